use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use flowcore::{sse_frame, Context, EventRecord, NodeKind, NodeStatus, NodeValidator, Value};
use flownodes::NodeCatalog;
use flowruntime::{
    ExecutionGraph, FlowFile, FlowRuntime, LoggingExtension, RetryExtension, RuntimeConfig,
    StepSpec, TimingExtension, ValidationExtension,
};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow Engine CLI", long_about = None)]
struct Cli {
    /// Read FLOW_* settings from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow file
    Run {
        /// Path to flow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Initial context as a JSON object
        #[arg(short, long)]
        context: Option<String>,

        /// How events are printed
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,

        /// Pause after setup, overrides FLOW_PRE_DELAY_MS
        #[arg(long)]
        pre_delay_ms: Option<u64>,

        /// Pause after each step, overrides FLOW_POST_DELAY_MS
        #[arg(long)]
        post_delay_ms: Option<u64>,

        /// Retry failed steps up to N times
        #[arg(long, default_value_t = 0)]
        retries: u32,

        /// Delay between retries
        #[arg(long, default_value_t = 500)]
        retry_delay_ms: u64,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow file
    Validate {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// List available handler types and node kinds
    Nodes,

    /// Create a new example flow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Pretty,
    Json,
    Sse,
}

struct RunArgs {
    env_file: Option<PathBuf>,
    file: PathBuf,
    context: Option<String>,
    format: Format,
    pre_delay_ms: Option<u64>,
    post_delay_ms: Option<u64>,
    retries: u32,
    retry_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.env_file.is_none() {
        let _ = dotenvy::dotenv();
    }

    match cli.command {
        Commands::Run {
            file,
            context,
            format,
            pre_delay_ms,
            post_delay_ms,
            retries,
            retry_delay_ms,
            verbose,
        } => {
            init_logging(verbose);
            run_flow(RunArgs {
                env_file: cli.env_file,
                file,
                context,
                format,
                pre_delay_ms,
                post_delay_ms,
                retries,
                retry_delay_ms,
            })
            .await?;
        }

        Commands::Validate { file } => {
            init_logging(false);
            validate_flow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_flow(output)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn parse_context(raw: Option<String>) -> Result<Context> {
    let Some(raw) = raw else {
        return Ok(Context::new());
    };
    let json: serde_json::Value = serde_json::from_str(&raw).context("Invalid --context JSON")?;
    match Value::from(json) {
        Value::Object(values) => Ok(Context::from_values(values)),
        _ => Err(anyhow::anyhow!("Context must be a JSON object")),
    }
}

async fn run_flow(args: RunArgs) -> Result<()> {
    let pretty = args.format == Format::Pretty;
    let flow = FlowFile::load(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;
    let context = parse_context(args.context)?;

    if pretty {
        println!("🚀 Loading flow from: {}", args.file.display());
        println!("📋 Flow: {}", flow.graph_id);
        println!("   Steps: {}", flow.steps.len());
        println!();
    }

    let mut config = match &args.env_file {
        Some(path) => RuntimeConfig::from_env_file(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => RuntimeConfig::from_env(),
    };
    if let Some(ms) = args.pre_delay_ms {
        config.options.pre_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = args.post_delay_ms {
        config.options.post_delay = Duration::from_millis(ms);
    }

    let runtime = FlowRuntime::with_registry(Arc::new(flownodes::standard_registry()), config);
    let mut executor = runtime
        .build(flow)?
        .with_extension(TimingExtension::new())
        .with_extension(LoggingExtension::new())
        .with_extension(ValidationExtension::new(Arc::new(NodeCatalog::standard())));
    if args.retries > 0 {
        executor = executor.with_extension(RetryExtension::new(
            args.retries,
            Duration::from_millis(args.retry_delay_ms),
        ));
    }

    let mut events = executor.run(context);
    let mut failed = false;
    while let Some(record) = events.next().await {
        if matches!(record, EventRecord::Error(_)) {
            failed = true;
        }
        match args.format {
            Format::Pretty => print_pretty(&record),
            Format::Json => println!("{}", record.to_envelope()?),
            Format::Sse => print!("{}", sse_frame(&record)?),
        }
    }
    let state = events.finish().await?;

    if pretty {
        println!();
        println!("📊 Execution Summary:");
        println!("   Run ID: {}", state.run_id);
        println!(
            "   Completed: {}/{} steps",
            state.results.len(),
            state.steps().len()
        );
        if let Some(total) = state.context.get(flowruntime::extensions::TOTAL_EXECUTION_TIME) {
            println!("   Time: {}s", total.as_f64().unwrap_or_default());
        }
        if !state.results.is_empty() {
            println!();
            println!("📤 Results:");
            for (step_id, value) in &state.results {
                println!("   {}: {}", step_id, value.to_json());
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_pretty(record: &EventRecord) {
    match record {
        EventRecord::NodeStatus(e) => match e.status {
            NodeStatus::Pending => {}
            NodeStatus::Running => println!("  ⚡ Starting step: {}", e.node_id),
            NodeStatus::Success => println!("  ✅ Step {} completed", e.node_id),
            NodeStatus::Warning => println!(
                "  ⚠️  Step {} {}",
                e.node_id,
                e.message.as_deref().unwrap_or("warning")
            ),
            NodeStatus::Error => println!(
                "  ❌ Step {} failed: {}",
                e.node_id,
                e.message.as_deref().unwrap_or("unknown error")
            ),
        },
        EventRecord::EdgeStatus(_) => {}
        EventRecord::Complete(e) => {
            println!("✨ {}", e.message.as_deref().unwrap_or("Flow completed"));
        }
        EventRecord::Error(e) => match &e.node_id {
            Some(node) => println!("💥 Flow failed at {}: {}", node, e.message),
            None => println!("💥 {}", e.message),
        },
    }
}

fn validate_flow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let flow = FlowFile::load(&file)?;
    let registry = flownodes::standard_registry();
    let catalog = NodeCatalog::standard();
    let graph_id = flow.graph_id.clone();

    let steps = flow.into_steps(&registry)?;
    let mut problems = catalog.check_connections(&steps);
    for step in &steps {
        if let Some(node) = &step.node {
            problems.extend(
                catalog
                    .validate(node)
                    .into_iter()
                    .map(|p| format!("{}: {}", step.id, p)),
            );
        }
    }
    let graph = ExecutionGraph::new(steps)?;

    if !problems.is_empty() {
        println!("❌ Flow has {} problem(s):", problems.len());
        for problem in &problems {
            println!("   - {}", problem);
        }
        std::process::exit(1);
    }

    println!("✅ Flow is valid:");
    println!("   Graph: {}", graph_id);
    println!("   Steps: {}", graph.len());
    println!("   Dependencies: {}", graph.edges().len());
    println!("   Order: {}", graph.sorted_ids().join(" → "));

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Handler Types:");
    println!();

    let registry = flownodes::standard_registry();
    for handler_type in registry.list_handler_types() {
        if let Some(metadata) = registry.get_metadata(&handler_type) {
            println!("  • {} ({})", handler_type, metadata.category);
            println!("    {}", metadata.description);
            for key in &metadata.config_keys {
                let required = if key.required { " (required)" } else { "" };
                println!("      {}{}: {}", key.name, required, key.description);
            }
        } else {
            println!("  • {}", handler_type);
        }
    }

    println!();
    println!("🧩 Node Kinds:");
    let catalog = NodeCatalog::standard();
    for kind in catalog.kinds() {
        let behavior = catalog.behavior(kind);
        println!("  • {} ({}): {}", kind, behavior.category, behavior.description);
    }
}

fn create_example_flow(output: PathBuf) -> Result<()> {
    let flow = FlowFile {
        graph_id: "example-flow".to_string(),
        steps: vec![
            StepSpec::new("load")
                .handler("transform.json_parse")
                .config("json", r#"{"greeting": "hello"}"#),
            StepSpec::new("remember")
                .depends_on(["load"])
                .handler("context.set")
                .config("key", "greeting"),
            StepSpec::new("render")
                .depends_on(["load"])
                .handler("transform.json_stringify")
                .config("pretty", true),
            StepSpec {
                node: Some(flowcore::FlowNode::new(
                    "log",
                    NodeKind::Output {
                        destination: "stdout".to_string(),
                    },
                )),
                ..StepSpec::new("log")
                    .depends_on(["render", "remember"])
                    .handler("debug.log")
                    .config("message", "flow finished")
            },
        ],
    };

    std::fs::write(&output, flow.to_json_pretty()?)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  flow run --file {} --context '{{\"user\": \"demo\"}}'",
        output.display()
    );

    Ok(())
}
