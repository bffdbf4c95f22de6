use crate::builder::FlowFile;
use crate::executor::{EventStream, FlowExecutor, DEFAULT_EVENT_BUFFER};
use crate::registry::HandlerRegistry;
use flowcore::{Context, FlowError, RunOptions};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Main entry point: resolves flow files against a handler registry and
/// runs them with shared settings.
pub struct FlowRuntime {
    handlers: Arc<HandlerRegistry>,
    config: RuntimeConfig,
}

impl FlowRuntime {
    /// Create a new runtime with default settings and no handlers
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(HandlerRegistry::new()), config)
    }

    /// Create a new runtime with a pre-populated registry
    pub fn with_registry(handlers: Arc<HandlerRegistry>, config: RuntimeConfig) -> Self {
        Self { handlers, config }
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Build an executor for `flow` using this runtime's settings.
    pub fn build(&self, flow: FlowFile) -> Result<FlowExecutor, FlowError> {
        Ok(flow
            .into_executor(&self.handlers)?
            .with_options(self.config.options.clone())
            .with_event_buffer(self.config.event_buffer_size))
    }

    /// Build and start `flow`.
    pub fn run(&self, flow: FlowFile, context: Context) -> Result<EventStream, FlowError> {
        Ok(self.build(flow)?.run(context))
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    pub options: RunOptions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: DEFAULT_EVENT_BUFFER,
            options: RunOptions::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `FLOW_EVENT_BUFFER`, `FLOW_PRE_DELAY_MS`,
    /// `FLOW_POST_DELAY_MS` and `FLOW_RESET_FIRST`. Unparseable values are
    /// ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), with the `KEY=value` lines of a
    /// dotenv file filling in variables the process environment leaves unset.
    /// The process environment itself is not modified.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let mut file_vars = HashMap::new();
        for item in dotenvy::from_path_iter(path.as_ref()).map_err(env_file_error)? {
            let (key, value) = item.map_err(env_file_error)?;
            file_vars.insert(key, value);
        }
        tracing::debug!(
            "Loaded {} variables from {}",
            file_vars.len(),
            path.as_ref().display()
        );
        Ok(Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| file_vars.get(key).cloned())
        }))
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(size) = parse_var::<usize, _>(&lookup, "FLOW_EVENT_BUFFER") {
            config.event_buffer_size = size.max(1);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "FLOW_PRE_DELAY_MS") {
            config.options.pre_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "FLOW_POST_DELAY_MS") {
            config.options.post_delay = Duration::from_millis(ms);
        }
        if let Some(reset) = parse_var::<bool, _>(&lookup, "FLOW_RESET_FIRST") {
            config.options.reset_first = reset;
        }
        config
    }
}

fn env_file_error(error: dotenvy::Error) -> FlowError {
    match error {
        dotenvy::Error::Io(io) => FlowError::Io(io),
        other => FlowError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, other)),
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}
