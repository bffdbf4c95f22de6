//! Per-kind node behaviour: category, style, validation, execution and
//! connection rules, looked up by kind name.

use crate::execute::{CodeNode, EndNode, ModelNode, PassThrough, StartNode, ToolNode};
use flowcore::{FlowNode, NodeExecutor, NodeKind, NodeValidator, Step, StepHandler};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Wildcard matching any node kind in connection rules.
pub const ANY_KIND: &str = "*";

const SUPPORTED_LANGUAGES: [&str; 2] = ["python", "javascript"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStyle {
    pub fill: String,
    pub stroke: String,
    #[serde(rename = "textColor")]
    pub text_color: String,
}

impl NodeStyle {
    pub fn new(fill: &str, stroke: &str, text_color: &str) -> Self {
        Self {
            fill: fill.to_string(),
            stroke: stroke.to_string(),
            text_color: text_color.to_string(),
        }
    }
}

pub type KindValidator = Arc<dyn Fn(&FlowNode) -> Vec<String> + Send + Sync>;

/// Builds the handler that runs a node of one kind.
pub type KindExecutor = Arc<dyn Fn(&FlowNode) -> Arc<dyn StepHandler> + Send + Sync>;

/// What the catalog knows about one node kind.
#[derive(Clone)]
pub struct NodeBehavior {
    pub category: String,
    pub description: String,
    pub style: NodeStyle,
    validator: Option<KindValidator>,
    executor: Option<KindExecutor>,
}

impl NodeBehavior {
    pub fn new(category: &str, description: &str, style: NodeStyle) -> Self {
        Self {
            category: category.to_string(),
            description: description.to_string(),
            style,
            validator: None,
            executor: None,
        }
    }

    /// Extra checks run after the common ones.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&FlowNode) -> Vec<String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Work for nodes of this kind. Kinds without one pass through.
    pub fn with_executor<F>(mut self, executor: F) -> Self
    where
        F: Fn(&FlowNode) -> Arc<dyn StepHandler> + Send + Sync + 'static,
    {
        self.executor = Some(Arc::new(executor));
        self
    }
}

impl fmt::Debug for NodeBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeBehavior")
            .field("category", &self.category)
            .field("description", &self.description)
            .field("style", &self.style)
            .field("validator", &self.validator.is_some())
            .field("executor", &self.executor.is_some())
            .finish()
    }
}

/// Lookup tables for node kinds. Start from [`NodeCatalog::standard`] and
/// register custom kinds or rules per instance.
#[derive(Debug, Clone)]
pub struct NodeCatalog {
    kinds: HashMap<String, NodeBehavior>,
    fallback: NodeBehavior,
    rules: HashMap<(String, String), String>,
}

impl NodeCatalog {
    /// Catalog with no kinds or rules; every node gets the fallback
    /// behaviour and every connection is allowed.
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
            fallback: NodeBehavior::new(
                "general",
                "Generic node",
                NodeStyle::new("#f1f5f9", "#94a3b8", "#334155"),
            ),
            rules: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut catalog = Self::empty();

        let dark = NodeStyle::new("#1e293b", "#1e293b", "#fff");
        catalog.register_kind(
            "start",
            NodeBehavior::new("graph", "Flow entry point", dark.clone())
                .with_executor(StartNode::for_node),
        );
        catalog.register_kind(
            "end",
            NodeBehavior::new("graph", "Flow exit point", dark).with_executor(EndNode::for_node),
        );
        catalog.register_kind(
            "agent",
            NodeBehavior::new(
                "ai",
                "LLM agent with a system prompt",
                NodeStyle::new("#dbeafe", "#60a5fa", "#1e40af"),
            )
            .with_validator(validate_agent)
            .with_executor(ModelNode::for_node),
        );
        catalog.register_kind(
            "tool",
            NodeBehavior::new(
                "ai",
                "Tool invocation",
                NodeStyle::new("#fce7f3", "#f472b6", "#9d174d"),
            )
            .with_validator(validate_tool)
            .with_executor(ToolNode::for_node),
        );
        catalog.register_kind(
            "llm",
            NodeBehavior::new(
                "ai",
                "Raw model call",
                NodeStyle::new("#f3e8ff", "#c084fc", "#6b21a8"),
            )
            .with_executor(ModelNode::for_node),
        );
        catalog.register_kind(
            "condition",
            NodeBehavior::new(
                "control",
                "Branch on a condition",
                NodeStyle::new("#fef3c7", "#fbbf24", "#92400e"),
            ),
        );
        catalog.register_kind(
            "input",
            NodeBehavior::new(
                "data",
                "Data source",
                NodeStyle::new("#dcfce7", "#4ade80", "#166534"),
            ),
        );
        catalog.register_kind(
            "output",
            NodeBehavior::new(
                "data",
                "Data sink",
                NodeStyle::new("#fee2e2", "#f87171", "#991b1b"),
            ),
        );
        let sky = NodeStyle::new("#e0f2fe", "#38bdf8", "#0369a1");
        catalog.register_kind("filter", NodeBehavior::new("data", "Filter records", sky.clone()));
        catalog.register_kind(
            "join",
            NodeBehavior::new(
                "data",
                "Join two inputs",
                NodeStyle::new("#fef3c7", "#fbbf24", "#92400e"),
            ),
        );
        catalog.register_kind("transform", NodeBehavior::new("data", "Transform records", sky));
        let chart = NodeStyle::new("#eff4ff", "#5f95ff", "#262626");
        catalog.register_kind(
            "process",
            NodeBehavior::new("flowchart", "Process step", chart.clone()),
        );
        catalog.register_kind(
            "decision",
            NodeBehavior::new("flowchart", "Decision point", chart),
        );
        catalog.register_kind(
            "code",
            NodeBehavior::new(
                "code",
                "Inline code block",
                NodeStyle::new("#e6fffb", "#08979c", "#08979c"),
            )
            .with_validator(validate_code)
            .with_executor(CodeNode::for_node),
        );

        catalog.register_rule("start", "end", "Cannot connect start directly to end");
        catalog.register_rule("end", ANY_KIND, "End node cannot have outgoing connections");
        catalog.register_rule(ANY_KIND, "start", "Start node cannot have incoming connections");
        catalog.register_rule("output", ANY_KIND, "Output node cannot have outgoing connections");
        catalog.register_rule(ANY_KIND, "input", "Input node cannot have incoming connections");
        catalog
    }

    pub fn register_kind(&mut self, kind: &str, behavior: NodeBehavior) {
        tracing::debug!("Registering node kind: {}", kind);
        self.kinds.insert(kind.to_string(), behavior);
    }

    /// Reject connections from `source` to `target`; either side may be
    /// [`ANY_KIND`].
    pub fn register_rule(&mut self, source: &str, target: &str, reason: &str) {
        self.rules
            .insert((source.to_string(), target.to_string()), reason.to_string());
    }

    pub fn behavior(&self, kind: &str) -> &NodeBehavior {
        self.kinds.get(kind).unwrap_or(&self.fallback)
    }

    pub fn is_known(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    pub fn style_for(&self, node: &FlowNode) -> &NodeStyle {
        &self.behavior(node.kind_name()).style
    }

    /// Known kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Handler running `node`: its kind's executor, or a pass-through
    /// returning `{"status": "completed", "node_id": ...}`.
    pub fn node_handler(&self, node: &FlowNode) -> Arc<dyn StepHandler> {
        match &self.behavior(node.kind_name()).executor {
            Some(executor) => executor(node),
            None => PassThrough::for_node(node),
        }
    }

    /// Most specific rule wins: exact pair, then source wildcard-target,
    /// then wildcard-source target.
    pub fn can_connect(&self, source: &FlowNode, target: &FlowNode) -> Result<(), String> {
        let (src, tgt) = (source.kind_name(), target.kind_name());
        let candidates = [(src, tgt), (src, ANY_KIND), (ANY_KIND, tgt)];
        for (s, t) in candidates {
            if let Some(reason) = self.rules.get(&(s.to_string(), t.to_string())) {
                return Err(reason.clone());
            }
        }
        Ok(())
    }

    /// Problems with every dependency edge whose two steps carry node
    /// metadata.
    pub fn check_connections(&self, steps: &[Step]) -> Vec<String> {
        let nodes: HashMap<&str, &FlowNode> = steps
            .iter()
            .filter_map(|s| s.node.as_ref().map(|n| (s.id.as_str(), n)))
            .collect();

        let mut problems = Vec::new();
        for step in steps {
            let Some(target) = nodes.get(step.id.as_str()) else {
                continue;
            };
            for dep in &step.depends_on {
                if let Some(source) = nodes.get(dep.as_str()) {
                    if let Err(reason) = self.can_connect(source, target) {
                        problems.push(format!("{} -> {}: {}", dep, step.id, reason));
                    }
                }
            }
        }
        problems
    }
}

impl Default for NodeCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl NodeValidator for NodeCatalog {
    fn validate(&self, node: &FlowNode) -> Vec<String> {
        let mut errors = Vec::new();
        if node.id.is_empty() {
            errors.push("Node must have an id".to_string());
        }
        if let Some(validator) = &self.behavior(node.kind_name()).validator {
            errors.extend(validator(node));
        }
        errors
    }
}

impl NodeExecutor for NodeCatalog {
    fn handler_for(&self, node: &FlowNode) -> Option<Arc<dyn StepHandler>> {
        Some(self.node_handler(node))
    }
}

fn validate_agent(node: &FlowNode) -> Vec<String> {
    let mut errors = Vec::new();
    if let NodeKind::Agent {
        model, temperature, ..
    } = &node.kind
    {
        if model.is_empty() {
            errors.push("Agent node must specify a model".to_string());
        }
        if !(0.0..=2.0).contains(temperature) {
            errors.push("Temperature must be between 0 and 2".to_string());
        }
    }
    errors
}

fn validate_tool(node: &FlowNode) -> Vec<String> {
    match &node.kind {
        NodeKind::Tool { tool_name, .. } if tool_name.is_empty() => {
            vec!["Tool node must specify a tool_name".to_string()]
        }
        _ => Vec::new(),
    }
}

fn validate_code(node: &FlowNode) -> Vec<String> {
    match &node.kind {
        NodeKind::Code { language, .. } if !SUPPORTED_LANGUAGES.contains(&language.as_str()) => {
            vec![format!("Unsupported language: {}", language)]
        }
        _ => Vec::new(),
    }
}
