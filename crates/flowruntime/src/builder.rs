//! Shortcuts for assembling executors from plain step lists and flow files.

use crate::executor::FlowExecutor;
use crate::registry::{HandlerConfig, HandlerRegistry};
use flowcore::{FlowError, FlowNode, Step, StepHandler, StepId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const QUICK_FLOW_ID: &str = "quick-flow";
pub const PIPELINE_ID: &str = "pipeline";

/// A step as written in a flow file. The handler is named, not embedded,
/// and is resolved through a [`HandlerRegistry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: StepId,
    #[serde(default, alias = "dependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "HandlerConfig::is_empty")]
    pub config: HandlerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<FlowNode>,
}

impl StepSpec {
    pub fn new(id: impl Into<StepId>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            handler: None,
            config: HandlerConfig::new(),
            duration_ms: None,
            timeout_ms: None,
            node: None,
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn handler(mut self, handler_type: impl Into<String>) -> Self {
        self.handler = Some(handler_type.into());
        self
    }

    pub fn config(mut self, key: impl Into<String>, value: impl Into<flowcore::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn duration_ms(mut self, millis: u64) -> Self {
        self.duration_ms = Some(millis);
        self
    }

    /// Resolve the named handler and build the executable step. Without a
    /// named handler, a step with node metadata runs its kind's behaviour
    /// when the registry knows one.
    pub fn into_step(self, handlers: &HandlerRegistry) -> Result<Step, FlowError> {
        let handler = match &self.handler {
            Some(handler_type) => Some(
                handlers
                    .create_handler(handler_type, &self.config)
                    .map_err(|e| match e {
                        FlowError::HandlerConfig { source, .. } => FlowError::HandlerConfig {
                            step: self.id.clone(),
                            source,
                        },
                        other => other,
                    })?,
            ),
            None => self.node.as_ref().and_then(|node| handlers.node_handler(node)),
        };

        let mut step = Step::new(self.id).depends_on(self.depends_on);
        if let Some(handler) = handler {
            step = step.with_handler(handler);
        }
        if let Some(millis) = self.duration_ms {
            step = step.with_duration(Duration::from_millis(millis));
        }
        if let Some(millis) = self.timeout_ms {
            step = step.with_timeout(Duration::from_millis(millis));
        }
        if let Some(node) = self.node {
            step = step.with_node(node);
        }
        Ok(step)
    }
}

/// On-disk flow description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowFile {
    #[serde(default = "default_graph_id", alias = "graphId")]
    pub graph_id: String,
    pub steps: Vec<StepSpec>,
}

fn default_graph_id() -> String {
    QUICK_FLOW_ID.to_string()
}

impl FlowFile {
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn into_steps(self, handlers: &HandlerRegistry) -> Result<Vec<Step>, FlowError> {
        self.steps
            .into_iter()
            .map(|spec| spec.into_step(handlers))
            .collect()
    }

    pub fn into_executor(self, handlers: &HandlerRegistry) -> Result<FlowExecutor, FlowError> {
        let graph_id = self.graph_id.clone();
        FlowExecutor::new(graph_id, self.into_steps(handlers)?)
    }
}

/// Executor named `quick-flow` over `steps`.
pub fn quick_flow(steps: Vec<Step>) -> Result<FlowExecutor, FlowError> {
    FlowExecutor::new(QUICK_FLOW_ID, steps)
}

/// Linear chain: every handler depends on the one before it.
///
/// ```ignore
/// let executor = run_pipeline(PIPELINE_ID, vec![("load", load), ("train", train)])?;
/// ```
pub fn run_pipeline<S>(
    graph_id: impl Into<String>,
    handlers: Vec<(S, Arc<dyn StepHandler>)>,
) -> Result<FlowExecutor, FlowError>
where
    S: Into<StepId>,
{
    let mut steps: Vec<Step> = Vec::with_capacity(handlers.len());
    for (id, handler) in handlers {
        let mut step = Step::new(id).with_handler(handler);
        if let Some(previous) = steps.last() {
            step = step.depends_on([previous.id.clone()]);
        }
        steps.push(step);
    }
    FlowExecutor::new(graph_id, steps)
}
