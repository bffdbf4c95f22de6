//! Work performed by nodes that have no named handler.
//!
//! Agent and model nodes call a [`ModelClient`] and tool nodes a
//! [`Toolbox`], both injected as context services. Without them the nodes
//! return a status object instead of failing, so a graph can be run before
//! its integrations are wired up.

use async_trait::async_trait;
use flowcore::{Context, FlowNode, NodeKind, StepError, StepHandler, StepInputs, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Context key holding the value a start node emits.
pub const INITIAL_DATA: &str = "initial_data";

/// One model call made by an agent or llm node.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub node_id: String,
    pub model: String,
    pub temperature: f64,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub inputs: Value,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<Value, StepError>;
}

/// Context service giving agent and llm nodes access to a model.
///
/// ```ignore
/// let ctx = Context::new().with_service(Arc::new(ModelService::new(client)));
/// ```
#[derive(Clone)]
pub struct ModelService {
    client: Arc<dyn ModelClient>,
}

impl ModelService {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }
}

/// Named tools callable from tool nodes, provided as a context service.
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: HashMap<String, Arc<dyn StepHandler>>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: impl Into<String>, tool: Arc<dyn StepHandler>) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StepHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn status<const N: usize>(status: &str, fields: [(&str, Value); N]) -> Value {
    let mut object = BTreeMap::new();
    object.insert("status".to_string(), Value::from(status));
    for (key, value) in fields {
        object.insert(key.to_string(), value);
    }
    Value::Object(object)
}

/// Dependency results as an object; missing results become null.
fn inputs_value(inputs: &StepInputs) -> Value {
    Value::Object(
        inputs
            .iter()
            .map(|(id, result)| (id.clone(), result.clone().unwrap_or_default()))
            .collect(),
    )
}

/// Returns `{"status": "completed", "node_id": ...}`.
pub(crate) struct PassThrough {
    node_id: String,
}

impl PassThrough {
    pub(crate) fn for_node(node: &FlowNode) -> Arc<dyn StepHandler> {
        Arc::new(Self {
            node_id: node.id.clone(),
        })
    }
}

#[async_trait]
impl StepHandler for PassThrough {
    async fn call(&self, _ctx: &mut Context, _inputs: StepInputs) -> Result<Value, StepError> {
        Ok(status("completed", [("node_id", Value::from(self.node_id.as_str()))]))
    }
}

/// Emits the context's initial data, or an empty object.
pub(crate) struct StartNode;

impl StartNode {
    pub(crate) fn for_node(_node: &FlowNode) -> Arc<dyn StepHandler> {
        Arc::new(Self)
    }
}

#[async_trait]
impl StepHandler for StartNode {
    async fn call(&self, ctx: &mut Context, _inputs: StepInputs) -> Result<Value, StepError> {
        Ok(ctx
            .get(INITIAL_DATA)
            .cloned()
            .unwrap_or_else(|| Value::Object(BTreeMap::new())))
    }
}

/// Collects every input under `final_results`.
pub(crate) struct EndNode;

impl EndNode {
    pub(crate) fn for_node(_node: &FlowNode) -> Arc<dyn StepHandler> {
        Arc::new(Self)
    }
}

#[async_trait]
impl StepHandler for EndNode {
    async fn call(&self, _ctx: &mut Context, inputs: StepInputs) -> Result<Value, StepError> {
        let mut object = BTreeMap::new();
        object.insert("final_results".to_string(), inputs_value(&inputs));
        Ok(Value::Object(object))
    }
}

pub(crate) struct ModelNode {
    template: ModelRequest,
}

impl ModelNode {
    pub(crate) fn for_node(node: &FlowNode) -> Arc<dyn StepHandler> {
        let (model, temperature, system_prompt, max_tokens) = match &node.kind {
            NodeKind::Agent {
                model,
                temperature,
                system_prompt,
            } => (
                model.clone(),
                *temperature,
                Some(system_prompt.clone()).filter(|p| !p.is_empty()),
                None,
            ),
            NodeKind::Llm {
                model,
                temperature,
                max_tokens,
            } => (model.clone(), *temperature, None, Some(*max_tokens)),
            _ => (String::new(), 0.7, None, None),
        };
        Arc::new(Self {
            template: ModelRequest {
                node_id: node.id.clone(),
                model,
                temperature,
                system_prompt,
                max_tokens,
                inputs: Value::Null,
            },
        })
    }
}

#[async_trait]
impl StepHandler for ModelNode {
    async fn call(&self, ctx: &mut Context, inputs: StepInputs) -> Result<Value, StepError> {
        let inputs = inputs_value(&inputs);
        match ctx.service::<ModelService>() {
            Some(service) => {
                tracing::debug!(
                    "Node {} calling model {}",
                    self.template.node_id,
                    self.template.model
                );
                let request = ModelRequest {
                    inputs,
                    ..self.template.clone()
                };
                service.client.complete(request).await
            }
            None => Ok(status(
                "no_llm_configured",
                [
                    ("node_id", Value::from(self.template.node_id.as_str())),
                    ("inputs", inputs),
                ],
            )),
        }
    }
}

pub(crate) struct ToolNode {
    tool_name: String,
}

impl ToolNode {
    pub(crate) fn for_node(node: &FlowNode) -> Arc<dyn StepHandler> {
        let tool_name = match &node.kind {
            NodeKind::Tool { tool_name, .. } => tool_name.clone(),
            _ => String::new(),
        };
        Arc::new(Self { tool_name })
    }
}

#[async_trait]
impl StepHandler for ToolNode {
    async fn call(&self, ctx: &mut Context, inputs: StepInputs) -> Result<Value, StepError> {
        let tool = ctx
            .service::<Toolbox>()
            .and_then(|tools| tools.get(&self.tool_name));
        match tool {
            Some(tool) => tool.call(ctx, inputs).await,
            None => {
                tracing::warn!("Tool {} not found", self.tool_name);
                Ok(status(
                    "tool_not_found",
                    [("tool_name", Value::from(self.tool_name.as_str()))],
                ))
            }
        }
    }
}

/// Code blocks are carried for display only and never evaluated.
pub(crate) struct CodeNode {
    node_id: String,
    language: String,
    has_code: bool,
}

impl CodeNode {
    pub(crate) fn for_node(node: &FlowNode) -> Arc<dyn StepHandler> {
        let (language, has_code) = match &node.kind {
            NodeKind::Code { language, code } => (language.clone(), !code.trim().is_empty()),
            _ => (String::new(), false),
        };
        Arc::new(Self {
            node_id: node.id.clone(),
            language,
            has_code,
        })
    }
}

#[async_trait]
impl StepHandler for CodeNode {
    async fn call(&self, _ctx: &mut Context, _inputs: StepInputs) -> Result<Value, StepError> {
        if !self.has_code {
            return Ok(status("no_code", [("node_id", Value::from(self.node_id.as_str()))]));
        }
        Ok(status(
            "unsupported_language",
            [("language", Value::from(self.language.as_str()))],
        ))
    }
}
