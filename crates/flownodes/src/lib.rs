//! Standard node library
//!
//! The node-kind catalog used for validation, styling and per-kind
//! execution, and a set of built-in step handlers for common operations.

mod catalog;
mod context;
mod debug;
mod execute;
mod time;
mod transform;

pub use catalog::{KindExecutor, KindValidator, NodeBehavior, NodeCatalog, NodeStyle, ANY_KIND};
pub use context::{ContextSet, ContextSetFactory};
pub use execute::{ModelClient, ModelRequest, ModelService, Toolbox, INITIAL_DATA};
pub use debug::{DebugFail, DebugFailFactory, DebugLog, DebugLogFactory};
pub use time::{Delay, DelayFactory};
pub use transform::{JsonParse, JsonParseFactory, JsonStringify, JsonStringifyFactory};

use flowcore::{StepError, StepInputs, Value};
use flowruntime::HandlerRegistry;
use std::sync::Arc;

/// Register all standard handlers with a registry, along with the standard
/// catalog as the executor for steps that only carry a node.
pub fn register_all(registry: &mut HandlerRegistry) {
    registry.set_node_executor(Arc::new(NodeCatalog::standard()));
    registry.register(Arc::new(DebugLogFactory));
    registry.register(Arc::new(DebugFailFactory));
    registry.register(Arc::new(DelayFactory));
    registry.register(Arc::new(JsonParseFactory));
    registry.register(Arc::new(JsonStringifyFactory));
    registry.register(Arc::new(ContextSetFactory));
}

/// A registry holding every standard handler.
pub fn standard_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register_all(&mut registry);
    registry
}

/// The input a single-input handler works on: the dependency named `from`,
/// or the only dependency when there is exactly one.
pub(crate) fn pick_input(inputs: &StepInputs, from: Option<&str>) -> Result<Value, StepError> {
    let name = match from {
        Some(name) => name,
        None if inputs.len() == 1 => inputs.keys().next().map(String::as_str).unwrap_or(""),
        None => {
            return Err(StepError::MissingInput(format!(
                "expected exactly one dependency, got {}",
                inputs.len()
            )))
        }
    };
    inputs
        .get(name)
        .cloned()
        .flatten()
        .ok_or_else(|| StepError::MissingInput(name.to_string()))
}
