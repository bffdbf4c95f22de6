//! Core abstractions for the flow engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: steps and their handlers, the per-run execution
//! state, the extension trait, control signals and progress event records.
//! It contains no scheduling logic.

mod context;
mod error;
pub mod events;
mod extension;
mod node;
mod state;
mod step;
mod value;

pub use context::Context;
pub use error::{ControlSignal, FlowError, GraphError, HookError, StepError};
pub use events::*;
pub use extension::{Extension, Hook, HookResult};
pub use node::{FlowNode, NodeExecutor, NodeKind, NodeValidator};
pub use state::{ErrorRecord, ExecutionState, RunOptions, StepOutcome};
pub use step::{
    handler_fn, Edge, FnHandler, Step, StepHandler, StepId, StepInputs,
    DEFAULT_SIMULATED_DURATION,
};
pub use value::Value;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
