use std::time::Duration;
use thiserror::Error;

use crate::StepId;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Unknown handler type: {0}")]
    UnknownHandler(String),

    #[error("Handler configuration error for step '{step}': {source}")]
    HandlerConfig {
        step: StepId,
        #[source]
        source: StepError,
    },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Setup errors: the step set cannot be scheduled at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Cycle detected in step dependencies: {}", steps.join(", "))]
    CycleDetected { steps: Vec<StepId> },

    #[error("Duplicate step id: {0}")]
    DuplicateStep(StepId),

    #[error("Dependency '{dependency}' of step '{step}' does not exist")]
    UnknownDependency { step: StepId, dependency: StepId },

    #[error("Step '{0}' cannot depend on itself")]
    SelfDependency(StepId),

    #[error("Step id must not be empty")]
    EmptyStepId,
}

/// Cooperative control instructions raised by hooks or handlers.
///
/// These are not failures: the executor consumes them and they never reach
/// the caller of a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlSignal {
    #[error("flow cancelled: {reason}")]
    CancelFlow { reason: String },

    #[error("step skipped: {reason}")]
    SkipNode { reason: String },

    #[error("retry requested (max={max_retries}, delay={delay:?})")]
    RetryNode { max_retries: u32, delay: Duration },
}

impl ControlSignal {
    pub fn cancel(reason: impl Into<String>) -> Self {
        ControlSignal::CancelFlow {
            reason: reason.into(),
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        ControlSignal::SkipNode {
            reason: reason.into(),
        }
    }

    pub fn retry(max_retries: u32, delay: Duration) -> Self {
        ControlSignal::RetryNode { max_retries, delay }
    }
}

#[derive(Error, Debug, Clone)]
pub enum StepError {
    #[error(transparent)]
    Control(#[from] ControlSignal),

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {}ms", after.as_millis())]
    Timeout { after: Duration },

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        StepError::ExecutionFailed(message.into())
    }

    pub fn control(&self) -> Option<&ControlSignal> {
        match self {
            StepError::Control(signal) => Some(signal),
            _ => None,
        }
    }
}

/// Error returned from an extension hook.
///
/// `Signal` propagates to the executor; `Failed` is logged and swallowed.
#[derive(Error, Debug, Clone)]
pub enum HookError {
    #[error(transparent)]
    Signal(#[from] ControlSignal),

    #[error("{0}")]
    Failed(String),
}

impl HookError {
    pub fn failed(message: impl Into<String>) -> Self {
        HookError::Failed(message.into())
    }
}
