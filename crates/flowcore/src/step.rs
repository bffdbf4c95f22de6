use crate::{Context, FlowNode, StepError, Value};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub type StepId = String;

/// Results of a step's dependencies, keyed by dependency id.
///
/// A dependency that was skipped or failed maps to `None`.
pub type StepInputs = HashMap<StepId, Option<Value>>;

/// Simulated work duration for steps without a handler.
pub const DEFAULT_SIMULATED_DURATION: Duration = Duration::from_secs(1);

/// Work performed by a step
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Run the step. `ctx` is the run's shared context and may be mutated.
    async fn call(&self, ctx: &mut Context, inputs: StepInputs) -> Result<Value, StepError>;
}

/// Adapter turning a closure into a [`StepHandler`].
///
/// ```ignore
/// let handler = handler_fn(|ctx, inputs| Box::pin(async move {
///     ctx.insert("seen", inputs.len() as i64);
///     Ok(Value::from("done"))
/// }));
/// ```
pub struct FnHandler<F> {
    func: F,
}

pub fn handler_fn<F>(func: F) -> Arc<dyn StepHandler>
where
    F: for<'a> Fn(&'a mut Context, StepInputs) -> BoxFuture<'a, Result<Value, StepError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnHandler { func })
}

#[async_trait]
impl<F> StepHandler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context, StepInputs) -> BoxFuture<'a, Result<Value, StepError>>
        + Send
        + Sync
        + 'static,
{
    async fn call(&self, ctx: &mut Context, inputs: StepInputs) -> Result<Value, StepError> {
        (self.func)(ctx, inputs).await
    }
}

/// One schedulable unit of work. Never mutated by the executor.
#[derive(Clone)]
pub struct Step {
    pub id: StepId,
    pub depends_on: Vec<StepId>,
    pub handler: Option<Arc<dyn StepHandler>>,
    pub simulated_duration: Duration,
    pub timeout: Option<Duration>,
    pub node: Option<FlowNode>,
}

impl Step {
    pub fn new(id: impl Into<StepId>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            handler: None,
            simulated_duration: DEFAULT_SIMULATED_DURATION,
            timeout: None,
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

    pub fn with_handler(mut self, handler: Arc<dyn StepHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.simulated_duration = duration;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_node(mut self, node: FlowNode) -> Self {
        self.node = Some(node);
        self
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .field("simulated_duration", &self.simulated_duration)
            .field("timeout", &self.timeout)
            .field("node", &self.node)
            .finish()
    }
}

/// A dependency hand-off from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: StepId,
    pub target: StepId,
}

impl Edge {
    pub fn new(source: impl Into<StepId>, target: impl Into<StepId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}
