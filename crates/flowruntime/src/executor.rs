use crate::extensions::{panic_message, Drained, ExtensionRegistry, StreamExtension};
use crate::graph::ExecutionGraph;
use flowcore::{
    Context, ControlSignal, Edge, EventRecord, ExecutionState, Extension, FlowError, Hook,
    NodeStatus, RunOptions, Step, StepError, StepInputs, StepOutcome, Value,
};
use futures::future::{BoxFuture, FutureExt};
use futures::Stream;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Default capacity of the event channel between a run and its consumer.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

const STREAM_CLOSED: &str = "event stream closed";
const CALLER_CANCELLED: &str = "cancelled by caller";

/// Runs a validated step graph one step at a time in topological order,
/// dispatching lifecycle hooks to its extensions and streaming the events
/// they produce.
pub struct FlowExecutor {
    graph_id: String,
    graph: ExecutionGraph,
    extensions: ExtensionRegistry,
    options: RunOptions,
    event_buffer: usize,
    cancel: CancellationToken,
}

impl FlowExecutor {
    /// Validate `steps` and build an executor with the default stream
    /// extension. Cycles and broken dependencies are reported here, before
    /// any event is produced.
    pub fn new(graph_id: impl Into<String>, steps: Vec<Step>) -> Result<Self, FlowError> {
        let graph = ExecutionGraph::new(steps)?;
        Ok(Self::from_graph(graph_id, graph))
    }

    pub fn from_graph(graph_id: impl Into<String>, graph: ExecutionGraph) -> Self {
        Self {
            graph_id: graph_id.into(),
            graph,
            extensions: ExtensionRegistry::with_defaults(),
            options: RunOptions::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_extension(mut self, extension: impl Extension + 'static) -> Self {
        self.extensions.register(Box::new(extension));
        self
    }

    /// Replace the extension set. A stream extension is added if missing.
    pub fn with_extensions(mut self, mut extensions: ExtensionRegistry) -> Self {
        extensions.ensure_stream();
        self.extensions = extensions;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size.max(1);
        self
    }

    /// Observe `token` at every checkpoint; cancelling it stops the run
    /// before the next step starts.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    pub fn graph(&self) -> &ExecutionGraph {
        &self.graph
    }

    pub fn steps(&self) -> &[Step] {
        self.graph.steps()
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.extensions
    }

    /// Start the run on the tokio runtime and return its event stream.
    ///
    /// Dropping the stream cancels the run at its next checkpoint.
    pub fn run(self, context: Context) -> EventStream {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move {
            let mut executor = self;
            let mut outlet = Outlet::new(Sink::Channel(tx));
            executor.execute(context, &mut outlet).await
        });
        EventStream { rx, task, cancel }
    }

    /// Run to completion in the current task, buffering every event.
    ///
    /// The executor can be run again afterwards; built-in extensions reset
    /// their counters in `before_flow`.
    pub async fn run_to_end(&mut self, context: Context) -> RunReport {
        let mut outlet = Outlet::new(Sink::Buffer(Vec::new()));
        let state = self.execute(context, &mut outlet).await;
        let events = match outlet.sink {
            Sink::Buffer(events) => events,
            Sink::Channel(_) => Vec::new(),
        };
        RunReport { events, state }
    }

    async fn execute(&mut self, context: Context, outlet: &mut Outlet) -> ExecutionState {
        let mut state = ExecutionState::new(
            self.graph_id.clone(),
            Arc::clone(self.graph.steps()),
            Arc::clone(self.graph.edges()),
            context,
            self.options.clone(),
        );
        let span = tracing::info_span!(
            "flow_run",
            graph_id = %state.graph_id,
            run_id = %state.run_id
        );
        self.drive(&mut state, outlet).instrument(span).await;
        state
    }

    async fn drive(&mut self, state: &mut ExecutionState, outlet: &mut Outlet) {
        tracing::info!("Starting flow {} with {} steps", state.graph_id, self.graph.len());

        if let Err(signal) = self.extensions.dispatch(Hook::BeforeFlow, state) {
            self.flow_signal(state, Hook::BeforeFlow, signal);
        }
        self.flush(state, outlet).await;

        if !state.cancelled {
            pause(&self.cancel, state.options.pre_delay).await;
            self.checkpoint(state);
        }
        if !state.cancelled {
            self.run_steps(state, outlet).await;
        }

        if state.cancelled {
            tracing::info!(
                "Flow {} cancelled: {}",
                state.graph_id,
                state.cancel_reason.as_deref().unwrap_or("no reason given")
            );
            if let Err(signal) = self.extensions.dispatch(Hook::OnCancel, state) {
                self.flow_signal(state, Hook::OnCancel, signal);
            }
            self.flush(state, outlet).await;
        }

        if let Err(signal) = self.extensions.dispatch(Hook::AfterFlow, state) {
            self.flow_signal(state, Hook::AfterFlow, signal);
        }
        self.flush(state, outlet).await;

        if !outlet.terminal_sent {
            tracing::debug!("No terminal event was streamed, synthesizing one");
            outlet.terminal_sent = true;
            outlet.send(StreamExtension::terminal_record(state)).await;
        }

        tracing::info!(
            "Flow {} finished: {} results, {} errors ({} recovered), cancelled={}",
            state.graph_id,
            state.results.len(),
            state.errors.len(),
            state.errors.len() - state.active_errors().count(),
            state.cancelled
        );
    }

    async fn run_steps(&mut self, state: &mut ExecutionState, outlet: &mut Outlet) {
        let steps = Arc::clone(self.graph.steps());
        let order = self.graph.order().to_vec();

        for index in order {
            self.checkpoint(state);
            if state.cancelled {
                break;
            }

            let step = &steps[index];
            let incoming = self.graph.incoming(index).to_vec();
            state.enter_step(index);
            tracing::debug!("Entering step {}", step.id);

            if self.announce_edges(state, outlet, &incoming).await
                || self.before_node(state, outlet).await
            {
                if state.cancelled {
                    state.set_outcome(step.id.as_str(), StepOutcome::Cancelled);
                    state.leave_step();
                    break;
                }
                tracing::debug!("Step {} skipped before execution", step.id);
                state.set_outcome(step.id.as_str(), StepOutcome::Skipped);
                state.leave_step();
                continue;
            }

            self.execute_step(state, outlet, step).await;
            if state.cancelled {
                state.leave_step();
                break;
            }

            if let Err(signal) = self.extensions.dispatch(Hook::AfterNode, state) {
                self.flow_signal(state, Hook::AfterNode, signal);
            }
            self.flush(state, outlet).await;

            for edge in &incoming {
                if state.cancelled {
                    break;
                }
                state.current_edge = Some(edge.clone());
                if let Err(signal) = self.extensions.dispatch(Hook::AfterEdge, state) {
                    self.flow_signal(state, Hook::AfterEdge, signal);
                }
                self.flush(state, outlet).await;
            }

            state.leave_step();
            if state.cancelled {
                break;
            }
            pause(&self.cancel, state.options.post_delay).await;
        }
    }

    /// `before_edge` for every dependency of the current step. Returns true
    /// when the step must not run.
    async fn announce_edges(
        &mut self,
        state: &mut ExecutionState,
        outlet: &mut Outlet,
        incoming: &[Edge],
    ) -> bool {
        for edge in incoming {
            state.current_edge = Some(edge.clone());
            let signal = self.extensions.dispatch(Hook::BeforeEdge, state).err();
            self.flush(state, outlet).await;
            if let Some(signal) = signal {
                self.step_signal(state, Hook::BeforeEdge, signal);
            }
            if state.cancelled || state.skip_current {
                state.current_edge = None;
                return true;
            }
        }
        state.current_edge = None;
        false
    }

    async fn before_node(&mut self, state: &mut ExecutionState, outlet: &mut Outlet) -> bool {
        let signal = self.extensions.dispatch(Hook::BeforeNode, state).err();
        self.flush(state, outlet).await;
        if let Some(signal) = signal {
            self.step_signal(state, Hook::BeforeNode, signal);
        }
        state.cancelled || state.skip_current
    }

    /// Run the current step's work, retrying as long as the shared retry
    /// budget allows.
    async fn execute_step(&mut self, state: &mut ExecutionState, outlet: &mut Outlet, step: &Step) {
        let mut budget = RetryBudget::default();

        loop {
            state.attempt += 1;
            let failure = match invoke(state, step).await {
                Ok(value) => {
                    tracing::debug!("Step {} succeeded on attempt {}", step.id, state.attempt);
                    state.set_result(step.id.as_str(), value);
                    state.set_outcome(step.id.as_str(), StepOutcome::Succeeded);
                    return;
                }
                Err(StepError::Control(ControlSignal::SkipNode { reason })) => {
                    tracing::debug!("Step {} skipped itself: {}", step.id, reason);
                    state.skip_current = true;
                    state.set_outcome(step.id.as_str(), StepOutcome::Skipped);
                    return;
                }
                Err(StepError::Control(ControlSignal::CancelFlow { reason })) => {
                    tracing::info!("Step {} cancelled the flow: {}", step.id, reason);
                    state.add_error(StepError::Cancelled(reason.clone()), None);
                    state.cancel(reason);
                    state.set_outcome(step.id.as_str(), StepOutcome::Cancelled);
                    return;
                }
                Err(StepError::Control(ControlSignal::RetryNode { max_retries, delay })) => {
                    if budget.take(max_retries) {
                        tracing::info!(
                            "Step {} requested a retry ({} left)",
                            step.id,
                            budget.remaining()
                        );
                        if self.retry_pause(state, step, delay).await {
                            continue;
                        }
                        return;
                    }
                    StepError::RetriesExhausted {
                        attempts: state.attempt,
                    }
                }
                Err(error) => error,
            };

            if self.handle_failure(state, outlet, step, failure, &mut budget).await {
                continue;
            }
            return;
        }
    }

    /// Record a failure and let the extensions react to it. Returns true
    /// when the step should be attempted again.
    async fn handle_failure(
        &mut self,
        state: &mut ExecutionState,
        outlet: &mut Outlet,
        step: &Step,
        error: StepError,
        budget: &mut RetryBudget,
    ) -> bool {
        tracing::error!("Step {} failed (attempt {}): {}", step.id, state.attempt, error);
        let record = state.add_error(error.clone(), None);
        let signal = self.extensions.dispatch_error(state, &error).err();
        self.flush(state, outlet).await;

        match signal {
            None => {
                state.set_outcome(step.id.as_str(), StepOutcome::Failed);
                false
            }
            Some(ControlSignal::RetryNode { max_retries, delay }) => {
                if !budget.take(max_retries) {
                    tracing::warn!("Retry budget for step {} is exhausted", step.id);
                    state.set_outcome(step.id.as_str(), StepOutcome::Failed);
                    return false;
                }
                state.errors[record].superseded = true;
                self.retry_pause(state, step, delay).await
            }
            Some(ControlSignal::SkipNode { reason }) => {
                tracing::debug!("Failure of step {} downgraded to skip: {}", step.id, reason);
                state.errors[record].superseded = true;
                state.skip_current = true;
                state.set_outcome(step.id.as_str(), StepOutcome::Skipped);
                false
            }
            Some(ControlSignal::CancelFlow { reason }) => {
                state.cancel(reason);
                state.set_outcome(step.id.as_str(), StepOutcome::Cancelled);
                false
            }
        }
    }

    /// Wait out a retry delay. Returns false if the run was cancelled in
    /// the meantime.
    async fn retry_pause(
        &mut self,
        state: &mut ExecutionState,
        step: &Step,
        delay: Duration,
    ) -> bool {
        pause(&self.cancel, delay).await;
        self.checkpoint(state);
        if state.cancelled {
            state.set_outcome(step.id.as_str(), StepOutcome::Cancelled);
            return false;
        }
        true
    }

    /// Signals raised before the step runs: cancel stops the run, skip
    /// bypasses the step.
    fn step_signal(&self, state: &mut ExecutionState, hook: Hook, signal: ControlSignal) {
        match signal {
            ControlSignal::CancelFlow { reason } => state.cancel(reason),
            ControlSignal::SkipNode { .. } => state.skip_current = true,
            ControlSignal::RetryNode { .. } => {
                tracing::warn!("Ignoring retry request raised in {}", hook);
            }
        }
    }

    /// Signals raised where only cancellation is meaningful.
    fn flow_signal(&self, state: &mut ExecutionState, hook: Hook, signal: ControlSignal) {
        match signal {
            ControlSignal::CancelFlow { reason } => state.cancel(reason),
            other => tracing::warn!("Ignoring {} raised in {}", other, hook),
        }
    }

    fn checkpoint(&self, state: &mut ExecutionState) {
        if self.cancel.is_cancelled() {
            state.cancel(CALLER_CANCELLED);
        }
    }

    /// Forward buffered extension events to the consumer.
    async fn flush(&mut self, state: &mut ExecutionState, outlet: &mut Outlet) {
        for Drained {
            record,
            closes_stream,
        } in self.extensions.drain_events()
        {
            if outlet.terminal_sent {
                tracing::warn!("Dropping event after the terminal one: {}", record);
                continue;
            }
            if closes_stream {
                outlet.terminal_sent = true;
            }
            if !outlet.send(record).await {
                state.cancel(STREAM_CLOSED);
            }
        }
    }
}

impl std::fmt::Debug for FlowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowExecutor")
            .field("graph_id", &self.graph_id)
            .field("steps", &self.graph.sorted_ids())
            .field("extensions", &self.extensions.names())
            .field("options", &self.options)
            .finish()
    }
}

/// Sleep for `duration`, waking early if `cancel` fires.
async fn pause(cancel: &CancellationToken, duration: Duration) {
    if duration.is_zero() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = cancel.cancelled() => {}
    }
}

/// Call the step's handler, or simulate its work when it has none.
async fn invoke(state: &mut ExecutionState, step: &Step) -> Result<Value, StepError> {
    let work: BoxFuture<'_, Result<Value, StepError>> = match &step.handler {
        Some(handler) => {
            let inputs: StepInputs = step
                .depends_on
                .iter()
                .map(|dep| (dep.clone(), state.get_result(dep).cloned()))
                .collect();
            handler.call(&mut state.context, inputs)
        }
        None => {
            let duration = step.simulated_duration;
            Box::pin(async move {
                tokio::time::sleep(duration).await;
                Ok(Value::completed_marker())
            })
        }
    };

    let guarded = AssertUnwindSafe(work).catch_unwind();
    let outcome = match step.timeout {
        Some(after) => match tokio::time::timeout(after, guarded).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(StepError::Timeout { after }),
        },
        None => guarded.await,
    };
    outcome.unwrap_or_else(|panic| Err(StepError::Panicked(panic_message(panic.as_ref()))))
}

/// Retries left for one step, shared by handler and extension requests.
#[derive(Debug, Default)]
struct RetryBudget {
    remaining: Option<u32>,
}

impl RetryBudget {
    /// Consume one retry of a request allowing `requested` more attempts.
    fn take(&mut self, requested: u32) -> bool {
        let available = self
            .remaining
            .map_or(requested, |left| left.min(requested));
        if available == 0 {
            self.remaining = Some(0);
            return false;
        }
        self.remaining = Some(available - 1);
        true
    }

    fn remaining(&self) -> u32 {
        self.remaining.unwrap_or(0)
    }
}

enum Sink {
    Channel(mpsc::Sender<EventRecord>),
    Buffer(Vec<EventRecord>),
}

struct Outlet {
    sink: Sink,
    terminal_sent: bool,
    closed: bool,
}

impl Outlet {
    fn new(sink: Sink) -> Self {
        Self {
            sink,
            terminal_sent: false,
            closed: false,
        }
    }

    /// Returns false once the consumer has gone away.
    async fn send(&mut self, record: EventRecord) -> bool {
        if self.closed {
            return false;
        }
        match &mut self.sink {
            Sink::Buffer(events) => events.push(record),
            Sink::Channel(tx) => {
                if tx.send(record).await.is_err() {
                    tracing::debug!("Event receiver dropped");
                    self.closed = true;
                    return false;
                }
            }
        }
        true
    }
}

/// Events of a running flow, in emission order.
///
/// Ends after the terminal `complete` or `error` record. Use
/// [`collect`](Self::collect) to wait for the final state.
pub struct EventStream {
    rx: mpsc::Receiver<EventRecord>,
    task: JoinHandle<ExecutionState>,
    cancel: CancellationToken,
}

impl EventStream {
    /// Request cooperative cancellation. The run stops before its next step
    /// and still emits its terminal record.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the remaining events and wait for the run to end.
    pub async fn collect(mut self) -> Result<RunReport, FlowError> {
        let mut events = Vec::new();
        while let Some(record) = self.rx.recv().await {
            events.push(record);
        }
        let state = self
            .task
            .await
            .map_err(|e| FlowError::Execution(format!("Run task failed: {}", e)))?;
        Ok(RunReport { events, state })
    }

    /// Like [`collect`](Self::collect), discarding events already consumed.
    pub async fn finish(self) -> Result<ExecutionState, FlowError> {
        self.collect().await.map(|report| report.state)
    }
}

impl Stream for EventStream {
    type Item = EventRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub events: Vec<EventRecord>,
    pub state: ExecutionState,
}

impl RunReport {
    pub fn terminal(&self) -> Option<&EventRecord> {
        self.events.iter().rev().find(|e| e.is_terminal())
    }

    /// True when the run ended with a `complete` record.
    pub fn succeeded(&self) -> bool {
        matches!(self.terminal(), Some(EventRecord::Complete(_)))
    }

    /// Node statuses reported for `step_id`, in order.
    pub fn node_statuses(&self, step_id: &str) -> Vec<NodeStatus> {
        self.events
            .iter()
            .filter_map(|e| match e {
                EventRecord::NodeStatus(ev) if ev.node_id == step_id => Some(ev.status),
                _ => None,
            })
            .collect()
    }

    /// Step ids in the order they were reported `running`.
    pub fn started_steps(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                EventRecord::NodeStatus(ev) if ev.status == NodeStatus::Running => {
                    Some(ev.node_id.as_str())
                }
                _ => None,
            })
            .collect()
    }
}
