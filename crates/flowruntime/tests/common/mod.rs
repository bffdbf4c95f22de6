#![allow(dead_code)]

use async_trait::async_trait;
use flowcore::{
    Context, ControlSignal, ExecutionState, Extension, Hook, HookResult, Step, StepError,
    StepHandler, StepInputs, Value,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A step with no handler that finishes immediately.
pub fn instant(id: &str) -> Step {
    Step::new(id).with_duration(Duration::ZERO)
}

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Handler returning a fixed value and counting its calls.
pub struct Returns {
    value: Value,
    pub calls: Arc<AtomicU32>,
}

impl Returns {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl StepHandler for Returns {
    async fn call(&self, _ctx: &mut Context, _inputs: StepInputs) -> Result<Value, StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.clone())
    }
}

/// Handler that answers with `error` for the first `failures` calls and
/// with `"ok"` afterwards.
pub struct FailsFirst {
    failures: u32,
    error: StepError,
    pub calls: Arc<AtomicU32>,
}

impl FailsFirst {
    pub fn new(failures: u32, error: StepError) -> Self {
        Self {
            failures,
            error,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn always(error: StepError) -> Self {
        Self::new(u32::MAX, error)
    }
}

#[async_trait]
impl StepHandler for FailsFirst {
    async fn call(&self, _ctx: &mut Context, _inputs: StepInputs) -> Result<Value, StepError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(self.error.clone())
        } else {
            Ok(Value::from("ok"))
        }
    }
}

/// Extension that journals every hook as `name:hook[:step]` and can raise
/// configured signals.
pub struct Recorder {
    name: String,
    order: i32,
    journal: Journal,
    raises: Vec<(Hook, Option<String>, ControlSignal)>,
    on_error: Option<ControlSignal>,
}

impl Recorder {
    pub fn new(name: &str, order: i32, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            order,
            journal: Arc::clone(journal),
            raises: Vec::new(),
            on_error: None,
        }
    }

    /// Raise `signal` from `hook`, only for `step` when given.
    pub fn raise(mut self, hook: Hook, step: Option<&str>, signal: ControlSignal) -> Self {
        self.raises.push((hook, step.map(str::to_string), signal));
        self
    }

    pub fn on_error_signal(mut self, signal: ControlSignal) -> Self {
        self.on_error = Some(signal);
        self
    }

    fn record(&mut self, hook: Hook, state: &ExecutionState) -> HookResult {
        let entry = match state.current_step_id() {
            Some(id) => format!("{}:{}:{}", self.name, hook, id),
            None => format!("{}:{}", self.name, hook),
        };
        self.journal.lock().unwrap().push(entry);

        for (raise_hook, step, signal) in &self.raises {
            let step_matches = match step {
                Some(step) => state.current_step_id() == Some(step.as_str()),
                None => true,
            };
            if *raise_hook == hook && step_matches {
                return Err(signal.clone().into());
            }
        }
        Ok(())
    }
}

impl Extension for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn before_flow(&mut self, state: &mut ExecutionState) -> HookResult {
        self.record(Hook::BeforeFlow, state)
    }

    fn after_flow(&mut self, state: &mut ExecutionState) -> HookResult {
        self.record(Hook::AfterFlow, state)
    }

    fn before_node(&mut self, state: &mut ExecutionState) -> HookResult {
        self.record(Hook::BeforeNode, state)
    }

    fn after_node(&mut self, state: &mut ExecutionState) -> HookResult {
        self.record(Hook::AfterNode, state)
    }

    fn before_edge(&mut self, state: &mut ExecutionState) -> HookResult {
        self.record(Hook::BeforeEdge, state)
    }

    fn after_edge(&mut self, state: &mut ExecutionState) -> HookResult {
        self.record(Hook::AfterEdge, state)
    }

    fn on_error(&mut self, state: &mut ExecutionState, _error: &StepError) -> HookResult {
        let entry = format!(
            "{}:on_error:{}",
            self.name,
            state.current_step_id().unwrap_or("")
        );
        self.journal.lock().unwrap().push(entry);
        match &self.on_error {
            Some(signal) => Err(signal.clone().into()),
            None => Ok(()),
        }
    }

    fn on_cancel(&mut self, state: &mut ExecutionState) -> HookResult {
        self.record(Hook::OnCancel, state)
    }
}
