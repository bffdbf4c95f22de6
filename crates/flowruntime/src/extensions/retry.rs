use flowcore::{ControlSignal, ExecutionState, Extension, HookResult, StepError, StepId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type RetryFilter = Arc<dyn Fn(&StepError) -> bool + Send + Sync>;

/// Retries failed steps up to `max_retries` extra attempts each.
///
/// Each request carries the number of retries still available, so the
/// executor's budget decreases with every attempt. Counters reset in
/// `before_flow`.
#[derive(Clone)]
pub struct RetryExtension {
    max_retries: u32,
    delay: Duration,
    retry_on: Option<RetryFilter>,
    used: HashMap<StepId, u32>,
}

impl RetryExtension {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            retry_on: None,
            used: HashMap::new(),
        }
    }

    /// Only retry errors matching `filter`; everything else fails as usual.
    pub fn retry_on<F>(mut self, filter: F) -> Self
    where
        F: Fn(&StepError) -> bool + Send + Sync + 'static,
    {
        self.retry_on = Some(Arc::new(filter));
        self
    }

    pub fn retries_used(&self, step_id: &str) -> u32 {
        self.used.get(step_id).copied().unwrap_or(0)
    }
}

impl Default for RetryExtension {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl fmt::Debug for RetryExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExtension")
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .field("filtered", &self.retry_on.is_some())
            .field("used", &self.used)
            .finish()
    }
}

impl Extension for RetryExtension {
    fn name(&self) -> &str {
        "retry"
    }

    fn order(&self) -> i32 {
        50
    }

    fn before_flow(&mut self, _state: &mut ExecutionState) -> HookResult {
        self.used.clear();
        Ok(())
    }

    fn on_error(&mut self, state: &mut ExecutionState, error: &StepError) -> HookResult {
        if let Some(filter) = &self.retry_on {
            if !filter(error) {
                return Ok(());
            }
        }
        let Some(id) = state.current_step_id() else {
            return Ok(());
        };

        let used = self.used.entry(id.to_string()).or_insert(0);
        if *used >= self.max_retries {
            return Ok(());
        }
        let remaining = self.max_retries - *used;
        *used += 1;
        tracing::info!(
            "Retrying step {} ({} of {})",
            id,
            self.max_retries - remaining + 1,
            self.max_retries
        );
        Err(ControlSignal::retry(remaining, self.delay).into())
    }
}
