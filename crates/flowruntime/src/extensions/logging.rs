use flowcore::{ExecutionState, Extension, HookResult, StepError};
use tracing::Level;

/// Reports run lifecycle through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingExtension {
    level: Level,
}

impl LoggingExtension {
    pub fn new() -> Self {
        Self { level: Level::INFO }
    }

    /// Level used for flow start and finish; per-step lines are always debug.
    pub fn with_level(level: Level) -> Self {
        Self { level }
    }

    fn log(&self, message: &str) {
        match self.level {
            Level::ERROR => tracing::error!("{}", message),
            Level::WARN => tracing::warn!("{}", message),
            Level::INFO => tracing::info!("{}", message),
            Level::DEBUG => tracing::debug!("{}", message),
            _ => tracing::trace!("{}", message),
        }
    }
}

impl Default for LoggingExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for LoggingExtension {
    fn name(&self) -> &str {
        "logging"
    }

    fn order(&self) -> i32 {
        10
    }

    fn before_flow(&mut self, state: &mut ExecutionState) -> HookResult {
        self.log(&format!(
            "Starting flow execution: {} ({} steps)",
            state.graph_id,
            state.steps().len()
        ));
        Ok(())
    }

    fn before_node(&mut self, state: &mut ExecutionState) -> HookResult {
        if let Some(id) = state.current_step_id() {
            tracing::debug!("Executing step: {}", id);
        }
        Ok(())
    }

    fn after_node(&mut self, state: &mut ExecutionState) -> HookResult {
        if let Some(id) = state.current_step_id() {
            let elapsed = state.step_timings.get(id).copied().unwrap_or_default();
            tracing::debug!("Completed step: {} ({:.2}s)", id, elapsed.as_secs_f64());
        }
        Ok(())
    }

    fn on_error(&mut self, state: &mut ExecutionState, error: &StepError) -> HookResult {
        tracing::error!(
            "Error in step {}: {}",
            state.current_step_id().unwrap_or("unknown"),
            error
        );
        Ok(())
    }

    fn on_cancel(&mut self, state: &mut ExecutionState) -> HookResult {
        tracing::warn!(
            "Flow {} cancelled: {}",
            state.graph_id,
            state.cancel_reason.as_deref().unwrap_or("no reason given")
        );
        Ok(())
    }

    fn after_flow(&mut self, state: &mut ExecutionState) -> HookResult {
        let status = if state.cancelled {
            "cancelled"
        } else if state.has_errors() {
            "failed"
        } else {
            "completed"
        };
        self.log(&format!(
            "Flow {}: {} ({:.2}s)",
            status,
            state.graph_id,
            state.total_time().as_secs_f64()
        ));
        Ok(())
    }
}
