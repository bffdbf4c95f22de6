use flowcore::{ExecutionState, Extension, HookResult};
use std::time::Instant;

/// Context key holding the total run time in seconds.
pub const TOTAL_EXECUTION_TIME: &str = "total_execution_time";

/// Records wall-clock timings into the state and context.
///
/// `start_time` is stamped in `before_flow`, per-step elapsed time lands in
/// `step_timings` at `after_node`, and the total is written to the context
/// under `total_execution_time` at `after_flow`.
#[derive(Debug, Default)]
pub struct TimingExtension {
    step_start: Option<Instant>,
}

impl TimingExtension {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Extension for TimingExtension {
    fn name(&self) -> &str {
        "timing"
    }

    fn order(&self) -> i32 {
        5
    }

    fn before_flow(&mut self, state: &mut ExecutionState) -> HookResult {
        state.start_time = Some(Instant::now());
        self.step_start = None;
        Ok(())
    }

    fn before_node(&mut self, _state: &mut ExecutionState) -> HookResult {
        self.step_start = Some(Instant::now());
        Ok(())
    }

    fn after_node(&mut self, state: &mut ExecutionState) -> HookResult {
        if let (Some(id), Some(start)) = (state.current_step_id(), self.step_start.take()) {
            let id = id.to_string();
            state.step_timings.insert(id, start.elapsed());
        }
        Ok(())
    }

    fn after_flow(&mut self, state: &mut ExecutionState) -> HookResult {
        let total = state.total_time().as_secs_f64();
        state.context.insert(TOTAL_EXECUTION_TIME, total);
        Ok(())
    }
}
