use flowcore::{ExecutionState, Extension, HookResult};

/// Context key holding the latest completion percentage.
pub const PROGRESS_PERCENT: &str = "progress_percent";

type ProgressFn = Box<dyn FnMut(f64, &str) + Send>;

/// Reports `completed / total * 100` after every step.
pub struct ProgressExtension {
    on_progress: Option<ProgressFn>,
    total: usize,
    completed: usize,
}

impl ProgressExtension {
    pub fn new() -> Self {
        Self {
            on_progress: None,
            total: 0,
            completed: 0,
        }
    }

    /// Call `on_progress(percent, step_id)` after every step.
    pub fn with_callback<F>(on_progress: F) -> Self
    where
        F: FnMut(f64, &str) + Send + 'static,
    {
        Self {
            on_progress: Some(Box::new(on_progress)),
            ..Self::new()
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }
}

impl Default for ProgressExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for ProgressExtension {
    fn name(&self) -> &str {
        "progress"
    }

    fn order(&self) -> i32 {
        90
    }

    fn before_flow(&mut self, state: &mut ExecutionState) -> HookResult {
        self.total = state.steps().len();
        self.completed = 0;
        Ok(())
    }

    fn after_node(&mut self, state: &mut ExecutionState) -> HookResult {
        self.completed += 1;
        let percent = self.percent();
        if let Some(callback) = self.on_progress.as_mut() {
            callback(percent, state.current_step_id().unwrap_or(""));
        }
        state.context.insert(PROGRESS_PERCENT, percent);
        Ok(())
    }
}
