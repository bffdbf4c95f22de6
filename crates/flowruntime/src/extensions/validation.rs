use flowcore::{
    ControlSignal, ExecutionState, Extension, HookResult, NodeValidator, Step, StepId, Value,
};
use std::sync::Arc;

/// Context key holding `{step_id: [problems]}` gathered by validation.
pub const VALIDATION_ERRORS: &str = "validation_errors";

/// Validates step node metadata before the flow and before each step.
///
/// With `fail_fast` the first problem cancels the flow; otherwise problems
/// are collected into the context and execution continues.
pub struct ValidationExtension {
    validator: Arc<dyn NodeValidator>,
    fail_fast: bool,
    errors: Vec<(StepId, Vec<String>)>,
}

impl ValidationExtension {
    pub fn new(validator: Arc<dyn NodeValidator>) -> Self {
        Self {
            validator,
            fail_fast: true,
            errors: Vec::new(),
        }
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn errors(&self) -> &[(StepId, Vec<String>)] {
        &self.errors
    }

    fn check(&self, step: &Step) -> Vec<String> {
        match &step.node {
            Some(node) => self.validator.validate(node),
            None => Vec::new(),
        }
    }

    fn rejection(step_id: &str, problems: &[String]) -> ControlSignal {
        ControlSignal::cancel(format!(
            "Validation failed for {}: {}",
            step_id,
            problems.join("; ")
        ))
    }
}

impl Extension for ValidationExtension {
    fn name(&self) -> &str {
        "validation"
    }

    fn order(&self) -> i32 {
        1
    }

    fn before_flow(&mut self, state: &mut ExecutionState) -> HookResult {
        self.errors.clear();
        for step in state.steps() {
            let problems = self.check(step);
            if problems.is_empty() {
                continue;
            }
            if self.fail_fast {
                return Err(Self::rejection(&step.id, &problems).into());
            }
            self.errors.push((step.id.clone(), problems));
        }

        if !self.errors.is_empty() {
            let summary = self
                .errors
                .iter()
                .map(|(id, problems)| {
                    let list = problems.iter().map(|p| Value::from(p.as_str())).collect();
                    (id.clone(), Value::Array(list))
                })
                .collect();
            state.context.insert(VALIDATION_ERRORS, Value::Object(summary));
        }
        Ok(())
    }

    fn before_node(&mut self, state: &mut ExecutionState) -> HookResult {
        if !self.fail_fast {
            return Ok(());
        }
        if let Some(step) = state.current_step() {
            let problems = self.check(step);
            if !problems.is_empty() {
                return Err(Self::rejection(&step.id, &problems).into());
            }
        }
        Ok(())
    }
}
