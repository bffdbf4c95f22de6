use crate::{EventRecord, ExecutionState, HookError, StepError};
use std::fmt;

pub type HookResult = Result<(), HookError>;

/// Lifecycle phases an [`Extension`] can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    BeforeFlow,
    BeforeNode,
    AfterNode,
    BeforeEdge,
    AfterEdge,
    AfterFlow,
    OnCancel,
}

impl Hook {
    pub fn name(self) -> &'static str {
        match self {
            Hook::BeforeFlow => "before_flow",
            Hook::BeforeNode => "before_node",
            Hook::AfterNode => "after_node",
            Hook::BeforeEdge => "before_edge",
            Hook::AfterEdge => "after_edge",
            Hook::AfterFlow => "after_flow",
            Hook::OnCancel => "on_cancel",
        }
    }

    /// Invoke the matching hook method on `ext`.
    pub fn call(self, ext: &mut dyn Extension, state: &mut ExecutionState) -> HookResult {
        match self {
            Hook::BeforeFlow => ext.before_flow(state),
            Hook::BeforeNode => ext.before_node(state),
            Hook::AfterNode => ext.after_node(state),
            Hook::BeforeEdge => ext.before_edge(state),
            Hook::AfterEdge => ext.after_edge(state),
            Hook::AfterFlow => ext.after_flow(state),
            Hook::OnCancel => ext.on_cancel(state),
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered observer of a run.
///
/// Hooks can read and mutate the [`ExecutionState`] and may return a
/// [`ControlSignal`](crate::ControlSignal) to cancel the flow, skip the
/// current step or retry it. Any other error is logged and ignored.
///
/// Lifecycle, in order:
/// 1. `before_flow` once
/// 2. per step: `before_edge` for each dependency, `before_node`,
///    `on_error` on failure, `after_node`, `after_edge` for each dependency
/// 3. `on_cancel` if the run was cancelled
/// 4. `after_flow` once
pub trait Extension: Send {
    /// Identifier used for logging and de-duplication.
    fn name(&self) -> &str;

    /// Lower runs first within each phase.
    fn order(&self) -> i32 {
        0
    }

    fn before_flow(&mut self, _state: &mut ExecutionState) -> HookResult {
        Ok(())
    }

    fn after_flow(&mut self, _state: &mut ExecutionState) -> HookResult {
        Ok(())
    }

    fn before_node(&mut self, _state: &mut ExecutionState) -> HookResult {
        Ok(())
    }

    /// Runs after the step, including after an absorbed failure.
    fn after_node(&mut self, _state: &mut ExecutionState) -> HookResult {
        Ok(())
    }

    fn before_edge(&mut self, _state: &mut ExecutionState) -> HookResult {
        Ok(())
    }

    fn after_edge(&mut self, _state: &mut ExecutionState) -> HookResult {
        Ok(())
    }

    /// Called when the current step's handler fails.
    fn on_error(&mut self, _state: &mut ExecutionState, _error: &StepError) -> HookResult {
        Ok(())
    }

    fn on_cancel(&mut self, _state: &mut ExecutionState) -> HookResult {
        Ok(())
    }

    /// Events buffered since the last drain. The executor drains after every
    /// phase so records are streamed incrementally.
    ///
    /// `complete` and `error` records returned here are forwarded like any
    /// other event; only the stream extension's own terminal record ends the
    /// stream. Nothing is forwarded after that record.
    fn drain_events(&mut self) -> Vec<EventRecord> {
        Vec::new()
    }
}
