use flowcore::{
    EdgeStatus, EventRecord, ExecutionState, Extension, HookResult, NodeStatus, StepOutcome, Value,
};
use std::collections::BTreeMap;

/// Turns phase transitions into [`EventRecord`]s for the UI layer.
///
/// Runs late (order 100) so it reports the state other extensions left
/// behind. Records are buffered and handed out by `drain_events`.
#[derive(Debug, Default)]
pub struct StreamExtension {
    buffer: Vec<EventRecord>,
}

impl StreamExtension {
    pub const NAME: &'static str = "stream";

    pub fn new() -> Self {
        Self::default()
    }

    fn graph_id(state: &ExecutionState) -> Option<&str> {
        Some(state.graph_id.as_str())
    }

    /// Terminal record for a finished run.
    pub fn terminal_record(state: &ExecutionState) -> EventRecord {
        if state.cancelled {
            let details = state.cancel_reason.as_ref().map(|reason| {
                let mut details = BTreeMap::new();
                details.insert("reason".to_string(), Value::from(reason.as_str()));
                details
            });
            EventRecord::error("Flow cancelled", None, details)
        } else if let Some(last) = state.last_error() {
            EventRecord::error(last.message.clone(), last.step_id.clone(), None)
        } else {
            EventRecord::complete(
                Some("Execution completed successfully".to_string()),
                (!state.results.is_empty()).then(|| state.results.clone()),
            )
        }
    }
}

impl Extension for StreamExtension {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn order(&self) -> i32 {
        100
    }

    fn before_flow(&mut self, state: &mut ExecutionState) -> HookResult {
        if state.options.reset_first {
            for id in state.step_ids() {
                self.buffer.push(EventRecord::node_status(
                    id,
                    NodeStatus::Pending,
                    Self::graph_id(state),
                    None,
                ));
            }
        }
        Ok(())
    }

    fn before_node(&mut self, state: &mut ExecutionState) -> HookResult {
        if let Some(id) = state.current_step_id() {
            self.buffer.push(EventRecord::node_status(
                id,
                NodeStatus::Running,
                Self::graph_id(state),
                None,
            ));
        }
        Ok(())
    }

    fn after_node(&mut self, state: &mut ExecutionState) -> HookResult {
        let Some(id) = state.current_step_id() else {
            return Ok(());
        };
        let (status, message) = match state.outcome(id) {
            Some(StepOutcome::Skipped) => (NodeStatus::Warning, Some("skipped".to_string())),
            _ => match state.last_error_for(id) {
                Some(error) => (NodeStatus::Error, Some(error.message.clone())),
                None => (NodeStatus::Success, None),
            },
        };
        self.buffer.push(EventRecord::node_status(
            id,
            status,
            Self::graph_id(state),
            message,
        ));
        Ok(())
    }

    fn before_edge(&mut self, state: &mut ExecutionState) -> HookResult {
        if let Some(edge) = &state.current_edge {
            self.buffer.push(EventRecord::edge_status(
                edge.source.as_str(),
                edge.target.as_str(),
                EdgeStatus::Running,
                true,
                Self::graph_id(state),
            ));
        }
        Ok(())
    }

    fn after_edge(&mut self, state: &mut ExecutionState) -> HookResult {
        if let Some(edge) = &state.current_edge {
            let status = if state.step_failed(&edge.target) {
                EdgeStatus::Error
            } else {
                EdgeStatus::Success
            };
            self.buffer.push(EventRecord::edge_status(
                edge.source.as_str(),
                edge.target.as_str(),
                status,
                false,
                Self::graph_id(state),
            ));
        }
        Ok(())
    }

    fn after_flow(&mut self, state: &mut ExecutionState) -> HookResult {
        self.buffer.push(Self::terminal_record(state));
        Ok(())
    }

    fn drain_events(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.buffer)
    }
}
