//! Mutable state threaded through a single run.

use crate::{Context, Edge, Step, StepError, StepId, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Per-run scheduling options.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Report every step as pending before the first step starts.
    pub reset_first: bool,
    /// Pause after the flow-level setup phase.
    pub pre_delay: Duration,
    /// Pause after each step.
    pub post_delay: Duration,
}

impl RunOptions {
    /// No pauses at all; used by tests and batch callers.
    pub fn immediate() -> Self {
        Self {
            reset_first: true,
            pre_delay: Duration::ZERO,
            post_delay: Duration::ZERO,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            reset_first: true,
            pre_delay: Duration::from_millis(300),
            post_delay: Duration::from_millis(200),
        }
    }
}

/// Final disposition of a step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

/// A step failure recorded during the run.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub error: StepError,
    pub step_id: Option<StepId>,
    pub message: String,
    pub attempt: u32,
    /// Set when an extension turned this failure into a retry or a skip.
    pub superseded: bool,
}

#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub graph_id: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub options: RunOptions,
    steps: Arc<[Step]>,
    edges: Arc<[Edge]>,
    current_step: Option<usize>,
    pub current_edge: Option<Edge>,
    pub context: Context,
    pub results: BTreeMap<StepId, Value>,
    pub errors: Vec<ErrorRecord>,
    pub outcomes: BTreeMap<StepId, StepOutcome>,
    pub cancelled: bool,
    pub cancel_reason: Option<String>,
    pub skip_current: bool,
    /// Attempt number of the current step, starting at 1.
    pub attempt: u32,
    pub start_time: Option<Instant>,
    pub step_timings: BTreeMap<StepId, Duration>,
}

impl ExecutionState {
    pub fn new(
        graph_id: impl Into<String>,
        steps: Arc<[Step]>,
        edges: Arc<[Edge]>,
        context: Context,
        options: RunOptions,
    ) -> Self {
        Self {
            graph_id: graph_id.into(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            options,
            steps,
            edges,
            current_step: None,
            current_edge: None,
            context,
            results: BTreeMap::new(),
            errors: Vec::new(),
            outcomes: BTreeMap::new(),
            cancelled: false,
            cancel_reason: None,
            skip_current: false,
            attempt: 0,
            start_time: None,
            step_timings: BTreeMap::new(),
        }
    }

    /// State with no steps, handy for exercising extensions in isolation.
    pub fn detached(graph_id: impl Into<String>) -> Self {
        Self::new(
            graph_id,
            Arc::from(Vec::new()),
            Arc::from(Vec::new()),
            Context::new(),
            RunOptions::default(),
        )
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.id.as_str())
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.current_step.and_then(|idx| self.steps.get(idx))
    }

    pub fn current_step_id(&self) -> Option<&str> {
        self.current_step().map(|s| s.id.as_str())
    }

    /// Make the step at `index` current and clear per-step flags.
    pub fn enter_step(&mut self, index: usize) {
        self.current_step = Some(index).filter(|idx| *idx < self.steps.len());
        self.current_edge = None;
        self.skip_current = false;
        self.attempt = 0;
    }

    pub fn leave_step(&mut self) {
        self.current_step = None;
        self.current_edge = None;
    }

    pub fn get_result(&self, step_id: &str) -> Option<&Value> {
        self.results.get(step_id)
    }

    pub fn set_result(&mut self, step_id: impl Into<StepId>, result: Value) {
        self.results.insert(step_id.into(), result);
    }

    /// Record a failure against `step_id`, or the current step when `None`.
    /// Returns the index of the new record.
    pub fn add_error(&mut self, error: StepError, step_id: Option<&str>) -> usize {
        let step_id = step_id
            .map(str::to_string)
            .or_else(|| self.current_step_id().map(str::to_string));
        self.errors.push(ErrorRecord {
            message: error.to_string(),
            error,
            step_id,
            attempt: self.attempt,
            superseded: false,
        });
        self.errors.len() - 1
    }

    /// Errors no extension has turned into a retry or a skip.
    pub fn active_errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.errors.iter().filter(|e| !e.superseded)
    }

    /// True once any failure was recorded, recovered or not.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.errors.last()
    }

    /// Most recent failure recorded against `step_id`.
    pub fn last_error_for(&self, step_id: &str) -> Option<&ErrorRecord> {
        self.errors
            .iter()
            .rev()
            .find(|e| e.step_id.as_deref() == Some(step_id))
    }

    pub fn step_failed(&self, step_id: &str) -> bool {
        self.last_error_for(step_id).is_some()
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        if !self.cancelled {
            self.cancelled = true;
            self.cancel_reason = Some(reason.into());
        }
    }

    pub fn set_outcome(&mut self, step_id: impl Into<StepId>, outcome: StepOutcome) {
        self.outcomes.insert(step_id.into(), outcome);
    }

    pub fn outcome(&self, step_id: &str) -> Option<StepOutcome> {
        self.outcomes.get(step_id).copied()
    }

    /// Wall-clock time since the timing extension stamped the start.
    pub fn total_time(&self) -> Duration {
        self.start_time.map(|t| t.elapsed()).unwrap_or_default()
    }
}
