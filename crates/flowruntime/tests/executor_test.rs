mod common;

use common::*;
use flowcore::{
    Context, ControlSignal, EventRecord, ExecutionState, Extension, FlowError, GraphError, Hook,
    HookError, HookResult, NodeStatus, RunOptions, Step, StepError, StepOutcome, Value,
};
use flowruntime::FlowExecutor;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn executor(steps: Vec<Step>) -> FlowExecutor {
    FlowExecutor::new("test-graph", steps)
        .unwrap()
        .with_options(RunOptions::immediate())
}

fn terminals(events: &[EventRecord]) -> Vec<&EventRecord> {
    events.iter().filter(|e| e.is_terminal()).collect()
}

#[tokio::test]
async fn test_linear_flow_emits_events_in_phase_order() {
    init_tracing();

    let mut exec = executor(vec![
        Step::new("a").with_handler(Arc::new(Returns::new(1))),
        Step::new("b")
            .depends_on(["a"])
            .with_handler(Arc::new(Returns::new(2))),
    ]);
    let report = exec.run_to_end(Context::new()).await;

    let rendered: Vec<String> = report.events.iter().map(|e| e.to_string()).collect();
    assert_eq!(
        rendered,
        vec![
            "node a -> Pending",
            "node b -> Pending",
            "node a -> Running",
            "node a -> Success",
            "edge a -> b: Running",
            "node b -> Running",
            "node b -> Success",
            "edge a -> b: Success",
            "complete: Execution completed successfully",
        ]
    );
    assert!(report.succeeded());
}

#[tokio::test]
async fn test_handler_result_is_stored() {
    init_tracing();

    let value = Value::from(vec![Value::from("x"), Value::from(3)]);
    let mut exec = executor(vec![Step::new("s").with_handler(Arc::new(Returns::new(value.clone())))]);
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(report.state.get_result("s"), Some(&value));
    assert_eq!(report.state.outcome("s"), Some(StepOutcome::Succeeded));
    match report.terminal() {
        Some(EventRecord::Complete(complete)) => {
            assert_eq!(complete.results.as_ref().and_then(|r| r.get("s")), Some(&value));
        }
        other => panic!("unexpected terminal: {:?}", other),
    }
}

#[tokio::test]
async fn test_handler_receives_dependency_results() {
    init_tracing();

    let consumer = flowcore::handler_fn(|_ctx, inputs| {
        Box::pin(async move {
            match inputs.get("a").cloned().flatten() {
                Some(upstream) => Ok(Value::from(upstream.as_i64().unwrap_or_default() * 10)),
                None => Err(StepError::MissingInput("a".into())),
            }
        })
    });
    let mut exec = executor(vec![
        Step::new("a").with_handler(Arc::new(Returns::new(4))),
        Step::new("b").depends_on(["a"]).with_handler(consumer),
    ]);
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(report.state.get_result("b"), Some(&Value::Int(40)));
}

#[tokio::test]
async fn test_step_without_handler_simulates_work() {
    let mut exec = executor(vec![Step::new("sim").with_duration(Duration::from_millis(5))]);
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(report.state.get_result("sim"), Some(&Value::completed_marker()));
}

#[tokio::test]
async fn test_independent_steps_keep_a_stable_order() {
    init_tracing();

    let steps = || {
        vec![
            instant("A"),
            instant("B").depends_on(["A"]),
            instant("C").depends_on(["A"]),
        ]
    };
    let first = executor(steps()).run_to_end(Context::new()).await;
    let second = executor(steps()).run_to_end(Context::new()).await;

    assert_eq!(first.started_steps(), vec!["A", "B", "C"]);
    assert_eq!(first.started_steps(), second.started_steps());
}

#[tokio::test]
async fn test_cycle_is_rejected_before_any_event() {
    let result = FlowExecutor::new(
        "cyclic",
        vec![
            instant("a").depends_on(["c"]),
            instant("b").depends_on(["a"]),
            instant("c").depends_on(["b"]),
        ],
    );

    match result {
        Err(FlowError::Graph(GraphError::CycleDetected { steps })) => {
            assert_eq!(steps, vec!["a", "b", "c"]);
        }
        other => panic!("expected cycle error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_hooks_fire_in_extension_order() {
    init_tracing();

    let log = journal();
    let mut exec = executor(vec![
        Step::new("a").with_handler(Arc::new(FailsFirst::always(StepError::failed("boom")))),
        instant("b").depends_on(["a"]),
    ])
    .with_extension(Recorder::new("fifty", 50, &log))
    .with_extension(Recorder::new("one", 1, &log))
    .with_extension(Recorder::new("hundred", 100, &log).raise(
        Hook::AfterEdge,
        Some("b"),
        ControlSignal::cancel("done"),
    ));
    exec.run_to_end(Context::new()).await;

    let phases = [
        "before_flow",
        "before_node:a",
        "on_error:a",
        "after_node:a",
        "before_edge:b",
        "before_node:b",
        "after_node:b",
        "after_edge:b",
        "on_cancel",
        "after_flow",
    ];
    let expected: Vec<String> = phases
        .iter()
        .flat_map(|phase| {
            ["one", "fifty", "hundred"]
                .into_iter()
                .map(move |name| format!("{}:{}", name, phase))
        })
        .collect();
    assert_eq!(entries(&log), expected);
}

#[tokio::test]
async fn test_skip_in_before_node_bypasses_the_step() {
    init_tracing();

    let log = journal();
    let skipped = Returns::new("never");
    let calls = Arc::clone(&skipped.calls);
    let mut exec = executor(vec![
        instant("a"),
        Step::new("b").depends_on(["a"]).with_handler(Arc::new(skipped)),
        instant("c").depends_on(["a"]),
    ])
    .with_extension(Recorder::new("rec", 1, &log).raise(
        Hook::BeforeNode,
        Some("b"),
        ControlSignal::skip("not today"),
    ));
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.state.outcome("b"), Some(StepOutcome::Skipped));
    assert!(report.state.get_result("b").is_none());
    assert!(!entries(&log).contains(&"rec:after_node:b".to_string()));
    assert!(entries(&log).contains(&"rec:after_node:c".to_string()));
    assert_eq!(report.started_steps(), vec!["a", "c"]);
    assert!(report.succeeded());
}

#[tokio::test]
async fn test_skip_in_before_edge_bypasses_the_step() {
    init_tracing();

    let log = journal();
    let mut exec = executor(vec![instant("a"), instant("b").depends_on(["a"])]).with_extension(
        Recorder::new("rec", 1, &log).raise(Hook::BeforeEdge, None, ControlSignal::skip("edge")),
    );
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(report.state.outcome("b"), Some(StepOutcome::Skipped));
    assert_eq!(report.node_statuses("b"), vec![NodeStatus::Pending]);
    assert!(!entries(&log).iter().any(|e| e.starts_with("rec:before_node:b")));
}

#[tokio::test]
async fn test_retry_from_on_error_makes_exactly_the_requested_attempts() {
    init_tracing();

    let failing = FailsFirst::always(StepError::failed("flaky"));
    let calls = Arc::clone(&failing.calls);
    let log = journal();
    let mut exec = executor(vec![Step::new("x").with_handler(Arc::new(failing))]).with_extension(
        Recorder::new("rec", 1, &log).on_error_signal(ControlSignal::retry(2, Duration::ZERO)),
    );
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.state.outcome("x"), Some(StepOutcome::Failed));
    assert_eq!(report.state.errors.len(), 3);
    assert_eq!(report.state.active_errors().count(), 1);
    assert_eq!(report.state.last_error().map(|e| e.attempt), Some(3));
    assert!(!report.succeeded());
}

#[tokio::test]
async fn test_skip_from_on_error_keeps_the_failure_visible() {
    init_tracing();

    let log = journal();
    let mut exec = executor(vec![
        Step::new("x").with_handler(Arc::new(FailsFirst::always(StepError::failed("broken")))),
        instant("y").depends_on(["x"]),
    ])
    .with_extension(Recorder::new("rec", 1, &log).on_error_signal(ControlSignal::skip("tolerated")));
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(report.state.outcome("x"), Some(StepOutcome::Skipped));
    assert_eq!(report.state.errors.len(), 1);
    assert!(report.state.errors[0].superseded);
    assert!(entries(&log).contains(&"rec:after_node:x".to_string()));
    assert_eq!(
        report.node_statuses("x"),
        vec![NodeStatus::Pending, NodeStatus::Running, NodeStatus::Warning]
    );
    assert_eq!(report.state.outcome("y"), Some(StepOutcome::Succeeded));

    match report.terminal() {
        Some(EventRecord::Error(error)) => {
            assert_eq!(error.message, "Execution failed: broken");
            assert_eq!(error.node_id.as_deref(), Some("x"));
        }
        other => panic!("unexpected terminal: {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_from_on_error_stops_before_after_node() {
    init_tracing();

    let log = journal();
    let later = Returns::new("never");
    let calls = Arc::clone(&later.calls);
    let mut exec = executor(vec![
        Step::new("x").with_handler(Arc::new(FailsFirst::always(StepError::failed("fatal")))),
        Step::new("y").depends_on(["x"]).with_handler(Arc::new(later)),
    ])
    .with_extension(Recorder::new("rec", 1, &log).on_error_signal(ControlSignal::cancel("give up")));
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.state.outcome("x"), Some(StepOutcome::Cancelled));
    assert_eq!(
        entries(&log),
        vec![
            "rec:before_flow",
            "rec:before_node:x",
            "rec:on_error:x",
            "rec:on_cancel",
            "rec:after_flow"
        ]
    );
    assert_eq!(
        report.node_statuses("x"),
        vec![NodeStatus::Pending, NodeStatus::Running]
    );
    assert_eq!(terminals(&report.events).len(), 1);
    match report.terminal() {
        Some(EventRecord::Error(error)) => {
            assert_eq!(error.message, "Flow cancelled");
            assert_eq!(
                error.details.as_ref().and_then(|d| d.get("reason")),
                Some(&Value::from("give up"))
            );
        }
        other => panic!("unexpected terminal: {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_in_before_node_stops_the_remaining_steps() {
    init_tracing();

    let log = journal();
    let mut exec = executor(vec![
        instant("a"),
        instant("b").depends_on(["a"]),
        instant("c").depends_on(["b"]),
    ])
    .with_extension(Recorder::new("rec", 1, &log).raise(
        Hook::BeforeNode,
        Some("b"),
        ControlSignal::cancel("halt"),
    ));
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(report.started_steps(), vec!["a"]);
    assert_eq!(report.state.outcome("a"), Some(StepOutcome::Succeeded));
    assert_eq!(report.state.outcome("b"), Some(StepOutcome::Cancelled));
    assert_eq!(report.state.outcome("c"), None);
    assert_eq!(report.node_statuses("b"), vec![NodeStatus::Pending]);
    assert_eq!(report.node_statuses("c"), vec![NodeStatus::Pending]);

    let log = entries(&log);
    assert!(!log.contains(&"rec:after_node:b".to_string()));
    assert!(!log.iter().any(|e| e.ends_with(":c")));
    assert!(matches!(report.terminal(), Some(EventRecord::Error(e)) if e.message == "Flow cancelled"));
}

#[tokio::test]
async fn test_cancel_in_before_edge_stops_the_remaining_steps() {
    init_tracing();

    let log = journal();
    let mut exec = executor(vec![
        instant("a"),
        instant("b").depends_on(["a"]),
        instant("c").depends_on(["b"]),
        instant("d").depends_on(["c"]),
    ])
    .with_extension(Recorder::new("rec", 1, &log).raise(
        Hook::BeforeEdge,
        Some("c"),
        ControlSignal::cancel("edge closed"),
    ));
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(report.started_steps(), vec!["a", "b"]);
    assert_eq!(report.state.outcome("c"), Some(StepOutcome::Cancelled));
    assert_eq!(report.state.outcome("d"), None);
    assert!(!entries(&log).iter().any(|e| e == "rec:before_node:c"));
    assert_eq!(report.state.cancel_reason.as_deref(), Some("edge closed"));
    assert_eq!(terminals(&report.events).len(), 1);
}

#[tokio::test]
async fn test_cancel_in_before_flow_runs_no_steps() {
    init_tracing();

    let log = journal();
    let mut exec = executor(vec![instant("a"), instant("b").depends_on(["a"])]).with_extension(
        Recorder::new("gate", 1, &log).raise(
            Hook::BeforeFlow,
            None,
            ControlSignal::cancel("closed"),
        ),
    );
    let report = exec.run_to_end(Context::new()).await;

    assert!(report.events.iter().all(|e| !matches!(
        e,
        EventRecord::NodeStatus(n) if n.status == NodeStatus::Running || n.status == NodeStatus::Success
    )));
    assert_eq!(terminals(&report.events).len(), 1);
    match report.terminal() {
        Some(EventRecord::Error(error)) => {
            assert_eq!(error.message, "Flow cancelled");
            assert_eq!(
                error.details.as_ref().and_then(|d| d.get("reason")),
                Some(&Value::from("closed"))
            );
        }
        other => panic!("unexpected terminal: {:?}", other),
    }
    let log = entries(&log);
    assert_eq!(log, vec!["gate:before_flow", "gate:on_cancel", "gate:after_flow"]);
    assert!(report.state.results.is_empty());
}

#[tokio::test]
async fn test_failed_step_does_not_stop_the_flow() {
    init_tracing();

    let log = journal();
    let mut exec = executor(vec![
        Step::new("X").with_handler(Arc::new(FailsFirst::always(StepError::failed("boom")))),
        instant("Y").depends_on(["X"]),
        instant("Z"),
    ])
    .with_extension(Recorder::new("rec", 1, &log));
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(report.state.errors.len(), 1);
    assert_eq!(report.state.errors[0].step_id.as_deref(), Some("X"));
    assert_eq!(report.state.outcome("Y"), Some(StepOutcome::Succeeded));
    assert_eq!(report.state.outcome("Z"), Some(StepOutcome::Succeeded));
    assert!(entries(&log).contains(&"rec:after_flow".to_string()));
    assert_eq!(
        report.node_statuses("X"),
        vec![NodeStatus::Pending, NodeStatus::Running, NodeStatus::Error]
    );

    match report.terminal() {
        Some(EventRecord::Error(error)) => {
            assert!(error.message.contains("boom"));
            assert_eq!(error.node_id.as_deref(), Some("X"));
        }
        other => panic!("unexpected terminal: {:?}", other),
    }
}

#[tokio::test]
async fn test_handler_skip_still_runs_after_hooks() {
    init_tracing();

    let log = journal();
    let skipper = flowcore::handler_fn(|_ctx, _inputs| {
        Box::pin(async move { Err::<Value, _>(StepError::from(ControlSignal::skip("nothing to do"))) })
    });
    let mut exec = executor(vec![Step::new("s").with_handler(skipper)])
        .with_extension(Recorder::new("rec", 1, &log));
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(report.state.outcome("s"), Some(StepOutcome::Skipped));
    assert!(entries(&log).contains(&"rec:after_node:s".to_string()));
    assert_eq!(
        report.node_statuses("s"),
        vec![NodeStatus::Pending, NodeStatus::Running, NodeStatus::Warning]
    );
    assert!(report.succeeded());
}

#[tokio::test]
async fn test_handler_cancel_stops_the_flow() {
    init_tracing();

    let after = Returns::new("late");
    let calls = Arc::clone(&after.calls);
    let canceller = flowcore::handler_fn(|_ctx, _inputs| {
        Box::pin(async move { Err::<Value, _>(StepError::from(ControlSignal::cancel("abort"))) })
    });
    let mut exec = executor(vec![
        Step::new("stop").with_handler(canceller),
        Step::new("next").depends_on(["stop"]).with_handler(Arc::new(after)),
    ]);
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(report.state.cancelled);
    assert_eq!(report.state.cancel_reason.as_deref(), Some("abort"));
    assert_eq!(report.state.outcome("stop"), Some(StepOutcome::Cancelled));
    assert!(matches!(
        report.state.errors[0].error,
        StepError::Cancelled(ref reason) if reason == "abort"
    ));
    assert_eq!(terminals(&report.events).len(), 1);
    assert!(matches!(report.terminal(), Some(EventRecord::Error(e)) if e.message == "Flow cancelled"));
}

#[tokio::test]
async fn test_handler_retry_request_reruns_the_step() {
    init_tracing();

    let flaky = FailsFirst::new(1, ControlSignal::retry(3, Duration::ZERO).into());
    let calls = Arc::clone(&flaky.calls);
    let mut exec = executor(vec![Step::new("r").with_handler(Arc::new(flaky))]);
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.state.get_result("r"), Some(&Value::from("ok")));
    assert!(report.state.errors.is_empty());
}

#[tokio::test]
async fn test_handler_retry_requests_are_bounded() {
    init_tracing();

    let stubborn = FailsFirst::always(ControlSignal::retry(2, Duration::ZERO).into());
    let calls = Arc::clone(&stubborn.calls);
    let mut exec = executor(vec![Step::new("r").with_handler(Arc::new(stubborn))]);
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.state.errors.len(), 1);
    assert!(matches!(
        report.state.errors[0].error,
        StepError::RetriesExhausted { attempts: 3 }
    ));
}

#[tokio::test]
async fn test_step_timeout_is_reported_as_failure() {
    init_tracing();

    let slow = flowcore::handler_fn(|_ctx, _inputs| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StepError>(Value::Null)
        })
    });
    let mut exec = executor(vec![Step::new("slow")
        .with_handler(slow)
        .with_timeout(Duration::from_millis(20))]);
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(report.state.outcome("slow"), Some(StepOutcome::Failed));
    assert!(matches!(
        report.state.errors[0].error,
        StepError::Timeout { after } if after == Duration::from_millis(20)
    ));
}

#[tokio::test]
async fn test_handler_panic_is_contained() {
    init_tracing();

    let panicky = flowcore::handler_fn(|_ctx, _inputs| {
        Box::pin(async move {
            if true {
                panic!("handler exploded");
            }
            Ok::<_, StepError>(Value::Null)
        })
    });
    let mut exec = executor(vec![Step::new("p").with_handler(panicky), instant("q")]);
    let report = exec.run_to_end(Context::new()).await;

    assert!(matches!(
        report.state.errors[0].error,
        StepError::Panicked(ref msg) if msg.contains("handler exploded")
    ));
    assert_eq!(report.state.outcome("q"), Some(StepOutcome::Succeeded));
}

struct Faulty;

impl Extension for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    fn before_node(&mut self, _state: &mut ExecutionState) -> HookResult {
        panic!("observer bug");
    }

    fn after_node(&mut self, _state: &mut ExecutionState) -> HookResult {
        Err(HookError::failed("could not write metrics"))
    }
}

#[tokio::test]
async fn test_extension_failures_are_swallowed() {
    init_tracing();

    let mut exec = executor(vec![instant("a"), instant("b").depends_on(["a"])]).with_extension(Faulty);
    let report = exec.run_to_end(Context::new()).await;

    assert!(report.succeeded());
    assert!(report.state.errors.is_empty());
    assert_eq!(report.state.results.len(), 2);
}

/// Emits its own terminal record after the stream extension.
#[derive(Default)]
struct LateTerminal {
    pending: Vec<EventRecord>,
}

impl Extension for LateTerminal {
    fn name(&self) -> &str {
        "late-terminal"
    }

    fn order(&self) -> i32 {
        200
    }

    fn after_flow(&mut self, _state: &mut ExecutionState) -> HookResult {
        self.pending
            .push(EventRecord::complete(Some("duplicate".to_string()), None));
        Ok(())
    }

    fn drain_events(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.pending)
    }
}

#[tokio::test]
async fn test_only_one_terminal_event_is_streamed() {
    init_tracing();

    let mut exec = executor(vec![instant("a")]).with_extension(LateTerminal::default());
    let report = exec.run_to_end(Context::new()).await;

    let terminal = terminals(&report.events);
    assert_eq!(terminal.len(), 1);
    assert!(matches!(
        terminal[0],
        EventRecord::Complete(c) if c.message.as_deref() == Some("Execution completed successfully")
    ));
}

/// Reports every step failure as an `error` record while the run goes on.
#[derive(Default)]
struct FailureReporter {
    pending: Vec<EventRecord>,
}

impl Extension for FailureReporter {
    fn name(&self) -> &str {
        "failure-reporter"
    }

    fn on_error(&mut self, state: &mut ExecutionState, error: &StepError) -> HookResult {
        self.pending.push(EventRecord::error(
            format!("reported: {}", error),
            state.current_step_id().map(str::to_string),
            None,
        ));
        Ok(())
    }

    fn drain_events(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.pending)
    }
}

#[tokio::test]
async fn test_extension_error_records_do_not_end_the_stream() {
    init_tracing();

    let mut exec = executor(vec![
        Step::new("x").with_handler(Arc::new(FailsFirst::always(StepError::failed("boom")))),
        instant("y").depends_on(["x"]),
    ])
    .with_extension(FailureReporter::default());
    let report = exec.run_to_end(Context::new()).await;

    let reported = report
        .events
        .iter()
        .position(|e| matches!(e, EventRecord::Error(err) if err.message.starts_with("reported:")))
        .unwrap();
    let y_running = report
        .events
        .iter()
        .position(|e| matches!(e, EventRecord::NodeStatus(n) if n.node_id == "y" && n.status == NodeStatus::Running))
        .unwrap();
    assert!(reported < y_running);
    assert_eq!(report.state.outcome("y"), Some(StepOutcome::Succeeded));

    match report.events.last() {
        Some(EventRecord::Error(error)) => {
            assert_eq!(error.message, "Execution failed: boom");
            assert_eq!(error.node_id.as_deref(), Some("x"));
        }
        other => panic!("unexpected last event: {:?}", other),
    }
}

#[tokio::test]
async fn test_successful_run_without_results_omits_them() {
    let mut exec = executor(vec![]);
    let report = exec.run_to_end(Context::new()).await;

    match report.terminal() {
        Some(EventRecord::Complete(complete)) => assert!(complete.results.is_none()),
        other => panic!("unexpected terminal: {:?}", other),
    }
}

#[tokio::test]
async fn test_terminal_event_is_synthesized_when_after_flow_is_cut_short() {
    init_tracing();

    let log = journal();
    let mut exec = executor(vec![instant("a")]).with_extension(Recorder::new("early", 1, &log).raise(
        Hook::AfterFlow,
        None,
        ControlSignal::cancel("late cancel"),
    ));
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(terminals(&report.events).len(), 1);
    assert!(matches!(report.terminal(), Some(EventRecord::Error(e)) if e.message == "Flow cancelled"));
    assert!(report.state.cancelled);
}

#[tokio::test]
async fn test_reset_first_controls_pending_events() {
    let options = RunOptions {
        reset_first: false,
        ..RunOptions::immediate()
    };
    let mut exec = executor(vec![instant("a")]).with_options(options);
    let report = exec.run_to_end(Context::new()).await;

    assert_eq!(
        report.node_statuses("a"),
        vec![NodeStatus::Running, NodeStatus::Success]
    );
}

#[tokio::test]
async fn test_executor_can_run_twice() {
    let mut exec = executor(vec![instant("a"), instant("b").depends_on(["a"])]);
    let first = exec.run_to_end(Context::new()).await;
    let second = exec.run_to_end(Context::new()).await;

    assert_eq!(first.events.len(), second.events.len());
    assert_ne!(first.state.run_id, second.state.run_id);
}

#[tokio::test]
async fn test_context_is_shared_with_handlers() {
    let writer = flowcore::handler_fn(|ctx, _inputs| {
        Box::pin(async move {
            let base = ctx.get("base").and_then(Value::as_i64).unwrap_or_default();
            ctx.insert("doubled", base * 2);
            Ok::<_, StepError>(Value::Null)
        })
    });
    let mut exec = executor(vec![Step::new("w").with_handler(writer)]);
    let context: Context = [("base", 21)].into_iter().collect();
    let report = exec.run_to_end(context).await;

    assert_eq!(report.state.context.get("doubled"), Some(&Value::Int(42)));
}
