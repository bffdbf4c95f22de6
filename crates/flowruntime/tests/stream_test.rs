mod common;

use common::*;
use flowcore::{
    Context, EventRecord, NodeStatus, RunOptions, Step, StepError, StepHandler, StepInputs,
    StepOutcome, Value,
};
use flowruntime::FlowExecutor;
use futures::StreamExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_event_stream_ends_with_terminal_record() {
    init_tracing();

    let executor = FlowExecutor::new(
        "streamed",
        vec![instant("a"), instant("b").depends_on(["a"])],
    )
    .unwrap()
    .with_options(RunOptions::immediate())
    .with_event_buffer(2);

    let mut events = executor.run(Context::new());
    let mut seen = Vec::new();
    while let Some(record) = events.next().await {
        seen.push(record);
    }
    let state = events.finish().await.unwrap();

    assert_eq!(seen.len(), 9);
    assert!(matches!(seen.last(), Some(EventRecord::Complete(_))));
    assert_eq!(seen.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(state.results.len(), 2);
}

#[tokio::test]
async fn test_collect_returns_events_and_state() {
    let executor = FlowExecutor::new("collected", vec![instant("only")])
        .unwrap()
        .with_options(RunOptions::immediate());

    let report = executor.run(Context::new()).collect().await.unwrap();

    assert!(report.succeeded());
    assert_eq!(
        report.node_statuses("only"),
        vec![NodeStatus::Pending, NodeStatus::Running, NodeStatus::Success]
    );
    assert_eq!(report.state.graph_id, "collected");
}

/// Cancels the token injected into the context, then succeeds.
struct CancelCaller;

#[async_trait::async_trait]
impl StepHandler for CancelCaller {
    async fn call(&self, ctx: &mut Context, _inputs: StepInputs) -> Result<Value, StepError> {
        let token = ctx
            .service::<CancellationToken>()
            .ok_or_else(|| StepError::Configuration("no token".into()))?;
        token.cancel();
        Ok(Value::from("cancelled the caller"))
    }
}

#[tokio::test]
async fn test_caller_cancellation_stops_before_next_step() {
    init_tracing();

    let token = CancellationToken::new();
    let later = Returns::new("unreachable");
    let calls = Arc::clone(&later.calls);
    let executor = FlowExecutor::new(
        "cancellable",
        vec![
            Step::new("first").with_handler(Arc::new(CancelCaller)),
            Step::new("second")
                .depends_on(["first"])
                .with_handler(Arc::new(later)),
        ],
    )
    .unwrap()
    .with_options(RunOptions::immediate())
    .with_cancellation(token.clone());

    let context = Context::new().with_service(Arc::new(token));
    let report = executor.run(context).collect().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.state.outcome("first"), Some(StepOutcome::Succeeded));
    assert_eq!(report.state.cancel_reason.as_deref(), Some("cancelled by caller"));
    match report.terminal() {
        Some(EventRecord::Error(error)) => assert_eq!(error.message, "Flow cancelled"),
        other => panic!("unexpected terminal: {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_interrupts_inter_step_delay() {
    init_tracing();

    let options = RunOptions {
        reset_first: true,
        pre_delay: Duration::ZERO,
        post_delay: Duration::from_secs(30),
    };
    let executor = FlowExecutor::new("slow", vec![instant("a"), instant("b")])
        .unwrap()
        .with_options(options);

    let mut events = executor.run(Context::new());
    while let Some(record) = events.next().await {
        if matches!(&record, EventRecord::NodeStatus(n) if n.node_id == "a" && n.status == NodeStatus::Success)
        {
            events.cancel();
            break;
        }
    }

    let report = tokio::time::timeout(Duration::from_secs(5), events.collect())
        .await
        .expect("cancelled run should end promptly")
        .unwrap();
    assert!(report.state.cancelled);
    assert!(report.state.outcome("b").is_none());
}

#[tokio::test]
async fn test_dropping_the_stream_cancels_the_run() {
    init_tracing();

    let counter = Arc::new(AtomicU32::new(0));
    let steps = (0..10)
        .map(|i| {
            let counter = Arc::clone(&counter);
            Step::new(format!("s{}", i)).with_handler(flowcore::handler_fn(move |_ctx, _inputs| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, StepError>(Value::Null)
                })
            }))
        })
        .collect();
    let executor = FlowExecutor::new("dropped", steps)
        .unwrap()
        .with_options(RunOptions::immediate())
        .with_event_buffer(1);

    let mut events = executor.run(Context::new());
    let first = events.next().await;
    assert!(matches!(first, Some(EventRecord::NodeStatus(_))));
    drop(events);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}
