//! Stream executor callback ordering and session isolation

use crate::integration::test_utils::{harness, COUNT, FLAKY_SCAN, LIST, PUT};
use cairn::context::{CollectingObserver, ComposedQuery, ContextState, StreamCall, StreamObserver};
use cairn::driver::memory::Cursor;
use cairn::error::ContextError;
use cairn::normalize::{QueryOutput, Row, Summary};
use cairn::params;
use cairn::value::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const TICKS: &str = "UNWIND range(1, $n) AS i RETURN i";

/// Notes how many rows the backend had produced when each row arrived
struct PacedObserver {
    produced: Arc<AtomicUsize>,
    produced_at_delivery: Vec<usize>,
    completed: bool,
}

impl StreamObserver for PacedObserver {
    fn on_next(&mut self, _row: Row) {
        self.produced_at_delivery
            .push(self.produced.load(Ordering::SeqCst));
    }

    fn on_completed(&mut self, _summary: Summary) {
        self.completed = true;
    }
}

fn assert_well_ordered(calls: &[StreamCall]) {
    let keys = calls
        .iter()
        .filter(|c| matches!(c, StreamCall::Keys(_)))
        .count();
    assert!(keys <= 1);
    if keys == 1 {
        assert!(matches!(calls[0], StreamCall::Keys(_)));
    }
    let terminals: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, StreamCall::Completed(_) | StreamCall::Error(_)))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminals, vec![calls.len() - 1]);
}

#[tokio::test]
async fn test_stream_delivers_keys_rows_then_completion() {
    let h = harness("stream");
    let mut ctx = h.writer();
    for (key, value) in [("a", "1"), ("b", "2"), ("c", "3")] {
        ctx.run(PUT, params! { "key" => key, "value" => value })
            .await
            .unwrap();
    }

    let mut observer = CollectingObserver::new();
    ctx.stream(LIST, params! {}, &mut observer).await;

    assert_well_ordered(&observer.calls);
    assert_eq!(observer.keys(), Some(&["key".to_string(), "value".to_string()][..]));
    let keys: Vec<_> = observer
        .rows()
        .iter()
        .map(|r| r.get("key").and_then(Value::as_str).unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
    assert!(observer.summary().is_some());
    assert!(observer.error().is_none());
}

#[tokio::test]
async fn test_direct_stream_leaves_caller_session_open() {
    let h = harness("direct");
    let mut ctx = h.writer();
    ctx.run(PUT, params! { "key" => "a", "value" => "1" })
        .await
        .unwrap();
    let session = ctx.session_id();

    let mut observer = CollectingObserver::new();
    ctx.stream(LIST, params! {}, &mut observer).await;

    assert_eq!(ctx.state(), ContextState::SessionOpen);
    assert_eq!(ctx.session_id(), session);
    let stats = h.cluster.stats();
    assert_eq!(stats.sessions_opened, 1);
    assert_eq!(stats.sessions_closed, 0);
}

#[tokio::test]
async fn test_stream_inside_transaction_uses_a_closed_sibling() {
    let h = harness("sibling");
    let mut ctx = h.writer();
    ctx.run(PUT, params! { "key" => "a", "value" => "1" })
        .await
        .unwrap();

    let streamed = ComposedQuery::new(|ctx, params| {
        Box::pin(async move {
            let transaction = ctx.transaction_id();
            let session = ctx.session_id();
            let mut observer = CollectingObserver::new();
            ctx.stream(LIST, params, &mut observer).await;

            assert_well_ordered(&observer.calls);
            assert!(observer.error().is_none());
            assert_eq!(ctx.transaction_id(), transaction);
            assert_eq!(ctx.session_id(), session);
            Ok(QueryOutput::Rows(observer.rows().into_iter().cloned().collect()))
        })
    });
    let rows = ctx.query(streamed, params! {}).await.unwrap();
    assert_eq!(rows.len(), 1);

    let stats = h.cluster.stats();
    assert_eq!(stats.sessions_opened, 2);
    assert_eq!(stats.sessions_closed, 1);
    assert_eq!(stats.transactions_begun, 1);
    assert_eq!(ctx.state(), ContextState::SessionOpen);
    assert!(ctx.last_bookmarks().contains("sibling:neo4j:1"));
}

#[tokio::test]
async fn test_stream_failure_is_reported_once_after_rows() {
    let h = harness("flaky");
    let mut ctx = h.writer();
    ctx.run(PUT, params! { "key" => "a", "value" => "1" })
        .await
        .unwrap();

    let mut observer = CollectingObserver::new();
    ctx.stream(FLAKY_SCAN, params! {}, &mut observer).await;

    assert_well_ordered(&observer.calls);
    assert_eq!(observer.rows().len(), 1);
    assert!(observer.summary().is_none());
    assert!(matches!(observer.error(), Some(ContextError::Stream(msg)) if msg.contains("/ by zero")));
}

#[tokio::test]
async fn test_unknown_statement_only_reports_an_error() {
    let h = harness("unknown");
    let mut ctx = h.writer();

    let mut observer = CollectingObserver::new();
    ctx.stream("RETURN nonsense", params! {}, &mut observer).await;

    assert_eq!(observer.calls.len(), 1);
    assert!(matches!(observer.calls[0], StreamCall::Error(ContextError::Stream(_))));
}

#[tokio::test]
async fn test_rows_reach_observer_before_later_rows_are_produced() {
    let h = harness("paced");
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = produced.clone();
    h.cluster.register_cursor(TICKS, move |_, params| {
        let n = params.get("n").and_then(Value::as_i64).unwrap_or(0);
        let counter = counter.clone();
        Ok(Cursor::new(
            &["i"],
            (1..=n).map(move |i| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![Value::Integer(i)])
            }),
        ))
    });
    let mut ctx = h.writer();

    let mut observer = PacedObserver {
        produced: produced.clone(),
        produced_at_delivery: Vec::new(),
        completed: false,
    };
    ctx.stream(TICKS, params! { "n" => 4i64 }, &mut observer).await;

    assert!(observer.completed);
    assert_eq!(observer.produced_at_delivery, vec![1, 2, 3, 4]);
    assert_eq!(produced.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_stream_from_idle_context_opens_a_session_on_it() {
    let h = harness("idle");
    let mut ctx = h.writer();
    assert_eq!(ctx.state(), ContextState::Idle);

    let mut observer = CollectingObserver::new();
    ctx.stream(LIST, params! {}, &mut observer).await;

    assert_well_ordered(&observer.calls);
    assert!(observer.summary().is_some());
    assert_eq!(ctx.state(), ContextState::SessionOpen);
    let stats = h.cluster.stats();
    assert_eq!(stats.sessions_opened, 1);
    assert_eq!(stats.sessions_closed, 0);
}

#[tokio::test]
async fn test_failed_sibling_stream_keeps_previous_summary() {
    let h = harness("keep_summary");
    let mut ctx = h.writer();
    ctx.run(PUT, params! { "key" => "a", "value" => "1" })
        .await
        .unwrap();

    let scanned = ComposedQuery::new(|ctx, params| {
        Box::pin(async move {
            ctx.execute(COUNT, params.clone()).await?;
            let before = ctx.last_summary().cloned();
            assert!(before.is_some());

            let mut observer = CollectingObserver::new();
            ctx.stream(FLAKY_SCAN, params, &mut observer).await;

            assert!(observer.error().is_some());
            assert_eq!(ctx.last_summary().cloned(), before);
            Ok(QueryOutput::Rows(Vec::new()))
        })
    });
    ctx.query(scanned, params! {}).await.unwrap();
}
