use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use muster::{
    Batch, BatchId, Checker, CheckerConfig, MockBatchStore, MockQueueTransport, MockStatusProber,
    SendOutcome, UpdateBatchMessage,
};

fn batch(id: &str, external_batch_id: Option<&str>) -> Batch {
    Batch {
        id: BatchId::from(id),
        external_batch_id: external_batch_id.map(str::to_string),
        status: "Waiting".to_string(),
        created_at: Utc::now(),
    }
}

fn config() -> CheckerConfig {
    CheckerConfig::with_required(
        "test-key".to_string(),
        "batches".to_string(),
        "https://queue.example.com/update".to_string(),
    )
}

fn checker(
    store: &Arc<MockBatchStore>,
    prober: &Arc<MockStatusProber>,
    transport: &Arc<MockQueueTransport>,
    config: &CheckerConfig,
) -> Checker<MockBatchStore, MockStatusProber, MockQueueTransport> {
    Checker::new(store.clone(), prober.clone(), transport.clone(), config)
}

#[test_log::test(tokio::test)]
async fn announces_only_terminal_batches_with_upstream_ids() {
    let store = Arc::new(MockBatchStore::new());
    store.set_batches(vec![
        batch("X", Some("r1")),
        batch("Y", Some("r2")),
        batch("Z", None),
    ]);

    let prober = Arc::new(MockStatusProber::new());
    prober.add_status("r1", "completed");
    prober.add_status("r2", "pending");

    let transport = Arc::new(MockQueueTransport::new());

    let report = checker(&store, &prober, &transport, &config())
        .run()
        .await
        .expect("run should succeed");

    assert_eq!(report.candidates, 3);
    assert_eq!(report.eligible, 1);
    assert_eq!(report.chunks_dispatched, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.dropped, 0);

    // Z was never probed: it has no upstream id.
    assert_eq!(prober.call_count(), 2);

    // Exactly one message, referencing X.
    let attempts = transport.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].len(), 1);
    let message: UpdateBatchMessage = serde_json::from_str(&attempts[0][0].body).unwrap();
    assert_eq!(message.batch_id, BatchId::from("X"));
}

#[test_log::test(tokio::test)]
async fn chunks_large_runs_to_the_protocol_limit() {
    let store = Arc::new(MockBatchStore::new());
    let mut batches = Vec::new();
    let prober = Arc::new(MockStatusProber::new());
    for i in 0..25 {
        let external_id = format!("job-{i}");
        prober.add_status(&external_id, "completed");
        batches.push(batch(&format!("batch-{i}"), Some(&external_id)));
    }
    store.set_batches(batches);

    let transport = Arc::new(MockQueueTransport::new());

    let report = checker(&store, &prober, &transport, &config())
        .run()
        .await
        .expect("run should succeed");

    assert_eq!(report.candidates, 25);
    assert_eq!(report.eligible, 25);
    assert_eq!(report.chunks_dispatched, 3);
    assert_eq!(report.delivered, 25);

    let mut sizes: Vec<usize> = transport.attempts().iter().map(Vec::len).collect();
    assert!(sizes.iter().all(|&size| size <= 10));
    sizes.sort_unstable();
    assert_eq!(sizes, vec![5, 10, 10]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn retries_a_failing_chunk_then_delivers() {
    let store = Arc::new(MockBatchStore::new());
    store.set_batches(vec![batch("A", Some("job-a")), batch("B", Some("job-b"))]);

    let prober = Arc::new(MockStatusProber::new());
    prober.add_status("job-a", "completed");
    prober.add_status("job-b", "failed");

    let transport = Arc::new(MockQueueTransport::new());
    transport.push_outcome(SendOutcome::Fail);
    transport.push_outcome(SendOutcome::Fail);
    // Third attempt falls through to the default accept-all.

    let start = tokio::time::Instant::now();
    let report = checker(&store, &prober, &transport, &config())
        .run()
        .await
        .expect("run should succeed");

    assert_eq!(report.eligible, 2);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.dropped, 0);
    assert_eq!(transport.attempt_count(), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(500));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn drops_undeliverable_chunk_without_failing_the_run() {
    let store = Arc::new(MockBatchStore::new());
    store.set_batches(vec![batch("A", Some("job-a")), batch("B", Some("job-b"))]);

    let prober = Arc::new(MockStatusProber::new());
    prober.add_status("job-a", "completed");
    prober.add_status("job-b", "completed");

    let transport = Arc::new(MockQueueTransport::new());
    for _ in 0..3 {
        transport.push_outcome(SendOutcome::AcceptNone);
    }

    let report = checker(&store, &prober, &transport, &config())
        .run()
        .await
        .expect("run must complete despite undeliverable entries");

    assert_eq!(report.eligible, 2);
    assert_eq!(report.delivered, 0);
    assert_eq!(report.dropped, 2);
    assert_eq!(transport.attempt_count(), 3);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn probe_concurrency_stays_within_the_limiter() {
    let store = Arc::new(MockBatchStore::new());
    let mut batches = Vec::new();
    let prober = Arc::new(MockStatusProber::new());
    for i in 0..9 {
        let external_id = format!("job-{i}");
        prober.add_status(&external_id, "in_progress");
        batches.push(batch(&format!("batch-{i}"), Some(&external_id)));
    }
    store.set_batches(batches);
    prober.set_latency(Duration::from_millis(50));

    let transport = Arc::new(MockQueueTransport::new());

    let mut config = config();
    config.probe_concurrency = 2;

    let report = checker(&store, &prober, &transport, &config)
        .run()
        .await
        .expect("run should succeed");

    assert_eq!(report.candidates, 9);
    assert_eq!(report.eligible, 0);
    assert_eq!(prober.call_count(), 9);
    assert!(
        prober.max_in_flight() <= 2,
        "saw {} concurrent probes",
        prober.max_in_flight()
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn chunk_sends_stay_within_the_dispatch_limiter() {
    let store = Arc::new(MockBatchStore::new());
    let mut batches = Vec::new();
    let prober = Arc::new(MockStatusProber::new());
    for i in 0..50 {
        let external_id = format!("job-{i}");
        prober.add_status(&external_id, "completed");
        batches.push(batch(&format!("batch-{i}"), Some(&external_id)));
    }
    store.set_batches(batches);

    let transport = Arc::new(MockQueueTransport::new());
    transport.set_latency(Duration::from_millis(50));

    let mut config = config();
    config.dispatch_concurrency = 2;

    let report = checker(&store, &prober, &transport, &config)
        .run()
        .await
        .expect("run should succeed");

    assert_eq!(report.chunks_dispatched, 5);
    assert_eq!(report.delivered, 50);
    assert!(
        transport.max_in_flight() <= 2,
        "saw {} concurrent sends",
        transport.max_in_flight()
    );
}

#[test_log::test(tokio::test)]
async fn probe_failures_skip_their_batch_but_not_the_run() {
    let store = Arc::new(MockBatchStore::new());
    store.set_batches(vec![
        batch("A", Some("job-a")),
        batch("B", Some("job-b")),
        batch("C", Some("job-c")),
    ]);

    let prober = Arc::new(MockStatusProber::new());
    prober.add_status("job-a", "completed");
    prober.add_response(
        "job-b",
        Err(muster::MusterError::Transport("connect timeout".to_string())),
    );
    prober.add_response("job-c", Ok(None));

    let transport = Arc::new(MockQueueTransport::new());

    let report = checker(&store, &prober, &transport, &config())
        .run()
        .await
        .expect("one flaky probe must not abort the pass");

    assert_eq!(report.candidates, 3);
    assert_eq!(report.eligible, 1);
    assert_eq!(report.delivered, 1);
}

#[test_log::test(tokio::test)]
async fn record_source_failure_is_fatal_to_the_run() {
    let store = Arc::new(MockBatchStore::new());
    store.fail_with("index offline");

    let prober = Arc::new(MockStatusProber::new());
    let transport = Arc::new(MockQueueTransport::new());

    let result = checker(&store, &prober, &transport, &config()).run().await;

    assert!(matches!(result, Err(muster::MusterError::Store(_))));
    assert_eq!(transport.attempt_count(), 0);
}

#[test_log::test(tokio::test)]
async fn empty_record_source_completes_without_sending() {
    let store = Arc::new(MockBatchStore::new());
    let prober = Arc::new(MockStatusProber::new());
    let transport = Arc::new(MockQueueTransport::new());

    let report = checker(&store, &prober, &transport, &config())
        .run()
        .await
        .expect("run should succeed");

    assert_eq!(report, muster::RunReport::default());
    assert_eq!(transport.attempt_count(), 0);
}
