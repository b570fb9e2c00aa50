mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use common::{harness, order_numbers, processed, ScriptedOracle};
use loyalty_core::accrual::AccrualOutcome;
use loyalty_core::models::{Balance, OrderStatus};
use loyalty_core::reconciliation::{AccrualWorker, WorkerConfig, WorkerState};
use loyalty_core::services::OrderService;

const ORDER: &str = "79927398713";

fn config(max_concurrent_queries: usize) -> WorkerConfig {
    WorkerConfig {
        max_concurrent_queries,
        ..WorkerConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_then_processed() {
    let oracle = Arc::new(
        ScriptedOracle::new(AccrualOutcome::transient("unexpected"))
            .script(ORDER, vec![AccrualOutcome::rate_limited_secs(2), processed(300)]),
    );
    let (store, services, worker) = harness(oracle.clone(), WorkerConfig::default());
    store.seed_order(1, ORDER, OrderStatus::New, None);

    let started = Instant::now();
    let report = worker.run_pass().await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(report.finalized, 1);

    let calls = oracle.calls_for(ORDER);
    assert_eq!(calls.len(), 2);
    assert!(calls[1] - calls[0] >= Duration::from_secs(2));

    let order = store.order(ORDER).unwrap();
    assert_eq!(order.status, OrderStatus::Processed);
    assert_eq!(order.accrual, Some(300));
    assert_eq!(
        services.ledger.get_balance(1).await.unwrap(),
        Balance {
            current: 300,
            withdrawn: 0
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_retries_are_bounded() {
    let oracle = Arc::new(ScriptedOracle::new(AccrualOutcome::rate_limited_secs(1)));
    let (store, services, worker) = harness(oracle.clone(), WorkerConfig::default());
    let before = store.seed_order(1, ORDER, OrderStatus::New, None);

    let started = Instant::now();
    let report = worker.run_pass().await.unwrap();

    // One initial query plus three retries, each a second apart
    assert_eq!(oracle.calls_for(ORDER).len(), 4);
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(report.rate_limit_exhausted, 1);
    assert_eq!(store.order(ORDER).unwrap(), before);
    assert_eq!(services.orders.get_pending_orders().await.unwrap(), vec![ORDER]);

    // Exhaustion is per pass: the next pass asks again
    worker.run_pass().await.unwrap();
    assert_eq!(oracle.calls_for(ORDER).len(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_is_respected() {
    let numbers = order_numbers(25);
    let oracle = Arc::new(
        ScriptedOracle::new(processed(10)).with_latency(Duration::from_millis(50)),
    );
    let (store, services, worker) = harness(oracle.clone(), config(4));
    for number in &numbers {
        store.seed_order(7, number, OrderStatus::New, None);
    }

    let report = worker.run_pass().await.unwrap();

    assert_eq!(report.fetched, 25);
    assert_eq!(report.finalized, 25);
    assert_eq!(oracle.total_calls(), 25);
    assert_eq!(oracle.peak_in_flight(), 4);
    assert_eq!(services.ledger.get_balance(7).await.unwrap().current, 250);
}

#[tokio::test(start_paused = true)]
async fn test_back_off_does_not_hold_a_query_slot() {
    let other = "12345678903";
    let oracle = Arc::new(
        ScriptedOracle::new(processed(1))
            .script(ORDER, vec![AccrualOutcome::rate_limited_secs(30), processed(5)]),
    );
    let (store, _, worker) = harness(oracle.clone(), config(1));
    store.seed_order(1, ORDER, OrderStatus::New, None);
    store.seed_order(2, other, OrderStatus::New, None);

    let report = worker.run_pass().await.unwrap();
    assert_eq!(report.finalized, 2);

    let rate_limited = oracle.calls_for(ORDER);
    let unaffected = oracle.calls_for(other);
    assert_eq!(rate_limited.len(), 2);
    assert_eq!(unaffected.len(), 1);
    assert!(unaffected[0] < rate_limited[1]);
}

#[tokio::test]
async fn test_transient_failures_wait_for_next_pass() {
    let oracle = Arc::new(ScriptedOracle::new(AccrualOutcome::transient(
        "503 Service Unavailable",
    )));
    let (store, _, worker) = harness(oracle.clone(), WorkerConfig::default());
    let before = store.seed_order(1, ORDER, OrderStatus::New, None);

    let report = worker.run_pass().await.unwrap();

    assert_eq!(report.deferred, 1);
    assert_eq!(oracle.calls_for(ORDER).len(), 1);
    assert_eq!(store.order(ORDER).unwrap(), before);
}

#[tokio::test]
async fn test_not_registered_and_non_terminal_verdicts() {
    let registered = "12345678903";
    let processing = "2377225624";
    let unknown = "9278923470";
    let oracle = Arc::new(
        ScriptedOracle::new(AccrualOutcome::transient("unexpected"))
            .script(
                registered,
                vec![AccrualOutcome::Resolved {
                    status: OrderStatus::Registered,
                    accrual: None,
                }],
            )
            .script(
                processing,
                vec![AccrualOutcome::Resolved {
                    status: OrderStatus::Processing,
                    accrual: None,
                }],
            )
            .script(unknown, vec![AccrualOutcome::NotRegistered]),
    );
    let (store, services, worker) = harness(oracle, WorkerConfig::default());
    let registered_before = store.seed_order(1, registered, OrderStatus::New, None);
    let processing_before = store.seed_order(1, processing, OrderStatus::New, None);
    store.seed_order(1, unknown, OrderStatus::New, None);

    let report = worker.run_pass().await.unwrap();

    assert_eq!(report.unchanged, 2);
    assert_eq!(report.finalized, 1);
    assert_eq!(store.order(registered).unwrap(), registered_before);
    assert_eq!(store.order(processing).unwrap(), processing_before);

    let invalid = store.order(unknown).unwrap();
    assert_eq!(invalid.status, OrderStatus::Invalid);
    assert_eq!(invalid.accrual, None);

    assert_eq!(
        services.orders.get_pending_orders().await.unwrap(),
        vec![registered, processing]
    );
}

#[tokio::test]
async fn test_invalid_accrual_does_not_abort_the_pass() {
    let good = "12345678903";
    let oracle = Arc::new(ScriptedOracle::new(processed(50)).script(
        ORDER,
        vec![AccrualOutcome::Resolved {
            status: OrderStatus::Processed,
            accrual: Some(-1),
        }],
    ));
    let (store, _, worker) = harness(oracle, WorkerConfig::default());
    store.seed_order(1, ORDER, OrderStatus::New, None);
    store.seed_order(1, good, OrderStatus::New, None);

    let report = worker.run_pass().await.unwrap();

    assert_eq!(report.rejected, 1);
    assert_eq!(report.finalized, 1);
    assert_eq!(store.order(ORDER).unwrap().status, OrderStatus::New);
    assert_eq!(store.order(good).unwrap().accrual, Some(50));
}

#[tokio::test]
async fn test_worker_without_oracle_stops_immediately() {
    let store = loyalty_core::persistence::MemoryStore::new();
    store.seed_order(1, ORDER, OrderStatus::New, None);
    let worker = AccrualWorker::new(
        OrderService::new(Arc::new(store.clone())),
        None,
        WorkerConfig::default(),
    );

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    worker.run(shutdown_rx).await;

    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(worker.passes_completed(), 0);
    assert_eq!(store.order(ORDER).unwrap().status, OrderStatus::New);
}

#[tokio::test(start_paused = true)]
async fn test_loop_runs_first_pass_immediately_and_stops_on_shutdown() {
    let oracle = Arc::new(ScriptedOracle::new(processed(40)));
    let (store, _, worker) = harness(oracle, WorkerConfig::default());
    store.seed_order(1, ORDER, OrderStatus::New, None);
    let worker = Arc::new(worker);
    assert_eq!(worker.state(), WorkerState::Idle);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = Arc::clone(&worker).spawn(shutdown_rx);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(worker.state(), WorkerState::Running);
    assert_eq!(worker.passes_completed(), 1);
    assert_eq!(worker.last_report().unwrap().finalized, 1);
    assert_eq!(store.order(ORDER).unwrap().status, OrderStatus::Processed);

    // Later passes find nothing to do
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(worker.passes_completed() >= 3);
    assert!(worker.last_report().unwrap().is_empty());

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_slow_pass_delays_next_tick_without_overlap() {
    let oracle = Arc::new(
        ScriptedOracle::new(AccrualOutcome::transient("still down"))
            .with_latency(Duration::from_secs(5)),
    );
    let (store, _, worker) = harness(oracle.clone(), WorkerConfig::default());
    store.seed_order(1, ORDER, OrderStatus::New, None);
    let worker = Arc::new(worker);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = Arc::clone(&worker).spawn(shutdown_rx);

    tokio::time::sleep(Duration::from_secs(11)).await;

    let completed = worker.passes_completed();
    assert!((2..=3).contains(&completed), "completed {completed} passes");
    assert_eq!(oracle.peak_in_flight(), 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_in_flight_queries() {
    let oracle = Arc::new(
        ScriptedOracle::new(processed(99)).with_latency(Duration::from_secs(3_600)),
    );
    let (store, _, worker) = harness(oracle.clone(), WorkerConfig::default());
    let before = store.seed_order(1, ORDER, OrderStatus::New, None);
    let worker = Arc::new(worker);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = Arc::clone(&worker).spawn(shutdown_rx);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(oracle.total_calls(), 1);

    let started = Instant::now();
    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker did not stop promptly")
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(worker.passes_completed(), 0);
    assert_eq!(store.order(ORDER).unwrap(), before);
}
