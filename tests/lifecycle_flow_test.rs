//! End-to-end lifecycle scenarios: registration through activation, driven
//! by price ticks flowing through the in-memory bus into the aggregator.

use beskard::bus::{EventPublisher, InMemoryBus};
use beskard::clock::ManualClock;
use beskard::db::{init_db, AuditKind, KeyedLocks, Repository};
use beskard::domain::{LoanId, LoanStatus, Venue};
use beskard::lifecycle::{ApplicationSubmission, LifecycleEngine, TopUpSubmission};
use beskard::liquidation::LiquidationQueue;
use beskard::ltv::LtvEvaluator;
use beskard::pricing::{ingest, PriceBoard};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

const EVENTS_TOPIC: &str = "coruscant-bank-loan-events";

struct Harness {
    engine: LifecycleEngine,
    evaluator: Arc<LtvEvaluator>,
    board: Arc<PriceBoard>,
    bus: Arc<InMemoryBus>,
    repo: Arc<Repository>,
    clock: ManualClock,
    queue_rx: mpsc::Receiver<LoanId>,
    _temp: TempDir,
}

async fn setup() -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let locks = Arc::new(KeyedLocks::new());
    let clock = ManualClock::new(1_700_000_000_000);
    let bus = Arc::new(InMemoryBus::new());
    let publisher = EventPublisher::new(bus.clone(), EVENTS_TOPIC.to_string());
    let board = Arc::new(PriceBoard::new(Arc::new(clock.clone()), 30));
    let (queue, queue_rx) = LiquidationQueue::bounded(16);

    let engine = LifecycleEngine::new(
        repo.clone(),
        locks.clone(),
        publisher.clone(),
        Arc::new(clock.clone()),
    );
    let evaluator = Arc::new(LtvEvaluator::new(
        repo.clone(),
        locks,
        board.clone(),
        publisher,
        queue,
        Arc::new(clock.clone()),
        50,
        80,
    ));

    Harness {
        engine,
        evaluator,
        board,
        bus,
        repo,
        clock,
        queue_rx,
        _temp: temp_dir,
    }
}

/// Push a Mos Espa feed message through normalization into the board, the
/// same path the ingest task takes.
fn publish_mos_espa_tick(h: &Harness, price: &str) {
    let message = serde_json::json!({
        "timestamp": "2026-03-01T12:00:00Z",
        "ladder": [
            {"quantity": 1, "buy": price, "sell": price},
            {"quantity": 10, "buy": price, "sell": price},
            {"quantity": 50, "buy": price, "sell": price},
            {"quantity": 100, "buy": price, "sell": price},
        ]
    });
    ingest::ingest_message(&h.board, &h.clock, Venue::MosEspa, &message);
}

fn events_of_type(h: &Harness, event_type: &str) -> Vec<serde_json::Value> {
    h.bus
        .published(EVENTS_TOPIC)
        .into_iter()
        .filter(|e| e["eventType"] == event_type)
        .collect()
}

async fn register(h: &Harness, request_id: &str, loan_id: &str, principal: &str) {
    h.engine
        .submit_application(ApplicationSubmission {
            request_id: request_id.to_string(),
            loan_id: loan_id.to_string(),
            borrower_id: "B1".to_string(),
            amount: principal.to_string(),
        })
        .await
        .unwrap();
}

async fn add_collateral(h: &Harness, request_id: &str, loan_id: &str, amount: &str) {
    h.engine
        .submit_top_up(TopUpSubmission {
            request_id: request_id.to_string(),
            loan_id: loan_id.to_string(),
            borrower_id: "B1".to_string(),
            amount: amount.to_string(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_activation_scenario() {
    let h = setup().await;

    // Register L1 with principal 1000, top up 40 BSK, mid price 50:
    // LTV = 1000 / (40 * 50) = 50% -> activates.
    register(&h, "r-1", "L1", "1000").await;
    add_collateral(&h, "r-2", "L1", "40").await;
    publish_mos_espa_tick(&h, "50");

    h.evaluator.evaluate_once().await.unwrap();

    let loan = h.repo.get_loan(&LoanId::new("L1")).await.unwrap().unwrap();
    assert_eq!(loan.status, LoanStatus::Active);

    let applications = events_of_type(&h, "application");
    assert_eq!(applications.len(), 1);
    assert_eq!(applications[0]["amount"], "1000");
    assert_eq!(applications[0]["status"], "new");

    let activations = events_of_type(&h, "activation");
    assert_eq!(activations.len(), 1);
    assert_eq!(activations[0]["loanId"], "L1");
    assert_eq!(activations[0]["outstandingBalance"], "1000");
    assert_eq!(activations[0]["status"], "active");

    // Every transition leaves an audit trail.
    assert!(h
        .repo
        .count_audit(&LoanId::new("L1"), Some(AuditKind::Activation))
        .await
        .unwrap()
        > 0);
}

#[tokio::test]
async fn test_no_activation_below_collateral() {
    let h = setup().await;

    // 20 BSK at mid 50: LTV = 100%, stays new, no activation event.
    register(&h, "r-1", "L2", "1000").await;
    add_collateral(&h, "r-2", "L2", "20").await;
    publish_mos_espa_tick(&h, "50");

    h.evaluator.evaluate_once().await.unwrap();

    let loan = h.repo.get_loan(&LoanId::new("L2")).await.unwrap().unwrap();
    assert_eq!(loan.status, LoanStatus::New);
    assert!(events_of_type(&h, "activation").is_empty());
}

#[tokio::test]
async fn test_top_up_after_tick_activates_on_next_tick() {
    let h = setup().await;

    register(&h, "r-1", "L1", "1000").await;
    add_collateral(&h, "r-2", "L1", "20").await;
    publish_mos_espa_tick(&h, "50");
    h.evaluator.evaluate_once().await.unwrap();
    assert_eq!(
        h.repo
            .get_loan(&LoanId::new("L1"))
            .await
            .unwrap()
            .unwrap()
            .status,
        LoanStatus::New
    );

    // The threshold-crossing top-up takes effect on the next tick.
    add_collateral(&h, "r-3", "L1", "20").await;
    h.clock.advance_ms(300);
    publish_mos_espa_tick(&h, "50");
    h.evaluator.evaluate_once().await.unwrap();

    assert_eq!(
        h.repo
            .get_loan(&LoanId::new("L1"))
            .await
            .unwrap()
            .unwrap()
            .status,
        LoanStatus::Active
    );
}

#[tokio::test]
async fn test_breach_schedules_liquidation_once() {
    let mut h = setup().await;

    register(&h, "r-1", "L1", "1000").await;
    add_collateral(&h, "r-2", "L1", "40").await;
    publish_mos_espa_tick(&h, "50");
    h.evaluator.evaluate_once().await.unwrap();

    // Price falls to 31.25: LTV = 80%, the liquidation threshold.
    h.clock.advance_ms(300);
    publish_mos_espa_tick(&h, "31.25");
    h.evaluator.evaluate_once().await.unwrap();

    let loan = h.repo.get_loan(&LoanId::new("L1")).await.unwrap().unwrap();
    assert_eq!(loan.status, LoanStatus::Liquidating);
    assert_eq!(h.queue_rx.recv().await.unwrap(), LoanId::new("L1"));

    // Re-evaluation does not enqueue a second job.
    h.clock.advance_ms(300);
    publish_mos_espa_tick(&h, "31.25");
    h.evaluator.evaluate_once().await.unwrap();
    assert!(h.queue_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_status_history_is_forward_only() {
    let h = setup().await;

    register(&h, "r-1", "L1", "1000").await;
    add_collateral(&h, "r-2", "L1", "40").await;

    let mut observed = Vec::new();
    observed.push(
        h.repo
            .get_loan(&LoanId::new("L1"))
            .await
            .unwrap()
            .unwrap()
            .status,
    );

    publish_mos_espa_tick(&h, "50");
    h.evaluator.evaluate_once().await.unwrap();
    observed.push(
        h.repo
            .get_loan(&LoanId::new("L1"))
            .await
            .unwrap()
            .unwrap()
            .status,
    );

    h.clock.advance_ms(300);
    publish_mos_espa_tick(&h, "31.25");
    h.evaluator.evaluate_once().await.unwrap();
    observed.push(
        h.repo
            .get_loan(&LoanId::new("L1"))
            .await
            .unwrap()
            .unwrap()
            .status,
    );

    // Price recovery must not regress the loan.
    h.clock.advance_ms(300);
    publish_mos_espa_tick(&h, "90");
    h.evaluator.evaluate_once().await.unwrap();
    observed.push(
        h.repo
            .get_loan(&LoanId::new("L1"))
            .await
            .unwrap()
            .unwrap()
            .status,
    );

    assert_eq!(
        observed,
        vec![
            LoanStatus::New,
            LoanStatus::Active,
            LoanStatus::Liquidating,
            LoanStatus::Liquidating,
        ]
    );
}

#[tokio::test]
async fn test_repeated_activation_publishes_same_event_id() {
    let h = setup().await;

    register(&h, "r-1", "L1", "1000").await;
    add_collateral(&h, "r-2", "L1", "40").await;
    publish_mos_espa_tick(&h, "50");
    h.evaluator.evaluate_once().await.unwrap();

    let events = events_of_type(&h, "activation");
    assert_eq!(events.len(), 1);
    let event_id = events[0]["eventId"].as_str().unwrap();
    assert!(event_id.starts_with("evt:"));

    // All application events for a loan share one id too.
    let applications = events_of_type(&h, "application");
    assert_ne!(applications[0]["eventId"].as_str().unwrap(), event_id);
}
