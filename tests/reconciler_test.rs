mod common;

use billpay_recon::domain::idempotency::KeyState;
use billpay_recon::domain::order::OrderStatus;
use billpay_recon::domain::ports::OrderStore;
use billpay_recon::domain::settlement::SettlementStatus;
use billpay_recon::services::reconciler::{ReconcileReport, Reconciler, run_reconciler};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn reconciler(h: &Harness, grace: Duration) -> Reconciler {
    Reconciler::new(h.store.clone(), h.aggregator.clone(), grace, 50)
}

#[tokio::test]
async fn applies_outcome_already_recorded_under_the_key() {
    let h = Harness::new(FakeAggregator::replying(201));
    let order = h.claimed_order().await;
    h.trigger()
        .trigger(&order, &order.order_ref.settlement_key())
        .await
        .unwrap();

    let report = reconciler(&h, Duration::ZERO).reconcile_once().await.unwrap();
    assert_eq!(
        report,
        ReconcileReport {
            examined: 1,
            resolved: 1,
            unresolved: 0
        }
    );
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::Paid);
    assert_eq!(h.aggregator.status_queries(), 0);
    assert!(
        h.ledger_kinds(&order.order_ref)
            .await
            .contains(&"SETTLEMENT_RECONCILED".to_string())
    );
}

#[tokio::test]
async fn queries_aggregator_when_call_never_recorded() {
    let h = Harness::new(FakeAggregator::replying(201));
    let order = h.claimed_order().await;
    let key = order.order_ref.settlement_key();
    // Crash mid-call: key held in flight, nothing recorded.
    h.store.try_acquire(&key).await.unwrap();
    h.aggregator.answer_status_queries(Some(SettlementStatus::Success));

    let report = reconciler(&h, Duration::ZERO).reconcile_once().await.unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(h.aggregator.status_queries(), 1);
    assert_eq!(h.aggregator.calls(), 0);
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::Paid);

    let record = h.store.find_idempotency(&key).await.unwrap().unwrap();
    assert_eq!(record.state, KeyState::Consumed);
    assert_eq!(record.outcome, Some(SettlementStatus::Success));
    assert_eq!(h.store.settlement_attempts_for(&order.order_ref).await.unwrap().len(), 1);
}

#[tokio::test]
async fn no_answer_leaves_order_for_manual_reconciliation() {
    let h = Harness::new(FakeAggregator::replying(201));
    let order = h.claimed_order().await;

    let report = reconciler(&h, Duration::ZERO).reconcile_once().await.unwrap();
    assert_eq!(report.unresolved, 1);
    assert_eq!(
        h.order(&order.order_ref).await.status,
        OrderStatus::SettlementTriggered
    );
}

#[tokio::test]
async fn resolves_pending_order_with_definitive_answer() {
    let h = Harness::new(FakeAggregator::replying(202));
    let order = h.attached_order(24900).await;
    let body = captured_event(&gateway_ref(&order), "pay_RC2", 24900);
    h.pipeline
        .ingest_gateway_webhook(&body, Some(&sign(&body)))
        .await
        .unwrap();
    h.pipeline.settle(&order.order_ref).await.unwrap();
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::SettlementPending);

    h.aggregator.answer_status_queries(Some(SettlementStatus::Pending));
    let report = reconciler(&h, Duration::ZERO).reconcile_once().await.unwrap();
    assert_eq!(report.unresolved, 1);
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::SettlementPending);

    h.aggregator.answer_status_queries(Some(SettlementStatus::Failed));
    let report = reconciler(&h, Duration::ZERO).reconcile_once().await.unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::SettlementFailed);
}

#[tokio::test]
async fn grace_period_skips_fresh_orders() {
    let h = Harness::new(FakeAggregator::replying(201));
    h.claimed_order().await;
    h.aggregator.answer_status_queries(Some(SettlementStatus::Success));

    let report = reconciler(&h, Duration::from_secs(3600))
        .reconcile_once()
        .await
        .unwrap();
    assert_eq!(report, ReconcileReport::default());
    assert_eq!(h.aggregator.status_queries(), 0);
}

#[tokio::test]
async fn loop_stops_on_shutdown() {
    let h = Harness::new(FakeAggregator::replying(201));
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(run_reconciler(
        Arc::new(reconciler(&h, Duration::ZERO)),
        Duration::from_millis(10),
        rx,
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("reconciler did not stop")
        .unwrap();
}
