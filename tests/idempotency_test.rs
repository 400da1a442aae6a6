mod common;

use billpay_recon::domain::idempotency::{Acquire, KeyState};
use billpay_recon::domain::ports::OrderStore;
use billpay_recon::domain::settlement::{SettlementOutcome, SettlementStatus};
use common::*;
use std::time::Duration;

#[tokio::test]
async fn same_key_triggers_exactly_once() {
    let h = Harness::new(FakeAggregator::replying(201));
    let order = h.attached_order(24900).await;
    let key = order.order_ref.settlement_key();
    let trigger = h.trigger();

    let first = trigger.trigger(&order, &key).await.unwrap();
    match &first {
        SettlementOutcome::Completed { status, aggregator_txn_id, .. } => {
            assert_eq!(*status, SettlementStatus::Success);
            assert_eq!(aggregator_txn_id.as_deref(), Some("BBPS-TXN-1"));
        }
        other => panic!("expected Completed, got {other:?}"),
    }

    let second = trigger.trigger(&order, &key).await.unwrap();
    assert_eq!(second, SettlementOutcome::AlreadyTriggered);
    assert_eq!(second.label(), "ALREADY_TRIGGERED");

    assert_eq!(h.aggregator.calls(), 1);
    assert_eq!(h.store.settlement_attempts_for(&order.order_ref).await.unwrap().len(), 1);
    assert!(
        h.ledger_kinds(&order.order_ref)
            .await
            .contains(&"SETTLEMENT_IDEMPOTENT_HIT".to_string())
    );
}

#[tokio::test]
async fn key_is_in_flight_while_the_call_runs() {
    let h = Harness::new(FakeAggregator::replying(201).delayed(Duration::from_millis(300)));
    let order = h.attached_order(24900).await;
    let key = order.order_ref.settlement_key();

    let trigger = h.trigger();
    let (o, k) = (order.clone(), key.clone());
    let running = tokio::spawn(async move { trigger.trigger(&o, &k).await.unwrap() });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let record = h.store.find_idempotency(&key).await.unwrap().unwrap();
    assert_eq!(record.state, KeyState::InFlight);
    assert_eq!(record.outcome, None);

    // A second worker racing on the same key never assumes freshness.
    let racing = h.trigger().trigger(&order, &key).await.unwrap();
    assert_eq!(racing, SettlementOutcome::AlreadyTriggered);

    let finished = running.await.unwrap();
    assert_eq!(finished.label(), "SUCCESS");
    assert_eq!(h.aggregator.calls(), 1);

    let record = h.store.find_idempotency(&key).await.unwrap().unwrap();
    assert_eq!(record.state, KeyState::Consumed);
    assert_eq!(record.outcome, Some(SettlementStatus::Success));
    assert!(record.consumed_at.is_some());
}

#[tokio::test]
async fn clearing_the_key_allows_a_manual_replay() {
    let h = Harness::new(FakeAggregator::timing_out());
    let order = h.attached_order(24900).await;
    let key = order.order_ref.settlement_key();
    let trigger = h.trigger();

    trigger.trigger(&order, &key).await.unwrap();
    assert_eq!(
        trigger.trigger(&order, &key).await.unwrap(),
        SettlementOutcome::AlreadyTriggered
    );

    assert!(h.pipeline.clear_settlement_key(&order.order_ref).await.unwrap());
    assert!(h.store.find_idempotency(&key).await.unwrap().is_none());
    assert!(
        h.ledger_kinds(&order.order_ref)
            .await
            .contains(&"IDEMPOTENCY_KEY_CLEARED".to_string())
    );

    let replay = trigger.trigger(&order, &key).await.unwrap();
    assert_eq!(replay.label(), "FAILED");
    assert_eq!(h.aggregator.calls(), 2);
    assert_eq!(h.store.settlement_attempts_for(&order.order_ref).await.unwrap().len(), 2);
}

#[tokio::test]
async fn clearing_a_missing_key_reports_false() {
    let h = Harness::new(FakeAggregator::replying(201));
    let order = h.attached_order(100).await;

    assert!(!h.pipeline.clear_settlement_key(&order.order_ref).await.unwrap());
    assert!(
        !h.ledger_kinds(&order.order_ref)
            .await
            .contains(&"IDEMPOTENCY_KEY_CLEARED".to_string())
    );
}

#[tokio::test]
async fn keys_are_scoped_per_order() {
    let h = Harness::new(FakeAggregator::replying(201));
    let a = h.attached_order(100).await;
    let b = h.attached_order(200).await;
    let trigger = h.trigger();

    trigger.trigger(&a, &a.order_ref.settlement_key()).await.unwrap();
    trigger.trigger(&b, &b.order_ref.settlement_key()).await.unwrap();

    assert_eq!(h.aggregator.calls(), 2);
    assert_ne!(a.order_ref.settlement_key(), b.order_ref.settlement_key());
}

#[tokio::test]
async fn acquire_reports_existing_record() {
    let h = Harness::new(FakeAggregator::replying(201));

    assert!(matches!(h.store.try_acquire("k-1").await.unwrap(), Acquire::Fresh));
    match h.store.try_acquire("k-1").await.unwrap() {
        Acquire::AlreadyConsumed(record) => {
            assert_eq!(record.key, "k-1");
            assert_eq!(record.state, KeyState::InFlight);
        }
        Acquire::Fresh => panic!("second acquire must not be fresh"),
    }
}
