//! Needs a live Postgres at localhost:5432 (postgres/password).
//! Run with `cargo test --test postgres_store_test -- --ignored`.

mod common;

use billpay_recon::domain::error::PipelineError;
use billpay_recon::domain::id::{GatewayOrderRef, GatewayPaymentRef, OrderRef};
use billpay_recon::domain::idempotency::{Acquire, KeyState};
use billpay_recon::domain::ledger::{LedgerKind, NewLedgerEntry};
use billpay_recon::domain::money::MinorUnits;
use billpay_recon::domain::order::{Evidence, NewOrder, OrderStatus};
use billpay_recon::domain::payment::{NewPayment, PaymentRecordStatus};
use billpay_recon::domain::ports::OrderStore;
use billpay_recon::domain::settlement::{NewSettlementAttempt, SettlementStatus};
use billpay_recon::infra::postgres::PgStore;
use common::setup_pool;
use std::sync::Arc;

const DB: &str = "billpay_recon_test_store";

async fn store() -> PgStore {
    PgStore::new(setup_pool(DB).await)
}

async fn attached(store: &PgStore) -> OrderRef {
    let order_ref = OrderRef::generate();
    let new = NewOrder::new(
        order_ref.clone(),
        "CONSUMER-1",
        MinorUnits::new(24900).unwrap(),
        "ELECTRICITY",
    )
    .unwrap();
    store.create_order(&new).await.unwrap();
    store
        .transition(
            &order_ref,
            &[OrderStatus::Created],
            OrderStatus::GatewayAttached,
            Evidence::GatewayOrder(GatewayOrderRef::new(format!("order_{order_ref}")).unwrap()),
        )
        .await
        .unwrap();
    order_ref
}

fn capture(payment_ref: &str) -> Evidence {
    Evidence::Payment(NewPayment::new(
        GatewayPaymentRef::new(payment_ref).unwrap(),
        Some("upi".into()),
        PaymentRecordStatus::Captured,
        Some(MinorUnits::new(24900).unwrap()),
        serde_json::json!({"id": payment_ref}),
    ))
}

#[tokio::test]
#[ignore]
async fn create_then_duplicate_order() {
    let store = store().await;
    let order_ref = attached(&store).await;

    let order = store.find_order(&order_ref).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::GatewayAttached);
    let by_gateway = store
        .find_order_by_gateway_ref(order.gateway_order_ref.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_gateway.order_ref, order_ref);

    let dup = NewOrder::new(order_ref.clone(), "X", MinorUnits::new(1).unwrap(), "GAS").unwrap();
    let err = store.create_order(&dup).await.unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateOrder(_)), "got {err:?}");
}

#[tokio::test]
#[ignore]
async fn transition_writes_payment_and_ledger_atomically() {
    let store = store().await;
    let order_ref = attached(&store).await;

    store
        .transition(
            &order_ref,
            &[OrderStatus::GatewayAttached],
            OrderStatus::GatewayCaptured,
            capture("pay_PG1"),
        )
        .await
        .unwrap();

    let err = store
        .transition(
            &order_ref,
            &[OrderStatus::GatewayAttached],
            OrderStatus::GatewayCaptured,
            capture("pay_PG1"),
        )
        .await
        .unwrap_err();
    match err {
        PipelineError::InvalidTransition { current, .. } => {
            assert_eq!(current, OrderStatus::GatewayCaptured)
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }

    assert_eq!(store.payments_for(&order_ref).await.unwrap().len(), 1);
    let kinds: Vec<String> = store
        .ledger_for(&order_ref)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec!["ORDER_CREATED", "GATEWAY_ORDER_ATTACHED", "GATEWAY_CAPTURED"]
    );
}

#[tokio::test]
#[ignore]
async fn illegal_edge_is_refused_even_if_caller_allows_it() {
    let store = store().await;
    let order_ref = attached(&store).await;

    let err = store
        .transition(
            &order_ref,
            &OrderStatus::ALL,
            OrderStatus::Paid,
            Evidence::Reconciled {
                status: SettlementStatus::Success,
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition(), "got {err:?}");

    let missing = OrderRef::new("no-such-order").unwrap();
    let err = store
        .transition(
            &missing,
            &[OrderStatus::Created],
            OrderStatus::GatewayAttached,
            Evidence::GatewayOrder(GatewayOrderRef::new("order_nope").unwrap()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::OrderNotFound(_)), "got {err:?}");
}

#[tokio::test]
#[ignore]
async fn idempotency_key_lifecycle() {
    let store = store().await;
    let order_ref = attached(&store).await;
    let key = order_ref.settlement_key();

    assert!(matches!(store.try_acquire(&key).await.unwrap(), Acquire::Fresh));
    match store.try_acquire(&key).await.unwrap() {
        Acquire::AlreadyConsumed(record) => assert_eq!(record.state, KeyState::InFlight),
        Acquire::Fresh => panic!("second acquire must not be fresh"),
    }

    let attempt = NewSettlementAttempt::new(
        order_ref.clone(),
        "corr-1",
        SettlementStatus::Failed,
        None,
        serde_json::json!({"error": "timeout"}),
    );
    let entry = NewLedgerEntry::new(Some(&order_ref), LedgerKind::SettlementAttemptRecorded, "status=FAILED");
    store.record_settlement(&key, &attempt, &entry).await.unwrap();

    let record = store.find_idempotency(&key).await.unwrap().unwrap();
    assert_eq!(record.state, KeyState::Consumed);
    assert_eq!(record.outcome, Some(SettlementStatus::Failed));
    assert_eq!(store.settlement_attempts_for(&order_ref).await.unwrap().len(), 1);

    let cleared = NewLedgerEntry::new(Some(&order_ref), LedgerKind::IdempotencyKeyCleared, key.clone());
    assert!(store.clear_idempotency(&key, &cleared).await.unwrap());
    assert!(!store.clear_idempotency(&key, &cleared).await.unwrap());
    assert!(store.find_idempotency(&key).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_transitions_have_one_winner() {
    let store = Arc::new(store().await);
    let order_ref = attached(&store).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        let order_ref = order_ref.clone();
        handles.push(tokio::spawn(async move {
            store
                .transition(
                    &order_ref,
                    &[OrderStatus::GatewayAttached, OrderStatus::GatewayVerified],
                    OrderStatus::GatewayCaptured,
                    capture(&format!("pay_PGC{i}")),
                )
                .await
        }));
    }

    let mut won = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => won += 1,
            Err(e) => assert!(e.is_invalid_transition(), "got {e:?}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(store.payments_for(&order_ref).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore]
async fn stale_orders_are_listed_oldest_first() {
    let store = store().await;
    let a = attached(&store).await;
    let b = attached(&store).await;

    let listed = store
        .orders_in_status(OrderStatus::GatewayAttached, chrono::Utc::now(), 1000)
        .await
        .unwrap();
    let pos_a = listed.iter().position(|o| o.order_ref == a).unwrap();
    let pos_b = listed.iter().position(|o| o.order_ref == b).unwrap();
    assert!(pos_a < pos_b);
}
