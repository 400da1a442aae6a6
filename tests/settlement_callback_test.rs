mod common;

use billpay_recon::domain::error::PipelineError;
use billpay_recon::domain::id::OrderRef;
use billpay_recon::domain::order::{Order, OrderStatus};
use billpay_recon::services::pipeline::CallbackResult;
use billpay_recon::signature;
use common::*;

/// Drive a fresh order through capture and settlement with the harness aggregator.
async fn settled_order(h: &Harness) -> Order {
    let order = h.attached_order(24900).await;
    let body = captured_event(&gateway_ref(&order), "pay_CB1", 24900);
    h.pipeline
        .ingest_gateway_webhook(&body, Some(&sign(&body)))
        .await
        .unwrap();
    h.pipeline.settle(&order.order_ref).await.unwrap();
    h.order(&order.order_ref).await
}

fn count(kinds: &[String], kind: &str) -> usize {
    kinds.iter().filter(|k| *k == kind).count()
}

#[tokio::test]
async fn pending_order_moves_to_paid_and_repeat_is_noop() {
    let h = Harness::new(FakeAggregator::replying(202));
    let order = settled_order(&h).await;
    assert_eq!(order.status, OrderStatus::SettlementPending);

    let body = callback_body(&order.order_ref, "SUCCESS");
    match h.pipeline.apply_settlement_callback(&body, None).await.unwrap() {
        CallbackResult::Applied(o) => assert_eq!(o.status, OrderStatus::Paid),
        other => panic!("expected Applied, got {other:?}"),
    }

    let again = h.pipeline.apply_settlement_callback(&body, None).await.unwrap();
    match &again {
        CallbackResult::Unchanged { current } => assert_eq!(*current, OrderStatus::Paid),
        other => panic!("expected Unchanged, got {other:?}"),
    }
    assert_eq!(again.label(), "noop");
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::Paid);

    let kinds = h.ledger_kinds(&order.order_ref).await;
    assert_eq!(count(&kinds, "SETTLEMENT_CALLBACK"), 2);
}

#[tokio::test]
async fn failed_report_moves_pending_order_to_failed() {
    let h = Harness::new(FakeAggregator::replying(202));
    let order = settled_order(&h).await;

    let body = callback_body(&order.order_ref, "failed");
    h.pipeline.apply_settlement_callback(&body, None).await.unwrap();
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::SettlementFailed);
}

#[tokio::test]
async fn unknown_vocabulary_reads_as_pending() {
    let h = Harness::new(FakeAggregator::replying(202));
    let order = settled_order(&h).await;

    let body = callback_body(&order.order_ref, "PROCESSING");
    match h.pipeline.apply_settlement_callback(&body, None).await.unwrap() {
        CallbackResult::Unchanged { current } => {
            assert_eq!(current, OrderStatus::SettlementPending)
        }
        other => panic!("expected Unchanged, got {other:?}"),
    }
}

#[tokio::test]
async fn report_contradicting_terminal_status_is_rejected() {
    let h = Harness::new(FakeAggregator::replying(201));
    let order = settled_order(&h).await;
    assert_eq!(order.status, OrderStatus::Paid);

    let body = callback_body(&order.order_ref, "FAILED");
    match h.pipeline.apply_settlement_callback(&body, None).await.unwrap() {
        CallbackResult::Rejected { current } => assert_eq!(current, OrderStatus::Paid),
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::Paid);

    let kinds = h.ledger_kinds(&order.order_ref).await;
    assert_eq!(count(&kinds, "TRANSITION_REJECTED"), 1);
}

#[tokio::test]
async fn callback_before_settlement_started_is_rejected() {
    let h = Harness::new(FakeAggregator::replying(201));
    let order = h.attached_order(24900).await;

    let body = callback_body(&order.order_ref, "SUCCESS");
    let result = h.pipeline.apply_settlement_callback(&body, None).await.unwrap();
    assert_eq!(result.label(), "rejected");
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::GatewayAttached);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let h = Harness::new(FakeAggregator::replying(201));
    let body = callback_body(&OrderRef::new("nobody-ordered-this").unwrap(), "SUCCESS");

    let err = h.pipeline.apply_settlement_callback(&body, None).await.unwrap_err();
    assert!(matches!(err, PipelineError::OrderNotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn malformed_callback_is_a_validation_error() {
    let h = Harness::new(FakeAggregator::replying(201));

    let err = h
        .pipeline
        .apply_settlement_callback(br#"{"status":"SUCCESS"}"#, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn order_uuid_alias_is_accepted() {
    let h = Harness::new(FakeAggregator::replying(202));
    let order = settled_order(&h).await;

    let body = serde_json::to_vec(&serde_json::json!({
        "order_uuid": order.order_ref.as_str(),
        "status": "SUCCESS",
    }))
    .unwrap();
    h.pipeline.apply_settlement_callback(&body, None).await.unwrap();
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::Paid);
}

// ── signed channel ─────────────────────────────────────────────────────────

#[tokio::test]
async fn signed_channel_fails_closed() {
    let h = Harness::with_signed_callbacks(FakeAggregator::replying(202));
    let order = settled_order(&h).await;
    let body = callback_body(&order.order_ref, "SUCCESS");

    let err = h.pipeline.apply_settlement_callback(&body, None).await.unwrap_err();
    assert!(matches!(err, PipelineError::SignatureMismatch(_)), "got {err:?}");

    let forged = signature::sign(&body, WEBHOOK_SECRET);
    let err = h
        .pipeline
        .apply_settlement_callback(&body, Some(&forged))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::SignatureMismatch(_)), "got {err:?}");
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::SettlementPending);

    let sig = signature::sign(&body, SETTLEMENT_SECRET);
    h.pipeline
        .apply_settlement_callback(&body, Some(&sig))
        .await
        .unwrap();
    assert_eq!(h.order(&order.order_ref).await.status, OrderStatus::Paid);
}
