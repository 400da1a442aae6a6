pub mod aggregator;
pub mod orders;
pub mod payu;
pub mod razorpay;

use {
    crate::{AppState, domain::id::OrderRef, services::pipeline::GatewayIngest},
    tracing::Instrument,
};

/// Settlement runs off the request path with its own budget. If the budget
/// runs out the order stays at SETTLEMENT_TRIGGERED for the reconciler.
pub(crate) fn spawn_settlement(state: &AppState, ingest: &GatewayIngest) {
    let Some(order_ref) = ingest.settlement_candidate() else {
        return;
    };
    let order_ref: OrderRef = order_ref.clone();
    let pipeline = state.pipeline.clone();
    let budget = state.webhooks.settlement_budget;
    let span = tracing::info_span!("settlement_task", order_ref = %order_ref);

    tokio::spawn(
        async move {
            match tokio::time::timeout(budget, pipeline.settle(&order_ref)).await {
                Ok(Ok(result)) => tracing::info!(status = result.label(), "settlement finished"),
                Ok(Err(e)) => tracing::error!(error = %e, "settlement failed"),
                Err(_) => tracing::warn!("settlement budget exceeded, left for reconciler"),
            }
        }
        .instrument(span),
    );
}
