use {
    crate::{
        AppState,
        adapters::spawn_settlement,
        domain::{error::PipelineError, event::CheckoutConfirmation},
        transport::http::errors::ApiError,
    },
    axum::{Json, body::Bytes, extract::State, http::HeaderMap},
};

pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

#[tracing::instrument(
    name = "gateway_webhook",
    skip_all,
    fields(event = tracing::field::Empty, order_ref = tracing::field::Empty)
)]
pub async fn gateway_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let ingest = tokio::time::timeout(
        state.webhooks.verify_timeout,
        state.pipeline.ingest_gateway_webhook(&body, signature),
    )
    .await
    .map_err(|_| PipelineError::Timeout("gateway webhook"))??;

    spawn_settlement(&state, &ingest);
    tracing::info!(status = ingest.label(), "gateway webhook handled");
    Ok(Json(serde_json::json!({"ok": true, "status": ingest.label()})))
}

/// Payer's client confirming checkout without waiting for the webhook.
#[tracing::instrument(
    name = "checkout_verify",
    skip_all,
    fields(order_ref = tracing::field::Empty)
)]
pub async fn checkout_verify_handler(
    State(state): State<AppState>,
    Json(confirmation): Json<CheckoutConfirmation>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ingest = tokio::time::timeout(
        state.webhooks.verify_timeout,
        state.pipeline.confirm_checkout(&confirmation),
    )
    .await
    .map_err(|_| PipelineError::Timeout("checkout verification"))??;

    spawn_settlement(&state, &ingest);
    let order_ref = ingest.order_ref().map(|r| r.to_string());
    Ok(Json(serde_json::json!({
        "ok": true,
        "verified": true,
        "status": ingest.label(),
        "order_ref": order_ref,
    })))
}
