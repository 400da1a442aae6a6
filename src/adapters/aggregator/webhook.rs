use {
    crate::{AppState, domain::error::PipelineError, transport::http::errors::ApiError},
    axum::{Json, body::Bytes, extract::State, http::HeaderMap},
};

pub const SIGNATURE_HEADER: &str = "X-Settlement-Signature";

#[tracing::instrument(
    name = "settlement_webhook",
    skip_all,
    fields(order_ref = tracing::field::Empty)
)]
pub async fn settlement_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let result = tokio::time::timeout(
        state.webhooks.verify_timeout,
        state.pipeline.apply_settlement_callback(&body, signature),
    )
    .await
    .map_err(|_| PipelineError::Timeout("settlement webhook"))??;

    tracing::info!(status = result.label(), "settlement callback handled");
    Ok(Json(serde_json::json!({"ok": true, "status": result.label()})))
}
