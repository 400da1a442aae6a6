use {
    crate::{
        AppState,
        domain::{
            error::PipelineError,
            id::OrderRef,
            money::MinorUnits,
            order::NewOrder,
        },
        services::pipeline::{OrderView, SettleResult},
        signature,
        transport::http::errors::ApiError,
    },
    axum::{
        Json,
        extract::{Path, State},
        http::{HeaderMap, header::AUTHORIZATION},
    },
    serde::Deserialize,
};

const DEFAULT_BILL_CATEGORY: &str = "ELECTRICITY";

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub order_ref: Option<String>,
    pub customer_ref: String,
    pub amount_minor: i64,
    pub bill_category: Option<String>,
}

pub async fn create_order_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let order_ref = match req.order_ref {
        Some(raw) => OrderRef::new(raw)?,
        None => OrderRef::generate(),
    };
    let new = NewOrder::new(
        order_ref,
        req.customer_ref,
        MinorUnits::new(req.amount_minor)?,
        req.bill_category
            .unwrap_or_else(|| DEFAULT_BILL_CATEGORY.to_string()),
    )?;

    let order = state.pipeline.create_order(new).await?;
    Ok(Json(serde_json::json!({
        "order_ref": order.order_ref,
        "amount_minor": order.amount,
        "gateway_order_ref": order.gateway_order_ref,
        "gateway_key_id": state.pipeline.gateway_key_id(),
        "status": order.status,
    })))
}

pub async fn order_status_handler(
    State(state): State<AppState>,
    Path(order_ref): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order_ref =
        OrderRef::new(order_ref).map_err(|_| PipelineError::OrderNotFound("invalid ref".into()))?;
    Ok(Json(state.pipeline.order_view(&order_ref).await?))
}

/// Operator replay for an order stuck at SETTLEMENT_TRIGGERED. Requires
/// `Authorization: Bearer <ADMIN_API_TOKEN>`; refused outright when no token
/// is configured.
#[tracing::instrument(
    name = "replay_settlement_route",
    skip_all,
    fields(order_ref = tracing::field::Empty)
)]
pub async fn replay_settlement_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_ref): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let expected = state
        .admin_token
        .as_deref()
        .ok_or(PipelineError::Unauthorized("operator routes are disabled"))?;
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(PipelineError::Unauthorized("missing bearer token"))?;
    if !signature::tokens_match(presented, expected) {
        return Err(PipelineError::Unauthorized("bad bearer token").into());
    }

    tracing::Span::current().record("order_ref", order_ref.as_str());
    let order_ref =
        OrderRef::new(order_ref).map_err(|_| PipelineError::OrderNotFound("invalid ref".into()))?;
    let result = state.pipeline.replay_settlement(&order_ref).await?;
    let current = match &result {
        SettleResult::Settled(order) => Some(order.status),
        SettleResult::NotOwner { current } | SettleResult::Superseded { current } => Some(*current),
        SettleResult::AlreadyTriggered => None,
    };
    tracing::info!(status = result.label(), "settlement replay handled");
    Ok(Json(serde_json::json!({
        "ok": true,
        "status": result.label(),
        "current": current,
    })))
}
