use {
    crate::{
        AppState,
        adapters::spawn_settlement,
        domain::{
            error::PipelineError,
            id::OrderRef,
            money::MinorUnits,
            order::NewOrder,
            payu::{Payer, PayuCheckout, PayuResponse},
        },
        services::pipeline::GatewayIngest,
        transport::http::errors::ApiError,
    },
    axum::{
        Form, Json,
        extract::State,
        response::Redirect,
    },
    serde::Deserialize,
};

const DEFAULT_BILL_CATEGORY: &str = "MAINTENANCE";

#[derive(Debug, Deserialize)]
pub struct GeneratePaymentRequest {
    pub order_ref: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(alias = "consumer_id")]
    pub customer_ref: String,
    #[serde(alias = "amount_paise")]
    pub amount_minor: i64,
    #[serde(alias = "bill_type")]
    pub bill_category: Option<String>,
}

/// Mobile intake for the hosted-checkout rail: creates the order and returns
/// the signed form the client posts to the rail.
pub async fn generate_payment_handler(
    State(state): State<AppState>,
    Json(req): Json<GeneratePaymentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(payu) = &state.payu else {
        return Err(PipelineError::Validation("payu rail is not configured".into()).into());
    };
    let payer = Payer::new(req.name, req.email, req.phone)?;
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

    let order = state.pipeline.create_payu_order(new).await?;
    let checkout = PayuCheckout::signed(
        &payu.merchant_key,
        &order,
        &payer,
        &payu.success_url,
        &payu.failure_url,
        &payu.salt,
    );
    Ok(Json(serde_json::json!({
        "ok": true,
        "gateway": "payu",
        "payu": checkout,
        "action": payu.action_url,
        "order_ref": order.order_ref,
    })))
}

/// Mobile client forwarding the rail's signed result as JSON.
#[tracing::instrument(
    name = "payu_verify",
    skip_all,
    fields(event = tracing::field::Empty, order_ref = tracing::field::Empty)
)]
pub async fn payu_verify_handler(
    State(state): State<AppState>,
    Json(response): Json<PayuResponse>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ingest = ingest(&state, &response).await?;
    let current = match &ingest {
        GatewayIngest::Applied(order) => Some(order.status),
        GatewayIngest::Duplicate { current, .. } => Some(*current),
        _ => None,
    };
    Ok(Json(serde_json::json!({
        "ok": true,
        "status": ingest.label(),
        "order_ref": response.txnid,
        "current": current,
    })))
}

/// The rail's browser return (both success and failure URLs). The signed
/// `status` decides the outcome, not which URL was hit. The payer lands on
/// the order's status view.
#[tracing::instrument(
    name = "payu_return",
    skip_all,
    fields(event = tracing::field::Empty, order_ref = tracing::field::Empty)
)]
pub async fn payu_return_handler(
    State(state): State<AppState>,
    Form(response): Form<PayuResponse>,
) -> Result<Redirect, ApiError> {
    ingest(&state, &response).await?;
    Ok(Redirect::to(&format!("/orders/{}", response.txnid)))
}

async fn ingest(state: &AppState, response: &PayuResponse) -> Result<GatewayIngest, ApiError> {
    let ingest = tokio::time::timeout(
        state.webhooks.verify_timeout,
        state.pipeline.apply_payu_response(response),
    )
    .await
    .map_err(|_| PipelineError::Timeout("payu result"))??;

    spawn_settlement(state, &ingest);
    tracing::info!(status = ingest.label(), "payu result handled");
    Ok(ingest)
}
