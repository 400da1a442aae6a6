//! Inbound payloads, validated at the boundary before any field is trusted.

use {
    super::error::PipelineError,
    super::id::{GatewayOrderRef, GatewayPaymentRef},
    super::money::MinorUnits,
    super::payment::PaymentRecordStatus,
    serde::Deserialize,
};

/// Gateway webhook envelope, keyed on `event`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
pub enum GatewayEvent {
    #[serde(rename = "payment.authorized")]
    PaymentAuthorized { payload: PaymentPayload },

    #[serde(rename = "payment.captured")]
    PaymentCaptured { payload: PaymentPayload },

    #[serde(rename = "payment.failed")]
    PaymentFailed { payload: PaymentPayload },

    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
pub struct PaymentPayload {
    pub payment: PaymentWrapper,
}

#[derive(Debug, Deserialize)]
pub struct PaymentWrapper {
    pub entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: Option<i64>,
    pub method: Option<String>,
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PaymentAuthorized { .. } => "payment.authorized",
            Self::PaymentCaptured { .. } => "payment.captured",
            Self::PaymentFailed { .. } => "payment.failed",
            Self::Unsupported => "unsupported",
        }
    }

    /// Normalize into the fields the pipeline acts on. `None` for unsupported events.
    pub fn into_gateway_payment(self) -> Result<Option<GatewayPayment>, PipelineError> {
        let (payload, status) = match self {
            Self::PaymentAuthorized { payload } => (payload, PaymentRecordStatus::Authorized),
            Self::PaymentCaptured { payload } => (payload, PaymentRecordStatus::Captured),
            Self::PaymentFailed { payload } => (payload, PaymentRecordStatus::Failed),
            Self::Unsupported => return Ok(None),
        };
        let entity = payload.payment.entity;
        let gateway_order_ref = entity
            .order_id
            .ok_or_else(|| PipelineError::Validation("payment entity has no order_id".into()))
            .and_then(GatewayOrderRef::new)?;
        Ok(Some(GatewayPayment {
            gateway_order_ref,
            payment_ref: GatewayPaymentRef::new(entity.id)?,
            amount: entity.amount.map(MinorUnits::new).transpose()?,
            method: entity.method,
            status,
        }))
    }
}

/// A verified gateway payment, independent of which channel delivered it.
#[derive(Debug, Clone)]
pub struct GatewayPayment {
    pub gateway_order_ref: GatewayOrderRef,
    pub payment_ref: GatewayPaymentRef,
    pub amount: Option<MinorUnits>,
    pub method: Option<String>,
    pub status: PaymentRecordStatus,
}

/// Synchronous checkout confirmation submitted by the payer's client.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfirmation {
    #[serde(alias = "razorpay_order_id")]
    pub gateway_order_ref: String,
    #[serde(alias = "razorpay_payment_id")]
    pub gateway_payment_ref: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

/// Settlement aggregator callback body. `order_ref` stays raw so a malformed
/// reference reads as an unknown order, as it does on every other route.
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementCallback {
    #[serde(alias = "orderExternalID", alias = "order_uuid")]
    pub order_ref: String,
    pub status: String,
    #[serde(default, alias = "bbps_txn_id")]
    pub aggregator_txn_id: Option<String>,
}
