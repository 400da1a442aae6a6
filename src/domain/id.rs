use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::PipelineError;

fn validate(kind: &str, id: &str, max_len: usize) -> Result<(), PipelineError> {
    if id.is_empty() {
        return Err(PipelineError::Validation(format!("{kind} must not be empty")));
    }
    if id.len() > max_len {
        return Err(PipelineError::Validation(format!(
            "{kind} longer than {max_len} chars: {id}"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(PipelineError::Validation(format!(
            "{kind} contains illegal characters: {id}"
        )));
    }
    Ok(())
}

/// Our external-facing order identifier. Immutable and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderRef(String);

impl OrderRef {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        validate("OrderRef", &id, 64)?;
        Ok(Self(id))
    }

    /// Fresh identifier for intake requests that do not bring their own.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic settlement idempotency key for this order.
    pub fn settlement_key(&self) -> String {
        format!("settlement-{}", self.0)
    }
}

impl TryFrom<String> for OrderRef {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OrderRef> for String {
    fn from(value: OrderRef) -> Self {
        value.0
    }
}

/// Gateway-side order identifier (`order_xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GatewayOrderRef(String);

impl GatewayOrderRef {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        validate("GatewayOrderRef", &id, 100)?;
        if !id.starts_with("order_") {
            return Err(PipelineError::Validation(format!(
                "GatewayOrderRef must start with order_, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GatewayOrderRef {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GatewayOrderRef> for String {
    fn from(value: GatewayOrderRef) -> Self {
        value.0
    }
}

/// Gateway payment identifier (`pay_xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GatewayPaymentRef(String);

impl GatewayPaymentRef {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        validate("GatewayPaymentRef", &id, 100)?;
        if !id.starts_with("pay_") {
            return Err(PipelineError::Validation(format!(
                "GatewayPaymentRef must start with pay_, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GatewayPaymentRef {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GatewayPaymentRef> for String {
    fn from(value: GatewayPaymentRef) -> Self {
        value.0
    }
}
