use {
    super::error::PipelineError,
    super::id::GatewayPaymentRef,
    super::money::MinorUnits,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentRecordStatus {
    Authorized,
    Captured,
    Failed,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorized => "AUTHORIZED",
            Self::Captured => "CAPTURED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PaymentRecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentRecordStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "AUTHORIZED" => Ok(Self::Authorized),
            "CAPTURED" => Ok(Self::Captured),
            "FAILED" => Ok(Self::Failed),
            other => Err(PipelineError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Payment row as stored. Immutable after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub payment_ref: String,
    pub method: Option<String>,
    pub status: PaymentRecordStatus,
    pub amount: Option<i64>,
    pub raw_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Payment evidence to insert; id generated via Uuid::now_v7().
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub payment_ref: GatewayPaymentRef,
    pub method: Option<String>,
    pub status: PaymentRecordStatus,
    pub amount: Option<MinorUnits>,
    pub raw_payload: serde_json::Value,
}

impl NewPayment {
    pub fn new(
        payment_ref: GatewayPaymentRef,
        method: Option<String>,
        status: PaymentRecordStatus,
        amount: Option<MinorUnits>,
        raw_payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            payment_ref,
            method,
            status,
            amount,
            raw_payload,
        }
    }
}
