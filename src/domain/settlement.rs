use {
    super::error::PipelineError,
    super::id::OrderRef,
    super::money::MinorUnits,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Success,
    Pending,
    Failed,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Pending => "PENDING",
            Self::Failed => "FAILED",
        }
    }

    /// 202 means accepted-but-undecided; any other 2xx settled; everything else failed.
    pub fn from_http_status(code: u16) -> Self {
        match code {
            202 => Self::Pending,
            200..=299 => Self::Success,
            _ => Self::Failed,
        }
    }

    /// Callback vocabulary: SUCCESS and FAILED are definitive, anything else is pending.
    pub fn from_reported(reported: &str) -> Self {
        match reported.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SettlementStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "SUCCESS" => Ok(Self::Success),
            "PENDING" => Ok(Self::Pending),
            "FAILED" => Ok(Self::Failed),
            other => Err(PipelineError::Validation(format!(
                "unknown settlement status: {other}"
            ))),
        }
    }
}

/// What the settlement trigger reports back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// One aggregator call was made and classified.
    Completed {
        status: SettlementStatus,
        aggregator_txn_id: Option<String>,
        raw_payload: serde_json::Value,
    },
    /// The idempotency key was already taken; no call was made.
    AlreadyTriggered,
}

impl SettlementOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { status, .. } => status.as_str(),
            Self::AlreadyTriggered => "ALREADY_TRIGGERED",
        }
    }
}

/// Body sent to the aggregator. Field names follow its wire contract.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementRequest {
    pub aggregator_id: String,
    pub biller_code: String,
    pub customer_ref: String,
    pub amount: String,
    pub correlation_id: String,
    pub order_ref: OrderRef,
    pub hash: String,
}

/// Raw, unclassified aggregator reply. Transport failures are folded in here,
/// never returned as errors.
#[derive(Debug, Clone)]
pub struct AggregatorReply {
    pub http_status: Option<u16>,
    pub body: serde_json::Value,
    pub transport_error: Option<String>,
}

impl AggregatorReply {
    pub fn transport_failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            http_status: None,
            body: serde_json::json!({ "error": error }),
            transport_error: Some(error),
        }
    }

    pub fn aggregator_txn_id(&self) -> Option<String> {
        self.body
            .get("bbps_txn_id")
            .or_else(|| self.body.get("aggregator_txn_id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// A top-level body field as text; numbers are rendered as sent.
    pub fn field(&self, name: &str) -> Option<String> {
        match self.body.get(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Check the reply's `hash` against the reverse canonical string built
    /// from the reply's own fields. `None` when the reply carries no hash.
    pub fn verify_hash(&self, fallback_status: &str, salt: &str) -> Option<bool> {
        let claimed = self.body.get("hash").and_then(|v| v.as_str())?;
        let status = self
            .field("status")
            .unwrap_or_else(|| fallback_status.to_string());
        let values: Vec<String> = CANONICAL_FIELDS
            .iter()
            .map(|name| self.field(name).unwrap_or_default())
            .collect();
        let fields: Vec<&str> = values.iter().map(String::as_str).collect();
        Some(crate::signature::verify_response(
            &status, &fields, salt, claimed,
        ))
    }
}

/// Settlement attempt row as stored.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementAttempt {
    pub id: Uuid,
    pub order_id: Uuid,
    pub aggregator_txn_id: Option<String>,
    pub correlation_id: String,
    pub status: SettlementStatus,
    pub raw_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSettlementAttempt {
    pub id: Uuid,
    pub order_ref: OrderRef,
    pub aggregator_txn_id: Option<String>,
    pub correlation_id: String,
    pub status: SettlementStatus,
    pub raw_payload: serde_json::Value,
}

impl NewSettlementAttempt {
    pub fn new(
        order_ref: OrderRef,
        correlation_id: impl Into<String>,
        status: SettlementStatus,
        aggregator_txn_id: Option<String>,
        raw_payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_ref,
            aggregator_txn_id,
            correlation_id: correlation_id.into(),
            status,
            raw_payload,
        }
    }
}

/// Names of the hashed fields, in canonical order, on both request and reply.
pub const CANONICAL_FIELDS: [&str; 6] = [
    "aggregator_id",
    "biller_code",
    "customer_ref",
    "amount",
    "correlation_id",
    "order_ref",
];

impl SettlementRequest {
    /// Hashed fields in their fixed order.
    pub fn canonical_fields(&self) -> [&str; 6] {
        [
            &self.aggregator_id,
            &self.biller_code,
            &self.customer_ref,
            &self.amount,
            &self.correlation_id,
            self.order_ref.as_str(),
        ]
    }

    /// Build a signed request. `amount` goes out in major units.
    pub fn signed(
        aggregator_id: &str,
        biller_code: &str,
        customer_ref: &str,
        amount: MinorUnits,
        correlation_id: &str,
        order_ref: &OrderRef,
        salt: &str,
    ) -> Self {
        let mut request = Self {
            aggregator_id: aggregator_id.to_string(),
            biller_code: biller_code.to_string(),
            customer_ref: customer_ref.to_string(),
            amount: amount.to_major_string(),
            correlation_id: correlation_id.to_string(),
            order_ref: order_ref.clone(),
            hash: String::new(),
        };
        request.hash = crate::signature::request_hash(&request.canonical_fields(), salt);
        request
    }

    /// A reply that echoes `order_ref` or `amount` must echo ours.
    pub fn matches_reply(&self, reply: &AggregatorReply) -> bool {
        let echoed = |name: &str| reply.field(name).filter(|v| !v.is_empty());
        echoed("order_ref").is_none_or(|v| v == self.order_ref.as_str())
            && echoed("amount").is_none_or(|v| v == self.amount)
    }
}
