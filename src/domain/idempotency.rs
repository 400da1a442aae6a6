use {
    super::error::PipelineError,
    super::settlement::SettlementStatus,
    chrono::{DateTime, Utc},
    serde::Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyState {
    /// Acquired; the guarded call may still be running.
    InFlight,
    /// The guarded call finished and its outcome was recorded.
    Consumed,
}

impl KeyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InFlight => "IN_FLIGHT",
            Self::Consumed => "CONSUMED",
        }
    }
}

impl TryFrom<&str> for KeyState {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "IN_FLIGHT" => Ok(Self::InFlight),
            "CONSUMED" => Ok(Self::Consumed),
            other => Err(PipelineError::Validation(format!(
                "unknown idempotency state: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub state: KeyState,
    pub outcome: Option<SettlementStatus>,
    pub acquired_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub enum Acquire {
    /// Key was unused and is now held by the caller.
    Fresh,
    /// Key already taken (possibly still in flight). Skip the guarded action.
    AlreadyConsumed(IdempotencyRecord),
}
