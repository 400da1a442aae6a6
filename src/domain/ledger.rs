use {
    super::id::OrderRef,
    chrono::{DateTime, Utc},
    serde::Serialize,
    std::fmt,
};

/// Enumerated ledger event names. Audit only; never read back for decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerKind {
    OrderCreated,
    GatewayOrderAttached,
    GatewayVerified,
    GatewayCaptured,
    GatewayFailed,
    SettlementTriggered,
    SettlementIdempotentHit,
    SettlementAttemptRecorded,
    SettlementResolved,
    SettlementCallback,
    SettlementReconciled,
    TransitionRejected,
    IdempotencyKeyCleared,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "ORDER_CREATED",
            Self::GatewayOrderAttached => "GATEWAY_ORDER_ATTACHED",
            Self::GatewayVerified => "GATEWAY_VERIFIED",
            Self::GatewayCaptured => "GATEWAY_CAPTURED",
            Self::GatewayFailed => "GATEWAY_FAILED",
            Self::SettlementTriggered => "SETTLEMENT_TRIGGERED",
            Self::SettlementIdempotentHit => "SETTLEMENT_IDEMPOTENT_HIT",
            Self::SettlementAttemptRecorded => "SETTLEMENT_ATTEMPT_RECORDED",
            Self::SettlementResolved => "SETTLEMENT_RESOLVED",
            Self::SettlementCallback => "SETTLEMENT_CALLBACK",
            Self::SettlementReconciled => "SETTLEMENT_RECONCILED",
            Self::TransitionRejected => "TRANSITION_REJECTED",
            Self::IdempotencyKeyCleared => "IDEMPOTENCY_KEY_CLEARED",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub order_ref: Option<OrderRef>,
    pub kind: LedgerKind,
    pub message: String,
}

impl NewLedgerEntry {
    pub fn new(order_ref: Option<&OrderRef>, kind: LedgerKind, message: impl Into<String>) -> Self {
        Self {
            order_ref: order_ref.cloned(),
            kind,
            message: message.into(),
        }
    }
}

/// Stored entry. `seq` is the insertion order.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub seq: i64,
    pub order_ref: Option<String>,
    pub kind: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
