use {
    super::error::PipelineError,
    super::id::{GatewayOrderRef, OrderRef},
    super::ledger::LedgerKind,
    super::money::MinorUnits,
    super::payment::NewPayment,
    super::settlement::SettlementStatus,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    GatewayAttached,
    GatewayVerified,
    GatewayCaptured,
    SettlementTriggered,
    Paid,
    SettlementPending,
    SettlementFailed,
    GatewayFailed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        Self::Created,
        Self::GatewayAttached,
        Self::GatewayVerified,
        Self::GatewayCaptured,
        Self::SettlementTriggered,
        Self::Paid,
        Self::SettlementPending,
        Self::SettlementFailed,
        Self::GatewayFailed,
    ];

    /// States a gateway failure may still interrupt.
    pub const PRE_CAPTURE: [OrderStatus; 3] =
        [Self::Created, Self::GatewayAttached, Self::GatewayVerified];

    /// States a settlement callback may move an order out of.
    pub const SETTLEMENT_OPEN: [OrderStatus; 2] =
        [Self::SettlementTriggered, Self::SettlementPending];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::GatewayAttached => "GATEWAY_ATTACHED",
            Self::GatewayVerified => "GATEWAY_VERIFIED",
            Self::GatewayCaptured => "GATEWAY_CAPTURED",
            Self::SettlementTriggered => "SETTLEMENT_TRIGGERED",
            Self::Paid => "PAID",
            Self::SettlementPending => "SETTLEMENT_PENDING",
            Self::SettlementFailed => "SETTLEMENT_FAILED",
            Self::GatewayFailed => "GATEWAY_FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Paid | Self::SettlementFailed | Self::GatewayFailed
        )
    }

    /// The transition table. Nothing outside it is ever written.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, GatewayAttached)
                | (Created, GatewayFailed)
                | (GatewayAttached, GatewayVerified)
                | (GatewayAttached, GatewayCaptured)
                | (GatewayAttached, GatewayFailed)
                | (GatewayVerified, GatewayCaptured)
                | (GatewayVerified, GatewayFailed)
                | (GatewayCaptured, SettlementTriggered)
                | (SettlementTriggered, Paid)
                | (SettlementTriggered, SettlementPending)
                | (SettlementTriggered, SettlementFailed)
                | (SettlementPending, Paid)
                | (SettlementPending, SettlementFailed)
        )
    }

    /// Narrow a caller's allowed "from" set to the sources the table permits.
    pub fn legal_sources(from: &[OrderStatus], to: OrderStatus) -> Vec<OrderStatus> {
        from.iter()
            .copied()
            .filter(|s| s.can_transition_to(to))
            .collect()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PipelineError::Validation(format!("unknown order status: {s}")))
    }
}

impl From<SettlementStatus> for OrderStatus {
    fn from(status: SettlementStatus) -> Self {
        match status {
            SettlementStatus::Success => Self::Paid,
            SettlementStatus::Pending => Self::SettlementPending,
            SettlementStatus::Failed => Self::SettlementFailed,
        }
    }
}

/// Full order record (for reads).
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub order_ref: OrderRef,
    pub customer_ref: String,
    pub amount: MinorUnits,
    pub bill_category: String,
    pub status: OrderStatus,
    pub gateway_order_ref: Option<GatewayOrderRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Intake request. The intake side guarantees `order_ref` uniqueness.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_ref: OrderRef,
    pub customer_ref: String,
    pub amount: MinorUnits,
    pub bill_category: String,
}

impl NewOrder {
    pub fn new(
        order_ref: OrderRef,
        customer_ref: impl Into<String>,
        amount: MinorUnits,
        bill_category: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let customer_ref = customer_ref.into();
        if customer_ref.trim().is_empty() {
            return Err(PipelineError::Validation("customer_ref must not be empty".into()));
        }
        let bill_category = bill_category.into();
        if bill_category.trim().is_empty() {
            return Err(PipelineError::Validation("bill_category must not be empty".into()));
        }
        Ok(Self {
            order_ref,
            customer_ref,
            amount,
            bill_category,
        })
    }
}

/// What a transition carries with it. Written in the same transaction as the
/// status change.
#[derive(Debug, Clone)]
pub enum Evidence {
    /// Gateway order created and attached to our order.
    GatewayOrder(GatewayOrderRef),
    /// A verified gateway payment (authorization, capture or failure).
    Payment(NewPayment),
    /// Settlement handed to the aggregator under this idempotency key.
    SettlementStarted { idempotency_key: String },
    /// Outcome of our own aggregator call.
    SettlementResult {
        status: SettlementStatus,
        aggregator_txn_id: Option<String>,
    },
    /// Status reported by the aggregator's callback channel.
    SettlementCallback {
        reported: String,
        aggregator_txn_id: Option<String>,
    },
    /// Status recovered by the reconciler.
    Reconciled { status: SettlementStatus },
}

impl Evidence {
    pub fn ledger_kind(&self, to: OrderStatus) -> LedgerKind {
        match self {
            Self::GatewayOrder(_) => LedgerKind::GatewayOrderAttached,
            Self::Payment(_) => match to {
                OrderStatus::GatewayVerified => LedgerKind::GatewayVerified,
                OrderStatus::GatewayFailed => LedgerKind::GatewayFailed,
                _ => LedgerKind::GatewayCaptured,
            },
            Self::SettlementStarted { .. } => LedgerKind::SettlementTriggered,
            Self::SettlementResult { .. } => LedgerKind::SettlementResolved,
            Self::SettlementCallback { .. } => LedgerKind::SettlementCallback,
            Self::Reconciled { .. } => LedgerKind::SettlementReconciled,
        }
    }

    pub fn ledger_message(&self, to: OrderStatus) -> String {
        match self {
            Self::GatewayOrder(gateway_ref) => format!("-> {to} gateway_order={gateway_ref}"),
            Self::Payment(p) => format!(
                "-> {to} payment={} status={}",
                p.payment_ref,
                p.status.as_str()
            ),
            Self::SettlementStarted { idempotency_key } => {
                format!("-> {to} key={idempotency_key}")
            }
            Self::SettlementResult {
                status,
                aggregator_txn_id,
            } => format!(
                "-> {to} settlement={} txn={}",
                status.as_str(),
                aggregator_txn_id.as_deref().unwrap_or("-")
            ),
            Self::SettlementCallback {
                reported,
                aggregator_txn_id,
            } => format!(
                "-> {to} reported={reported} txn={}",
                aggregator_txn_id.as_deref().unwrap_or("-")
            ),
            Self::Reconciled { status } => format!("-> {to} reconciled={}", status.as_str()),
        }
    }

    /// The gateway order reference to stamp on the order row, if any.
    pub fn gateway_order_ref(&self) -> Option<&GatewayOrderRef> {
        match self {
            Self::GatewayOrder(r) => Some(r),
            _ => None,
        }
    }

    pub fn payment(&self) -> Option<&NewPayment> {
        match self {
            Self::Payment(p) => Some(p),
            _ => None,
        }
    }
}
