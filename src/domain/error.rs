use {super::order::OrderStatus, thiserror::Error};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("invalid transition for {order_ref}: {current} -> {attempted}")]
    InvalidTransition {
        order_ref: String,
        current: OrderStatus,
        attempted: OrderStatus,
    },

    #[error("duplicate order: {0}")]
    DuplicateOrder(String),

    #[error("gateway: {0}")]
    Gateway(String),

    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("timed out: {0}")]
    Timeout(&'static str),
}

impl PipelineError {
    /// Duplicates and races land here; callers acknowledge instead of failing.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}
