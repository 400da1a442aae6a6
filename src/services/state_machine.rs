use {
    crate::domain::{
        error::PipelineError,
        id::OrderRef,
        order::{Evidence, Order, OrderStatus},
        ports::OrderStore,
    },
    std::sync::Arc,
};

/// Outcome of a guarded transition.
#[derive(Debug, Clone)]
pub enum Transitioned {
    Applied(Order),
    /// The order had already moved on (duplicate delivery or a lost race).
    Rejected { current: OrderStatus },
}

/// Sole writer of `orders.status`.
#[derive(Clone)]
pub struct OrderStateMachine {
    store: Arc<dyn OrderStore>,
}

impl OrderStateMachine {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Move `order_ref` to `to` if it currently sits in one of `from`.
    /// `InvalidTransition` is folded into `Rejected`; every other error propagates.
    pub async fn transition(
        &self,
        order_ref: &OrderRef,
        from: &[OrderStatus],
        to: OrderStatus,
        evidence: Evidence,
    ) -> Result<Transitioned, PipelineError> {
        match self.store.transition(order_ref, from, to, evidence).await {
            Ok(order) => {
                tracing::info!(order_ref = %order_ref, status = %to, "order transitioned");
                Ok(Transitioned::Applied(order))
            }
            Err(PipelineError::InvalidTransition { current, .. }) => {
                tracing::info!(
                    order_ref = %order_ref,
                    %current,
                    attempted = %to,
                    "transition rejected, order already advanced"
                );
                Ok(Transitioned::Rejected { current })
            }
            Err(e) => Err(e),
        }
    }
}
