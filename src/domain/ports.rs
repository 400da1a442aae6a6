//! Seams between the engine and the outside world: the shared store, the
//! settlement aggregator and the payment gateway.

use {
    super::error::PipelineError,
    super::id::{GatewayOrderRef, OrderRef},
    super::idempotency::{Acquire, IdempotencyRecord},
    super::ledger::{LedgerEntry, NewLedgerEntry},
    super::money::MinorUnits,
    super::order::{Evidence, NewOrder, Order, OrderStatus},
    super::payment::Payment,
    super::settlement::{
        AggregatorReply, NewSettlementAttempt, SettlementAttempt, SettlementRequest,
        SettlementStatus,
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::{future::Future, pin::Pin},
};

/// The only shared mutable resource. Every method is one atomic unit.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert the order and its `ORDER_CREATED` ledger entry.
    async fn create_order(&self, order: &NewOrder) -> Result<Order, PipelineError>;

    async fn find_order(&self, order_ref: &OrderRef) -> Result<Option<Order>, PipelineError>;

    async fn find_order_by_gateway_ref(
        &self,
        gateway_ref: &GatewayOrderRef,
    ) -> Result<Option<Order>, PipelineError>;

    /// Compare-and-swap `status` from any of `from` to `to`, writing the
    /// evidence and one ledger entry in the same transaction. Fails with
    /// `InvalidTransition` when the current status is not an allowed source.
    async fn transition(
        &self,
        order_ref: &OrderRef,
        from: &[OrderStatus],
        to: OrderStatus,
        evidence: Evidence,
    ) -> Result<Order, PipelineError>;

    async fn append_ledger(&self, entry: &NewLedgerEntry) -> Result<(), PipelineError>;

    /// Claim `key` as in-flight if nobody holds it yet.
    async fn try_acquire(&self, key: &str) -> Result<Acquire, PipelineError>;

    async fn find_idempotency(&self, key: &str)
    -> Result<Option<IdempotencyRecord>, PipelineError>;

    /// Persist the attempt, mark `key` consumed with its outcome and append
    /// the summary ledger entry, all in one commit.
    async fn record_settlement(
        &self,
        key: &str,
        attempt: &NewSettlementAttempt,
        ledger: &NewLedgerEntry,
    ) -> Result<(), PipelineError>;

    /// Manual replay: forget `key` so settlement may run again.
    async fn clear_idempotency(&self, key: &str, ledger: &NewLedgerEntry)
    -> Result<bool, PipelineError>;

    /// Orders sitting in `status` since before `older_than`.
    async fn orders_in_status(
        &self,
        status: OrderStatus,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, PipelineError>;

    async fn payments_for(&self, order_ref: &OrderRef) -> Result<Vec<Payment>, PipelineError>;

    async fn settlement_attempts_for(
        &self,
        order_ref: &OrderRef,
    ) -> Result<Vec<SettlementAttempt>, PipelineError>;

    async fn ledger_for(&self, order_ref: &OrderRef) -> Result<Vec<LedgerEntry>, PipelineError>;
}

/// External biller-settlement aggregator.
pub trait SettlementAggregator: Send + Sync {
    /// One outbound call. Never errors: transport failures come back inside the reply.
    fn submit(
        &self,
        request: &SettlementRequest,
        idempotency_key: &str,
    ) -> Pin<Box<dyn Future<Output = AggregatorReply> + Send + '_>>;

    /// Ask the aggregator what it knows about an order. `None` when it has no answer.
    fn query_status(
        &self,
        order_ref: &OrderRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SettlementStatus>, PipelineError>> + Send + '_>>;
}

/// Card/UPI gateway client.
pub trait GatewayClient: Send + Sync {
    fn create_gateway_order(
        &self,
        amount: MinorUnits,
        receipt: &OrderRef,
    ) -> Pin<Box<dyn Future<Output = Result<GatewayOrderRef, PipelineError>> + Send + '_>>;

    /// Gateway's own primitive for client-submitted confirmations.
    fn verify_checkout_signature(
        &self,
        gateway_order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> bool;

    /// Public key id handed to the checkout client.
    fn public_key_id(&self) -> &str;
}
