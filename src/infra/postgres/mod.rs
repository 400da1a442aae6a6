pub mod idempotency_repo;
pub mod ledger_repo;
pub mod order_repo;
pub mod settlement_repo;

use {
    crate::domain::{
        error::PipelineError,
        id::{GatewayOrderRef, OrderRef},
        idempotency::{Acquire, IdempotencyRecord},
        ledger::{LedgerEntry, LedgerKind, NewLedgerEntry},
        order::{Evidence, NewOrder, Order, OrderStatus},
        payment::Payment,
        ports::OrderStore,
        settlement::{NewSettlementAttempt, SettlementAttempt},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    ledger_repo::insert_ledger_entry,
    sqlx::PgPool,
};

/// Postgres-backed store. Each trait method is one transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let Some(created) = order_repo::insert_order(&mut tx, order).await? else {
            return Err(PipelineError::DuplicateOrder(order.order_ref.to_string()));
        };
        let entry = NewLedgerEntry::new(
            Some(&order.order_ref),
            LedgerKind::OrderCreated,
            format!("amount={} category={}", order.amount, order.bill_category),
        );
        insert_ledger_entry(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn find_order(&self, order_ref: &OrderRef) -> Result<Option<Order>, PipelineError> {
        order_repo::find_by_ref(&self.pool, order_ref).await
    }

    async fn find_order_by_gateway_ref(
        &self,
        gateway_ref: &GatewayOrderRef,
    ) -> Result<Option<Order>, PipelineError> {
        order_repo::find_by_gateway_ref(&self.pool, gateway_ref).await
    }

    async fn transition(
        &self,
        order_ref: &OrderRef,
        from: &[OrderStatus],
        to: OrderStatus,
        evidence: Evidence,
    ) -> Result<Order, PipelineError> {
        let allowed = OrderStatus::legal_sources(from, to);
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET LOCAL lock_timeout = '5s'")
            .execute(&mut *tx)
            .await?;

        let updated = order_repo::compare_and_set_status(
            &mut tx,
            order_ref,
            &allowed,
            to,
            evidence.gateway_order_ref(),
        )
        .await?;

        let Some(order) = updated else {
            // Dropping the transaction rolls it back; nothing was written.
            return match order_repo::current_status(&mut tx, order_ref).await? {
                None => Err(PipelineError::OrderNotFound(order_ref.to_string())),
                Some(current) => Err(PipelineError::InvalidTransition {
                    order_ref: order_ref.to_string(),
                    current,
                    attempted: to,
                }),
            };
        };

        if let Some(payment) = evidence.payment() {
            order_repo::insert_payment(&mut tx, order.id, payment).await?;
        }
        let entry = NewLedgerEntry::new(
            Some(order_ref),
            evidence.ledger_kind(to),
            evidence.ledger_message(to),
        );
        insert_ledger_entry(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn append_ledger(&self, entry: &NewLedgerEntry) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;
        insert_ledger_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn try_acquire(&self, key: &str) -> Result<Acquire, PipelineError> {
        // A manual clear can land between the insert and the read; retry a few times.
        for _ in 0..3 {
            if idempotency_repo::insert_in_flight(&self.pool, key).await? {
                return Ok(Acquire::Fresh);
            }
            if let Some(record) = idempotency_repo::find(&self.pool, key).await? {
                return Ok(Acquire::AlreadyConsumed(record));
            }
        }
        tracing::warn!(key, "idempotency key keeps changing concurrently");
        Err(PipelineError::Timeout("idempotency key contention"))
    }

    async fn find_idempotency(
        &self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, PipelineError> {
        idempotency_repo::find(&self.pool, key).await
    }

    async fn record_settlement(
        &self,
        key: &str,
        attempt: &NewSettlementAttempt,
        ledger: &NewLedgerEntry,
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;
        settlement_repo::insert_attempt(&mut tx, attempt).await?;
        idempotency_repo::mark_consumed(&mut tx, key, attempt.status).await?;
        insert_ledger_entry(&mut tx, ledger).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear_idempotency(
        &self,
        key: &str,
        ledger: &NewLedgerEntry,
    ) -> Result<bool, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let removed = idempotency_repo::delete(&mut tx, key).await?;
        if removed {
            insert_ledger_entry(&mut tx, ledger).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn orders_in_status(
        &self,
        status: OrderStatus,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, PipelineError> {
        order_repo::in_status_since(&self.pool, status, older_than, limit).await
    }

    async fn payments_for(&self, order_ref: &OrderRef) -> Result<Vec<Payment>, PipelineError> {
        order_repo::payments_for(&self.pool, order_ref).await
    }

    async fn settlement_attempts_for(
        &self,
        order_ref: &OrderRef,
    ) -> Result<Vec<SettlementAttempt>, PipelineError> {
        settlement_repo::attempts_for(&self.pool, order_ref).await
    }

    async fn ledger_for(&self, order_ref: &OrderRef) -> Result<Vec<LedgerEntry>, PipelineError> {
        ledger_repo::entries_for(&self.pool, order_ref).await
    }
}
