use {
    crate::domain::{
        error::PipelineError,
        id::{GatewayOrderRef, OrderRef},
        idempotency::{Acquire, IdempotencyRecord, KeyState},
        ledger::{LedgerEntry, LedgerKind, NewLedgerEntry},
        order::{Evidence, NewOrder, Order, OrderStatus},
        payment::Payment,
        ports::OrderStore,
        settlement::{NewSettlementAttempt, SettlementAttempt},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::{collections::HashMap, sync::Arc},
    tokio::sync::Mutex,
};

#[derive(Default)]
struct Tables {
    orders: HashMap<String, Order>,
    payments: Vec<Payment>,
    attempts: Vec<SettlementAttempt>,
    ledger: Vec<LedgerEntry>,
    keys: HashMap<String, IdempotencyRecord>,
}

impl Tables {
    fn push_ledger(&mut self, entry: &NewLedgerEntry) {
        let seq = self.ledger.len() as i64 + 1;
        self.ledger.push(LedgerEntry {
            seq,
            order_ref: entry.order_ref.as_ref().map(|r| r.as_str().to_string()),
            kind: entry.kind.as_str().to_string(),
            message: entry.message.clone(),
            created_at: Utc::now(),
        });
    }
}

/// Process-local store behind one mutex. Every method holds the lock for its
/// whole body, so each call is atomic exactly like a database transaction.
///
/// Used by tests and by `STORE=memory` local runs.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(&self, new: &NewOrder) -> Result<Order, PipelineError> {
        let mut t = self.tables.lock().await;
        if t.orders.contains_key(new.order_ref.as_str()) {
            return Err(PipelineError::DuplicateOrder(new.order_ref.to_string()));
        }
        let now = Utc::now();
        let order = Order {
            id: uuid::Uuid::now_v7(),
            order_ref: new.order_ref.clone(),
            customer_ref: new.customer_ref.clone(),
            amount: new.amount,
            bill_category: new.bill_category.clone(),
            status: OrderStatus::Created,
            gateway_order_ref: None,
            created_at: now,
            updated_at: now,
        };
        t.orders
            .insert(new.order_ref.as_str().to_string(), order.clone());
        t.push_ledger(&NewLedgerEntry::new(
            Some(&new.order_ref),
            LedgerKind::OrderCreated,
            format!("amount={} category={}", new.amount, new.bill_category),
        ));
        Ok(order)
    }

    async fn find_order(&self, order_ref: &OrderRef) -> Result<Option<Order>, PipelineError> {
        let t = self.tables.lock().await;
        Ok(t.orders.get(order_ref.as_str()).cloned())
    }

    async fn find_order_by_gateway_ref(
        &self,
        gateway_ref: &GatewayOrderRef,
    ) -> Result<Option<Order>, PipelineError> {
        let t = self.tables.lock().await;
        Ok(t.orders
            .values()
            .find(|o| o.gateway_order_ref.as_ref() == Some(gateway_ref))
            .cloned())
    }

    async fn transition(
        &self,
        order_ref: &OrderRef,
        from: &[OrderStatus],
        to: OrderStatus,
        evidence: Evidence,
    ) -> Result<Order, PipelineError> {
        let mut t = self.tables.lock().await;
        let allowed = OrderStatus::legal_sources(from, to);

        let order = t
            .orders
            .get_mut(order_ref.as_str())
            .ok_or_else(|| PipelineError::OrderNotFound(order_ref.to_string()))?;

        if !allowed.contains(&order.status) {
            return Err(PipelineError::InvalidTransition {
                order_ref: order_ref.to_string(),
                current: order.status,
                attempted: to,
            });
        }

        order.status = to;
        order.updated_at = Utc::now();
        if let Some(gateway_ref) = evidence.gateway_order_ref() {
            order.gateway_order_ref = Some(gateway_ref.clone());
        }
        let updated = order.clone();

        if let Some(p) = evidence.payment() {
            t.payments.push(Payment {
                id: p.id,
                order_id: updated.id,
                payment_ref: p.payment_ref.as_str().to_string(),
                method: p.method.clone(),
                status: p.status,
                amount: p.amount.map(|a| a.get()),
                raw_payload: p.raw_payload.clone(),
                created_at: Utc::now(),
            });
        }
        t.push_ledger(&NewLedgerEntry::new(
            Some(order_ref),
            evidence.ledger_kind(to),
            evidence.ledger_message(to),
        ));
        Ok(updated)
    }

    async fn append_ledger(&self, entry: &NewLedgerEntry) -> Result<(), PipelineError> {
        self.tables.lock().await.push_ledger(entry);
        Ok(())
    }

    async fn try_acquire(&self, key: &str) -> Result<Acquire, PipelineError> {
        let mut t = self.tables.lock().await;
        if let Some(existing) = t.keys.get(key) {
            return Ok(Acquire::AlreadyConsumed(existing.clone()));
        }
        t.keys.insert(
            key.to_string(),
            IdempotencyRecord {
                key: key.to_string(),
                state: KeyState::InFlight,
                outcome: None,
                acquired_at: Utc::now(),
                consumed_at: None,
            },
        );
        Ok(Acquire::Fresh)
    }

    async fn find_idempotency(
        &self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, PipelineError> {
        Ok(self.tables.lock().await.keys.get(key).cloned())
    }

    async fn record_settlement(
        &self,
        key: &str,
        attempt: &NewSettlementAttempt,
        ledger: &NewLedgerEntry,
    ) -> Result<(), PipelineError> {
        let mut t = self.tables.lock().await;
        let order_id = t
            .orders
            .get(attempt.order_ref.as_str())
            .map(|o| o.id)
            .ok_or_else(|| PipelineError::OrderNotFound(attempt.order_ref.to_string()))?;

        let now = Utc::now();
        t.attempts.push(SettlementAttempt {
            id: attempt.id,
            order_id,
            aggregator_txn_id: attempt.aggregator_txn_id.clone(),
            correlation_id: attempt.correlation_id.clone(),
            status: attempt.status,
            raw_payload: attempt.raw_payload.clone(),
            created_at: now,
        });
        let record = t
            .keys
            .entry(key.to_string())
            .or_insert_with(|| IdempotencyRecord {
                key: key.to_string(),
                state: KeyState::InFlight,
                outcome: None,
                acquired_at: now,
                consumed_at: None,
            });
        record.state = KeyState::Consumed;
        record.outcome = Some(attempt.status);
        record.consumed_at = Some(now);
        t.push_ledger(ledger);
        Ok(())
    }

    async fn clear_idempotency(
        &self,
        key: &str,
        ledger: &NewLedgerEntry,
    ) -> Result<bool, PipelineError> {
        let mut t = self.tables.lock().await;
        let removed = t.keys.remove(key).is_some();
        if removed {
            t.push_ledger(ledger);
        }
        Ok(removed)
    }

    async fn orders_in_status(
        &self,
        status: OrderStatus,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, PipelineError> {
        let t = self.tables.lock().await;
        let mut found: Vec<Order> = t
            .orders
            .values()
            .filter(|o| o.status == status && o.updated_at < older_than)
            .cloned()
            .collect();
        found.sort_by_key(|o| o.updated_at);
        found.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(found)
    }

    async fn payments_for(&self, order_ref: &OrderRef) -> Result<Vec<Payment>, PipelineError> {
        let t = self.tables.lock().await;
        let Some(order) = t.orders.get(order_ref.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(t.payments
            .iter()
            .filter(|p| p.order_id == order.id)
            .cloned()
            .collect())
    }

    async fn settlement_attempts_for(
        &self,
        order_ref: &OrderRef,
    ) -> Result<Vec<SettlementAttempt>, PipelineError> {
        let t = self.tables.lock().await;
        let Some(order) = t.orders.get(order_ref.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(t.attempts
            .iter()
            .filter(|a| a.order_id == order.id)
            .cloned()
            .collect())
    }

    async fn ledger_for(&self, order_ref: &OrderRef) -> Result<Vec<LedgerEntry>, PipelineError> {
        let t = self.tables.lock().await;
        Ok(t.ledger
            .iter()
            .filter(|e| e.order_ref.as_deref() == Some(order_ref.as_str()))
            .cloned()
            .collect())
    }
}
