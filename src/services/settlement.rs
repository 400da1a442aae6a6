use {
    crate::domain::{
        error::PipelineError,
        idempotency::Acquire,
        ledger::{LedgerKind, NewLedgerEntry},
        order::Order,
        ports::{OrderStore, SettlementAggregator},
        settlement::{
            AggregatorReply, NewSettlementAttempt, SettlementOutcome, SettlementRequest,
            SettlementStatus,
        },
    },
    std::sync::Arc,
    uuid::Uuid,
};

/// Aggregator identity stamped on every outbound request.
#[derive(Debug, Clone)]
pub struct SettlementParams {
    pub aggregator_id: String,
    pub biller_code: String,
    pub hash_salt: String,
}

/// Calls the biller-settlement aggregator at most once per idempotency key.
#[derive(Clone)]
pub struct SettlementTrigger {
    store: Arc<dyn OrderStore>,
    aggregator: Arc<dyn SettlementAggregator>,
    params: SettlementParams,
}

impl SettlementTrigger {
    pub fn new(
        store: Arc<dyn OrderStore>,
        aggregator: Arc<dyn SettlementAggregator>,
        params: SettlementParams,
    ) -> Self {
        Self {
            store,
            aggregator,
            params,
        }
    }

    /// Acquire the key, make exactly one call, record the attempt together
    /// with the consumed key. A key that is already taken short-circuits to
    /// `AlreadyTriggered` without touching the network.
    #[tracing::instrument(name = "settlement", skip_all, fields(order_ref = %order.order_ref, key = %idempotency_key))]
    pub async fn trigger(
        &self,
        order: &Order,
        idempotency_key: &str,
    ) -> Result<SettlementOutcome, PipelineError> {
        if let Acquire::AlreadyConsumed(record) = self.store.try_acquire(idempotency_key).await? {
            let entry = NewLedgerEntry::new(
                Some(&order.order_ref),
                LedgerKind::SettlementIdempotentHit,
                format!("{idempotency_key} state={}", record.state.as_str()),
            );
            self.store.append_ledger(&entry).await?;
            tracing::info!(state = record.state.as_str(), "idempotency key already taken, skipping call");
            return Ok(SettlementOutcome::AlreadyTriggered);
        }

        let correlation_id = Uuid::now_v7().to_string();
        let request = SettlementRequest::signed(
            &self.params.aggregator_id,
            &self.params.biller_code,
            &order.customer_ref,
            order.amount,
            &correlation_id,
            &order.order_ref,
            &self.params.hash_salt,
        );

        let reply = self.aggregator.submit(&request, idempotency_key).await;
        let status = self.classify(&request, &reply);
        let aggregator_txn_id = reply.aggregator_txn_id();

        let attempt = NewSettlementAttempt::new(
            order.order_ref.clone(),
            correlation_id,
            status,
            aggregator_txn_id.clone(),
            reply.body.clone(),
        );
        let summary = NewLedgerEntry::new(
            Some(&order.order_ref),
            LedgerKind::SettlementAttemptRecorded,
            format!(
                "status={status} http={} txn={}",
                reply
                    .http_status
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".into()),
                aggregator_txn_id.as_deref().unwrap_or("-"),
            ),
        );
        self.store
            .record_settlement(idempotency_key, &attempt, &summary)
            .await?;

        tracing::info!(%status, "settlement attempt recorded");
        Ok(SettlementOutcome::Completed {
            status,
            aggregator_txn_id,
            raw_payload: reply.body,
        })
    }

    fn classify(&self, request: &SettlementRequest, reply: &AggregatorReply) -> SettlementStatus {
        if let Some(error) = &reply.transport_error {
            tracing::warn!(%error, "aggregator call failed, folding into FAILED");
            return SettlementStatus::Failed;
        }
        let Some(code) = reply.http_status else {
            return SettlementStatus::Failed;
        };
        let status = SettlementStatus::from_http_status(code);

        if reply.verify_hash(status.as_str(), &self.params.hash_salt) == Some(false) {
            tracing::warn!(http = code, "aggregator response hash mismatch, treating as FAILED");
            return SettlementStatus::Failed;
        }
        if !request.matches_reply(reply) {
            tracing::warn!(http = code, "aggregator reply echoes another order or amount, treating as FAILED");
            return SettlementStatus::Failed;
        }
        status
    }
}
