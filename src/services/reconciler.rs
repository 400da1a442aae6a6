//! Background sweep for orders whose settlement outcome never got applied:
//! a crash between the aggregator call and the final transition, or an
//! aggregator that answered PENDING and never called back.

use {
    crate::domain::{
        error::PipelineError,
        ledger::{LedgerKind, NewLedgerEntry},
        order::{Evidence, Order, OrderStatus},
        ports::{OrderStore, SettlementAggregator},
        settlement::{NewSettlementAttempt, SettlementStatus},
    },
    chrono::Utc,
    std::{sync::Arc, time::Duration},
    tokio::sync::watch,
    uuid::Uuid,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

pub struct Reconciler {
    store: Arc<dyn OrderStore>,
    aggregator: Arc<dyn SettlementAggregator>,
    grace: Duration,
    batch: i64,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        aggregator: Arc<dyn SettlementAggregator>,
        grace: Duration,
        batch: i64,
    ) -> Self {
        Self {
            store,
            aggregator,
            grace,
            batch,
        }
    }

    pub async fn reconcile_once(&self) -> Result<ReconcileReport, PipelineError> {
        let grace = chrono::Duration::from_std(self.grace)
            .map_err(|e| PipelineError::Validation(format!("reconcile grace: {e}")))?;
        let cutoff = Utc::now() - grace;
        let mut report = ReconcileReport::default();

        let stuck = self
            .store
            .orders_in_status(OrderStatus::SettlementTriggered, cutoff, self.batch)
            .await?;
        for order in stuck {
            report.examined += 1;
            match self.recover_triggered(&order).await {
                Ok(true) => report.resolved += 1,
                Ok(false) => report.unresolved += 1,
                Err(e) => {
                    tracing::error!(order_ref = %order.order_ref, error = %e, "reconcile failed");
                    report.unresolved += 1;
                }
            }
        }

        let pending = self
            .store
            .orders_in_status(OrderStatus::SettlementPending, cutoff, self.batch)
            .await?;
        for order in pending {
            report.examined += 1;
            match self.recover_pending(&order).await {
                Ok(true) => report.resolved += 1,
                Ok(false) => report.unresolved += 1,
                Err(e) => {
                    tracing::error!(order_ref = %order.order_ref, error = %e, "reconcile failed");
                    report.unresolved += 1;
                }
            }
        }

        Ok(report)
    }

    /// Order claimed for settlement but never resolved. Prefer the outcome
    /// already recorded under its key; otherwise ask the aggregator and record
    /// what it says.
    async fn recover_triggered(&self, order: &Order) -> Result<bool, PipelineError> {
        let key = order.order_ref.settlement_key();
        let recorded = self
            .store
            .find_idempotency(&key)
            .await?
            .and_then(|record| record.outcome);

        let status = match recorded {
            Some(status) => status,
            None => {
                let Some(status) = self.aggregator.query_status(&order.order_ref).await? else {
                    tracing::warn!(order_ref = %order.order_ref, "aggregator has no answer, needs manual reconciliation");
                    return Ok(false);
                };
                let attempt = NewSettlementAttempt::new(
                    order.order_ref.clone(),
                    format!("reconcile-{}", Uuid::now_v7()),
                    status,
                    None,
                    serde_json::json!({ "source": "status_query", "status": status.as_str() }),
                );
                let entry = NewLedgerEntry::new(
                    Some(&order.order_ref),
                    LedgerKind::SettlementAttemptRecorded,
                    format!("status={status} source=status_query"),
                );
                self.store.record_settlement(&key, &attempt, &entry).await?;
                status
            }
        };

        self.apply(order, OrderStatus::SettlementTriggered, status).await
    }

    async fn recover_pending(&self, order: &Order) -> Result<bool, PipelineError> {
        match self.aggregator.query_status(&order.order_ref).await? {
            Some(status @ (SettlementStatus::Success | SettlementStatus::Failed)) => {
                self.apply(order, OrderStatus::SettlementPending, status).await
            }
            _ => {
                tracing::debug!(order_ref = %order.order_ref, "settlement still pending");
                Ok(false)
            }
        }
    }

    async fn apply(
        &self,
        order: &Order,
        from: OrderStatus,
        status: SettlementStatus,
    ) -> Result<bool, PipelineError> {
        match self
            .store
            .transition(
                &order.order_ref,
                &[from],
                status.into(),
                Evidence::Reconciled { status },
            )
            .await
        {
            Ok(_) => {
                tracing::info!(order_ref = %order.order_ref, %status, "settlement reconciled");
                Ok(true)
            }
            // Someone else (usually a callback) resolved it first.
            Err(e) if e.is_invalid_transition() => Ok(true),
            Err(e) => Err(e),
        }
    }
}

/// Run `reconcile_once` every `interval` until shutdown flips.
pub async fn run_reconciler(
    reconciler: Arc<Reconciler>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("reconciler started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("reconciler shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match reconciler.reconcile_once().await {
            Ok(report) if report.examined > 0 => {
                tracing::info!(?report, "reconcile pass finished");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "reconcile pass failed"),
        }
    }
}
