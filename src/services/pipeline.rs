use {
    super::{
        settlement::SettlementTrigger,
        state_machine::{OrderStateMachine, Transitioned},
    },
    crate::{
        domain::{
            error::PipelineError,
            event::{CheckoutConfirmation, GatewayEvent, GatewayPayment, SettlementCallback},
            payu::{self, PayuResponse},
            id::{GatewayOrderRef, GatewayPaymentRef, OrderRef},
            ledger::{LedgerKind, NewLedgerEntry},
            order::{Evidence, NewOrder, Order, OrderStatus},
            payment::{NewPayment, Payment, PaymentRecordStatus},
            ports::{GatewayClient, OrderStore},
            settlement::{SettlementAttempt, SettlementOutcome, SettlementStatus},
        },
        signature,
    },
    serde::Serialize,
    std::sync::Arc,
};

/// What happened to one verified gateway notification.
#[derive(Debug, Clone)]
pub enum GatewayIngest {
    /// The order moved; carries the updated row.
    Applied(Order),
    /// The order had already advanced past this event.
    Duplicate {
        order_ref: OrderRef,
        current: OrderStatus,
    },
    /// No order carries this gateway reference.
    UnknownOrder(GatewayOrderRef),
    /// Acknowledged without touching any order.
    Ignored(&'static str),
}

impl GatewayIngest {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::Duplicate { .. } => "duplicate",
            Self::UnknownOrder(_) => "unknown_order",
            Self::Ignored(reason) => *reason,
        }
    }

    pub fn order_ref(&self) -> Option<&OrderRef> {
        match self {
            Self::Applied(order) => Some(&order.order_ref),
            Self::Duplicate { order_ref, .. } => Some(order_ref),
            _ => None,
        }
    }

    /// The order to hand to settlement. A redelivery that finds the order
    /// still at GATEWAY_CAPTURED qualifies too; `settle` lets only one owner through.
    pub fn settlement_candidate(&self) -> Option<&OrderRef> {
        match self {
            Self::Applied(order) if order.status == OrderStatus::GatewayCaptured => {
                Some(&order.order_ref)
            }
            Self::Duplicate {
                order_ref,
                current: OrderStatus::GatewayCaptured,
            } => Some(order_ref),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SettleResult {
    /// Outcome applied; the order is now PAID, SETTLEMENT_PENDING or SETTLEMENT_FAILED.
    Settled(Order),
    /// Key already consumed without a recorded outcome; left for the reconciler.
    AlreadyTriggered,
    /// Another worker owns settlement for this order.
    NotOwner { current: OrderStatus },
    /// A callback resolved the order while our call was in flight.
    Superseded { current: OrderStatus },
}

impl SettleResult {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Settled(_) => "settled",
            Self::AlreadyTriggered => "already_triggered",
            Self::NotOwner { .. } => "not_owner",
            Self::Superseded { .. } => "superseded",
        }
    }
}

#[derive(Debug, Clone)]
pub enum CallbackResult {
    Applied(Order),
    /// The order already carries the reported status.
    Unchanged { current: OrderStatus },
    /// The report contradicts a status the order can no longer leave.
    Rejected { current: OrderStatus },
}

impl CallbackResult {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::Unchanged { .. } => "noop",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Read-only order view for the payer UI.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub order: Order,
    pub payments: Vec<Payment>,
    pub settlement_attempts: Vec<SettlementAttempt>,
}

pub struct PipelineSecrets {
    pub gateway_webhook: String,
    /// `None` leaves the settlement callback channel unauthenticated.
    pub settlement_webhook: Option<String>,
    /// Salt of the hosted-checkout rail; `None` when that rail is disabled.
    pub payu_salt: Option<String>,
}

/// Both inbound channels, funnelled through the same guarded state machine.
pub struct WebhookPipeline {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn GatewayClient>,
    machine: OrderStateMachine,
    trigger: SettlementTrigger,
    secrets: PipelineSecrets,
}

impl WebhookPipeline {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn GatewayClient>,
        trigger: SettlementTrigger,
        secrets: PipelineSecrets,
    ) -> Self {
        Self {
            machine: OrderStateMachine::new(store.clone()),
            store,
            gateway,
            trigger,
            secrets,
        }
    }

    pub fn gateway_key_id(&self) -> &str {
        self.gateway.public_key_id()
    }

    /// Intake: persist the order, then attach a freshly created gateway order.
    /// A gateway failure leaves the order at CREATED and surfaces as `Gateway`.
    pub async fn create_order(&self, new: NewOrder) -> Result<Order, PipelineError> {
        let order = self.store.create_order(&new).await?;
        tracing::info!(order_ref = %order.order_ref, amount = %order.amount, "order created");

        let gateway_ref = self
            .gateway
            .create_gateway_order(order.amount, &order.order_ref)
            .await?;
        self.attach(order, gateway_ref).await
    }

    /// Intake for the hosted-checkout rail. No remote order is created; the
    /// rail knows the order by its ref, so the order is attached at once.
    pub async fn create_payu_order(&self, new: NewOrder) -> Result<Order, PipelineError> {
        let order = self.store.create_order(&new).await?;
        tracing::info!(order_ref = %order.order_ref, amount = %order.amount, rail = "payu", "order created");
        let gateway_ref = payu::gateway_order_ref(&order.order_ref)?;
        self.attach(order, gateway_ref).await
    }

    async fn attach(
        &self,
        order: Order,
        gateway_ref: GatewayOrderRef,
    ) -> Result<Order, PipelineError> {
        match self
            .machine
            .transition(
                &order.order_ref,
                &[OrderStatus::Created],
                OrderStatus::GatewayAttached,
                Evidence::GatewayOrder(gateway_ref),
            )
            .await?
        {
            Transitioned::Applied(order) => Ok(order),
            Transitioned::Rejected { current } => Err(PipelineError::InvalidTransition {
                order_ref: order.order_ref.to_string(),
                current,
                attempted: OrderStatus::GatewayAttached,
            }),
        }
    }

    /// Asynchronous gateway channel. The signature is checked over `raw_body`
    /// before a single byte of it is parsed.
    pub async fn ingest_gateway_webhook(
        &self,
        raw_body: &[u8],
        claimed_signature: Option<&str>,
    ) -> Result<GatewayIngest, PipelineError> {
        let claimed = claimed_signature
            .ok_or_else(|| PipelineError::SignatureMismatch("missing signature header".into()))?;
        if !signature::verify(raw_body, claimed, &self.secrets.gateway_webhook) {
            return Err(PipelineError::SignatureMismatch(
                "gateway webhook signature".into(),
            ));
        }

        let event: GatewayEvent = match serde_json::from_slice(raw_body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "verified gateway payload did not parse");
                return Ok(GatewayIngest::Ignored("ignored_invalid_data"));
            }
        };
        let event_name = event.name();
        tracing::Span::current().record("event", event_name);

        let payment = match event.into_gateway_payment() {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                tracing::info!("unsupported gateway event acknowledged");
                return Ok(GatewayIngest::Ignored("ignored_unsupported_event"));
            }
            Err(PipelineError::Validation(msg)) => {
                tracing::warn!(event = event_name, "skipping invalid gateway payment: {msg}");
                return Ok(GatewayIngest::Ignored("ignored_invalid_data"));
            }
            Err(e) => return Err(e),
        };

        let Some(order) = self
            .store
            .find_order_by_gateway_ref(&payment.gateway_order_ref)
            .await?
        else {
            tracing::warn!(gateway_order_ref = %payment.gateway_order_ref, "no order for gateway reference");
            return Ok(GatewayIngest::UnknownOrder(payment.gateway_order_ref));
        };

        let raw_payload: serde_json::Value = serde_json::from_slice(raw_body)?;
        self.apply_gateway_payment(order, payment, raw_payload).await
    }

    /// Synchronous checkout confirmation from the payer's client. Runs the
    /// same capture sequence as the webhook and may race it safely.
    pub async fn confirm_checkout(
        &self,
        confirmation: &CheckoutConfirmation,
    ) -> Result<GatewayIngest, PipelineError> {
        if !self.gateway.verify_checkout_signature(
            &confirmation.gateway_order_ref,
            &confirmation.gateway_payment_ref,
            &confirmation.signature,
        ) {
            return Err(PipelineError::SignatureMismatch(
                "checkout confirmation signature".into(),
            ));
        }

        let gateway_order_ref = GatewayOrderRef::new(confirmation.gateway_order_ref.clone())?;
        let payment = GatewayPayment {
            payment_ref: GatewayPaymentRef::new(confirmation.gateway_payment_ref.clone())?,
            gateway_order_ref,
            amount: None,
            method: Some("checkout".to_string()),
            status: PaymentRecordStatus::Captured,
        };

        let order = self
            .store
            .find_order_by_gateway_ref(&payment.gateway_order_ref)
            .await?
            .ok_or_else(|| PipelineError::OrderNotFound(payment.gateway_order_ref.to_string()))?;

        let raw_payload = serde_json::json!({
            "gateway_order_ref": confirmation.gateway_order_ref,
            "gateway_payment_ref": confirmation.gateway_payment_ref,
            "source": "checkout",
        });
        self.apply_gateway_payment(order, payment, raw_payload).await
    }

    /// Signed result from the hosted-checkout rail, delivered by either return
    /// URL or the mobile verify API. The reverse hash is checked over the
    /// result's own fields before anything is written; a verified success
    /// captures, a verified failure fails the order.
    pub async fn apply_payu_response(
        &self,
        response: &PayuResponse,
    ) -> Result<GatewayIngest, PipelineError> {
        let salt = self
            .secrets
            .payu_salt
            .as_deref()
            .ok_or_else(|| PipelineError::Validation("payu rail is not configured".into()))?;

        if !response.verify(salt) {
            return Err(PipelineError::SignatureMismatch("payu response hash".into()));
        }
        let order = self.find_by_ref(&response.txnid).await?;
        tracing::Span::current().record("event", response.status.as_str());

        let amount = match response.amount() {
            Ok(amount) => amount,
            Err(e) => {
                tracing::warn!(order_ref = %order.order_ref, error = %e, "verified payu result has no usable amount");
                return Ok(GatewayIngest::Ignored("ignored_invalid_data"));
            }
        };
        let payment = GatewayPayment {
            gateway_order_ref: payu::gateway_order_ref(&order.order_ref)?,
            payment_ref: response.payment_ref()?,
            amount: Some(amount),
            method: Some("payu".to_string()),
            status: if response.is_success() {
                PaymentRecordStatus::Captured
            } else {
                PaymentRecordStatus::Failed
            },
        };
        let raw_payload = serde_json::to_value(response)?;
        self.apply_gateway_payment(order, payment, raw_payload).await
    }

    async fn apply_gateway_payment(
        &self,
        order: Order,
        payment: GatewayPayment,
        raw_payload: serde_json::Value,
    ) -> Result<GatewayIngest, PipelineError> {
        tracing::Span::current().record("order_ref", tracing::field::display(&order.order_ref));

        if let Some(amount) = payment.amount.filter(|a| *a != order.amount) {
            tracing::warn!(
                order_ref = %order.order_ref,
                expected = %order.amount,
                received = %amount,
                "gateway amount does not match order, ignoring"
            );
            let entry = NewLedgerEntry::new(
                Some(&order.order_ref),
                LedgerKind::TransitionRejected,
                format!(
                    "amount mismatch payment={} expected={} received={amount}",
                    payment.payment_ref, order.amount
                ),
            );
            self.store.append_ledger(&entry).await?;
            return Ok(GatewayIngest::Ignored("ignored_invalid_data"));
        }

        let from: &[OrderStatus] = match payment.status {
            PaymentRecordStatus::Authorized => &[OrderStatus::GatewayAttached],
            PaymentRecordStatus::Captured => {
                &[OrderStatus::GatewayAttached, OrderStatus::GatewayVerified]
            }
            PaymentRecordStatus::Failed => &OrderStatus::PRE_CAPTURE,
        };
        let to = match payment.status {
            PaymentRecordStatus::Authorized => OrderStatus::GatewayVerified,
            PaymentRecordStatus::Captured => OrderStatus::GatewayCaptured,
            PaymentRecordStatus::Failed => OrderStatus::GatewayFailed,
        };

        let evidence = Evidence::Payment(NewPayment::new(
            payment.payment_ref,
            payment.method,
            payment.status,
            payment.amount,
            raw_payload,
        ));

        Ok(
            match self
                .machine
                .transition(&order.order_ref, from, to, evidence)
                .await?
            {
                Transitioned::Applied(updated) => GatewayIngest::Applied(updated),
                Transitioned::Rejected { current } => GatewayIngest::Duplicate {
                    order_ref: order.order_ref,
                    current,
                },
            },
        )
    }

    /// Settle a captured order: claim it, call the aggregator once under the
    /// order's settlement key, then apply the classified outcome.
    #[tracing::instrument(name = "settle", skip_all, fields(order_ref = %order_ref))]
    pub async fn settle(&self, order_ref: &OrderRef) -> Result<SettleResult, PipelineError> {
        let key = order_ref.settlement_key();

        let order = match self
            .machine
            .transition(
                order_ref,
                &[OrderStatus::GatewayCaptured],
                OrderStatus::SettlementTriggered,
                Evidence::SettlementStarted {
                    idempotency_key: key.clone(),
                },
            )
            .await?
        {
            Transitioned::Applied(order) => order,
            Transitioned::Rejected { current } => return Ok(SettleResult::NotOwner { current }),
        };

        let (status, aggregator_txn_id) = match self.trigger.trigger(&order, &key).await? {
            SettlementOutcome::Completed {
                status,
                aggregator_txn_id,
                ..
            } => (status, aggregator_txn_id),
            SettlementOutcome::AlreadyTriggered => {
                match self
                    .store
                    .find_idempotency(&key)
                    .await?
                    .and_then(|record| record.outcome)
                {
                    Some(status) => (status, None),
                    None => return Ok(SettleResult::AlreadyTriggered),
                }
            }
        };

        self.resolve(order_ref, status, aggregator_txn_id).await
    }

    async fn resolve(
        &self,
        order_ref: &OrderRef,
        status: SettlementStatus,
        aggregator_txn_id: Option<String>,
    ) -> Result<SettleResult, PipelineError> {
        match self
            .machine
            .transition(
                order_ref,
                &[OrderStatus::SettlementTriggered],
                status.into(),
                Evidence::SettlementResult {
                    status,
                    aggregator_txn_id,
                },
            )
            .await?
        {
            Transitioned::Applied(order) => Ok(SettleResult::Settled(order)),
            Transitioned::Rejected { current } => Ok(SettleResult::Superseded { current }),
        }
    }

    /// Aggregator callback channel: last report wins while settlement is open.
    pub async fn apply_settlement_callback(
        &self,
        raw_body: &[u8],
        claimed_signature: Option<&str>,
    ) -> Result<CallbackResult, PipelineError> {
        match &self.secrets.settlement_webhook {
            Some(secret) => {
                let claimed = claimed_signature.ok_or_else(|| {
                    PipelineError::SignatureMismatch("missing settlement signature".into())
                })?;
                if !signature::verify(raw_body, claimed, secret) {
                    return Err(PipelineError::SignatureMismatch(
                        "settlement callback signature".into(),
                    ));
                }
            }
            None => tracing::warn!("accepting unauthenticated settlement callback"),
        }

        let callback: SettlementCallback = serde_json::from_slice(raw_body)
            .map_err(|e| PipelineError::Validation(format!("settlement callback: {e}")))?;
        tracing::Span::current().record("order_ref", callback.order_ref.as_str());

        let order = self.find_by_ref(&callback.order_ref).await?;

        let target: OrderStatus = SettlementStatus::from_reported(&callback.status).into();
        if order.status == target {
            self.note_duplicate_callback(&order.order_ref, &callback.status)
                .await?;
            return Ok(CallbackResult::Unchanged {
                current: order.status,
            });
        }

        let evidence = Evidence::SettlementCallback {
            reported: callback.status.clone(),
            aggregator_txn_id: callback.aggregator_txn_id.clone(),
        };
        match self
            .machine
            .transition(
                &order.order_ref,
                &OrderStatus::SETTLEMENT_OPEN,
                target,
                evidence,
            )
            .await?
        {
            Transitioned::Applied(order) => Ok(CallbackResult::Applied(order)),
            Transitioned::Rejected { current } if current == target => {
                self.note_duplicate_callback(&order.order_ref, &callback.status)
                    .await?;
                Ok(CallbackResult::Unchanged { current })
            }
            Transitioned::Rejected { current } => {
                tracing::warn!(
                    order_ref = %order.order_ref,
                    %current,
                    reported = %callback.status,
                    "settlement callback contradicts order status"
                );
                let entry = NewLedgerEntry::new(
                    Some(&order.order_ref),
                    LedgerKind::TransitionRejected,
                    format!("callback reported={} current={current}", callback.status),
                );
                self.store.append_ledger(&entry).await?;
                Ok(CallbackResult::Rejected { current })
            }
        }
    }

    async fn note_duplicate_callback(
        &self,
        order_ref: &OrderRef,
        reported: &str,
    ) -> Result<(), PipelineError> {
        tracing::info!(order_ref = %order_ref, reported, "settlement callback repeats current status");
        let entry = NewLedgerEntry::new(
            Some(order_ref),
            LedgerKind::SettlementCallback,
            format!("duplicate reported={reported}"),
        );
        self.store.append_ledger(&entry).await
    }

    /// Manual replay for an order left at SETTLEMENT_TRIGGERED. A recorded
    /// outcome is applied as is; otherwise the key is cleared and the
    /// aggregator is called again under the same key, which it sees as
    /// `X-Idempotency-Key`.
    #[tracing::instrument(name = "replay_settlement", skip_all, fields(order_ref = %order_ref))]
    pub async fn replay_settlement(&self, order_ref: &OrderRef) -> Result<SettleResult, PipelineError> {
        let order = self
            .store
            .find_order(order_ref)
            .await?
            .ok_or_else(|| PipelineError::OrderNotFound(order_ref.to_string()))?;
        if order.status != OrderStatus::SettlementTriggered {
            tracing::info!(current = %order.status, "nothing to replay");
            return Ok(SettleResult::NotOwner {
                current: order.status,
            });
        }

        let key = order_ref.settlement_key();
        if let Some(status) = self
            .store
            .find_idempotency(&key)
            .await?
            .and_then(|record| record.outcome)
        {
            return self.resolve(order_ref, status, None).await;
        }

        self.clear_settlement_key(order_ref).await?;
        match self.trigger.trigger(&order, &key).await? {
            SettlementOutcome::Completed {
                status,
                aggregator_txn_id,
                ..
            } => self.resolve(order_ref, status, aggregator_txn_id).await,
            SettlementOutcome::AlreadyTriggered => Ok(SettleResult::AlreadyTriggered),
        }
    }

    /// Forget the order's settlement key. Returns whether a key existed.
    pub async fn clear_settlement_key(&self, order_ref: &OrderRef) -> Result<bool, PipelineError> {
        let key = order_ref.settlement_key();
        let entry = NewLedgerEntry::new(
            Some(order_ref),
            LedgerKind::IdempotencyKeyCleared,
            key.clone(),
        );
        let removed = self.store.clear_idempotency(&key, &entry).await?;
        tracing::info!(order_ref = %order_ref, removed, "settlement key cleared");
        Ok(removed)
    }

    /// Look up an order by a caller-supplied reference. A reference that
    /// cannot exist is reported the same way as one that does not.
    async fn find_by_ref(&self, raw_ref: &str) -> Result<Order, PipelineError> {
        let not_found = || PipelineError::OrderNotFound(raw_ref.to_string());
        let order_ref = OrderRef::new(raw_ref).map_err(|_| not_found())?;
        self.store.find_order(&order_ref).await?.ok_or_else(not_found)
    }

    pub async fn order_view(&self, order_ref: &OrderRef) -> Result<OrderView, PipelineError> {
        let order = self
            .store
            .find_order(order_ref)
            .await?
            .ok_or_else(|| PipelineError::OrderNotFound(order_ref.to_string()))?;
        Ok(OrderView {
            payments: self.store.payments_for(order_ref).await?,
            settlement_attempts: self.store.settlement_attempts_for(order_ref).await?,
            order,
        })
    }
}
