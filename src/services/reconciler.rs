use {
    crate::domain::{
        error::PipelineError,
        id::PaymentId,
        payment::{
            Observation, ObservationSource, PaymentStatus, PendingPaymentEvent, Transition,
        },
        provider::{
            AttributionReport, AttributionSink, AttributionStatus, ChargeRequest, CreatedCharge,
            PaymentGateway,
        },
        store::PendingEventStore,
    },
    chrono::{Duration, Utc},
    rust_decimal::Decimal,
    std::sync::Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationOutcome {
    /// No stored record; nothing to reconstruct a report from.
    UnknownPayment,
    /// Provider status outside the known vocabulary.
    Ignored,
    /// Stored record was already terminal (replay or repeated poll).
    AlreadyTerminal(PaymentStatus),
    /// Still open; nothing written.
    Unchanged(PaymentStatus),
    /// Committed `paid` and attempted the attribution forward.
    Paid,
    /// Committed a non-paid terminal status.
    Closed(PaymentStatus),
    /// A concurrent path committed the transition first.
    LostRace,
}

/// Owns the payment state machine. Every observation path funnels
/// through [`Reconciler::observe`].
pub struct Reconciler {
    store: Arc<dyn PendingEventStore>,
    gateway: Arc<dyn PaymentGateway>,
    attribution: Arc<dyn AttributionSink>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn PendingEventStore>,
        gateway: Arc<dyn PaymentGateway>,
        attribution: Arc<dyn AttributionSink>,
    ) -> Self {
        Self {
            store,
            gateway,
            attribution,
        }
    }

    pub fn store(&self) -> &dyn PendingEventStore {
        &*self.store
    }

    /// Create at the gateway, persist `waiting_payment`, report it.
    ///
    /// Only a gateway failure fails the call. A store failure after the
    /// charge exists is logged and the charge is still returned: the
    /// shopper can pay it, and there is no way to undo it at the gateway.
    #[tracing::instrument(
        name = "create_charge",
        skip_all,
        fields(payment_id = tracing::field::Empty)
    )]
    pub async fn create_charge(
        &self,
        request: ChargeRequest,
    ) -> Result<CreatedCharge, PipelineError> {
        validate_charge(&request)?;

        let charge = self.gateway.create_charge(&request).await?;
        tracing::Span::current().record("payment_id", tracing::field::display(&charge.payment_id));

        let event = PendingPaymentEvent::waiting(
            charge.payment_id.clone(),
            request.customer,
            request.items,
            request.amount,
            request.tracking,
            Utc::now(),
        );

        if let Err(e) = self.store.upsert(&event).await {
            tracing::error!(error = %e, "charge exists at gateway but was not persisted");
        }

        self.forward(&AttributionReport::from_event(
            &event,
            AttributionStatus::WaitingPayment,
        ))
        .await;

        Ok(charge)
    }

    /// Apply one observed status to the stored record.
    ///
    /// The read is only used to pick a branch; the write is a conditional
    /// transition, so of two paths observing `paid` at once only the one
    /// whose update lands forwards the event.
    #[tracing::instrument(
        name = "observe",
        skip_all,
        fields(payment_id = %observation.payment_id, source = %observation.source, observed = %observation.status)
    )]
    pub async fn observe(
        &self,
        observation: Observation,
    ) -> Result<ObservationOutcome, PipelineError> {
        let Some(event) = self
            .store
            .get_by_payment_id(&observation.payment_id)
            .await?
        else {
            tracing::warn!("observation for unknown payment, discarded");
            return Ok(ObservationOutcome::UnknownPayment);
        };

        match event.status.decide(observation.status) {
            Transition::AlreadyTerminal(current) => {
                tracing::debug!(current = %current, "already terminal, discarded");
                Ok(ObservationOutcome::AlreadyTerminal(current))
            }
            Transition::Unchanged => Ok(ObservationOutcome::Unchanged(event.status)),
            Transition::Close(to) => {
                if !self
                    .store
                    .transition(&observation.payment_id, to, Utc::now())
                    .await?
                {
                    return Ok(ObservationOutcome::LostRace);
                }
                tracing::info!(from = %event.status, to = %to, "payment closed");
                Ok(ObservationOutcome::Closed(to))
            }
            Transition::MarkPaid => {
                let now = Utc::now();
                // Commit before forwarding: a crash in between leaves a paid
                // record and no report, never a report without a record.
                if !self
                    .store
                    .transition(&observation.payment_id, PaymentStatus::Paid, now)
                    .await?
                {
                    tracing::info!("paid already committed by another path, not forwarding");
                    return Ok(ObservationOutcome::LostRace);
                }
                tracing::info!(from = %event.status, "payment approved");

                let mut paid = event;
                paid.status = PaymentStatus::Paid;
                paid.approved_at = Some(now);
                paid.updated_at = now;
                if let Some(hint) = &observation.tracking_hint {
                    paid.tracking = paid.tracking.or(hint);
                }

                self.forward(&AttributionReport::from_event(&paid, AttributionStatus::Paid))
                    .await;
                Ok(ObservationOutcome::Paid)
            }
        }
    }

    /// Query the gateway for `id` and feed the answer through [`Self::observe`].
    pub async fn refresh_from_gateway(
        &self,
        id: &PaymentId,
        source: ObservationSource,
    ) -> Result<ObservationOutcome, PipelineError> {
        let current = self.gateway.get_charge_status(id).await?;
        let Some(status) = PaymentStatus::from_provider(&current.status) else {
            tracing::warn!(
                payment_id = %id,
                raw_status = %current.status,
                "unmapped provider status, ignored"
            );
            return Ok(ObservationOutcome::Ignored);
        };

        self.observe(Observation {
            payment_id: id.clone(),
            status,
            source,
            tracking_hint: None,
        })
        .await
    }

    /// Client poll path. Gateway trouble is not the shopper's problem: the
    /// stored (still open) record is returned instead. Once `window` has
    /// passed since creation the gateway is no longer asked; late charges
    /// are left to the sweep.
    pub async fn poll(
        &self,
        id: &PaymentId,
        window: Duration,
    ) -> Result<PendingPaymentEvent, PipelineError> {
        let event = self
            .store
            .get_by_payment_id(id)
            .await?
            .ok_or_else(|| PipelineError::UnknownPayment(id.to_string()))?;

        if !event.poll_window_open(Utc::now(), window) {
            return Ok(event);
        }

        match self.refresh_from_gateway(id, ObservationSource::Poll).await {
            Ok(ObservationOutcome::Unchanged(_) | ObservationOutcome::Ignored) => Ok(event),
            // Something moved the record since it was read, by us or another path.
            Ok(_) => Ok(self.store.get_by_payment_id(id).await?.unwrap_or(event)),
            Err(e) => {
                tracing::warn!(payment_id = %id, error = %e, "status poll failed, reporting stored status");
                Ok(event)
            }
        }
    }

    async fn forward(&self, report: &AttributionReport) {
        if let Err(e) = self.attribution.report(report).await {
            tracing::error!(
                payment_id = %report.payment_id,
                status = ?report.status,
                error = %e,
                "attribution forward failed"
            );
        }
    }
}

fn validate_charge(request: &ChargeRequest) -> Result<(), PipelineError> {
    if request.amount <= Decimal::ZERO {
        return Err(PipelineError::Validation(format!(
            "amount must be positive, got: {}",
            request.amount
        )));
    }
    if request.customer.name.trim().is_empty() || request.customer.email.trim().is_empty() {
        return Err(PipelineError::Validation(
            "customer name and email are required".into(),
        ));
    }
    if let Some(item) = request.items.iter().find(|i| i.quantity == 0) {
        return Err(PipelineError::Validation(format!(
            "item {} has zero quantity",
            item.id
        )));
    }
    Ok(())
}
