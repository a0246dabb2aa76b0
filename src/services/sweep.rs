use {
    crate::domain::{
        payment::{ObservationSource, PaymentStatus},
        store::StaleQuery,
    },
    crate::services::reconciler::{ObservationOutcome, Reconciler},
    chrono::{DateTime, Duration, Utc},
    std::sync::Arc,
    tokio::sync::watch,
};

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: std::time::Duration,
    /// Only records older than this are re-queried; younger ones are still
    /// expected to settle through poll or webhook.
    pub stale_after: Duration,
    /// Records older than this are past PIX expiry and no longer re-queried.
    pub max_age: Duration,
    pub batch_size: i64,
    /// Terminal records untouched for this long are purged.
    pub retention: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: std::time::Duration::from_secs(300),
            stale_after: Duration::hours(1),
            max_age: Duration::hours(48),
            batch_size: 50,
            retention: Duration::days(30),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub paid: usize,
    pub closed: usize,
    pub errors: usize,
    pub purged: u64,
}

/// One pass: re-query stale open records, then purge old terminal ones.
/// A failing record is counted and skipped; it never aborts the batch, and
/// it is not picked again before every other stale record has had a turn.
pub async fn sweep_once(
    reconciler: &Reconciler,
    config: &SweepConfig,
    now: DateTime<Utc>,
) -> SweepReport {
    let mut report = SweepReport::default();

    let query = StaleQuery {
        created_before: now - config.stale_after,
        created_after: now - config.max_age,
        statuses: PaymentStatus::OPEN.to_vec(),
        limit: config.batch_size,
    };

    match reconciler.store().list_stale(&query).await {
        Ok(events) => {
            for event in events {
                report.examined += 1;
                match reconciler
                    .refresh_from_gateway(&event.payment_id, ObservationSource::Sweep)
                    .await
                {
                    Ok(ObservationOutcome::Paid) => report.paid += 1,
                    Ok(ObservationOutcome::Closed(_)) => report.closed += 1,
                    Ok(outcome) => {
                        tracing::debug!(payment_id = %event.payment_id, ?outcome, "sweep: no transition");
                    }
                    Err(e) => {
                        report.errors += 1;
                        tracing::warn!(payment_id = %event.payment_id, error = %e, "sweep: record failed");
                    }
                }
                // Whatever the outcome, the record yields its place to the
                // next page.
                if let Err(e) = reconciler.store().mark_swept(&event.payment_id, now).await {
                    report.errors += 1;
                    tracing::warn!(payment_id = %event.payment_id, error = %e, "sweep: could not mark record");
                }
            }
        }
        Err(e) => {
            report.errors += 1;
            tracing::error!(error = %e, "sweep: listing stale events failed");
        }
    }

    match reconciler.store().purge(now - config.retention).await {
        Ok(n) => report.purged = n,
        Err(e) => {
            report.errors += 1;
            tracing::error!(error = %e, "sweep: purge failed");
        }
    }

    report
}

/// Run [`sweep_once`] every `config.interval` until shutdown.
pub async fn run_sweeper(
    reconciler: Arc<Reconciler>,
    config: SweepConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_secs = config.interval.as_secs(), "sweeper started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("sweeper shutting down");
                return;
            }
            _ = tokio::time::sleep(config.interval) => {}
        }

        let report = sweep_once(&reconciler, &config, Utc::now()).await;
        tracing::info!(
            examined = report.examined,
            paid = report.paid,
            closed = report.closed,
            errors = report.errors,
            purged = report.purged,
            "sweep finished"
        );
    }
}
