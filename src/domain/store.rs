use {
    super::error::PipelineError,
    super::id::PaymentId,
    super::payment::{PaymentStatus, PendingPaymentEvent},
    super::provider::BoxFuture,
    chrono::{DateTime, Utc},
};

/// Selection for the sweep: open records created inside
/// `[created_after, created_before)`. Never-swept records come first, then
/// the least recently swept, then oldest; so a page of records that never
/// settle cannot starve the rest.
#[derive(Debug, Clone)]
pub struct StaleQuery {
    pub created_before: DateTime<Utc>,
    pub created_after: DateTime<Utc>,
    pub statuses: Vec<PaymentStatus>,
    pub limit: i64,
}

/// Durable record of every payment attempt. The only shared mutable state;
/// callers must not cache what they read from it across requests.
pub trait PendingEventStore: Send + Sync {
    /// Insert if `payment_id` is absent. Otherwise bump `updated_at`, and
    /// overwrite `status` and `approved_at` only while the stored row is open.
    fn upsert<'a>(
        &'a self,
        event: &'a PendingPaymentEvent,
    ) -> BoxFuture<'a, Result<(), PipelineError>>;

    fn get_by_payment_id<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<Option<PendingPaymentEvent>, PipelineError>>;

    /// Move an open record to `to`. Returns `false` when no open record
    /// matched (already terminal, or unknown). `approved_at` is set to `at`
    /// when `to` is `Paid`.
    fn transition<'a>(
        &'a self,
        id: &'a PaymentId,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<bool, PipelineError>>;

    fn list_stale<'a>(
        &'a self,
        query: &'a StaleQuery,
    ) -> BoxFuture<'a, Result<Vec<PendingPaymentEvent>, PipelineError>>;

    /// Record that the sweep re-queried `id` at `at`, moving it to the back
    /// of the next [`StaleQuery`] page.
    fn mark_swept<'a>(
        &'a self,
        id: &'a PaymentId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<(), PipelineError>>;

    /// Delete terminal records last touched before `older_than`.
    fn purge(&self, older_than: DateTime<Utc>) -> BoxFuture<'_, Result<u64, PipelineError>>;
}
