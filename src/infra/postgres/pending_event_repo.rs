use {
    crate::domain::{
        error::PipelineError,
        id::PaymentId,
        payment::{CustomerData, PaymentStatus, PendingPaymentEvent, Product, TrackingParameters},
        provider::BoxFuture,
        store::{PendingEventStore, StaleQuery},
    },
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    sqlx::{PgPool, types::Json},
    uuid::Uuid,
};

const COLUMNS: &str = "payment_id, status, customer_data, products, total_amount, \
                       tracking_parameters, created_at, approved_at, updated_at";

#[derive(sqlx::FromRow)]
struct PendingEventRow {
    payment_id: String,
    status: String,
    customer_data: Json<CustomerData>,
    products: Json<Vec<Product>>,
    total_amount: Decimal,
    tracking_parameters: Json<TrackingParameters>,
    created_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PendingEventRow> for PendingPaymentEvent {
    type Error = PipelineError;

    fn try_from(row: PendingEventRow) -> Result<Self, Self::Error> {
        Ok(PendingPaymentEvent {
            payment_id: PaymentId::new(row.payment_id)?,
            status: PaymentStatus::try_from(row.status.as_str())?,
            customer: row.customer_data.0,
            products: row.products.0,
            total_amount: row.total_amount,
            tracking: row.tracking_parameters.0,
            created_at: row.created_at,
            approved_at: row.approved_at,
            updated_at: row.updated_at,
        })
    }
}

fn status_strings(statuses: &[PaymentStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// `pending_payment_events` backed by PostgreSQL.
#[derive(Clone)]
pub struct PgPendingEventStore {
    pool: PgPool,
}

impl PgPendingEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_inner(&self, event: &PendingPaymentEvent) -> Result<(), PipelineError> {
        // A terminal row keeps its status; the engine never regresses one,
        // but a late duplicate create must not either.
        sqlx::query(
            r#"
            INSERT INTO pending_payment_events
                (id, payment_id, status, customer_data, products, total_amount,
                 tracking_parameters, created_at, approved_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (payment_id) DO UPDATE
            SET status = CASE
                    WHEN pending_payment_events.status IN ('waiting_payment', 'pending')
                    THEN EXCLUDED.status
                    ELSE pending_payment_events.status
                END,
                approved_at = CASE
                    WHEN pending_payment_events.status IN ('waiting_payment', 'pending')
                    THEN EXCLUDED.approved_at
                    ELSE pending_payment_events.approved_at
                END,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(event.payment_id.as_str())
        .bind(event.status.as_str())
        .bind(Json(&event.customer))
        .bind(Json(&event.products))
        .bind(event.total_amount)
        .bind(Json(&event.tracking))
        .bind(event.created_at)
        .bind(event.approved_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_inner(
        &self,
        id: &PaymentId,
    ) -> Result<Option<PendingPaymentEvent>, PipelineError> {
        let row: Option<PendingEventRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM pending_payment_events WHERE payment_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PendingPaymentEvent::try_from).transpose()
    }

    async fn transition_inner(
        &self,
        id: &PaymentId,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, PipelineError> {
        // Conditional update: concurrent first observers race here and
        // exactly one of them sees rows_affected = 1.
        let result = sqlx::query(
            r#"
            UPDATE pending_payment_events
            SET status = $2,
                updated_at = $3,
                approved_at = CASE WHEN $2 = 'paid' THEN $3 ELSE approved_at END
            WHERE payment_id = $1
              AND status IN ('waiting_payment', 'pending')
            "#,
        )
        .bind(id.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_stale_inner(
        &self,
        query: &StaleQuery,
    ) -> Result<Vec<PendingPaymentEvent>, PipelineError> {
        let rows: Vec<PendingEventRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM pending_payment_events
            WHERE status = ANY($1)
              AND created_at < $2
              AND created_at >= $3
            ORDER BY last_swept_at NULLS FIRST, created_at
            LIMIT $4
            "#
        ))
        .bind(status_strings(&query.statuses))
        .bind(query.created_before)
        .bind(query.created_after)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PendingPaymentEvent::try_from).collect()
    }

    async fn mark_swept_inner(
        &self,
        id: &PaymentId,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        sqlx::query("UPDATE pending_payment_events SET last_swept_at = $2 WHERE payment_id = $1")
            .bind(id.as_str())
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn purge_inner(&self, older_than: DateTime<Utc>) -> Result<u64, PipelineError> {
        let result = sqlx::query(
            "DELETE FROM pending_payment_events WHERE status = ANY($1) AND updated_at < $2",
        )
        .bind(status_strings(&PaymentStatus::TERMINAL))
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

impl PendingEventStore for PgPendingEventStore {
    fn upsert<'a>(
        &'a self,
        event: &'a PendingPaymentEvent,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(self.upsert_inner(event))
    }

    fn get_by_payment_id<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<Option<PendingPaymentEvent>, PipelineError>> {
        Box::pin(self.get_inner(id))
    }

    fn transition<'a>(
        &'a self,
        id: &'a PaymentId,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<bool, PipelineError>> {
        Box::pin(self.transition_inner(id, to, at))
    }

    fn list_stale<'a>(
        &'a self,
        query: &'a StaleQuery,
    ) -> BoxFuture<'a, Result<Vec<PendingPaymentEvent>, PipelineError>> {
        Box::pin(self.list_stale_inner(query))
    }

    fn mark_swept<'a>(
        &'a self,
        id: &'a PaymentId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(self.mark_swept_inner(id, at))
    }

    fn purge(&self, older_than: DateTime<Utc>) -> BoxFuture<'_, Result<u64, PipelineError>> {
        Box::pin(self.purge_inner(older_than))
    }
}
