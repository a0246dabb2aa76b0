use {
    super::error::PipelineError,
    super::id::PaymentId,
    super::payment::{
        CustomerData, DeliveryAddress, PendingPaymentEvent, Product, TrackingParameters,
    },
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    serde::Serialize,
    std::{future::Future, pin::Pin},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything the gateway needs to open a PIX charge.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Major units.
    pub amount: Decimal,
    pub customer: CustomerData,
    pub items: Vec<Product>,
    pub delivery_address: DeliveryAddress,
    /// Embedded in the postback URL so the webhook can recover them.
    pub tracking: TrackingParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedCharge {
    pub payment_id: PaymentId,
    /// Raw provider status at creation time.
    pub status: String,
    /// `data:image/png;base64,...` or empty when the provider sent none.
    pub qr_code_image: String,
    pub pix_copy_paste: String,
    pub expires_at: DateTime<Utc>,
}

/// Current provider-side view of a charge.
#[derive(Debug, Clone)]
pub struct ChargeStatus {
    pub status: String,
    pub raw: serde_json::Value,
}

pub trait PaymentGateway: Send + Sync {
    fn create_charge<'a>(
        &'a self,
        request: &'a ChargeRequest,
    ) -> BoxFuture<'a, Result<CreatedCharge, PipelineError>>;

    fn get_charge_status<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<ChargeStatus, PipelineError>>;
}

/// Lifecycle stages the attribution sink is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionStatus {
    WaitingPayment,
    Paid,
}

/// Snapshot handed to the attribution sink.
#[derive(Debug, Clone)]
pub struct AttributionReport {
    pub payment_id: PaymentId,
    pub status: AttributionStatus,
    pub customer: CustomerData,
    pub products: Vec<Product>,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub tracking: TrackingParameters,
    pub approved_at: Option<DateTime<Utc>>,
}

impl AttributionReport {
    pub fn from_event(event: &PendingPaymentEvent, status: AttributionStatus) -> Self {
        Self {
            payment_id: event.payment_id.clone(),
            status,
            customer: event.customer.clone(),
            products: event.products.clone(),
            total_amount: event.total_amount,
            created_at: event.created_at,
            tracking: event.tracking.clone(),
            approved_at: event.approved_at,
        }
    }
}

/// Not idempotent on the receiving side: every successful call is a new
/// record there. Implementations report failures as `Err` and never panic.
pub trait AttributionSink: Send + Sync {
    fn report<'a>(
        &'a self,
        report: &'a AttributionReport,
    ) -> BoxFuture<'a, Result<(), PipelineError>>;
}
