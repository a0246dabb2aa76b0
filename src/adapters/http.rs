use {
    crate::{
        AppState,
        adapters::{api_errors::ApiError, webhook},
        domain::{
            id::PaymentId,
            payment::{CustomerData, DeliveryAddress, PaymentStatus, Product, TrackingParameters},
            provider::{ChargeRequest, CreatedCharge},
        },
    },
    axum::{
        Json, Router,
        extract::{DefaultBodyLimit, Path, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    },
    chrono::Utc,
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::time::Duration,
    tower_http::timeout::TimeoutLayer,
};

// Charge creation makes two sequential gateway calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

pub fn router(state: AppState) -> Router {
    let timeout = TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT);

    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/payments", post(create_payment_handler))
        .route("/payments/{payment_id}/status", get(payment_status_handler))
        .route(
            "/webhook/mangofy",
            post(webhook::mangofy_webhook_handler).get(webhook::mangofy_webhook_health),
        )
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(timeout)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    /// Major units.
    pub amount: Decimal,
    pub customer: CustomerData,
    #[serde(default)]
    pub items: Vec<Product>,
    pub delivery_address: DeliveryAddress,
    #[serde(default)]
    pub tracking: TrackingParameters,
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

pub async fn create_payment_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<CreatedCharge>, ApiError> {
    let charge = state
        .reconciler
        .create_charge(ChargeRequest {
            amount: request.amount,
            customer: CustomerData {
                ip: client_ip(&headers),
                ..request.customer
            },
            items: request.items,
            delivery_address: request.delivery_address,
            tracking: request.tracking,
        })
        .await?;

    Ok(Json(charge))
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub paid: bool,
    pub terminal: bool,
    /// `None` tells the client to stop polling.
    pub poll_again_in_secs: Option<u64>,
}

pub async fn payment_status_handler(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let payment_id = PaymentId::new(payment_id)?;
    let max_elapsed = chrono::Duration::from_std(state.poll.max_elapsed)
        .unwrap_or_else(|_| chrono::Duration::days(365));
    let event = state.reconciler.poll(&payment_id, max_elapsed).await?;

    let poll_again_in_secs = event
        .poll_window_open(Utc::now(), max_elapsed)
        .then_some(state.poll.interval.as_secs());

    Ok(Json(PaymentStatusResponse {
        payment_id: event.payment_id,
        status: event.status,
        paid: event.status == PaymentStatus::Paid,
        terminal: event.status.is_terminal(),
        poll_again_in_secs,
    }))
}
