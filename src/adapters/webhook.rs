use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{
            error::PipelineError,
            id::PaymentId,
            payment::{Observation, ObservationSource, PaymentStatus, TrackingParameters},
        },
    },
    axum::{
        Json,
        extract::{Query, State},
        http::{HeaderMap, Uri, header::AUTHORIZATION},
    },
    hmac::{Hmac, Mac},
    serde::Deserialize,
    sha2::Sha256,
};

/// Mangofy postback body. Fields may sit at the top level or under `data`.
#[derive(Debug, Default, Deserialize)]
struct PostbackPayload {
    #[serde(default)]
    payment_code: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    data: Option<PostbackData>,
}

#[derive(Debug, Default, Deserialize)]
struct PostbackData {
    #[serde(default)]
    payment_code: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

type HmacSha256 = Hmac<Sha256>;

/// The shared secret may be sent bare or as a bearer token.
pub fn is_authorized(headers: &HeaderMap, secret: &str) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let value = value.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    !secret.is_empty() && secrets_match(token, secret)
}

// Both sides are MACed under the secret so the comparison is constant time
// and independent of the presented token's length.
fn secrets_match(presented: &str, secret: &str) -> bool {
    let tag = |input: &[u8]| {
        HmacSha256::new_from_slice(secret.as_bytes()).map(|mut mac| {
            mac.update(input);
            mac
        })
    };
    let (Ok(expected), Ok(candidate)) = (tag(secret.as_bytes()), tag(presented.as_bytes())) else {
        return false;
    };
    candidate
        .verify_slice(&expected.finalize().into_bytes())
        .is_ok()
}

fn ack(ok: bool) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": ok }))
}

/// Provider push notifications. Everything past authentication answers 200
/// so Mangofy does not start retrying; failures are only logged.
#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(payment_id = tracing::field::Empty, payment_status = tracing::field::Empty)
)]
pub async fn mangofy_webhook_handler(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !is_authorized(&headers, &state.webhook_secret) {
        tracing::warn!("webhook rejected: bad or missing credentials");
        return Err(PipelineError::Unauthorized.into());
    }

    let payload: PostbackPayload = match serde_json::from_str(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "webhook body is not valid JSON");
            return Ok(ack(false));
        }
    };

    let data = payload.data.unwrap_or_default();
    let payment_code = payload.payment_code.or(data.payment_code);
    let raw_status = payload.payment_status.or(data.payment_status);

    let span = tracing::Span::current();
    if let Some(code) = &payment_code {
        span.record("payment_id", tracing::field::display(code));
    }
    if let Some(status) = &raw_status {
        span.record("payment_status", tracing::field::display(status));
    }

    let Some(status) = raw_status.as_deref().and_then(PaymentStatus::from_provider) else {
        tracing::info!("unmapped payment status, acknowledged and ignored");
        return Ok(ack(true));
    };

    let payment_id = match payment_code.map(PaymentId::new) {
        Some(Ok(id)) => id,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "webhook with invalid payment_code");
            return Ok(ack(false));
        }
        None => {
            tracing::warn!("webhook without payment_code");
            return Ok(ack(false));
        }
    };

    // Tracking fields ride on our own postback URL, not in the body.
    let tracking = match Query::<TrackingParameters>::try_from_uri(&uri) {
        Ok(Query(t)) => t,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable tracking query string");
            TrackingParameters::default()
        }
    };

    let observation = Observation {
        payment_id,
        status,
        source: ObservationSource::Webhook,
        tracking_hint: Some(tracking),
    };

    match state.reconciler.observe(observation).await {
        Ok(outcome) => {
            tracing::info!(?outcome, "webhook processed");
            Ok(ack(true))
        }
        Err(e) => {
            tracing::error!(error = %e, "webhook processing failed");
            Ok(ack(false))
        }
    }
}

pub async fn mangofy_webhook_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true, "route": "/webhook/mangofy" }))
}
