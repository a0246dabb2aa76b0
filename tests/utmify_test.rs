mod common;

use axum::{Json, Router, extract::State, http::HeaderMap, http::StatusCode, routing::post};
use chrono::{FixedOffset, TimeZone, Utc};
use common::*;
use pix_sync::adapters::utmify::{UtmifyConfig, UtmifyForwarder, build_order_payload, format_utc};
use pix_sync::domain::error::PipelineError;
use pix_sync::domain::money::FeePolicy;
use pix_sync::domain::payment::PaymentStatus;
use pix_sync::domain::provider::{AttributionReport, AttributionSink, AttributionStatus};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

fn paid_report() -> AttributionReport {
    let created = Utc.with_ymd_and_hms(2025, 3, 7, 21, 15, 0).unwrap();
    let mut event = waiting_event("pay_utm", created);
    event.status = PaymentStatus::Paid;
    event.approved_at = Some(Utc.with_ymd_and_hms(2025, 3, 7, 21, 19, 42).unwrap());
    AttributionReport::from_event(&event, AttributionStatus::Paid)
}

#[test]
fn timestamps_are_normalized_to_utc() {
    let sao_paulo = FixedOffset::west_opt(3 * 3600).unwrap();
    let local = sao_paulo.with_ymd_and_hms(2025, 3, 7, 22, 30, 5).unwrap();

    assert_eq!(format_utc(&local), "2025-03-08 01:30:05");
    assert_eq!(
        format_utc(&Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()),
        "2025-01-02 03:04:05"
    );
}

#[test]
fn waiting_payload_has_null_approval_and_plan_fields() {
    let created = Utc.with_ymd_and_hms(2025, 3, 7, 21, 15, 0).unwrap();
    let report = AttributionReport::from_event(
        &waiting_event("pay_wait", created),
        AttributionStatus::WaitingPayment,
    );

    let payload = build_order_payload(&report, "Mangofy", FeePolicy::ZERO).unwrap();
    let json = serde_json::to_value(&payload).unwrap();

    assert_eq!(json["orderId"], "pay_wait");
    assert_eq!(json["platform"], "Mangofy");
    assert_eq!(json["paymentMethod"], "pix");
    assert_eq!(json["status"], "waiting_payment");
    assert_eq!(json["createdAt"], "2025-03-07 21:15:00");
    assert_eq!(json["approvedDate"], Value::Null);
    assert_eq!(json["refundedAt"], Value::Null);
    assert_eq!(json["isTest"], false);
    assert_eq!(json["products"][0]["planId"], Value::Null);
    assert_eq!(json["products"][0]["planName"], Value::Null);
    assert_eq!(json["products"][0]["priceInCents"], 850);
    assert_eq!(json["products"][0]["quantity"], 2);
}

#[test]
fn paid_payload_carries_customer_tracking_and_commission() {
    let payload = build_order_payload(&paid_report(), "Mangofy", FeePolicy::ZERO).unwrap();
    let json = serde_json::to_value(&payload).unwrap();

    assert_eq!(json["status"], "paid");
    assert_eq!(json["approvedDate"], "2025-03-07 21:19:42");
    assert_eq!(json["customer"]["document"], "12345678909");
    assert_eq!(json["customer"]["phone"], "11987654321");
    assert_eq!(json["customer"]["country"], "BR");
    assert_eq!(json["customer"]["ip"], "127.0.0.1");
    assert_eq!(json["trackingParameters"]["utm_source"], "facebook");
    assert_eq!(json["trackingParameters"]["utm_campaign"], "promo-sexta");
    assert_eq!(json["trackingParameters"]["utm_medium"], Value::Null);
    assert_eq!(
        json["commission"],
        json!({
            "totalPriceInCents": 2550,
            "gatewayFeeInCents": 0,
            "userCommissionInCents": 2550,
            "currency": "BRL"
        })
    );
}

#[test]
fn configured_fee_is_deducted_from_commission() {
    let fee = FeePolicy::from_basis_points(200).unwrap();

    let payload = build_order_payload(&paid_report(), "Mangofy", fee).unwrap();

    // 2% of 2550 = 51
    assert_eq!(payload.commission.total_price_in_cents, 2550);
    assert_eq!(payload.commission.gateway_fee_in_cents, 51);
    assert_eq!(payload.commission.user_commission_in_cents, 2499);
}

#[test]
fn captured_shopper_ip_is_forwarded() {
    let mut report = paid_report();
    report.customer.ip = Some("203.0.113.7".into());

    let payload = build_order_payload(&report, "Mangofy", FeePolicy::ZERO).unwrap();

    assert_eq!(payload.customer.ip, "203.0.113.7");
}

#[test]
fn empty_phone_and_document_are_sent_as_null() {
    let mut report = paid_report();
    report.customer.phone = "  ".into();
    report.customer.document = String::new();

    let payload = build_order_payload(&report, "Mangofy", FeePolicy::ZERO).unwrap();

    assert_eq!(payload.customer.phone, None);
    assert_eq!(payload.customer.document, None);
}

// ── HTTP ───────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Received(Arc<Mutex<Vec<(Option<String>, Value)>>>);

async fn orders(
    State(received): State<Received>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let token = headers
        .get("x-api-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let status = if body["orderId"] == "pay_reject" {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    received.0.lock().unwrap().push((token, body));
    (status, Json(json!({ "OK": status == StatusCode::OK })))
}

async fn mock_utmify() -> (String, Received) {
    let received = Received::default();
    let app = Router::new()
        .route("/api-credentials/orders", post(orders))
        .with_state(received.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api-credentials/orders"), received)
}

fn forwarder(api_url: String) -> UtmifyForwarder {
    UtmifyForwarder::new(
        reqwest::Client::new(),
        UtmifyConfig {
            api_url,
            api_token: "utm_token".into(),
            platform: "Mangofy".into(),
            fee_policy: FeePolicy::ZERO,
        },
    )
}

#[tokio::test]
async fn report_posts_payload_with_api_token() {
    let (url, received) = mock_utmify().await;

    forwarder(url).report(&paid_report()).await.unwrap();

    let calls = received.0.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.as_deref(), Some("utm_token"));
    assert_eq!(calls[0].1["orderId"], "pay_utm");
    assert_eq!(calls[0].1["status"], "paid");
}

#[tokio::test]
async fn non_2xx_is_attribution_error() {
    let (url, _) = mock_utmify().await;
    let mut report = paid_report();
    report.payment_id = pid("pay_reject");

    let err = forwarder(url).report(&report).await.unwrap_err();

    match err {
        PipelineError::Attribution(msg) => assert!(msg.contains("500")),
        other => panic!("expected attribution error, got {other:?}"),
    }
}
