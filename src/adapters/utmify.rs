use {
    crate::domain::{
        error::PipelineError,
        money::{FeePolicy, MoneyAmount},
        payment::{DEFAULT_CUSTOMER_IP, TrackingParameters, digits_only},
        provider::{AttributionReport, AttributionSink, AttributionStatus, BoxFuture},
    },
    chrono::{DateTime, TimeZone, Utc},
    reqwest::Client,
    serde::Serialize,
};

#[derive(Debug, Clone)]
pub struct UtmifyConfig {
    pub api_url: String,
    pub api_token: String,
    /// Reported as `platform`, e.g. "Mangofy".
    pub platform: String,
    pub fee_policy: FeePolicy,
}

/// Forwards order lifecycle events to the UTMify orders API.
pub struct UtmifyForwarder {
    client: Client,
    config: UtmifyConfig,
}

impl UtmifyForwarder {
    pub fn new(client: Client, config: UtmifyConfig) -> Self {
        Self { client, config }
    }

    async fn report_inner(&self, report: &AttributionReport) -> Result<(), PipelineError> {
        let payload =
            build_order_payload(report, &self.config.platform, self.config.fee_policy)?;

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-token", &self.config.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::Attribution(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Attribution(format!(
                "UTMify returned {}: {body}",
                status.as_u16()
            )));
        }

        tracing::info!(
            payment_id = %report.payment_id,
            status = ?report.status,
            "attribution event sent"
        );
        Ok(())
    }
}

impl AttributionSink for UtmifyForwarder {
    fn report<'a>(
        &'a self,
        report: &'a AttributionReport,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(self.report_inner(report))
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC, whatever zone `ts` was recorded in.
pub fn format_utc<Tz: TimeZone>(ts: &DateTime<Tz>) -> String {
    ts.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn build_order_payload(
    report: &AttributionReport,
    platform: &str,
    fee_policy: FeePolicy,
) -> Result<OrderPayload, PipelineError> {
    let products = report
        .products
        .iter()
        .map(|p| {
            Ok(OrderProduct {
                id: p.id.clone(),
                name: p.name.clone(),
                plan_id: None,
                plan_name: None,
                quantity: p.quantity,
                price_in_cents: MoneyAmount::from_major(p.unit_price)?.cents(),
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    let total = MoneyAmount::from_major(report.total_amount)?;
    let fee = fee_policy.fee_for(total);
    let net = total.checked_sub(fee).unwrap_or(MoneyAmount::ZERO);

    let non_empty = |s: String| (!s.is_empty()).then_some(s);

    Ok(OrderPayload {
        order_id: report.payment_id.to_string(),
        platform: platform.to_string(),
        payment_method: "pix",
        status: report.status,
        created_at: format_utc(&report.created_at),
        approved_date: report.approved_at.as_ref().map(format_utc),
        refunded_at: None,
        customer: OrderCustomer {
            name: report.customer.name.clone(),
            email: report.customer.email.clone(),
            phone: non_empty(digits_only(&report.customer.phone)),
            document: non_empty(digits_only(&report.customer.document)),
            country: "BR",
            ip: report
                .customer
                .ip
                .clone()
                .unwrap_or_else(|| DEFAULT_CUSTOMER_IP.to_string()),
        },
        products,
        tracking_parameters: report.tracking.clone(),
        commission: Commission {
            total_price_in_cents: total.cents(),
            gateway_fee_in_cents: fee.cents(),
            user_commission_in_cents: net.cents(),
            currency: "BRL",
        },
        is_test: false,
    })
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order_id: String,
    pub platform: String,
    pub payment_method: &'static str,
    pub status: AttributionStatus,
    pub created_at: String,
    pub approved_date: Option<String>,
    pub refunded_at: Option<String>,
    pub customer: OrderCustomer,
    pub products: Vec<OrderProduct>,
    /// Snake-case keys on the wire; absent values are sent as `null`.
    pub tracking_parameters: TrackingParameters,
    pub commission: Commission,
    pub is_test: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderCustomer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub document: Option<String>,
    pub country: &'static str,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProduct {
    pub id: String,
    pub name: String,
    pub plan_id: Option<String>,
    pub plan_name: Option<String>,
    pub quantity: u32,
    pub price_in_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub total_price_in_cents: i64,
    pub gateway_fee_in_cents: i64,
    pub user_commission_in_cents: i64,
    pub currency: &'static str,
}
