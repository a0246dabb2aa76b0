use {
    crate::domain::{
        error::PipelineError,
        id::PaymentId,
        money::MoneyAmount,
        payment::{DEFAULT_CUSTOMER_IP, digits_only},
        provider::{BoxFuture, ChargeRequest, ChargeStatus, CreatedCharge, PaymentGateway},
    },
    chrono::Utc,
    reqwest::{Client, Response, Url},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

const ITEM_NAME_MAX_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct MangofyConfig {
    /// e.g. `https://checkout.mangofy.com.br/api/v1`, no trailing slash.
    pub api_url: String,
    pub api_key: String,
    pub store_code: String,
    /// Our webhook URL; tracking parameters are appended as a query string.
    pub postback_url: String,
    pub pix_expires_in_days: u32,
    pub charge_ttl: chrono::Duration,
}

/// HTTP client for the Mangofy checkout API.
pub struct MangofyGateway {
    client: Client,
    config: MangofyConfig,
    postback_base: Url,
}

impl MangofyGateway {
    pub fn new(client: Client, config: MangofyConfig) -> Result<Self, PipelineError> {
        let postback_base = Url::parse(&config.postback_url).map_err(|e| {
            PipelineError::Validation(format!("invalid postback url {}: {e}", config.postback_url))
        })?;
        Ok(Self {
            client,
            config,
            postback_base,
        })
    }

    fn postback_url(&self, request: &ChargeRequest) -> String {
        let mut url = self.postback_base.clone();
        url.query_pairs_mut()
            .extend_pairs(request.tracking.query_pairs().iter());
        url.into()
    }

    fn payment_url(&self, code: &str) -> String {
        format!("{}/payment/{code}", self.config.api_url)
    }

    fn build_body(&self, request: &ChargeRequest) -> Result<CreatePaymentBody, PipelineError> {
        let items = request
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let unit = MoneyAmount::from_major(item.unit_price)?;
                let line_total = item
                    .unit_price
                    .checked_mul(Decimal::from(item.quantity))
                    .ok_or_else(|| {
                        PipelineError::Validation(format!("line total overflow for {}", item.id))
                    })?;
                let line = MoneyAmount::from_major(line_total)?;
                Ok(ItemBody {
                    code: format!("item-{}", index + 1),
                    name: item.name.chars().take(ITEM_NAME_MAX_CHARS).collect(),
                    amount: unit.cents(),
                    total: line.cents(),
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let address = &request.delivery_address;
        Ok(CreatePaymentBody {
            store_code: self.config.store_code.clone(),
            external_code: format!("order-{}", Uuid::now_v7()),
            payment_method: "pix",
            payment_format: "regular",
            installments: 1,
            payment_amount: MoneyAmount::from_major(request.amount)?.cents(),
            shipping_amount: 0,
            postback_url: self.postback_url(request),
            items: (!items.is_empty()).then_some(items),
            customer: CustomerBody {
                email: request.customer.email.clone(),
                name: request.customer.name.clone(),
                document: digits_only(&request.customer.document),
                phone: digits_only(&request.customer.phone),
                ip: request
                    .customer
                    .ip
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CUSTOMER_IP.to_string()),
            },
            pix: PixBody {
                expires_in_days: self.config.pix_expires_in_days,
            },
            shipping: ShippingBody {
                street: address.street.clone(),
                street_number: address.number.clone(),
                complement: address
                    .complement
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| "Não informado".to_string()),
                neighborhood: address.neighborhood.clone(),
                city: address.city.clone(),
                state: address.state.clone(),
                zip_code: digits_only(&address.zip_code),
                country: "BR",
            },
        })
    }

    async fn fetch_details(&self, code: &str) -> Result<serde_json::Value, PipelineError> {
        let response = self
            .client
            .get(self.payment_url(code))
            .header("Authorization", &self.config.api_key)
            .header("Store-Code", &self.config.store_code)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(PipelineError::gateway_transport)?;

        let response = ensure_success(response).await?;
        response
            .json()
            .await
            .map_err(PipelineError::gateway_transport)
    }

    async fn create_charge_inner(
        &self,
        request: &ChargeRequest,
    ) -> Result<CreatedCharge, PipelineError> {
        let body = self.build_body(request)?;

        let response = self
            .client
            .post(format!("{}/payment", self.config.api_url))
            .header("Authorization", &self.config.api_key)
            .header("Store-Code", &self.config.store_code)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(PipelineError::gateway_transport)?;

        let created: CreatePaymentResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(PipelineError::gateway_transport)?;

        let details: PaymentDetails =
            serde_json::from_value(self.fetch_details(&created.payment_code).await?)?;
        let data = details.data.unwrap_or_default();
        let pix = data.pix.unwrap_or_default();

        let payment_id = PaymentId::new(data.payment_code.unwrap_or(created.payment_code))?;
        let qr_code_image = pix
            .pix_link
            .filter(|b64| !b64.is_empty())
            .map(|b64| format!("data:image/png;base64,{b64}"))
            .unwrap_or_default();

        tracing::info!(
            payment_id = %payment_id,
            external_code = %body.external_code,
            amount = body.payment_amount,
            "pix charge created"
        );

        Ok(CreatedCharge {
            payment_id,
            status: data
                .payment_status
                .or(created.payment_status)
                .unwrap_or_else(|| "pending".to_string()),
            qr_code_image,
            pix_copy_paste: pix.pix_qrcode_text.unwrap_or_default(),
            expires_at: Utc::now() + self.config.charge_ttl,
        })
    }

    async fn get_charge_status_inner(&self, id: &PaymentId) -> Result<ChargeStatus, PipelineError> {
        let raw = self.fetch_details(id.as_str()).await?;
        let status = raw
            .pointer("/data/payment_status")
            .and_then(|v| v.as_str())
            .unwrap_or("pending")
            .to_string();
        Ok(ChargeStatus { status, raw })
    }
}

impl PaymentGateway for MangofyGateway {
    fn create_charge<'a>(
        &'a self,
        request: &'a ChargeRequest,
    ) -> BoxFuture<'a, Result<CreatedCharge, PipelineError>> {
        Box::pin(self.create_charge_inner(request))
    }

    fn get_charge_status<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<ChargeStatus, PipelineError>> {
        Box::pin(self.get_charge_status_inner(id))
    }
}

/// Non-2xx becomes `Gateway` carrying the provider's raw body.
async fn ensure_success(response: Response) -> Result<Response, PipelineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::Gateway {
        status: Some(status.as_u16()),
        body,
    })
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CreatePaymentBody {
    store_code: String,
    external_code: String,
    payment_method: &'static str,
    payment_format: &'static str,
    installments: u32,
    payment_amount: i64,
    shipping_amount: i64,
    postback_url: String,
    items: Option<Vec<ItemBody>>,
    customer: CustomerBody,
    pix: PixBody,
    shipping: ShippingBody,
}

#[derive(Debug, Serialize)]
struct ItemBody {
    code: String,
    name: String,
    amount: i64,
    total: i64,
}

#[derive(Debug, Serialize)]
struct CustomerBody {
    email: String,
    name: String,
    document: String,
    phone: String,
    ip: String,
}

#[derive(Debug, Serialize)]
struct PixBody {
    expires_in_days: u32,
}

#[derive(Debug, Serialize)]
struct ShippingBody {
    street: String,
    street_number: String,
    complement: String,
    neighborhood: String,
    city: String,
    state: String,
    zip_code: String,
    country: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentResponse {
    payment_code: String,
    #[serde(default)]
    payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentDetails {
    #[serde(default)]
    data: Option<PaymentDetailsData>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentDetailsData {
    #[serde(default)]
    payment_code: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    pix: Option<PixDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct PixDetails {
    #[serde(default)]
    pix_qrcode_text: Option<String>,
    #[serde(default)]
    pix_link: Option<String>,
}
