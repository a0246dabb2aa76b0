use {
    super::error::PipelineError,
    super::id::PaymentId,
    chrono::{DateTime, Duration, Utc},
    derive_more::Display,
    rust_decimal::Decimal,
    serde::{Deserialize, Deserializer, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    WaitingPayment,
    Pending,
    Paid,
    Refused,
    Refunded,
    Chargedback,
}

impl PaymentStatus {
    pub const OPEN: [PaymentStatus; 2] = [Self::WaitingPayment, Self::Pending];

    pub const TERMINAL: [PaymentStatus; 4] =
        [Self::Paid, Self::Refused, Self::Refunded, Self::Chargedback];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingPayment => "waiting_payment",
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refused => "refused",
            Self::Refunded => "refunded",
            Self::Chargedback => "chargedback",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::WaitingPayment | Self::Pending)
    }

    /// `pending` and `waiting_payment` are the same state for transition
    /// purposes; every other state is terminal and absorbs.
    pub fn can_transition_to(&self, next: &PaymentStatus) -> bool {
        !self.is_terminal() && next.is_terminal()
    }

    /// Mangofy `payment_status` vocabulary. Unknown values map to `None`
    /// and are ignored by every observation path.
    pub fn from_provider(raw: &str) -> Option<Self> {
        match raw.trim() {
            "waiting_payment" => Some(Self::WaitingPayment),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Paid),
            "reproved" | "canceled" | "expired" => Some(Self::Refused),
            _ => None,
        }
    }

    /// What to do when `observed` arrives for a record currently in `self`.
    pub fn decide(&self, observed: PaymentStatus) -> Transition {
        if self.is_terminal() {
            return Transition::AlreadyTerminal(*self);
        }
        match observed {
            PaymentStatus::Paid => Transition::MarkPaid,
            other if self.can_transition_to(&other) => Transition::Close(other),
            _ => Transition::Unchanged,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "waiting_payment" => Ok(Self::WaitingPayment),
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "refused" => Ok(Self::Refused),
            "refunded" => Ok(Self::Refunded),
            "chargedback" => Ok(Self::Chargedback),
            other => Err(PipelineError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Stored status already terminal: replayed webhook or repeated poll.
    AlreadyTerminal(PaymentStatus),
    /// Observation is still an open status; nothing to write.
    Unchanged,
    MarkPaid,
    /// Terminal but not paid (refused/refunded/chargedback). Not forwarded.
    Close(PaymentStatus),
}

/// Which independent path produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ObservationSource {
    #[display("poll")]
    Poll,
    #[display("webhook")]
    Webhook,
    #[display("sweep")]
    Sweep,
}

/// A status seen by one of the observation paths.
#[derive(Debug, Clone)]
pub struct Observation {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub source: ObservationSource,
    /// Tracking fields recovered outside the store (webhook query string).
    /// Only fills gaps in the stored snapshot.
    pub tracking_hint: Option<TrackingParameters>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerData {
    pub name: String,
    pub email: String,
    /// CPF/CNPJ as entered.
    pub document: String,
    pub phone: String,
    /// Shopper IP as seen by the ingress; never taken from the request body.
    #[serde(default)]
    pub ip: Option<String>,
}

/// Sent to both providers when the shopper IP is unknown.
pub const DEFAULT_CUSTOMER_IP: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Major units.
    pub unit_price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub zip_code: String,
    pub street: String,
    pub number: String,
    #[serde(default)]
    pub complement: Option<String>,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

/// Marketing attribution fields captured when the charge is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingParameters {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub src: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub sck: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub utm_source: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub utm_medium: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub utm_content: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub utm_term: Option<String>,
}

impl TrackingParameters {
    /// All seven keys in wire order; absent values become empty strings so
    /// the postback URL always carries the full set.
    pub fn query_pairs(&self) -> [(&'static str, &str); 7] {
        fn v(f: &Option<String>) -> &str {
            f.as_deref().unwrap_or("")
        }
        [
            ("src", v(&self.src)),
            ("sck", v(&self.sck)),
            ("utm_source", v(&self.utm_source)),
            ("utm_campaign", v(&self.utm_campaign)),
            ("utm_medium", v(&self.utm_medium)),
            ("utm_content", v(&self.utm_content)),
            ("utm_term", v(&self.utm_term)),
        ]
    }

    /// Keep every field already set; fill the rest from `fallback`.
    pub fn or(self, fallback: &TrackingParameters) -> TrackingParameters {
        TrackingParameters {
            src: self.src.or_else(|| fallback.src.clone()),
            sck: self.sck.or_else(|| fallback.sck.clone()),
            utm_source: self.utm_source.or_else(|| fallback.utm_source.clone()),
            utm_campaign: self.utm_campaign.or_else(|| fallback.utm_campaign.clone()),
            utm_medium: self.utm_medium.or_else(|| fallback.utm_medium.clone()),
            utm_content: self.utm_content.or_else(|| fallback.utm_content.clone()),
            utm_term: self.utm_term.or_else(|| fallback.utm_term.clone()),
        }
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Strip everything but ASCII digits (CPF, phone, CEP).
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// One row of `pending_payment_events`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingPaymentEvent {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub customer: CustomerData,
    pub products: Vec<Product>,
    /// Major units, as charged.
    pub total_amount: Decimal,
    pub tracking: TrackingParameters,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PendingPaymentEvent {
    /// Fresh record for a charge that was just created at the gateway.
    pub fn waiting(
        payment_id: PaymentId,
        customer: CustomerData,
        products: Vec<Product>,
        total_amount: Decimal,
        tracking: TrackingParameters,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            payment_id,
            status: PaymentStatus::WaitingPayment,
            customer,
            products,
            total_amount,
            tracking,
            created_at: now,
            approved_at: None,
            updated_at: now,
        }
    }

    /// Whether a client poll loop should keep asking about this charge.
    pub fn poll_window_open(&self, now: DateTime<Utc>, max_elapsed: Duration) -> bool {
        !self.status.is_terminal()
            && self
                .created_at
                .checked_add_signed(max_elapsed)
                .is_some_and(|deadline| now < deadline)
    }
}
