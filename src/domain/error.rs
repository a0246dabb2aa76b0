use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("store: {0}")]
    Store(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Non-2xx or transport failure from the payment provider. `status` is
    /// `None` when the request never got an HTTP response.
    #[error("gateway ({status:?}): {body}")]
    Gateway { status: Option<u16>, body: String },

    #[error("attribution: {0}")]
    Attribution(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("unknown payment: {0}")]
    UnknownPayment(String),
}

impl PipelineError {
    pub fn gateway_transport(err: reqwest::Error) -> Self {
        Self::Gateway {
            status: None,
            body: err.to_string(),
        }
    }
}
