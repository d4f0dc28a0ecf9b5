use serde::Serialize;

/// Adapter failures are classified so callers can apply distinct retry
/// policy instead of treating every provider error the same.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider authentication failed: {0}")]
    Auth(String),
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("provider rejected the request: {0}")]
    Permanent(String),
    #[error("webhook verification failed: {0}")]
    Verification(String),
    #[error("malformed provider payload: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate idempotency key")]
    DuplicateIdempotencyKey,
    #[error("payment not found")]
    PaymentNotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("invalid request: {0}")]
    Client(String),
    #[error("provider not found: {0}")]
    ProviderNotFound(String),
    #[error("duplicate idempotency key")]
    Conflict,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
    #[error("compensating write failed after provider error (provider: {provider}, persistence: {persistence})")]
    Compensation {
        provider: ProviderError,
        persistence: StoreError,
    },
    #[error("webhook verification failed: {0}")]
    Verification(String),
    #[error("payment not found for {0}")]
    NotFound(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            error: ErrorPayload {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }
}
