//! The invoice service seam.
//!
//! The lifecycle controller only ever talks to the payment API through
//! [`InvoiceService`], so the transport can be the reqwest client, the
//! offline demo service, or a scripted double in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::objects::{CryptoCode, Invoice, InvoiceId, InvoiceStatusReport, PaymentRequestBody};

/// Errors produced by an [`InvoiceService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[cfg(feature = "client")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status code.
    #[error("api error: status {status}: {message}")]
    Api { status: u16, message: String },

    /// The body carried the `"status": "error"` marker.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The endpoint URL could not be built.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The body parsed but lacks fields an invoice cannot do without.
    #[error("malformed invoice: {0}")]
    MalformedInvoice(&'static str),
}

impl ServiceError {
    /// Message suitable for the error view of the modal.
    pub fn user_message(&self) -> String {
        match self {
            #[cfg(feature = "client")]
            ServiceError::Http(_) => "Network error".to_owned(),
            ServiceError::Api { message, .. } | ServiceError::Rejected(message) => message.clone(),
            ServiceError::Json(_) => "Failed to parse response".to_owned(),
            ServiceError::Url(_) | ServiceError::MalformedInvoice(_) => {
                "Payment creation failed".to_owned()
            }
        }
    }
}

/// Remote operations the widget needs from the payment API.
#[async_trait]
pub trait InvoiceService: Send + Sync {
    /// Create a payment request for `crypto`.
    async fn create_payment_request(
        &self,
        crypto: &CryptoCode,
        body: &PaymentRequestBody,
    ) -> Result<Invoice, ServiceError>;

    /// Fetch the current status of an invoice.
    async fn invoice_status(&self, id: &InvoiceId) -> Result<InvoiceStatusReport, ServiceError>;
}
