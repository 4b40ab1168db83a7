//! Invoice API client (checkout widget → payment API).
//!
//! All requests carry the merchant API key in a header, `X-Torpay-Api-Key`
//! unless configured otherwise.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::config::{ConfigurationError, DEFAULT_API_KEY_HEADER, DEFAULT_INVOICE_TTL, WidgetConfig};
use crate::objects::{
    CryptoCode, Invoice, InvoiceId, InvoiceStatusReport, PaymentRequestBody, RawInvoice,
    RawStatusReport,
};
use crate::service::{InvoiceService, ServiceError};

/// Typed HTTP client for the invoice endpoints of the payment API.
#[derive(Debug, Clone)]
pub struct InvoiceClient {
    http: Client,
    base_url: Url,
    api_key: String,
    api_key_header: String,
    invoice_ttl: Duration,
}

impl InvoiceClient {
    /// Create a new `InvoiceClient`.
    ///
    /// * `base_url` – root URL of the payment API.
    /// * `api_key` – the merchant API key.
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key: api_key.into(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_owned(),
            invoice_ttl: DEFAULT_INVOICE_TTL,
        }
    }

    /// Build a client from a widget configuration, validating its endpoint.
    pub fn from_config(config: &WidgetConfig) -> Result<Self, ConfigurationError> {
        let endpoint = config.endpoint()?;
        Ok(Self::new(endpoint.base_url, endpoint.api_key)
            .with_api_key_header(endpoint.api_key_header)
            .with_invoice_ttl(config.invoice_ttl))
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Send the API key under another header name, e.g. the legacy
    /// `X-Shkeeper-Api-Key`.
    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = header.into();
        self
    }

    /// Lifetime assumed for invoices whose response has no `expires_at`.
    pub fn with_invoice_ttl(mut self, ttl: Duration) -> Self {
        self.invoice_ttl = ttl;
        self
    }

    /// `POST /api/v1/{crypto}/payment_request` – create a payment request.
    #[tracing::instrument(skip_all, err, name = "HTTP:CreatePaymentRequest", fields(%crypto))]
    pub async fn create_payment_request(
        &self,
        crypto: &CryptoCode,
        body: &PaymentRequestBody,
    ) -> Result<Invoice, ServiceError> {
        let url = self.endpoint(&format!(
            "/api/v1/{}/payment_request",
            urlencoding::encode(crypto.as_str())
        ))?;

        let resp = self
            .http
            .post(url)
            .header(self.api_key_header.as_str(), &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        let received_at = time::OffsetDateTime::now_utc();

        if !status.is_success() {
            let message = serde_json::from_slice::<RawInvoice>(&bytes)
                .ok()
                .and_then(|raw| raw.message().map(str::to_owned))
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let raw: RawInvoice = serde_json::from_slice(&bytes)?;
        raw.into_invoice(crypto, body, received_at, self.invoice_ttl)
    }

    /// `GET /api/v1/invoice/{id}/status` – fetch the current invoice status.
    #[tracing::instrument(skip_all, err(level = "debug"), name = "HTTP:GetInvoiceStatus", fields(%id))]
    pub async fn invoice_status(&self, id: &InvoiceId) -> Result<InvoiceStatusReport, ServiceError> {
        let url = self.endpoint(&format!(
            "/api/v1/invoice/{}/status",
            urlencoding::encode(id.as_str())
        ))?;

        let resp = self
            .http
            .get(url)
            .header(self.api_key_header.as_str(), &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let bytes = resp.bytes().await?;
        let raw: RawStatusReport = serde_json::from_slice(&bytes)?;
        raw.into_report()
    }

    /// Append `path` to the base URL, keeping any path prefix it carries.
    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            path
        ))
    }
}

#[async_trait]
impl InvoiceService for InvoiceClient {
    async fn create_payment_request(
        &self,
        crypto: &CryptoCode,
        body: &PaymentRequestBody,
    ) -> Result<Invoice, ServiceError> {
        InvoiceClient::create_payment_request(self, crypto, body).await
    }

    async fn invoice_status(&self, id: &InvoiceId) -> Result<InvoiceStatusReport, ServiceError> {
        InvoiceClient::invoice_status(self, id).await
    }
}
