//! Offline invoice service for demo pages.
//!
//! Issues invoices with fixed addresses and rates so the widget can be shown
//! without a merchant account. Every status check reports `PENDING`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::config::DEFAULT_INVOICE_TTL;
use crate::objects::{
    CryptoCode, Invoice, InvoiceId, InvoiceStatus, InvoiceStatusReport, PaymentRequestBody,
};
use crate::service::{InvoiceService, ServiceError};

/// Fiat amount the demo rates are quoted for.
const REFERENCE_FIAT_AMOUNT: Decimal = Decimal::from_parts(9_999, 0, 0, false, 2);

/// `(code, address, crypto amount for REFERENCE_FIAT_AMOUNT)`; the amount is
/// given as `(mantissa, scale)`.
const DEMO_WALLETS: &[(&str, &str, i64, u32)] = &[
    ("BTC", "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh", 102, 5),
    ("LTC", "ltc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh", 108, 2),
    ("ETH", "0x742d35Cc6634C0532925a3b844Bc9e7595f8A3B2", 28, 3),
    (
        "XMR",
        "48VcTstRuRU9F3NM9RJJy8pXuZLYaGkKcZ3FBV9xM4r8fH7qB3CfHDz9J7gHQZ2qWDgXrLT5cZmWLbK4F8WdJuVVVQ2rXSd",
        52,
        2,
    ),
    ("USDT-TRC20", "TN2HNzHV7uNGPNmxKbLJ7cP6VyLq4yCCms", 9_999, 2),
    ("USDT-ERC20", "0x742d35Cc6634C0532925a3b844Bc9e7595f8A3B2", 9_999, 2),
    ("TRX", "TN2HNzHV7uNGPNmxKbLJ7cP6VyLq4yCCms", 4_855, 1),
    ("DOGE", "DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L", 2_486, 1),
];

/// Invoice service that never leaves the process.
#[derive(Debug, Clone)]
pub struct DemoInvoiceService {
    invoice_ttl: Duration,
}

impl DemoInvoiceService {
    pub fn new() -> Self {
        Self {
            invoice_ttl: DEFAULT_INVOICE_TTL,
        }
    }

    pub fn with_invoice_ttl(mut self, ttl: Duration) -> Self {
        self.invoice_ttl = ttl;
        self
    }

    /// Build the demo invoice for `crypto`. Unknown cryptos borrow the
    /// bitcoin wallet and a nominal rate.
    pub fn invoice_for(
        &self,
        crypto: &CryptoCode,
        body: &PaymentRequestBody,
    ) -> Result<Invoice, ServiceError> {
        let (address, reference_amount) = DEMO_WALLETS
            .iter()
            .find(|(code, ..)| *code == crypto.as_str())
            .or_else(|| DEMO_WALLETS.first())
            .map(|(_, address, mantissa, scale)| (*address, Decimal::new(*mantissa, *scale)))
            .ok_or(ServiceError::MalformedInvoice("no demo wallet configured"))?;

        let amount_crypto = body
            .amount
            .checked_div(REFERENCE_FIAT_AMOUNT)
            .and_then(|ratio| reference_amount.checked_mul(ratio))
            .map(|amount| amount.round_dp(8).normalize())
            .ok_or(ServiceError::MalformedInvoice("demo amount out of range"))?;
        let exchange_rate = REFERENCE_FIAT_AMOUNT
            .checked_div(reference_amount)
            .map(|rate| rate.round_dp(2));

        let expires_at = time::Duration::try_from(self.invoice_ttl)
            .ok()
            .and_then(|ttl| time::OffsetDateTime::now_utc().checked_add(ttl))
            .ok_or(ServiceError::MalformedInvoice("invoice ttl out of range"))?;

        Ok(Invoice {
            id: InvoiceId::new(format!("demo-{}", uuid::Uuid::new_v4().simple())),
            crypto: crypto.clone(),
            address: address.to_owned(),
            amount_crypto,
            amount_fiat: body.amount,
            fiat: body.fiat.clone(),
            exchange_rate,
            expires_at,
            status: InvoiceStatus::Pending,
        })
    }
}

impl Default for DemoInvoiceService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvoiceService for DemoInvoiceService {
    async fn create_payment_request(
        &self,
        crypto: &CryptoCode,
        body: &PaymentRequestBody,
    ) -> Result<Invoice, ServiceError> {
        tracing::debug!(%crypto, external_id = %body.external_id, "Issuing demo invoice");
        self.invoice_for(crypto, body)
    }

    async fn invoice_status(&self, id: &InvoiceId) -> Result<InvoiceStatusReport, ServiceError> {
        Ok(InvoiceStatusReport {
            id: Some(id.clone()),
            ..InvoiceStatusReport::from_status("PENDING")
        })
    }
}
