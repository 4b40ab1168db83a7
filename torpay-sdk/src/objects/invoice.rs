//! Invoice objects and their lenient wire representations.
//!
//! The API has changed field names over time (`wallet` / `dest` / `addr`,
//! `amount` / `amount_crypto`) and sends decimals as either strings or
//! numbers, so responses are first read into the `Raw*` structs and then
//! normalized into [`Invoice`] and [`InvoiceStatusReport`].

use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::identifiers::{CryptoCode, InvoiceId};
use super::payment_request::PaymentRequestBody;
use crate::service::ServiceError;

/// Fallback message when the API rejects a request without explaining why.
const GENERIC_CREATION_FAILURE: &str = "Payment creation failed";

/// Status of an invoice as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Pending,
    Partial,
    Paid,
    Overpaid,
    Expired,
}

impl InvoiceStatus {
    /// Interpret a remote status string, case-insensitively.
    ///
    /// Anything unrecognized (`UNPAID`, empty, future values) is treated as
    /// still pending.
    pub fn from_remote(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PARTIAL" => InvoiceStatus::Partial,
            // Legacy servers report late payments as `paid-expired`.
            "PAID" | "PAID-EXPIRED" | "PAID_EXPIRED" => InvoiceStatus::Paid,
            "OVERPAID" => InvoiceStatus::Overpaid,
            "EXPIRED" => InvoiceStatus::Expired,
            _ => InvoiceStatus::Pending,
        }
    }

    /// `PAID` and `OVERPAID` both complete the payment.
    pub fn is_paid(self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Overpaid)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceStatus::Pending => write!(f, "PENDING"),
            InvoiceStatus::Partial => write!(f, "PARTIAL"),
            InvoiceStatus::Paid => write!(f, "PAID"),
            InvoiceStatus::Overpaid => write!(f, "OVERPAID"),
            InvoiceStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A payment request issued by the server for one crypto.
///
/// Amounts and the exchange rate are fixed at creation time. Only `status`
/// changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub crypto: CryptoCode,
    /// Destination address to pay.
    pub address: String,
    pub amount_crypto: Decimal,
    pub amount_fiat: Decimal,
    pub fiat: CompactString,
    pub exchange_rate: Option<Decimal>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub status: InvoiceStatus,
}

/// Invoice expiry as sent on the wire: epoch milliseconds or RFC 3339.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    FractionalMillis(f64),
    Text(String),
}

impl RawTimestamp {
    fn to_datetime(&self) -> Option<OffsetDateTime> {
        match self {
            RawTimestamp::Millis(ms) => from_millis(i128::from(*ms)),
            RawTimestamp::FractionalMillis(ms) if ms.is_finite() => from_millis(*ms as i128),
            RawTimestamp::FractionalMillis(_) => None,
            RawTimestamp::Text(text) => OffsetDateTime::parse(text.trim(), &Rfc3339)
                .ok()
                .or_else(|| text.trim().parse::<i64>().ok().and_then(|ms| from_millis(ms.into()))),
        }
    }
}

fn from_millis(ms: i128) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(ms.checked_mul(1_000_000)?).ok()
}

/// Body of a `payment_request` response before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInvoice {
    pub status: Option<String>,
    pub message: Option<String>,
    pub msg: Option<String>,
    pub id: Option<InvoiceId>,
    pub crypto: Option<CryptoCode>,
    pub wallet: Option<String>,
    pub dest: Option<String>,
    pub addr: Option<String>,
    pub amount: Option<Decimal>,
    pub amount_crypto: Option<Decimal>,
    pub amount_fiat: Option<Decimal>,
    pub fiat: Option<CompactString>,
    pub exchange_rate: Option<Decimal>,
    pub expires_at: Option<RawTimestamp>,
}

impl RawInvoice {
    /// The server's explanation, if the body carries the error marker.
    pub fn error_message(&self) -> Option<String> {
        let is_error = self
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("error"));
        is_error.then(|| self.message().unwrap_or(GENERIC_CREATION_FAILURE).to_owned())
    }

    /// `message` or the older `msg` field.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().or(self.msg.as_deref())
    }

    /// Normalize into an [`Invoice`].
    ///
    /// Missing fields fall back to the request that produced the invoice;
    /// an absent or unreadable expiry becomes `received_at + ttl`.
    pub fn into_invoice(
        self,
        crypto: &CryptoCode,
        request: &PaymentRequestBody,
        received_at: OffsetDateTime,
        ttl: std::time::Duration,
    ) -> Result<Invoice, ServiceError> {
        if let Some(message) = self.error_message() {
            return Err(ServiceError::Rejected(message));
        }

        let id = self.id.ok_or(ServiceError::MalformedInvoice("missing id"))?;
        let address = self
            .wallet
            .or(self.dest)
            .or(self.addr)
            .filter(|a| !a.trim().is_empty())
            .ok_or(ServiceError::MalformedInvoice("missing destination address"))?;
        let amount_crypto = self
            .amount_crypto
            .or(self.amount)
            .ok_or(ServiceError::MalformedInvoice("missing crypto amount"))?;

        let expires_at = match self.expires_at.as_ref().and_then(RawTimestamp::to_datetime) {
            Some(at) => at,
            None => time::Duration::try_from(ttl)
                .ok()
                .and_then(|ttl| received_at.checked_add(ttl))
                .ok_or(ServiceError::MalformedInvoice("invoice ttl out of range"))?,
        };

        Ok(Invoice {
            id,
            crypto: self.crypto.unwrap_or_else(|| crypto.clone()),
            address,
            amount_crypto,
            amount_fiat: self.amount_fiat.unwrap_or(request.amount),
            fiat: self.fiat.unwrap_or_else(|| request.fiat.clone()),
            exchange_rate: self.exchange_rate,
            expires_at,
            status: self
                .status
                .as_deref()
                .map(InvoiceStatus::from_remote)
                .unwrap_or(InvoiceStatus::Pending),
        })
    }
}

/// Result of one status check, handed to the host on payment completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceStatusReport {
    pub status: InvoiceStatus,
    /// The status string exactly as the server sent it.
    pub raw_status: String,
    pub id: Option<InvoiceId>,
    pub amount_crypto: Option<Decimal>,
    pub balance_crypto: Option<Decimal>,
    pub balance_fiat: Option<Decimal>,
}

impl InvoiceStatusReport {
    pub fn from_status(raw_status: impl Into<String>) -> Self {
        let raw_status = raw_status.into();
        Self {
            status: InvoiceStatus::from_remote(&raw_status),
            raw_status,
            id: None,
            amount_crypto: None,
            balance_crypto: None,
            balance_fiat: None,
        }
    }
}

/// Body of an invoice status response before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStatusReport {
    pub status: Option<String>,
    pub message: Option<String>,
    pub id: Option<InvoiceId>,
    pub amount_crypto: Option<Decimal>,
    pub balance_crypto: Option<Decimal>,
    pub balance_fiat: Option<Decimal>,
}

impl RawStatusReport {
    pub fn into_report(self) -> Result<InvoiceStatusReport, ServiceError> {
        let raw_status = self.status.unwrap_or_default();
        if raw_status.eq_ignore_ascii_case("error") {
            return Err(ServiceError::Rejected(
                self.message.unwrap_or_else(|| "Status check failed".to_owned()),
            ));
        }
        Ok(InvoiceStatusReport {
            status: InvoiceStatus::from_remote(&raw_status),
            raw_status,
            id: self.id,
            amount_crypto: self.amount_crypto,
            balance_crypto: self.balance_crypto,
            balance_fiat: self.balance_fiat,
        })
    }
}
