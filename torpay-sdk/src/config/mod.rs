//! Configuration types for the TorPay checkout widget.
//!
//! [`WidgetConfig`] enumerates every recognized option with its default.
//! It is validated once when the widget is initialized; nothing is filled
//! in lazily afterwards.

mod widget;

pub use widget::{
    DEFAULT_API_KEY_HEADER, DEFAULT_AUTO_CLOSE_DELAY, DEFAULT_COUNTDOWN_TICK,
    DEFAULT_INVOICE_TTL, DEFAULT_POLL_INTERVAL, Endpoint, WidgetConfig,
};

use crate::objects::CryptoCode;
use thiserror::Error;

/// A required option is missing or invalid.
///
/// Raised before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("apiKey is required")]
    MissingApiKey,

    #[error("baseUrl is required")]
    MissingBaseUrl,

    #[error("invalid baseUrl: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("invalid API key header name: {0}")]
    InvalidApiKeyHeader(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("amount must be greater than zero, got {0}")]
    InvalidAmount(rust_decimal::Decimal),

    #[error("fiat currency code is required")]
    EmptyCurrency,

    #[error("crypto code is required")]
    EmptyCrypto,

    #[error("{0} is not one of the offered cryptos")]
    CryptoNotOffered(CryptoCode),
}
