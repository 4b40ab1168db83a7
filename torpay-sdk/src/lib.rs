//! SDK for the TorPay checkout widget.
//!
//! Shared wire types, the widget configuration and the [`InvoiceService`]
//! seam used by `torpay-core`. The reqwest-backed [`client::InvoiceClient`]
//! is gated behind the `client` feature (enabled by default).

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod demo;
pub mod objects;
pub mod service;

pub use config::{ConfigurationError, WidgetConfig};
pub use service::{InvoiceService, ServiceError};
