//! HTTP client for the payment API.
//!
//! Gated behind the `client` cargo feature so crates that only need the
//! shared types do not pull in `reqwest`.

mod invoice;

pub use invoice::InvoiceClient;
