//! Invoice lifecycle controller of the TorPay checkout widget.
//!
//! A modal instance owns at most one [`session`] at a time: one invoice plus
//! its expiry [`countdown`] and its status [`poller`]. The [`controller`]
//! reconciles both processes, applies host commands (close, currency
//! switch) and discards results that belong to superseded sessions.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod controller;
pub mod countdown;
pub mod error;
pub mod events;
pub mod params;
pub mod poller;
pub mod session;
pub mod view;
pub mod widget;

pub use error::CreationError;
pub use params::{HostCallbacks, PaymentRequestParams};
pub use view::{ModalView, ModalViewState};
pub use widget::{CheckoutWidget, ModalHandle};
