//! What the host renders.
//!
//! [`ModalView`] is a projection of the controller state. Only the
//! controller writes it; the host observes it through a watch channel.

use crate::countdown::CountdownDisplay;
use serde::Serialize;
use smallvec::SmallVec;
use torpay_sdk::objects::{CryptoCode, Invoice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModalViewState {
    Loading,
    AwaitingPayment,
    Partial,
    Paid,
    Expired,
    Error,
}

impl ModalViewState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ModalViewState::Paid | ModalViewState::Expired | ModalViewState::Error
        )
    }
}

impl std::fmt::Display for ModalViewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModalViewState::Loading => "LOADING",
            ModalViewState::AwaitingPayment => "AWAITING_PAYMENT",
            ModalViewState::Partial => "PARTIAL",
            ModalViewState::Paid => "PAID",
            ModalViewState::Expired => "EXPIRED",
            ModalViewState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Snapshot of one modal instance.
///
/// `offered` is the modal chrome and survives currency switches. The
/// invoice, countdown and error belong to the current session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalView {
    pub state: ModalViewState,
    pub crypto: Option<CryptoCode>,
    pub offered: SmallVec<[CryptoCode; 4]>,
    pub invoice: Option<Invoice>,
    pub countdown: Option<CountdownDisplay>,
    pub error: Option<String>,
    pub closed: bool,
}

impl ModalView {
    pub fn loading(crypto: CryptoCode, offered: SmallVec<[CryptoCode; 4]>) -> Self {
        Self {
            state: ModalViewState::Loading,
            crypto: Some(crypto),
            offered,
            invoice: None,
            countdown: None,
            error: None,
            closed: false,
        }
    }

    /// Whether the crypto tabs should be shown.
    pub fn can_switch(&self) -> bool {
        !self.closed && self.offered.len() > 1 && self.state != ModalViewState::Paid
    }
}
