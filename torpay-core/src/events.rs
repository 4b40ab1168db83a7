//! Events and commands consumed by the modal controller.
//!
//! Session processes never touch controller state. They send
//! [`SessionEvent`]s tagged with the [`Generation`] of the session that
//! spawned them, and the controller drops every event whose tag is not the
//! active session's.

use crate::countdown::CountdownDisplay;
use crate::session::Generation;
use tokio::sync::mpsc;
use torpay_sdk::ServiceError;
use torpay_sdk::objects::{CryptoCode, Invoice, InvoiceStatusReport};

/// Default buffer size for the controller channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// Something a session process observed.
#[derive(Debug)]
pub struct SessionEvent {
    pub generation: Generation,
    pub kind: SessionEventKind,
}

impl SessionEvent {
    pub fn new(generation: Generation, kind: SessionEventKind) -> Self {
        Self { generation, kind }
    }
}

#[derive(Debug)]
pub enum SessionEventKind {
    /// The invoice creation request resolved.
    Created(Result<Invoice, ServiceError>),
    /// The countdown recomputed its display value.
    CountdownTick(CountdownDisplay),
    /// The countdown reached zero. Sent once per session.
    Expired,
    /// A status check returned a non-pending status.
    StatusChecked(InvoiceStatusReport),
    /// The poll stopped after its final check without seeing a payment.
    PollDrained,
    /// The final check did not finish within one poll interval of expiry.
    DrainDeadline,
    /// The post-payment auto-close delay elapsed.
    AutoCloseDue,
}

/// Host request for a modal instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalCommand {
    /// Replace the session with one for another offered crypto.
    SwitchCrypto(CryptoCode),
    /// Close the modal.
    Close,
}

/// Sender handle for session events.
pub type SessionEventSender = mpsc::Sender<SessionEvent>;
/// Receiver handle for session events.
pub type SessionEventReceiver = mpsc::Receiver<SessionEvent>;

/// Sender handle for modal commands.
pub type ModalCommandSender = mpsc::Sender<ModalCommand>;
/// Receiver handle for modal commands.
pub type ModalCommandReceiver = mpsc::Receiver<ModalCommand>;

/// Create a new session event channel.
///
/// Every process spawned for a session gets a clone of the sender.
pub fn session_event_channel() -> (SessionEventSender, SessionEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new modal command channel.
pub fn modal_command_channel() -> (ModalCommandSender, ModalCommandReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
