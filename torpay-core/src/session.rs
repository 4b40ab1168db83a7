//! One invoice session of a modal instance.
//!
//! A session owns the task handles of every process spawned for it. Closing
//! the session aborts them all, and once closed no event tagged with its
//! generation is accepted again.

use crate::countdown::CountdownDisplay;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use torpay_sdk::objects::{CryptoCode, Invoice, InvoiceStatus};
use tracing::debug;

/// Identity of a session within its modal instance.
///
/// Strictly increasing: a replacement session always gets a larger value
/// than the one it replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn first() -> Self {
        Generation(1)
    }

    pub fn next(self) -> Self {
        Generation(self.0.saturating_add(1))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome latched by a session. Once set it never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Paid,
    Expired,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the creation request.
    Creating,
    /// Countdown and poll are running.
    Running,
    /// The countdown hit zero, the poll performs its final check.
    Draining,
    Latched(Terminal),
}

#[derive(Default)]
struct Tasks {
    creation: Option<JoinHandle<()>>,
    countdown: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
    drain_deadline: Option<JoinHandle<()>>,
    auto_close: Option<JoinHandle<()>>,
}

impl Tasks {
    fn abort_all(&mut self) {
        for handle in [
            self.creation.take(),
            self.countdown.take(),
            self.poll.take(),
            self.drain_deadline.take(),
            self.auto_close.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

pub struct Session {
    generation: Generation,
    crypto: CryptoCode,
    invoice: Option<Invoice>,
    countdown: Option<CountdownDisplay>,
    phase: Phase,
    tasks: Tasks,
    poll_stop: watch::Sender<bool>,
    closed: bool,
}

impl Session {
    pub fn new(generation: Generation, crypto: CryptoCode) -> Self {
        let (poll_stop, _) = watch::channel(false);
        Self {
            generation,
            crypto,
            invoice: None,
            countdown: None,
            phase: Phase::Creating,
            tasks: Tasks::default(),
            poll_stop,
            closed: false,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn crypto(&self) -> &CryptoCode {
        &self.crypto
    }

    pub fn invoice(&self) -> Option<&Invoice> {
        self.invoice.as_ref()
    }

    pub fn countdown(&self) -> Option<CountdownDisplay> {
        self.countdown
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn terminal(&self) -> Option<Terminal> {
        match self.phase {
            Phase::Latched(terminal) => Some(terminal),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether an event tagged `generation` may still change this session.
    pub fn accepts(&self, generation: Generation) -> bool {
        !self.closed && self.generation == generation
    }

    /// Receiver for the poll process. `true` asks it to drain.
    pub fn poll_stop_signal(&self) -> watch::Receiver<bool> {
        self.poll_stop.subscribe()
    }

    pub fn set_creation_task(&mut self, handle: JoinHandle<()>) {
        self.tasks.creation = Some(handle);
    }

    pub fn set_drain_deadline_task(&mut self, handle: JoinHandle<()>) {
        self.tasks.drain_deadline = Some(handle);
    }

    pub fn set_auto_close_task(&mut self, handle: JoinHandle<()>) {
        self.tasks.auto_close = Some(handle);
    }

    /// Record the created invoice and the processes watching it.
    pub fn start(&mut self, invoice: Invoice, countdown: JoinHandle<()>, poll: JoinHandle<()>) {
        self.invoice = Some(invoice);
        self.tasks.creation = None;
        self.tasks.countdown = Some(countdown);
        self.tasks.poll = Some(poll);
        self.phase = Phase::Running;
    }

    /// The only invoice field that changes after creation.
    pub fn set_invoice_status(&mut self, status: InvoiceStatus) {
        if let Some(invoice) = self.invoice.as_mut() {
            invoice.status = status;
        }
    }

    pub fn set_countdown(&mut self, display: CountdownDisplay) {
        self.countdown = Some(display);
    }

    /// Latch a terminal outcome. Returns `false` if one was already latched.
    ///
    /// The poll and the drain deadline stop with the latch.
    pub fn latch(&mut self, terminal: Terminal) -> bool {
        if let Phase::Latched(existing) = self.phase {
            debug!(
                generation = %self.generation,
                ?existing,
                ?terminal,
                "Terminal outcome already latched"
            );
            return false;
        }
        self.phase = Phase::Latched(terminal);
        for handle in [self.tasks.poll.take(), self.tasks.drain_deadline.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
        true
    }

    pub fn stop_countdown(&mut self) {
        if let Some(handle) = self.tasks.countdown.take() {
            handle.abort();
        }
    }

    /// Ask the poll for one final check. Only moves a running session.
    pub fn drain_poll(&mut self) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        self.phase = Phase::Draining;
        self.tasks.countdown = None;
        let _ = self.poll_stop.send(true);
        true
    }

    /// Stop every process of this session. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.tasks.abort_all();
        debug!(generation = %self.generation, crypto = %self.crypto, "Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
