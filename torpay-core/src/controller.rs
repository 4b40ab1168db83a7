//! Invoice lifecycle controller.
//!
//! One controller task runs per open modal. It owns the active [`Session`]
//! and is the only writer of the [`ModalView`]. It reacts to:
//! - host commands (`Close`, `SwitchCrypto`), always handled first
//! - session events sent by the creation request, the countdown, the status
//!   poll and the auto-close timer
//!
//! Every session event carries the generation of the session that spawned
//! its process. Events of a closed or replaced session are dropped on
//! arrival, so a response already in flight when the session was torn down
//! never reaches the view.
//!
//! Terminal outcomes are latched per session. Expiry does not latch right
//! away: the poll is drained first so that a payment confirmed by the
//! request in flight still wins. The drain is bounded by one poll interval.

use crate::clock::Clock;
use crate::countdown::{Countdown, CountdownDisplay};
use crate::error::CreationError;
use crate::events::{
    ModalCommand, ModalCommandReceiver, SessionEvent, SessionEventKind, SessionEventReceiver,
    SessionEventSender, session_event_channel,
};
use crate::params::ResolvedParams;
use crate::poller::StatusPoller;
use crate::session::{Generation, Phase, Session, Terminal};
use crate::view::{ModalView, ModalViewState};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use torpay_sdk::config::{DEFAULT_AUTO_CLOSE_DELAY, DEFAULT_COUNTDOWN_TICK, DEFAULT_POLL_INTERVAL};
use torpay_sdk::objects::{CryptoCode, Invoice, InvoiceStatus, InvoiceStatusReport};
use torpay_sdk::{InvoiceService, ServiceError, WidgetConfig};
use tracing::{debug, info, warn};

/// Buffer of the state transition broadcast.
const TRANSITION_BUFFER: usize = 16;

/// Timer settings of a modal instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub poll_interval: Duration,
    pub countdown_tick: Duration,
    pub auto_close_delay: Duration,
}

impl Timings {
    pub fn from_config(config: &WidgetConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            countdown_tick: config.countdown_tick,
            auto_close_delay: config.auto_close_delay,
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            countdown_tick: DEFAULT_COUNTDOWN_TICK,
            auto_close_delay: DEFAULT_AUTO_CLOSE_DELAY,
        }
    }
}

// ---------------------------------------------------------------------------
// ModalController
// ---------------------------------------------------------------------------

pub struct ModalController {
    service: Arc<dyn InvoiceService>,
    clock: Arc<dyn Clock>,
    timings: Timings,
    params: ResolvedParams,
    /// The active session. `None` only before the first one opens and after
    /// the modal closed.
    session: Option<Session>,
    next_generation: Generation,
    view_tx: watch::Sender<ModalView>,
    transitions_tx: broadcast::Sender<ModalViewState>,
    events_tx: SessionEventSender,
    events_rx: SessionEventReceiver,
    commands: ModalCommandReceiver,
}

impl ModalController {
    pub fn new(
        service: Arc<dyn InvoiceService>,
        clock: Arc<dyn Clock>,
        timings: Timings,
        params: ResolvedParams,
        commands: ModalCommandReceiver,
    ) -> Self {
        let (view_tx, _) = watch::channel(ModalView::loading(
            params.crypto.clone(),
            params.offered.clone(),
        ));
        let (transitions_tx, _) = broadcast::channel(TRANSITION_BUFFER);
        let (events_tx, events_rx) = session_event_channel();
        Self {
            service,
            clock,
            timings,
            params,
            session: None,
            next_generation: Generation::first(),
            view_tx,
            transitions_tx,
            events_tx,
            events_rx,
            commands,
        }
    }

    /// Observe the rendered view.
    pub fn subscribe_view(&self) -> watch::Receiver<ModalView> {
        self.view_tx.subscribe()
    }

    /// Observe state transitions. Subscribe before [`run`](Self::run) to see
    /// the initial `Loading`.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<ModalViewState> {
        self.transitions_tx.subscribe()
    }

    /// Open the first session and process commands and events until the
    /// modal closes.
    ///
    /// Dropping every command sender closes the modal without invoking
    /// `on_close`.
    pub async fn run(mut self) {
        let crypto = self.params.crypto.clone();
        info!(
            %crypto,
            amount = %self.params.amount,
            fiat = %self.params.currency,
            order_id = %self.params.order_id,
            "Payment modal opened"
        );
        self.open_session(crypto);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    let flow = match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("Modal handle dropped, closing modal");
                            self.close(false);
                            ControlFlow::Break(())
                        }
                    };
                    if flow.is_break() {
                        break;
                    }
                }

                Some(event) = self.events_rx.recv() => {
                    if self.handle_event(event).is_break() {
                        break;
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: ModalCommand) -> ControlFlow<()> {
        match command {
            ModalCommand::Close => {
                self.close(true);
                ControlFlow::Break(())
            }
            ModalCommand::SwitchCrypto(crypto) => {
                self.switch_crypto(crypto);
                ControlFlow::Continue(())
            }
        }
    }

    /// Apply one session event. Breaks when the modal closed.
    fn handle_event(&mut self, event: SessionEvent) -> ControlFlow<()> {
        let SessionEvent { generation, kind } = event;
        let accepted = self
            .session
            .as_ref()
            .is_some_and(|session| session.accepts(generation));
        if !accepted {
            debug!(%generation, ?kind, "Discarding event of a superseded session");
            return ControlFlow::Continue(());
        }

        match kind {
            SessionEventKind::Created(Ok(invoice)) => self.on_invoice_created(invoice),
            SessionEventKind::Created(Err(e)) => self.on_creation_failed(e),
            SessionEventKind::CountdownTick(display) => self.on_countdown_tick(display),
            SessionEventKind::Expired => self.on_expired(),
            SessionEventKind::StatusChecked(report) => self.on_status(report),
            SessionEventKind::PollDrained => self.latch_expired(),
            SessionEventKind::DrainDeadline => self.on_drain_deadline(),
            SessionEventKind::AutoCloseDue => return self.on_auto_close(),
        }
        ControlFlow::Continue(())
    }

    // -- Session lifecycle ---------------------------------------------------

    /// Replace the active session with a fresh one for `crypto` and request
    /// its invoice.
    fn open_session(&mut self, crypto: CryptoCode) {
        let generation = self.next_generation;
        self.next_generation = generation.next();

        let mut session = Session::new(generation, crypto.clone());
        let service = self.service.clone();
        let body = self.params.request_body();
        let events = self.events_tx.clone();
        let code = crypto.clone();
        session.set_creation_task(tokio::spawn(async move {
            let result = service.create_payment_request(&code, &body).await;
            let event = SessionEvent::new(generation, SessionEventKind::Created(result));
            if events.send(event).await.is_err() {
                warn!(%generation, "Controller gone before the invoice was created");
            }
        }));

        if let Some(mut previous) = self.session.replace(session) {
            previous.close();
        }
        info!(%generation, %crypto, "Session opened");

        self.view_tx
            .send_replace(ModalView::loading(crypto, self.params.offered.clone()));
        let _ = self.transitions_tx.send(ModalViewState::Loading);
    }

    fn switch_crypto(&mut self, crypto: CryptoCode) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if self.params.offered.len() < 2 || !self.params.offers(&crypto) {
            warn!(%crypto, "Ignoring switch to a crypto that is not offered");
            return;
        }
        if session.crypto() == &crypto {
            debug!(%crypto, "Ignoring switch to the current crypto");
            return;
        }
        if session.terminal() == Some(Terminal::Paid) {
            debug!(%crypto, "Ignoring switch after payment");
            return;
        }

        info!(
            generation = %session.generation(),
            from = %session.crypto(),
            to = %crypto,
            "Switching crypto"
        );
        self.open_session(crypto);
    }

    /// Tear down the session and mark the view closed.
    fn close(&mut self, notify_host: bool) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.view_tx.send_modify(|view| view.closed = true);
        info!(notify_host, "Payment modal closed");
        if notify_host {
            self.params.callbacks.close();
        }
    }

    // -- Session events ------------------------------------------------------

    fn on_invoice_created(&mut self, invoice: Invoice) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase() != Phase::Creating {
            return;
        }
        let generation = session.generation();
        info!(
            %generation,
            invoice_id = %invoice.id,
            crypto = %invoice.crypto,
            expires_at = %invoice.expires_at,
            "Invoice created"
        );

        let countdown = Countdown::new(
            generation,
            invoice.expires_at,
            self.clock.clone(),
            self.timings.countdown_tick,
        )
        .spawn(self.events_tx.clone());
        let poll = StatusPoller::new(
            generation,
            invoice.id.clone(),
            self.service.clone(),
            self.timings.poll_interval,
        )
        .spawn(session.poll_stop_signal(), self.events_tx.clone());
        session.start(invoice.clone(), countdown, poll);

        self.update_view(|view| {
            view.state = ModalViewState::AwaitingPayment;
            view.invoice = Some(invoice.clone());
            view.error = None;
        });
        self.params.callbacks.success(&invoice);
    }

    fn on_creation_failed(&mut self, error: ServiceError) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.latch(Terminal::Error) {
            return;
        }
        let error = CreationError::from(error);
        warn!(
            generation = %session.generation(),
            crypto = %session.crypto(),
            error = %error,
            "Invoice creation failed"
        );

        let message = error.message().to_owned();
        self.update_view(|view| {
            view.state = ModalViewState::Error;
            view.error = Some(message);
        });
        self.params.callbacks.error(&error);
    }

    fn on_countdown_tick(&mut self, shown: CountdownDisplay) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.terminal() == Some(Terminal::Paid) {
            return;
        }
        debug!(generation = %session.generation(), countdown = %shown, "Countdown tick");
        session.set_countdown(shown);
        self.update_view(|view| view.countdown = Some(shown));
    }

    fn on_expired(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.drain_poll() {
            return;
        }
        let generation = session.generation();
        info!(%generation, "Countdown reached zero, draining status poll");

        let events = self.events_tx.clone();
        let deadline = self.timings.poll_interval;
        session.set_drain_deadline_task(tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = events
                .send(SessionEvent::new(generation, SessionEventKind::DrainDeadline))
                .await;
        }));
    }

    fn on_status(&mut self, report: InvoiceStatusReport) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !matches!(session.phase(), Phase::Running | Phase::Draining) {
            debug!(
                generation = %session.generation(),
                status = %report.status,
                "Ignoring status after terminal outcome"
            );
            return;
        }
        let generation = session.generation();

        match report.status {
            InvoiceStatus::Paid | InvoiceStatus::Overpaid => {
                session.latch(Terminal::Paid);
                session.stop_countdown();
                session.set_invoice_status(report.status);

                let events = self.events_tx.clone();
                let delay = self.timings.auto_close_delay;
                session.set_auto_close_task(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events
                        .send(SessionEvent::new(generation, SessionEventKind::AutoCloseDue))
                        .await;
                }));
                info!(%generation, status = %report.status, "Invoice paid");

                let status = report.status;
                self.update_view(|view| {
                    view.state = ModalViewState::Paid;
                    if let Some(invoice) = view.invoice.as_mut() {
                        invoice.status = status;
                    }
                });
                self.params.callbacks.payment_complete(&report);
            }
            InvoiceStatus::Partial => {
                session.set_invoice_status(InvoiceStatus::Partial);
                self.update_view(|view| {
                    view.state = ModalViewState::Partial;
                    if let Some(invoice) = view.invoice.as_mut() {
                        invoice.status = InvoiceStatus::Partial;
                    }
                });
            }
            InvoiceStatus::Pending | InvoiceStatus::Expired => {}
        }
    }

    fn on_drain_deadline(&mut self) {
        let stalled = self
            .session
            .as_ref()
            .filter(|session| session.phase() == Phase::Draining);
        if let Some(session) = stalled {
            warn!(
                generation = %session.generation(),
                "Final status check still in flight, expiring anyway"
            );
        }
        self.latch_expired();
    }

    /// Latch `Expired` if the session is still draining.
    fn latch_expired(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase() != Phase::Draining || !session.latch(Terminal::Expired) {
            return;
        }
        session.set_countdown(CountdownDisplay::Expired);
        info!(generation = %session.generation(), "Invoice expired");
        self.update_view(|view| {
            view.state = ModalViewState::Expired;
            view.countdown = Some(CountdownDisplay::Expired);
        });
    }

    fn on_auto_close(&mut self) -> ControlFlow<()> {
        let paid = self
            .session
            .as_ref()
            .is_some_and(|session| session.terminal() == Some(Terminal::Paid));
        if !paid {
            return ControlFlow::Continue(());
        }
        debug!("Auto-close delay elapsed");
        self.close(true);
        ControlFlow::Break(())
    }

    /// Modify the view and broadcast the new state if it changed.
    fn update_view(&self, f: impl FnOnce(&mut ModalView)) {
        let mut changed = None;
        self.view_tx.send_modify(|view| {
            let before = view.state;
            f(view);
            if view.state != before {
                changed = Some(view.state);
            }
        });
        if let Some(state) = changed {
            debug!(%state, "Modal state changed");
            let _ = self.transitions_tx.send(state);
        }
    }
}
