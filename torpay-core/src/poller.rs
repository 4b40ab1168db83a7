//! Status poll process.
//!
//! Checks the invoice status once per interval until the invoice is paid or
//! the controller stops it. The loop issues one request, awaits it, then
//! sleeps whatever is left of the interval, so two requests are never in
//! flight at once.
//!
//! Failed checks are swallowed and retried on the next tick. Pending and
//! unrecognized statuses are not reported.

use crate::events::{SessionEvent, SessionEventKind, SessionEventSender};
use crate::session::Generation;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use torpay_sdk::InvoiceService;
use torpay_sdk::objects::{InvoiceId, InvoiceStatus};
use tracing::{debug, info};

/// Why the poll loop woke up.
enum Wake {
    Tick,
    /// The controller asked for a final check, then exit.
    Drain,
    /// The session owning the stop signal is gone.
    Detached,
}

/// The status poll of one session.
pub struct StatusPoller {
    generation: Generation,
    invoice_id: InvoiceId,
    service: Arc<dyn InvoiceService>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(
        generation: Generation,
        invoice_id: InvoiceId,
        service: Arc<dyn InvoiceService>,
        interval: Duration,
    ) -> Self {
        Self {
            generation,
            invoice_id,
            service,
            interval,
        }
    }

    /// Spawn the poll loop onto the runtime.
    pub fn spawn(
        self,
        stop_rx: watch::Receiver<bool>,
        events: SessionEventSender,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(stop_rx, events))
    }

    /// Poll until paid, drained, or detached.
    ///
    /// Setting the stop signal to `true` drains the loop: it finishes the
    /// request in flight, if any, performs one last check so a payment that
    /// landed at expiry time is still seen, and reports `PollDrained` unless
    /// that check found the invoice paid.
    pub async fn run(self, mut stop_rx: watch::Receiver<bool>, events: SessionEventSender) {
        let generation = self.generation;
        let mut next_check = Instant::now() + self.interval;

        debug!(%generation, invoice_id = %self.invoice_id, "Status poll started");

        loop {
            let wake = tokio::select! {
                biased;

                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        Wake::Detached
                    } else if *stop_rx.borrow() {
                        Wake::Drain
                    } else {
                        continue;
                    }
                }

                _ = tokio::time::sleep_until(next_check) => Wake::Tick,
            };

            match wake {
                Wake::Detached => {
                    debug!(%generation, "Session dropped, stopping status poll");
                    return;
                }
                Wake::Tick => {
                    let started = Instant::now();
                    if self.check(&events).await.is_break() {
                        return;
                    }
                    next_check = started + self.interval;
                }
                Wake::Drain => {
                    debug!(%generation, "Draining status poll with a final check");
                    if self.check(&events).await.is_break() {
                        return;
                    }
                    let _ = events
                        .send(SessionEvent::new(generation, SessionEventKind::PollDrained))
                        .await;
                    return;
                }
            }
        }
    }

    /// Issue one status request and report anything worth reporting.
    ///
    /// Breaks once the invoice is paid or the controller is gone.
    async fn check(&self, events: &SessionEventSender) -> ControlFlow<()> {
        let generation = self.generation;
        let report = match self.service.invoice_status(&self.invoice_id).await {
            Ok(report) => report,
            Err(e) => {
                debug!(
                    %generation,
                    invoice_id = %self.invoice_id,
                    error = %e,
                    "Status check failed, retrying on next tick"
                );
                return ControlFlow::Continue(());
            }
        };

        let paid = report.status.is_paid();
        match report.status {
            InvoiceStatus::Paid | InvoiceStatus::Overpaid | InvoiceStatus::Partial => {
                info!(
                    %generation,
                    invoice_id = %self.invoice_id,
                    status = %report.status,
                    "Invoice status changed"
                );
                let event = SessionEvent::new(generation, SessionEventKind::StatusChecked(report));
                if events.send(event).await.is_err() || paid {
                    return ControlFlow::Break(());
                }
            }
            InvoiceStatus::Pending | InvoiceStatus::Expired => {
                debug!(
                    %generation,
                    invoice_id = %self.invoice_id,
                    raw_status = %report.raw_status,
                    "Invoice still pending"
                );
            }
        }
        ControlFlow::Continue(())
    }
}
