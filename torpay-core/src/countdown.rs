//! Countdown process.
//!
//! Ticks against the fixed expiry of an invoice, reports the remaining time
//! as `mm:ss` and raises the one-shot `Expired` event when it reaches zero.
//! It never retries: if the clock cannot be read, the tick is skipped and
//! the poll process alone governs the outcome.

use crate::clock::Clock;
use crate::events::{SessionEvent, SessionEventKind, SessionEventSender};
use crate::session::Generation;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Value shown by the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountdownDisplay {
    /// Whole minutes and seconds left, rendered as `mm:ss`.
    Remaining { minutes: u64, seconds: u8 },
    /// Sentinel shown once the invoice expired.
    Expired,
}

impl CountdownDisplay {
    /// Display for a remaining duration. Zero or less is [`Expired`].
    ///
    /// [`Expired`]: CountdownDisplay::Expired
    pub fn from_remaining(remaining: time::Duration) -> Self {
        if remaining <= time::Duration::ZERO {
            return CountdownDisplay::Expired;
        }
        Self::from_seconds(remaining.whole_seconds().unsigned_abs())
    }

    fn from_seconds(total: u64) -> Self {
        CountdownDisplay::Remaining {
            minutes: total / 60,
            seconds: (total % 60) as u8,
        }
    }

    /// Seconds left, `None` once expired.
    pub fn total_seconds(&self) -> Option<u64> {
        match self {
            CountdownDisplay::Remaining { minutes, seconds } => {
                Some(minutes * 60 + u64::from(*seconds))
            }
            CountdownDisplay::Expired => None,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, CountdownDisplay::Expired)
    }
}

impl std::fmt::Display for CountdownDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountdownDisplay::Remaining { minutes, seconds } => {
                write!(f, "{minutes:02}:{seconds:02}")
            }
            CountdownDisplay::Expired => write!(f, "Expired"),
        }
    }
}

impl Serialize for CountdownDisplay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The countdown of one session.
pub struct Countdown {
    generation: Generation,
    expires_at: OffsetDateTime,
    clock: Arc<dyn Clock>,
    tick: Duration,
}

impl Countdown {
    pub fn new(
        generation: Generation,
        expires_at: OffsetDateTime,
        clock: Arc<dyn Clock>,
        tick: Duration,
    ) -> Self {
        Self {
            generation,
            expires_at,
            clock,
            tick,
        }
    }

    /// Spawn the countdown onto the runtime.
    pub fn spawn(self, events: SessionEventSender) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    /// Tick until expiry or until the controller goes away.
    ///
    /// The first tick fires immediately. The displayed value never
    /// increases, even if the clock steps backwards.
    pub async fn run(self, events: SessionEventSender) {
        let generation = self.generation;
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut lowest: Option<u64> = None;

        loop {
            ticker.tick().await;

            let Some(now) = self.clock.now() else {
                debug!(%generation, "Clock unavailable, countdown stalled for this tick");
                continue;
            };

            let display = match CountdownDisplay::from_remaining(self.expires_at - now) {
                CountdownDisplay::Remaining { minutes, seconds } => {
                    let total = minutes * 60 + u64::from(seconds);
                    let total = lowest.map_or(total, |low| total.min(low));
                    lowest = Some(total);
                    CountdownDisplay::from_seconds(total)
                }
                CountdownDisplay::Expired => CountdownDisplay::Expired,
            };

            let tick = SessionEvent::new(generation, SessionEventKind::CountdownTick(display));
            if events.send(tick).await.is_err() {
                debug!(%generation, "Controller gone, stopping countdown");
                return;
            }

            if display.is_expired() {
                info!(%generation, expires_at = %self.expires_at, "Invoice expired");
                let _ = events
                    .send(SessionEvent::new(generation, SessionEventKind::Expired))
                    .await;
                return;
            }
        }
    }
}
