//! Wall-clock sources for the countdown.

use time::OffsetDateTime;

/// Source of the current wall-clock time.
///
/// Returning `None` means the clock is unavailable; the countdown then
/// skips the tick instead of failing.
pub trait Clock: Send + Sync {
    fn now(&self) -> Option<OffsetDateTime>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Option<OffsetDateTime> {
        Some(OffsetDateTime::now_utc())
    }
}

/// Wall time anchored once and advanced by the tokio clock.
///
/// Follows `tokio::time::pause` / `advance`, which makes countdowns
/// deterministic under a paused runtime.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor_wall: OffsetDateTime,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::anchored_at(OffsetDateTime::now_utc())
    }

    /// A clock reading `wall` right now.
    pub fn anchored_at(wall: OffsetDateTime) -> Self {
        Self {
            anchor_wall: wall,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Option<OffsetDateTime> {
        let elapsed = time::Duration::try_from(self.anchor.elapsed()).ok()?;
        self.anchor_wall.checked_add(elapsed)
    }
}
