#![forbid(unsafe_code)]

//! Throttling for high-frequency preview updates.
//!
//! Pointer-move events can arrive faster than the host renders frames. A
//! drag or resize session produces a new preview for each of them, but the
//! view layer only needs to observe one preview per interval.
//!
//! [`CommitThrottle`] uses a "latest wins" strategy:
//! - The first value after a quiet period is emitted immediately.
//! - Values arriving inside the interval replace any pending value.
//! - [`CommitThrottle::poll`] emits the pending value once the interval has
//!   elapsed; [`CommitThrottle::flush`] emits it unconditionally.
//!
//! Time is always passed in by the caller, so the throttle is deterministic
//! under test.
//!
//! # Usage
//!
//! ```
//! use std::time::{Duration, Instant};
//! use dgrid_core::throttle::CommitThrottle;
//!
//! let start = Instant::now();
//! let mut throttle = CommitThrottle::new(Duration::from_millis(16));
//!
//! // First value passes straight through.
//! assert_eq!(throttle.push(1, start), Some(1));
//! // Inside the window, values coalesce.
//! assert_eq!(throttle.push(2, start + Duration::from_millis(4)), None);
//! assert_eq!(throttle.push(3, start + Duration::from_millis(8)), None);
//! // Once the window passes, the latest value is delivered.
//! assert_eq!(throttle.poll(start + Duration::from_millis(20)), Some(3));
//! ```

use std::time::{Duration, Instant};

/// Default interval between emitted values (one 60 Hz frame).
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(16);

/// Coalesces rapid updates so at most one value is emitted per interval.
///
/// # Thread Safety
///
/// `CommitThrottle` is not thread-safe. It should be driven from the single
/// interaction thread that owns the session.
#[derive(Debug, Clone)]
pub struct CommitThrottle<T> {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: Option<T>,
    coalesced: u64,
}

impl<T> CommitThrottle<T> {
    /// Create a throttle with the given interval. A zero interval passes
    /// every value through.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: None,
            coalesced: 0,
        }
    }

    /// Configured interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Offer a new value.
    ///
    /// Returns `Some(value)` if it should be published now, or `None` if it
    /// was held as the pending value.
    pub fn push(&mut self, value: T, now: Instant) -> Option<T> {
        if self.window_open(now) {
            self.pending = None;
            self.last_emit = Some(now);
            return Some(value);
        }
        if self.pending.replace(value).is_some() {
            self.coalesced = self.coalesced.saturating_add(1);
        }
        None
    }

    /// Timer tick: emit the pending value if the interval has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        if self.pending.is_none() || !self.window_open(now) {
            return None;
        }
        self.last_emit = Some(now);
        self.pending.take()
    }

    /// Emit the pending value regardless of timing.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take()
    }

    /// Discard the pending value and reset timing.
    pub fn clear(&mut self) {
        self.pending = None;
        self.last_emit = None;
    }

    /// Whether a value is waiting for the next window.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Peek at the pending value.
    #[must_use]
    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    /// Number of values overwritten before they could be emitted.
    #[must_use]
    pub const fn coalesced_count(&self) -> u64 {
        self.coalesced
    }

    fn window_open(&self, now: Instant) -> bool {
        match self.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }
}

impl<T> Default for CommitThrottle<T> {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn first_value_passes_through() {
        let now = Instant::now();
        let mut throttle = CommitThrottle::new(16 * MS);
        assert_eq!(throttle.push("a", now), Some("a"));
        assert!(!throttle.has_pending());
    }

    #[test]
    fn values_inside_window_coalesce_latest_wins() {
        let now = Instant::now();
        let mut throttle = CommitThrottle::new(16 * MS);
        assert_eq!(throttle.push(1, now), Some(1));
        assert_eq!(throttle.push(2, now + 2 * MS), None);
        assert_eq!(throttle.push(3, now + 4 * MS), None);
        assert_eq!(throttle.pending(), Some(&3));
        assert_eq!(throttle.coalesced_count(), 1);
    }

    #[test]
    fn poll_waits_for_interval() {
        let now = Instant::now();
        let mut throttle = CommitThrottle::new(16 * MS);
        let _ = throttle.push(1, now);
        let _ = throttle.push(2, now + MS);
        assert_eq!(throttle.poll(now + 10 * MS), None);
        assert_eq!(throttle.poll(now + 16 * MS), Some(2));
        assert_eq!(throttle.poll(now + 40 * MS), None);
    }

    #[test]
    fn push_after_window_emits_and_drops_stale_pending() {
        let now = Instant::now();
        let mut throttle = CommitThrottle::new(16 * MS);
        let _ = throttle.push(1, now);
        let _ = throttle.push(2, now + MS);
        assert_eq!(throttle.push(3, now + 20 * MS), Some(3));
        assert!(!throttle.has_pending());
    }

    #[test]
    fn flush_ignores_timing() {
        let now = Instant::now();
        let mut throttle = CommitThrottle::new(16 * MS);
        let _ = throttle.push(1, now);
        let _ = throttle.push(2, now + MS);
        assert_eq!(throttle.flush(), Some(2));
        assert_eq!(throttle.flush(), None);
    }

    #[test]
    fn zero_interval_never_holds() {
        let now = Instant::now();
        let mut throttle = CommitThrottle::new(Duration::ZERO);
        assert_eq!(throttle.push(1, now), Some(1));
        assert_eq!(throttle.push(2, now), Some(2));
    }

    #[test]
    fn clear_resets_window() {
        let now = Instant::now();
        let mut throttle = CommitThrottle::new(16 * MS);
        let _ = throttle.push(1, now);
        let _ = throttle.push(2, now + MS);
        throttle.clear();
        assert!(!throttle.has_pending());
        assert_eq!(throttle.push(3, now + 2 * MS), Some(3));
    }
}
