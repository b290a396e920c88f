//! Write pacing.
//!
//! A window starts with every full write. Over the window's length the
//! documents that were stale at its start are written out in proportion to
//! the elapsed time, so disk writes are spread evenly instead of arriving in
//! one burst when the window closes.

use std::time::{Duration, Instant};

/// Pacing state of the current window.
#[derive(Debug, Clone)]
pub struct WriteWindow {
    started: Instant,
    stale_at_start: usize,
    written: usize,
    last_partial: Option<Instant>,
}

impl WriteWindow {
    /// Starts a window at `now` with `stale_at_start` documents to pace.
    pub fn new(now: Instant, stale_at_start: usize) -> Self {
        Self {
            started: now,
            stale_at_start,
            written: 0,
            last_partial: None,
        }
    }

    /// Restarts the window.
    pub fn reset(&mut self, now: Instant, stale_at_start: usize) {
        *self = Self::new(now, stale_at_start);
    }

    /// Moves the window start without touching the counters.
    pub fn restart_clock(&mut self, now: Instant) {
        self.started = now;
    }

    /// Time since the window started.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Whether the window has run its full length.
    pub fn full_write_due(&self, now: Instant, flush_interval: Duration) -> bool {
        self.elapsed(now) >= flush_interval
    }

    /// Whether enough time passed since the last partial write.
    pub fn partial_write_due(&self, now: Instant, partial_interval: Duration) -> bool {
        self.last_partial
            .map_or(true, |last| now.saturating_duration_since(last) >= partial_interval)
    }

    /// Records that a partial write ran at `now`.
    pub fn mark_partial(&mut self, now: Instant) {
        self.last_partial = Some(now);
    }

    /// How many documents a partial write should take now.
    ///
    /// `floor(stale_at_start × elapsed / flush_interval) − written`, clamped
    /// to what is left of the window's quota and to what is actually stale.
    pub fn target(&self, now: Instant, flush_interval: Duration, stale_len: usize) -> usize {
        let fraction = if flush_interval.is_zero() {
            1.0
        } else {
            (self.elapsed(now).as_secs_f64() / flush_interval.as_secs_f64()).min(1.0)
        };

        let due = (self.stale_at_start as f64 * fraction).floor() as usize;
        let remaining = self.stale_at_start.saturating_sub(self.written);

        due.saturating_sub(self.written)
            .min(remaining)
            .min(stale_len)
    }

    /// Adds successful writes to the window total.
    pub fn record_written(&mut self, count: usize) {
        self.written += count;
    }

    /// Documents stale when the window started.
    pub fn stale_at_start(&self) -> usize {
        self.stale_at_start
    }

    /// Documents written during this window.
    pub fn written(&self) -> usize {
        self.written
    }
}
