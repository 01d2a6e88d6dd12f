//! Per-frame throttling for scroll-driven work
//!
//! Scroll events arrive far faster than the display refreshes. The throttle
//! lets at most one computation through per frame interval and remembers that
//! a trailing computation is owed, so the final scroll position is never lost.

use std::time::{Duration, Instant};

/// Frame interval for 60 FPS displays (16.67ms)
pub const FRAME_INTERVAL_60FPS: Duration = Duration::from_micros(16_667);

/// Leading-edge throttle with a trailing flag
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval: Duration,
    last_run: Option<Instant>,
    pending: bool,
}

impl FrameThrottle {
    /// Create a throttle with a custom interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            pending: false,
        }
    }

    /// Create a throttle for 60 FPS displays
    pub fn for_60fps() -> Self {
        Self::new(FRAME_INTERVAL_60FPS)
    }

    /// Ask to run at `now`
    ///
    /// Returns `true` when the caller should compute now. Otherwise the request
    /// is remembered and [`Self::poll_pending`] will grant it on a later frame.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.is_open(now) {
            self.last_run = Some(now);
            self.pending = false;
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// Grant a previously deferred request once the interval has elapsed
    pub fn poll_pending(&mut self, now: Instant) -> bool {
        if self.pending && self.is_open(now) {
            self.last_run = Some(now);
            self.pending = false;
            true
        } else {
            false
        }
    }

    /// Bypass the interval (size or count changed)
    pub fn force(&mut self, now: Instant) {
        self.last_run = Some(now);
        self.pending = false;
    }

    /// Whether a deferred request is waiting
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Drop any deferred request and timing history
    pub fn clear(&mut self) {
        self.last_run = None;
        self.pending = false;
    }

    /// Get the frame interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn is_open(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }
}

impl Default for FrameThrottle {
    fn default() -> Self {
        Self::for_60fps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_runs() {
        let mut throttle = FrameThrottle::for_60fps();
        assert!(throttle.request(Instant::now()));
        assert!(!throttle.has_pending());
    }

    #[test]
    fn test_burst_within_frame_is_deferred() {
        let mut throttle = FrameThrottle::for_60fps();
        let start = Instant::now();

        assert!(throttle.request(start));
        assert!(!throttle.request(start + Duration::from_millis(2)));
        assert!(!throttle.request(start + Duration::from_millis(5)));
        assert!(throttle.has_pending());
    }

    #[test]
    fn test_pending_runs_next_frame() {
        let mut throttle = FrameThrottle::for_60fps();
        let start = Instant::now();

        throttle.request(start);
        throttle.request(start + Duration::from_millis(4));

        assert!(!throttle.poll_pending(start + Duration::from_millis(10)));
        assert!(throttle.poll_pending(start + Duration::from_millis(17)));
        assert!(!throttle.has_pending());
    }

    #[test]
    fn test_force_clears_pending() {
        let mut throttle = FrameThrottle::for_60fps();
        let start = Instant::now();

        throttle.request(start);
        throttle.request(start + Duration::from_millis(1));
        throttle.force(start + Duration::from_millis(2));

        assert!(!throttle.has_pending());
        assert!(!throttle.request(start + Duration::from_millis(3)));
    }

    #[test]
    fn test_clear_reopens() {
        let mut throttle = FrameThrottle::for_60fps();
        let start = Instant::now();

        throttle.request(start);
        throttle.clear();
        assert!(throttle.request(start + Duration::from_millis(1)));
    }
}
