//! Deadline timer driven by explicit instants
//!
//! Used for UI-side timeouts such as hiding player controls after pointer
//! inactivity. The timer never spawns anything; callers pass `now` in and ask
//! whether the deadline passed, which keeps it trivially cancellable.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct IdleTimer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl IdleTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Restart the countdown from `now`
    pub fn reset(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    /// Disarm the timer
    pub fn clear(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// True once an armed timer's deadline is reached
    pub fn has_fired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Time left before firing, `None` when disarmed
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disarmed_never_fires() {
        let timer = IdleTimer::new(Duration::from_secs(3));
        assert!(!timer.is_armed());
        assert!(!timer.has_fired(Instant::now() + Duration::from_secs(60)));
        assert_eq!(timer.remaining(Instant::now()), None);
    }

    #[test]
    fn test_fires_after_timeout() {
        let mut timer = IdleTimer::new(Duration::from_secs(3));
        let start = Instant::now();
        timer.reset(start);

        assert!(!timer.has_fired(start + Duration::from_secs(2)));
        assert!(timer.has_fired(start + Duration::from_secs(3)));
    }

    #[test]
    fn test_reset_pushes_deadline() {
        let mut timer = IdleTimer::new(Duration::from_secs(3));
        let start = Instant::now();
        timer.reset(start);
        timer.reset(start + Duration::from_secs(2));

        assert!(!timer.has_fired(start + Duration::from_secs(4)));
        assert_eq!(
            timer.remaining(start + Duration::from_secs(4)),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_clear_disarms() {
        let mut timer = IdleTimer::new(Duration::from_secs(3));
        let start = Instant::now();
        timer.reset(start);
        timer.clear();

        assert!(!timer.has_fired(start + Duration::from_secs(10)));
    }
}
