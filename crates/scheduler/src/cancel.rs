//! Cancellation tokens and generation counters
//!
//! Two complementary tools for superseded asynchronous work:
//!
//! - [`CancellationToken`] lets a running operation be aborted cooperatively.
//!   Operations can poll [`CancellationToken::is_cancelled`] or await
//!   [`CancellationToken::cancelled`] inside a `select!`.
//! - [`GenerationCounter`] hands out [`Generation`] tags. A tag stays current
//!   until the counter advances; continuations that wake up holding a stale
//!   tag must drop their result instead of mutating state.
//!
//! The generation check is what enforces "last request started wins":
//! cancellation only speeds up the loser, the tag comparison decides it.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation token for cooperative cancellation
///
/// Clones share the same underlying state, so the owner can keep one copy
/// and hand another to the in-flight operation.
///
/// # Example
///
/// ```
/// use docket_preview_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let in_flight = token.clone();
///
/// token.cancel();
/// assert!(in_flight.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and wake every task awaiting [`Self::cancelled`]
    ///
    /// Idempotent: cancelling twice is harmless.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Check if this token (or any clone) has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once the token is cancelled
    ///
    /// Returns immediately if cancellation already happened.
    pub async fn cancelled(&self) {
        loop {
            // Created before the flag check so a concurrent cancel() is not missed.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Monotonic generation counter for one logical slot
///
/// Cloning the counter shares it; every [`Generation`] issued by any clone
/// is compared against the same value.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    value: Arc<AtomicU64>,
}

impl GenerationCounter {
    /// Create a counter at generation zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the counter, invalidating every previously issued tag
    pub fn advance(&self) -> Generation {
        let value = self.value.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(generation = value, "generation advanced");
        Generation {
            value,
            counter: self.value.clone(),
        }
    }

    /// Tag for the current generation without advancing
    pub fn current(&self) -> Generation {
        Generation {
            value: self.value.load(Ordering::Acquire),
            counter: self.value.clone(),
        }
    }

    /// Raw current value
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}

/// A generation tag captured when an operation started
#[derive(Debug, Clone)]
pub struct Generation {
    value: u64,
    counter: Arc<AtomicU64>,
}

impl Generation {
    /// The generation number this tag was issued for
    pub fn value(&self) -> u64 {
        self.value
    }

    /// True while no newer generation has been started on the counter
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::Acquire) == self.value
    }

    /// True once the counter moved past this tag
    pub fn is_stale(&self) -> bool {
        !self.is_current()
    }
}

impl PartialEq for Generation {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && Arc::ptr_eq(&self.counter, &other.counter)
    }
}

impl Eq for Generation {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancellation_token_basic() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancellation_token_clone() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel();
        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
    }

    #[test]
    fn test_cancellation_token_idempotent() {
        let token = CancellationToken::new();

        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        tokio::time::timeout(Duration::from_millis(10), token.cancelled())
            .await
            .expect("already-cancelled token should resolve at once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = token.clone();

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        assert!(handle.await.unwrap());
    }

    #[test]
    fn test_generation_starts_current() {
        let counter = GenerationCounter::new();
        let tag = counter.advance();

        assert_eq!(tag.value(), 1);
        assert!(tag.is_current());
    }

    #[test]
    fn test_advance_invalidates_older_tags() {
        let counter = GenerationCounter::new();
        let first = counter.advance();
        let second = counter.advance();

        assert!(first.is_stale());
        assert!(second.is_current());
        assert_ne!(first, second);
    }

    #[test]
    fn test_clones_share_counter() {
        let counter = GenerationCounter::new();
        let shared = counter.clone();

        let tag = counter.advance();
        shared.advance();

        assert!(tag.is_stale());
        assert_eq!(counter.value(), 2);
        assert_eq!(counter.current(), shared.current());
    }

    #[test]
    fn test_tags_from_different_counters_differ() {
        let a = GenerationCounter::new();
        let b = GenerationCounter::new();

        assert_ne!(a.advance(), b.advance());
    }
}
