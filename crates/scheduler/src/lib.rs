//! Docket Preview Scheduler Library
//!
//! Timing and supersession primitives shared by the preview engine.
//!
//! - [`CancellationToken`] and [`GenerationCounter`] make superseded async
//!   work harmless: the former aborts it, the latter lets late completions
//!   detect that they lost.
//! - [`RetryPolicy`] centralizes bounded retries for resolution call sites.
//! - [`FrameThrottle`] limits scroll-driven recomputation to one per frame.
//! - [`IdleTimer`] backs inactivity timeouts such as control auto-hide.
//!
//! # Example
//!
//! ```
//! use docket_preview_scheduler::GenerationCounter;
//!
//! let slot = GenerationCounter::new();
//!
//! let first = slot.advance();
//! let second = slot.advance();
//!
//! // The first request's late completion must be discarded.
//! assert!(first.is_stale());
//! assert!(second.is_current());
//! ```

mod cancel;
mod retry;
mod throttle;
mod timer;

// Re-export public API
pub use cancel::{CancellationToken, Generation, GenerationCounter};
pub use retry::{RetryError, RetryPolicy, Retryable};
pub use throttle::FrameThrottle;
pub use timer::IdleTimer;
