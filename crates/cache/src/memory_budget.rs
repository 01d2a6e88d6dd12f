//! Memory budget tracking for locally held resources
//!
//! Local handles keep whole files in memory. The budget bounds the total and
//! reports a pressure level so callers can refuse new handles before the
//! process balloons.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Memory pressure level indicating budget health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryPressure {
    /// Memory usage is low (< 50% utilization)
    Low,
    /// Memory usage is moderate (50-75% utilization)
    Moderate,
    /// Memory usage is high (75-90% utilization)
    High,
    /// Memory usage is critical (> 90% utilization)
    Critical,
}

impl MemoryPressure {
    /// Get the memory pressure level from a utilization ratio (0.0 to 1.0)
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization < 0.5 {
            MemoryPressure::Low
        } else if utilization < 0.75 {
            MemoryPressure::Moderate
        } else if utilization < 0.90 {
            MemoryPressure::High
        } else {
            MemoryPressure::Critical
        }
    }

    /// Returns true if pressure warrants a warning (High or Critical)
    pub fn is_elevated(&self) -> bool {
        matches!(self, MemoryPressure::High | MemoryPressure::Critical)
    }
}

/// Byte budget shared by all live local handles
///
/// # Example
///
/// ```
/// use docket_preview_cache::MemoryBudget;
///
/// let budget = MemoryBudget::with_limit_mb(64);
///
/// assert!(budget.try_reserve(10 * 1024 * 1024));
/// budget.release(10 * 1024 * 1024);
/// assert_eq!(budget.current_usage(), 0);
/// ```
#[derive(Debug)]
pub struct MemoryBudget {
    total_budget: usize,
    current_usage: AtomicUsize,
}

impl MemoryBudget {
    /// Create a budget with a limit in bytes
    pub fn new(total_budget: usize) -> Self {
        Self {
            total_budget,
            current_usage: AtomicUsize::new(0),
        }
    }

    /// Create a budget with a limit in megabytes, saturating at `usize::MAX` bytes
    pub fn with_limit_mb(total_mb: usize) -> Self {
        Self::new(total_mb.saturating_mul(1024 * 1024))
    }

    /// Get the current usage in bytes
    pub fn current_usage(&self) -> usize {
        self.current_usage.load(Ordering::Relaxed)
    }

    /// Get the total budget in bytes
    pub fn total_budget(&self) -> usize {
        self.total_budget
    }

    /// Get the available bytes
    pub fn available(&self) -> usize {
        self.total_budget.saturating_sub(self.current_usage())
    }

    /// Get the current utilization ratio (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.total_budget == 0 {
            0.0
        } else {
            self.current_usage() as f64 / self.total_budget as f64
        }
    }

    /// Get the current memory pressure level
    pub fn pressure(&self) -> MemoryPressure {
        MemoryPressure::from_utilization(self.utilization())
    }

    /// Atomically reserve `bytes` if they fit
    ///
    /// Returns false, reserving nothing, when the budget would be exceeded.
    pub fn try_reserve(&self, bytes: usize) -> bool {
        self.current_usage
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.checked_add(bytes)?;
                (next <= self.total_budget).then_some(next)
            })
            .is_ok()
    }

    /// Return previously reserved bytes
    pub fn release(&self, bytes: usize) {
        self.current_usage
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            })
            .ok();
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::with_limit_mb(512)
    }
}
