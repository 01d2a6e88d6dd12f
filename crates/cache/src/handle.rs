//! Local memory-backed resource handles
//!
//! A local handle wraps fetched bytes so player and image surfaces can load
//! them by address instead of fetching cross-origin. Every handle must be
//! released exactly once: the registry rejects a second release of the same
//! handle with [`HandleError::AlreadyReleased`] instead of silently ignoring it.
//!
//! Handles carry the issuing registry's id and a monotonically increasing
//! sequence number. A handle issued here that is no longer live was released,
//! so double releases are detected without remembering released ids.

use crate::memory_budget::{MemoryBudget, MemoryPressure};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Address scheme prefix for local handles
pub const HANDLE_SCHEME: &str = "blob:docket-preview/";

/// Errors from handle creation and release
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("local handle {0} was never issued by this registry")]
    UnknownHandle(Uuid),

    #[error("local handle {0} was already released")]
    AlreadyReleased(Uuid),

    #[error("local handle of {requested} bytes exceeds the memory budget ({available} bytes available)")]
    BudgetExceeded { requested: usize, available: usize },
}

/// Opaque identity of a live local resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalHandle {
    id: Uuid,
    issuer: Uuid,
    seq: u64,
    len: usize,
}

impl LocalHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Size of the held bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Address that embedding surfaces load the bytes from
    pub fn address(&self) -> String {
        format!("{}{}", HANDLE_SCHEME, self.id)
    }
}

/// Snapshot of registry usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleStats {
    /// Handles currently live
    pub live: usize,
    /// Bytes held by live handles
    pub bytes_held: usize,
    /// Handles created since construction
    pub created: u64,
    /// Handles released since construction
    pub released: u64,
    /// Release calls rejected as double releases
    pub rejected_releases: u64,
}

struct RegistryState {
    live: HashMap<Uuid, Arc<[u8]>>,
    next_seq: u64,
    stats: HandleStats,
}

/// Registry that creates, resolves and releases local handles
///
/// Thread-safe; clones of the surrounding `Arc` share one registry.
///
/// # Example
///
/// ```
/// use docket_preview_cache::{HandleError, LocalHandleRegistry};
///
/// let registry = LocalHandleRegistry::with_limit_mb(16);
/// let handle = registry.create(b"%PDF-1.7".to_vec()).unwrap();
///
/// assert!(registry.release(&handle).is_ok());
/// assert_eq!(
///     registry.release(&handle),
///     Err(HandleError::AlreadyReleased(handle.id()))
/// );
/// ```
pub struct LocalHandleRegistry {
    id: Uuid,
    state: Mutex<RegistryState>,
    budget: MemoryBudget,
}

impl LocalHandleRegistry {
    /// Create a registry bounded by `budget`
    pub fn new(budget: MemoryBudget) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(RegistryState {
                live: HashMap::new(),
                next_seq: 0,
                stats: HandleStats::default(),
            }),
            budget,
        }
    }

    /// Create a registry with a budget in megabytes
    pub fn with_limit_mb(total_mb: usize) -> Self {
        Self::new(MemoryBudget::with_limit_mb(total_mb))
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take ownership of `bytes` and issue a handle for them
    pub fn create(&self, bytes: Vec<u8>) -> Result<LocalHandle, HandleError> {
        let len = bytes.len();
        if !self.budget.try_reserve(len) {
            return Err(HandleError::BudgetExceeded {
                requested: len,
                available: self.budget.available(),
            });
        }

        let id = Uuid::new_v4();
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.live.insert(id, Arc::from(bytes));
        state.stats.created += 1;
        state.stats.live = state.live.len();
        state.stats.bytes_held = self.budget.current_usage();
        drop(state);

        let pressure = self.budget.pressure();
        if pressure.is_elevated() {
            tracing::warn!(?pressure, bytes = len, "local handle budget under pressure");
        }
        tracing::debug!(%id, bytes = len, "local handle created");

        Ok(LocalHandle {
            id,
            issuer: self.id,
            seq,
            len,
        })
    }

    /// Release a handle, freeing its bytes
    ///
    /// A second release of the same handle is a defect and is rejected.
    pub fn release(&self, handle: &LocalHandle) -> Result<(), HandleError> {
        let mut state = self.lock();

        match state.live.remove(&handle.id) {
            Some(bytes) => {
                self.budget.release(bytes.len());
                state.stats.released += 1;
                state.stats.live = state.live.len();
                state.stats.bytes_held = self.budget.current_usage();
                tracing::debug!(id = %handle.id, "local handle released");
                Ok(())
            }
            None if handle.issuer == self.id && handle.seq < state.next_seq => {
                state.stats.rejected_releases += 1;
                tracing::warn!(id = %handle.id, "rejected double release of local handle");
                Err(HandleError::AlreadyReleased(handle.id))
            }
            None => Err(HandleError::UnknownHandle(handle.id)),
        }
    }

    /// Bytes behind a live handle
    pub fn bytes(&self, handle: &LocalHandle) -> Option<Arc<[u8]>> {
        self.lock().live.get(&handle.id).cloned()
    }

    /// Whether the handle is still live
    pub fn is_live(&self, handle: &LocalHandle) -> bool {
        self.lock().live.contains_key(&handle.id)
    }

    pub fn stats(&self) -> HandleStats {
        self.lock().stats
    }

    pub fn pressure(&self) -> MemoryPressure {
        self.budget.pressure()
    }
}

impl Default for LocalHandleRegistry {
    fn default() -> Self {
        Self::new(MemoryBudget::default())
    }
}
