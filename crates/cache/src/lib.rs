//! Docket Preview Cache Library
//!
//! Ownership of locally held file bytes: the handle registry issues and
//! releases memory-backed handles under a shared memory budget.

pub mod handle;
pub mod memory_budget;

pub use handle::{HandleError, HandleStats, LocalHandle, LocalHandleRegistry, HANDLE_SCHEME};
pub use memory_budget::{MemoryBudget, MemoryPressure};
