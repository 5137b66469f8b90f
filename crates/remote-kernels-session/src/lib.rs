//! Session storage and kernel orchestration for remote kernels.
//!
//! Provides:
//! - `GatewayKernelManager` - resolve a session's kernel and run code in it
//! - Storage implementations (memory, SQLite)

pub mod manager;
pub mod storage;

pub use manager::{GatewayKernelManager, KernelBackend, ManagerError};

#[cfg(feature = "memory")]
pub use storage::MemoryStore;

#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
