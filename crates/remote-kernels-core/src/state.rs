//! Kernel execution-state labels.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a remote kernel, as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Kernel process is starting up.
    Starting,
    /// Kernel is ready for the next request.
    Idle,
    /// Kernel is processing a request.
    Busy,
    /// Kernel is restarting.
    Restarting,
    /// Kernel process has died.
    Dead,
    /// Label this client does not recognize.
    #[serde(other)]
    Unknown,
}
