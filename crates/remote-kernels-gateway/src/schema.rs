//! Kernel lifecycle schema for the gateway REST API.

use chrono::{DateTime, Utc};
use remote_kernels_core::ExecutionState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Request body for `POST /api/kernels`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateKernelRequest {
    /// Kernel spec name (defaults to the gateway's default spec).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Environment passed to the kernel process. Opaque to this client and
    /// subject to filtering by the gateway; values may be strings or
    /// structured mount descriptions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Map<String, Value>>,
}

/// Kernel descriptor returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelDescriptor {
    /// Gateway-assigned kernel id.
    pub id: Uuid,
    /// Kernel spec name.
    pub name: String,
    /// Timestamp of the kernel's last activity.
    pub last_activity: DateTime<Utc>,
    /// Current execution state.
    pub execution_state: ExecutionState,
    /// Number of connections to the kernel's channels.
    pub connections: u32,
}
