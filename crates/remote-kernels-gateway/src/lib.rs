//! REST client for kernel lifecycle operations against a kernel gateway.
//!
//! Provides:
//! - `GatewayClient` - create, fetch and delete kernels; derive channel URLs
//! - Kernel schema types for the gateway API
//! - `GatewayConfig` - connection and provisioning settings

pub mod client;
pub mod config;
pub mod schema;

pub use client::{GatewayClient, GatewayError};
pub use config::{ConfigError, GatewayConfig};
pub use schema::{CreateKernelRequest, KernelDescriptor};
