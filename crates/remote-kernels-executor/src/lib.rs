//! Execution protocol client for the kernel message channel.
//!
//! Provides:
//! - Wire types for the channel protocol (execute request, inbound kinds)
//! - `ExecutionClient` - drive one code execution to a terminal result

pub mod client;
pub mod wire;

pub use client::{ExecuteError, ExecutionClient};
pub use wire::{ExecuteRequest, KernelMessage, MessageKind};
