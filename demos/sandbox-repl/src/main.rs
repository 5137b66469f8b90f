//! Demo REPL running code snippets in a remote kernel.
//!
//! Run with: cargo run -p sandbox-repl-demo
//!
//! Requires `GATEWAY_URL` to point at a kernel gateway; `SHARED_VOLUME`,
//! `NFS_SERVER` and `KERNEL_NAMESPACE` are optional.

use std::time::Duration;

use anyhow::Context;
use remote_kernels_core::SessionKey;
use remote_kernels_gateway::GatewayConfig;
use remote_kernels_session::{GatewayKernelManager, KernelBackend, MemoryStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXECUTION_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = GatewayConfig::from_env().context("gateway configuration")?;
    let manager = GatewayKernelManager::new(MemoryStore::new(), config);

    let key = SessionKey::new("demo", uuid::Uuid::new_v4().simple().to_string());
    manager.create_session(&key).await?;
    println!("session {key} ready, enter code (ctrl-d to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match manager.run_code(&key, &line, EXECUTION_TIMEOUT).await {
            Ok(output) => println!("{output}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    manager.delete_session(&key).await?;
    Ok(())
}
