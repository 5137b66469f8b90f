//! Gateway configuration.

use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid gateway URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Gateway connection and kernel provisioning settings.
///
/// The volume and namespace knobs are opaque pass-through values placed into
/// the kernel creation environment; only the gateway interprets them.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the kernel gateway.
    pub base_url: Url,
    /// Kernel spec name. `None` uses the gateway's default spec.
    #[serde(default)]
    pub kernel_name: Option<String>,
    /// Mount path shared between this service and the kernels.
    #[serde(default)]
    pub shared_volume: Option<PathBuf>,
    /// NFS server backing the shared volume.
    #[serde(default)]
    pub nfs_server: Option<String>,
    /// Namespace to start kernels in.
    #[serde(default)]
    pub kernel_namespace: Option<String>,
}

impl GatewayConfig {
    /// Create a config pointing at `base_url` with no volume or namespace
    /// hints.
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self {
            base_url,
            kernel_name: None,
            shared_volume: None,
            nfs_server: None,
            kernel_namespace: None,
        }
    }

    /// Read the config from environment variables.
    ///
    /// `GATEWAY_URL` is required; `KERNEL_NAME`, `SHARED_VOLUME`,
    /// `NFS_SERVER` and `KERNEL_NAMESPACE` are optional.
    ///
    /// # Errors
    /// Returns an error if `GATEWAY_URL` is missing or not a valid URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = env::var("GATEWAY_URL").map_err(|_| ConfigError::MissingVar("GATEWAY_URL"))?;
        Ok(Self {
            base_url: Url::parse(&raw)?,
            kernel_name: env::var("KERNEL_NAME").ok(),
            shared_volume: env::var("SHARED_VOLUME").ok().map(PathBuf::from),
            nfs_server: env::var("NFS_SERVER").ok(),
            kernel_namespace: env::var("KERNEL_NAMESPACE").ok(),
        })
    }
}
