//! Kernel manager orchestrating sessions against the remote gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use remote_kernels_core::{
    ExecutionOutput, Session, SessionKey, SessionStore, StorageError,
};
use remote_kernels_executor::{ExecuteError, ExecutionClient};
use remote_kernels_gateway::{
    CreateKernelRequest, GatewayClient, GatewayConfig, GatewayError, KernelDescriptor,
};

/// Kernel manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionKey),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("kernel provisioning failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("execution failed: {0}")]
    Execute(#[from] ExecuteError),
    #[error("failed to prepare shared storage: {0}")]
    SharedStorage(#[from] std::io::Error),
}

/// Backend contract for running code in per-session kernels.
///
/// Implementations resolve the kernel backing a session and drive executions
/// against it. Only the remote-gateway implementation exists today.
#[async_trait]
pub trait KernelBackend: Send + Sync {
    /// Return the session's current kernel, provisioning one if needed.
    async fn get_or_create_kernel(
        &self,
        key: &SessionKey,
    ) -> Result<KernelDescriptor, ManagerError>;

    /// Execute `code` in the session's kernel.
    async fn run_code(
        &self,
        key: &SessionKey,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionOutput, ManagerError>;
}

/// Kernel manager backed by a remote kernel gateway.
///
/// Sessions are durable and authoritative for which kernel is current;
/// kernels are ephemeral and cheaply re-created. A remembered kernel id that
/// the gateway no longer knows (culled out-of-band) resolves the same way as
/// no kernel at all: provision a fresh one and record it.
pub struct GatewayKernelManager<S: SessionStore> {
    storage: S,
    config: GatewayConfig,
    gateway: GatewayClient,
    executor: ExecutionClient,
}

impl<S: SessionStore> GatewayKernelManager<S> {
    /// Create a manager for the gateway described by `config`.
    #[must_use]
    pub fn new(storage: S, config: GatewayConfig) -> Self {
        let gateway = GatewayClient::new(config.base_url.clone());
        Self {
            storage,
            config,
            gateway,
            executor: ExecutionClient::new(),
        }
    }

    /// Create and persist the session for a new conversation.
    ///
    /// # Errors
    /// Returns an error if the store rejects the write.
    pub async fn create_session(&self, key: &SessionKey) -> Result<Session, ManagerError> {
        let session = Session::new(key);
        self.storage.save(&session).await?;
        Ok(session)
    }

    /// Tear down a conversation: delete its kernel (if the gateway still
    /// knows it) and remove the session.
    ///
    /// # Errors
    /// Returns an error on storage failures or unexpected gateway responses.
    /// A kernel already culled by the gateway is not an error.
    pub async fn delete_session(&self, key: &SessionKey) -> Result<(), ManagerError> {
        if let Some(session) = self.storage.get(key).await? {
            if let Some(kernel_id) = session.kernel_id {
                match self.gateway.delete_kernel(kernel_id).await {
                    Ok(()) => {}
                    Err(GatewayError::KernelNotFound(_)) => {
                        info!(%kernel_id, "kernel already gone when deleting, maybe culled");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        self.storage.delete(key).await?;
        info!(session = %key, "session deleted");
        Ok(())
    }

    async fn load(&self, key: &SessionKey) -> Result<Session, ManagerError> {
        self.storage
            .get(key)
            .await?
            .ok_or_else(|| ManagerError::SessionNotFound(key.clone()))
    }

    async fn provision(&self, session: &mut Session) -> Result<KernelDescriptor, ManagerError> {
        let env = self.kernel_env(session).await?;
        let request = CreateKernelRequest {
            name: self.config.kernel_name.clone(),
            env: Some(env),
        };
        let kernel = self.gateway.create_kernel(&request).await?;
        session.kernel_id = Some(kernel.id);
        self.storage.save(session).await?;
        Ok(kernel)
    }

    /// Environment for a new kernel: the user identity marker plus the
    /// configured shared-volume and namespace hints.
    async fn kernel_env(&self, session: &Session) -> Result<Map<String, Value>, ManagerError> {
        let mut env = Map::new();
        env.insert("KERNEL_USERNAME".to_owned(), json!(session.principal));
        if let (Some(volume), Some(server)) = (&self.config.shared_volume, &self.config.nfs_server)
        {
            // Volume is mounted into this service as well, so the
            // per-conversation directory can be created here.
            let shared_path = volume.join(&session.principal).join(&session.conversation);
            debug!(path = %shared_path.display(), "creating shared path");
            tokio::fs::create_dir_all(&shared_path).await?;
            env.insert(
                "KERNEL_VOLUME_MOUNTS".to_owned(),
                json!([{"name": "shared-vol", "mountPath": volume}]),
            );
            env.insert(
                "KERNEL_VOLUMES".to_owned(),
                json!([{"name": "shared-vol", "nfs": {"server": server, "path": shared_path}}]),
            );
        }
        if let Some(namespace) = &self.config.kernel_namespace {
            env.insert("KERNEL_NAMESPACE".to_owned(), json!(namespace));
        }
        Ok(env)
    }
}

#[async_trait]
impl<S: SessionStore> KernelBackend for GatewayKernelManager<S> {
    async fn get_or_create_kernel(
        &self,
        key: &SessionKey,
    ) -> Result<KernelDescriptor, ManagerError> {
        let mut session = self.load(key).await?;
        if let Some(kernel_id) = session.kernel_id {
            match self.gateway.get_kernel(kernel_id).await {
                Ok(kernel) => return Ok(kernel),
                Err(GatewayError::KernelNotFound(_)) => {
                    debug!(%kernel_id, "kernel not found, creating a new one");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.provision(&mut session).await
    }

    async fn run_code(
        &self,
        key: &SessionKey,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionOutput, ManagerError> {
        let kernel = self.get_or_create_kernel(key).await?;
        let endpoint = self.gateway.channel_endpoint(kernel.id)?;
        Ok(self.executor.execute(&endpoint, code, timeout).await?)
    }
}
