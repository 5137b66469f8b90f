//! REST client for kernel lifecycle operations.

use reqwest::StatusCode;
use thiserror::Error;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::schema::{CreateKernelRequest, KernelDescriptor};

/// Gateway client error.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The kernel does not exist on the gateway (culled or never created).
    #[error("kernel {0} not found")]
    KernelNotFound(Uuid),
    /// The gateway answered with an unexpected status.
    #[error("gateway request failed with {status}: {body}")]
    Http { status: StatusCode, body: String },
    /// The request never produced a usable response.
    #[error("gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The configured base URL cannot be turned into an endpoint.
    #[error("invalid gateway endpoint: {0}")]
    Endpoint(String),
}

/// Stateless client for the gateway's kernel lifecycle API.
///
/// All remote-kernel state changes are funneled through this client so the
/// error-mapping policy lives in one place.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: Url,
    http: reqwest::Client,
}

impl GatewayClient {
    /// Create a client for the gateway at `base_url`.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Start a new kernel.
    ///
    /// # Errors
    /// Returns `GatewayError::Http` on any non-2xx response.
    pub async fn create_kernel(
        &self,
        request: &CreateKernelRequest,
    ) -> Result<KernelDescriptor, GatewayError> {
        let url = self.endpoint("/api/kernels")?;
        let response = self.http.post(url).json(request).send().await?;
        if !response.status().is_success() {
            return Err(http_error(response).await);
        }
        let kernel: KernelDescriptor = response.json().await?;
        info!(kernel_id = %kernel.id, "started kernel");
        Ok(kernel)
    }

    /// Fetch a kernel descriptor.
    ///
    /// # Errors
    /// Returns `KernelNotFound` on 404 and `GatewayError::Http` on any other
    /// non-2xx response.
    pub async fn get_kernel(&self, kernel_id: Uuid) -> Result<KernelDescriptor, GatewayError> {
        let url = self.endpoint(&format!("/api/kernels/{kernel_id}"))?;
        let response = self.http.get(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(GatewayError::KernelNotFound(kernel_id)),
            _ => Err(http_error(response).await),
        }
    }

    /// Shut down a kernel.
    ///
    /// # Errors
    /// Returns `KernelNotFound` on 404 (the kernel was already culled) and
    /// `GatewayError::Http` on any other non-2xx response. Callers cleaning
    /// up a conversation treat `KernelNotFound` as success.
    pub async fn delete_kernel(&self, kernel_id: Uuid) -> Result<(), GatewayError> {
        let url = self.endpoint(&format!("/api/kernels/{kernel_id}"))?;
        let response = self.http.delete(url).send().await?;
        match response.status() {
            status if status.is_success() => {
                info!(%kernel_id, "kernel deleted");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(GatewayError::KernelNotFound(kernel_id)),
            _ => Err(http_error(response).await),
        }
    }

    /// Derive the message-channel URL for a kernel.
    ///
    /// Substitutes the gateway's scheme (http to ws, https to wss) and
    /// appends the kernel channel path. No network call.
    ///
    /// # Errors
    /// Returns `GatewayError::Endpoint` if the base URL does not support the
    /// substitution.
    pub fn channel_endpoint(&self, kernel_id: Uuid) -> Result<Url, GatewayError> {
        let mut url = self.endpoint(&format!("/api/kernels/{kernel_id}/channels"))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| GatewayError::Endpoint(format!("cannot set scheme {scheme} on {url}")))?;
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Endpoint(e.to_string()))
    }
}

async fn http_error(response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    GatewayError::Http { status, body }
}

#[cfg(test)]
mod tests {
    use axum::{
        Json, Router,
        extract::Path,
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::json;

    use super::*;

    // Kernel the fake gateway knows about.
    const KNOWN: Uuid = Uuid::from_u128(0x72047b71_1616_4e4d_b6cb_a3388c808663);
    // Kernel id that makes the fake gateway blow up.
    const BROKEN: Uuid = Uuid::from_u128(0xdead);

    fn descriptor(id: Uuid, execution_state: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": "python_kubernetes",
            "last_activity": "2023-11-11T04:39:35.313278Z",
            "execution_state": execution_state,
            "connections": 0,
        })
    }

    async fn create_kernel() -> impl IntoResponse {
        (
            StatusCode::CREATED,
            Json(descriptor(Uuid::new_v4(), "starting")),
        )
    }

    async fn get_kernel(Path(id): Path<Uuid>) -> axum::response::Response {
        if id == BROKEN {
            (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
        } else if id == KNOWN {
            Json(descriptor(id, "idle")).into_response()
        } else {
            StatusCode::NOT_FOUND.into_response()
        }
    }

    async fn delete_kernel(Path(id): Path<Uuid>) -> StatusCode {
        if id == KNOWN {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::NOT_FOUND
        }
    }

    async fn spawn_gateway() -> Url {
        let app = Router::new()
            .route("/api/kernels", post(create_kernel))
            .route("/api/kernels/{id}", get(get_kernel).delete(delete_kernel));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn create_kernel_returns_descriptor() {
        let client = GatewayClient::new(spawn_gateway().await);
        let kernel = client
            .create_kernel(&CreateKernelRequest::default())
            .await
            .unwrap();
        assert_eq!(kernel.name, "python_kubernetes");
    }

    #[tokio::test]
    async fn get_missing_kernel_is_not_found() {
        let client = GatewayClient::new(spawn_gateway().await);
        let missing = Uuid::new_v4();
        match client.get_kernel(missing).await {
            Err(GatewayError::KernelNotFound(id)) => assert_eq!(id, missing),
            other => panic!("expected KernelNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_kernel_surfaces_unexpected_status() {
        let client = GatewayClient::new(spawn_gateway().await);
        match client.get_kernel(BROKEN).await {
            Err(GatewayError::Http { status, body }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_round_trip() {
        let client = GatewayClient::new(spawn_gateway().await);
        client.delete_kernel(KNOWN).await.unwrap();
        assert!(matches!(
            client.delete_kernel(Uuid::new_v4()).await,
            Err(GatewayError::KernelNotFound(_))
        ));
    }

    #[test]
    fn channel_endpoint_substitutes_scheme() {
        let client = GatewayClient::new(Url::parse("http://gateway:8888").unwrap());
        assert_eq!(
            client.channel_endpoint(KNOWN).unwrap().as_str(),
            format!("ws://gateway:8888/api/kernels/{KNOWN}/channels")
        );

        let client = GatewayClient::new(Url::parse("https://gateway").unwrap());
        assert_eq!(
            client.channel_endpoint(KNOWN).unwrap().scheme(),
            "wss"
        );
    }
}
