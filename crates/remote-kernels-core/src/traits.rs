//! Storage trait for durable session state.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{Session, SessionKey};

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Internal(String),
}

/// Trait for durable session storage backends.
///
/// All operations are idempotent and safe to retry; `save` overwrites. Store
/// failures are fatal to the caller; there is no cache or fallback in front
/// of a backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session by key.
    async fn get(&self, key: &SessionKey) -> Result<Option<Session>, StorageError>;

    /// Persist a session, overwriting any previous state.
    async fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// Remove a session.
    async fn delete(&self, key: &SessionKey) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: SessionStore> SessionStore for Arc<T> {
    async fn get(&self, key: &SessionKey) -> Result<Option<Session>, StorageError> {
        (**self).get(key).await
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        (**self).save(session).await
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StorageError> {
        (**self).delete(key).await
    }
}
