//! SQLite session storage (feature-gated).

use async_trait::async_trait;
use remote_kernels_core::{Session, SessionKey, SessionStore, StorageError};
use sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions};
use uuid::Uuid;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sessions (
    key TEXT PRIMARY KEY,
    principal TEXT NOT NULL,
    conversation TEXT NOT NULL,
    kernel_id TEXT
)";

fn internal(e: sqlx::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

/// SQLite storage implementation.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database at `database_url` and ensure the schema exists.
    ///
    /// # Errors
    /// Returns `StorageError::Unavailable` if the database cannot be opened.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        sqlx::query(SCHEMA).execute(&pool).await.map_err(internal)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<Session>, StorageError> {
        let row =
            sqlx::query("SELECT principal, conversation, kernel_id FROM sessions WHERE key = ?")
                .bind(key.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?;

        row.map(|row| {
            let kernel_id: Option<String> = row.try_get("kernel_id").map_err(internal)?;
            let kernel_id = kernel_id
                .map(|raw| {
                    Uuid::parse_str(&raw).map_err(|e| StorageError::Internal(e.to_string()))
                })
                .transpose()?;
            Ok(Session {
                principal: row.try_get("principal").map_err(internal)?,
                conversation: row.try_get("conversation").map_err(internal)?,
                kernel_id,
            })
        })
        .transpose()
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO sessions (key, principal, conversation, kernel_id) VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET kernel_id = excluded.kernel_id",
        )
        .bind(session.key().to_string())
        .bind(&session.principal)
        .bind(&session.conversation)
        .bind(session.kernel_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM sessions WHERE key = ?")
            .bind(key.to_string())
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }
}
