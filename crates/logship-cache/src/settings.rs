//! Installation-scoped key/value settings
//!
//! Holds values that must stay stable across restarts but do not belong to
//! any record, such as the install id sent with every batch.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::CacheError;

const INSTALL_ID_KEY: &str = "install_id";

/// Settings table accessor
pub struct SqliteSettings {
    pool: SqlitePool,
}

impl SqliteSettings {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the stored install id, generating and storing one on first use
    pub async fn install_id(&self) -> Result<Uuid, CacheError> {
        if let Some(stored) = self.get(INSTALL_ID_KEY).await? {
            match Uuid::parse_str(&stored) {
                Ok(id) => return Ok(id),
                Err(e) => {
                    tracing::warn!(error = %e, "Stored install id is not a UUID, regenerating");
                }
            }
        }

        let id = Uuid::new_v4();
        self.set(INSTALL_ID_KEY, &id.to_string()).await?;
        tracing::info!(install_id = %id, "Generated install id");
        Ok(id)
    }
}
