use core::{str::FromStr as _, time::Duration};
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;

use super::{AuthStore, PendingLogin, Session, StoreError, expiry_millis};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// `SQLite`-backed store. Records are JSON documents with an expiry column.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if necessary) the database at `path` and applies migrations.
    /// `:memory:` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    #[tracing::instrument]
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let (options, pool_options) = if path == Path::new(":memory:") {
            // every connection would get its own empty database, so pin exactly one
            (
                SqliteConnectOptions::from_str("sqlite::memory:")?,
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None),
            )
        } else {
            (
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true),
                SqlitePoolOptions::new(),
            )
        };
        let pool = pool_options.connect_with(options).await?;
        MIGRATOR.run(&pool).await?;
        info!("session store database ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl AuthStore for SqliteStore {
    async fn put_session(&self, session: &Session, ttl: Duration) -> Result<(), StoreError> {
        let record = serde_json::to_string(session)?;
        sqlx::query(
            "INSERT INTO sessions (id, record, expires_at) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET record = excluded.record, expires_at = excluded.expires_at",
        )
        .bind(session.id.as_str())
        .bind(record)
        .bind(expiry_millis(ttl))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT record FROM sessions WHERE id = ? AND expires_at > ?")
                .bind(id)
                .bind(Utc::now().timestamp_millis())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(record,)| serde_json::from_str(&record))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn remove_session(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_state(
        &self,
        key: &str,
        record: &PendingLogin,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(record)?;
        sqlx::query(
            "INSERT INTO login_states (key, record, expires_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET record = excluded.record, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(encoded)
        .bind(expiry_millis(ttl))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_state(&self, key: &str) -> Result<Option<PendingLogin>, StoreError> {
        // a single statement, so two racing callbacks cannot both get the row
        let row: Option<(String, i64)> =
            sqlx::query_as("DELETE FROM login_states WHERE key = ? RETURNING record, expires_at")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((record, expires_at)) if expires_at > Utc::now().timestamp_millis() => {
                Ok(Some(serde_json::from_str(&record)?))
            }
            _ => Ok(None),
        }
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now().timestamp_millis();
        let sessions = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        let states = sqlx::query("DELETE FROM login_states WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(sessions.rows_affected() + states.rows_affected())
    }
}
