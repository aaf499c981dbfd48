//! Session and pending-login persistence.
//!
//! The [`AuthStore`] trait is the contract the login flow and the request
//! authenticator rely on. Cookies only ever carry the opaque keys; a key with
//! no live record here is treated as if the cookie were absent.
//!
//! Two backends are provided: [`MemoryStore`] (process-local) and
//! [`SqliteStore`] (persistent, via `sqlx`).

mod memory;
mod sqlite;

use alloc::sync::Arc;
use core::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::auth::AuthenticatedUser;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Server-side session, keyed by its opaque id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user: AuthenticatedUser,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// A login that was initiated but whose callback has not arrived yet.
///
/// Stored under the (random) content of the state cookie, so the `state`
/// value sent to the provider never doubles as a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    /// The `state` parameter sent to the provider.
    pub state: String,
    /// Where to send the browser once the session is established.
    pub return_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("record could not be encoded or decoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Storage contract for sessions and pending logins.
///
/// Expired records must never be returned. `take_state` must look up and
/// invalidate in one atomic step so that two callbacks racing on the same
/// state key cannot both observe the record.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn put_session(&self, session: &Session, ttl: Duration) -> Result<(), StoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    async fn remove_session(&self, id: &str) -> Result<(), StoreError>;

    async fn put_state(
        &self,
        key: &str,
        record: &PendingLogin,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Removes the pending login stored under `key` and returns it if it had
    /// not expired yet.
    async fn take_state(&self, key: &str) -> Result<Option<PendingLogin>, StoreError>;

    /// Drops expired records, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

/// Periodically purges expired records from `store`.
pub fn spawn_purge_task(store: Arc<dyn AuthStore>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "purged expired session/state records"),
                Err(e) => warn!(%e, "failed to purge expired records"),
            }
        }
    });
}

/// Milliseconds since the epoch at which a record stored now with `ttl` expires.
fn expiry_millis(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_add(ttl_ms)
}
