use core::time::Duration;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{AuthStore, PendingLogin, Session, StoreError, expiry_millis};

#[derive(Debug)]
struct Entry<T> {
    value: T,
    expires_at_ms: i64,
}

impl<T> Entry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at_ms: expiry_millis(ttl),
        }
    }

    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at_ms > now_ms
    }
}

/// In-process store. Every operation holds the map lock for its whole
/// duration, which makes `take_state` atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Entry<Session>>>,
    states: RwLock<HashMap<String, Entry<PendingLogin>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored pending logins, live or not.
    #[cfg(test)]
    pub(crate) async fn pending_logins(&self) -> usize {
        self.states.read().await.len()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn put_session(&self, session: &Session, ttl: Duration) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), Entry::new(session.clone(), ttl));
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let now = Utc::now().timestamp_millis();
        Ok(self
            .sessions
            .read()
            .await
            .get(id)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn remove_session(&self, id: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn put_state(
        &self,
        key: &str,
        record: &PendingLogin,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.states
            .write()
            .await
            .insert(key.to_string(), Entry::new(record.clone(), ttl));
        Ok(())
    }

    async fn take_state(&self, key: &str) -> Result<Option<PendingLogin>, StoreError> {
        let now = Utc::now().timestamp_millis();
        Ok(self
            .states
            .write()
            .await
            .remove(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value))
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now().timestamp_millis();
        let mut removed = 0_usize;
        {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, e| e.is_live(now));
            removed += before - sessions.len();
        }
        {
            let mut states = self.states.write().await;
            let before = states.len();
            states.retain(|_, e| e.is_live(now));
            removed += before - states.len();
        }
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}
