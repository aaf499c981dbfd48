//! Signing-key resolution from the provider's published key set.

use core::time::Duration;
use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use reqwest::{StatusCode, header::CACHE_CONTROL};
use serde::Deserialize;
use thiserror::Error as ThisError;
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, info, warn};
use url::Url;

/// An unknown `kid` triggers a refetch only if the cached set is at least this old.
const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, ThisError)]
pub enum KeySetError {
    #[error("key set request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("key set endpoint answered {0}")]
    Status(StatusCode),
    #[error("key set is malformed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Resolves the verification key for a token's `kid`.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// `Ok(None)` means the provider does not publish a usable key under `kid`.
    async fn key_for(&self, kid: &str) -> Result<Option<DecodingKey>, KeySetError>;
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
    max_age: Duration,
}

impl CachedKeys {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() >= self.max_age
    }
}

/// Fetches `/.well-known/jwks.json` and caches the RSA signing keys by `kid`
/// for the `Cache-Control: max-age` the provider sends (or a default).
pub struct JwksClient {
    http: reqwest::Client,
    url: Url,
    default_max_age: Duration,
    min_refresh_interval: Duration,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksClient {
    pub fn new(http: reqwest::Client, url: Url, default_max_age: Duration) -> Self {
        Self {
            http,
            url,
            default_max_age,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            cache: RwLock::new(None),
        }
    }

    /// Overrides how old a fresh key set must be before an unknown `kid` refetches it.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    async fn fetch(&self) -> Result<CachedKeys, KeySetError> {
        let response = self.http.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(KeySetError::Status(status));
        }
        let max_age = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_max_age)
            .map_or(self.default_max_age, Duration::from_secs);
        let body = response.bytes().await?;
        let document: JwksDocument = serde_json::from_slice(&body)?;

        let keys = usable_keys(document);
        if keys.is_empty() {
            warn!(url = %self.url, "key set contains no usable RSA signing keys");
        }
        info!(url = %self.url, count = keys.len(), max_age_secs = max_age.as_secs(), "fetched signing keys");
        Ok(CachedKeys {
            keys,
            fetched_at: Instant::now(),
            max_age,
        })
    }
}

#[async_trait]
impl KeySource for JwksClient {
    async fn key_for(&self, kid: &str) -> Result<Option<DecodingKey>, KeySetError> {
        {
            let guard = self.cache.read().await;
            if let Some(ref cached) = *guard
                && !cached.is_stale()
            {
                if let Some(key) = cached.keys.get(kid) {
                    return Ok(Some(key.clone()));
                }
                if cached.fetched_at.elapsed() < self.min_refresh_interval {
                    return Ok(None);
                }
            }
        }
        debug!(kid, "refreshing signing keys");
        let fresh = match self.fetch().await {
            Ok(fresh) => fresh,
            Err(err) => {
                // keep serving keys we already hold while the provider is down
                if let Some(key) = self
                    .cache
                    .read()
                    .await
                    .as_ref()
                    .and_then(|cached| cached.keys.get(kid).cloned())
                {
                    warn!(kid, %err, "key set refresh failed, serving cached key");
                    return Ok(Some(key));
                }
                return Err(err);
            }
        };
        let key = fresh.keys.get(kid).cloned();
        *self.cache.write().await = Some(fresh);
        Ok(key)
    }
}

fn usable_keys(document: JwksDocument) -> HashMap<String, DecodingKey> {
    let mut keys = HashMap::new();
    for key in document.keys {
        if key.kty != "RSA" {
            continue;
        }
        if let Some(alg) = key.alg.as_deref()
            && alg != "RS256"
        {
            continue;
        }
        if let Some(u) = key.key_use.as_deref()
            && u != "sig"
        {
            continue;
        }
        let (Some(kid), Some(n), Some(e)) = (key.kid, key.n, key.e) else {
            continue;
        };
        if kid.trim().is_empty() {
            continue;
        }
        match DecodingKey::from_rsa_components(&n, &e) {
            Ok(decoding) => {
                keys.insert(kid, decoding);
            }
            Err(err) => warn!(kid = %kid, %err, "skipping unusable RSA key"),
        }
    }
    keys
}

fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control
        .split(',')
        .map(str::trim)
        .find_map(|directive| {
            directive
                .strip_prefix("max-age=")
                .and_then(|val| val.parse::<u64>().ok())
        })
}
