//! Configuration data types and structures for the gateway.
//!
//! This module contains all the data structures used for configuration,
//! including server, identity provider, session, login, token and store settings.

use alloc::sync::Arc;
use core::time::Duration;
use std::path::{Component, Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use sessiongate_common::{SESSION_ID_BYTES, STATE_BYTES, XSRF_TOKEN_BYTES};

/// HTTP server binding configuration section.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// TCP port for the HTTP listener.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Treat every request as arriving over HTTPS. Set this when a TLS
    /// terminator in front of the gateway does not forward protocol headers.
    #[serde(default)]
    pub assume_tls: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            assume_tls: false,
        }
    }
}

const fn default_port() -> u16 {
    8080
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

/// The single trusted identity provider.
#[derive(Debug, Deserialize, Clone)]
pub struct IdpConfig {
    /// Authentication domain. A bare host (`tenant.eu.auth0.com`) is served over
    /// https; a full URL (`http://127.0.0.1:9000`) is used as-is.
    pub domain: String,
    pub client_id: String,
    pub client_secret: Arc<SecretString>,
    /// Absolute URL of `/auth/callback` as reachable by the browser.
    pub callback_url: Url,
    /// Timeout for token-exchange and key-set requests.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Accepted clock skew when checking `exp`.
    #[serde(default)]
    pub leeway_secs: u64,
    /// Key-set cache lifetime when the provider sends no `Cache-Control: max-age`.
    #[serde(default = "default_jwks_max_age_secs")]
    pub jwks_max_age_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_jwks_max_age_secs() -> u64 {
    300
}

impl IdpConfig {
    /// Base URL of the provider, always without a trailing slash.
    ///
    /// # Errors
    ///
    /// Returns an error if `domain` is neither a host nor a valid URL.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        let domain = self.domain.trim().trim_end_matches('/');
        if domain.contains("://") {
            Url::parse(domain)
        } else {
            Url::parse(&format!("https://{domain}"))
        }
    }

    /// The `iss` value identity tokens must carry: the base URL with a trailing slash.
    ///
    /// # Errors
    ///
    /// Returns an error if `domain` is neither a host nor a valid URL.
    pub fn issuer(&self) -> Result<String, url::ParseError> {
        let base = self.base_url()?;
        Ok(format!("{}/", base.as_str().trim_end_matches('/')))
    }

    /// Authorization endpoint the browser is redirected to.
    ///
    /// # Errors
    ///
    /// Returns an error if `domain` is neither a host nor a valid URL.
    pub fn authorize_url(&self) -> Result<Url, url::ParseError> {
        self.endpoint("authorize")
    }

    /// Token endpoint used for the code exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if `domain` is neither a host nor a valid URL.
    pub fn token_url(&self) -> Result<Url, url::ParseError> {
        self.endpoint("oauth/token")
    }

    /// Published key set.
    ///
    /// # Errors
    ///
    /// Returns an error if `domain` is neither a host nor a valid URL.
    pub fn jwks_url(&self) -> Result<Url, url::ParseError> {
        self.endpoint(".well-known/jwks.json")
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}/{path}", self.issuer()?.trim_end_matches('/')))
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Session and cookie settings.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Lifetime of a session record and of the session and xsrf cookies.
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
    /// Lifetime of a pending-login record and its state cookie.
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,
    /// Optional base64-encoded cookie signing key (at least 64 bytes). If omitted,
    /// a random key is generated on startup and sessions do not survive restarts.
    #[serde(default)]
    pub cookie_secret: Option<Arc<SecretString>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl_secs: default_session_ttl_secs(),
            state_ttl_secs: default_state_ttl_secs(),
            cookie_secret: None,
        }
    }
}

impl SessionConfig {
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub const fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

fn default_cookie_name() -> String {
    "session".to_string()
}

const fn default_session_ttl_secs() -> u64 {
    24 * 60 * 60
}

const fn default_state_ttl_secs() -> u64 {
    10 * 60
}

/// Where the browser may be sent back to after login.
#[derive(Debug, Deserialize, Clone)]
pub struct LoginConfig {
    /// Hosts a `return_url` may point at (open-redirect defense).
    pub return_hosts: Vec<String>,
    /// Used when a login request carries no `return_url`, and after logout.
    pub default_return_url: Url,
}

/// Byte lengths of the generated opaque tokens (hex-encoded on the wire).
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TokenConfig {
    #[serde(default = "default_session_bytes")]
    pub session_bytes: usize,
    #[serde(default = "default_state_bytes")]
    pub state_bytes: usize,
    #[serde(default = "default_xsrf_bytes")]
    pub xsrf_bytes: usize,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            session_bytes: default_session_bytes(),
            state_bytes: default_state_bytes(),
            xsrf_bytes: default_xsrf_bytes(),
        }
    }
}

const fn default_session_bytes() -> usize {
    SESSION_ID_BYTES
}

const fn default_state_bytes() -> usize {
    STATE_BYTES
}

const fn default_xsrf_bytes() -> usize {
    XSRF_TOKEN_BYTES
}

/// Backend for session and pending-login records.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map; records are lost on restart.
    Memory,
    /// `SQLite` database. Relative paths are resolved relative to the config file.
    Sqlite {
        #[serde(default = "default_db_path")]
        path: String,
    },
}

/// Store configuration section.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(flatten)]
    pub backend: StoreBackend,
    /// How often expired records are purged.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn default_db_path() -> String {
    "./sessiongate.db".to_string()
}

const fn default_purge_interval_secs() -> u64 {
    60
}

/// Application user lookup.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct UsersConfig {
    /// Subjects or e-mail addresses that are recognized. Empty means every
    /// verified principal is recognized.
    #[serde(default)]
    pub allow: Vec<String>,
}

/// Root config structure for the gateway.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub idp: IdpConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub login: LoginConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub users: UsersConfig,
}

/// Resolves a path to an absolute one.
///
/// If the path is absolute, returns it as-is. If relative, joins it with the
/// config file's parent directory and normalizes the result to remove redundant
/// components like `./`.
pub fn resolve_config_relative_paths(config_path: &Path, relative_path: &str) -> PathBuf {
    let path = Path::new(relative_path);
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else if relative_path == ":memory:" {
        // Special case: SQLite in-memory database path
        path.to_path_buf()
    } else {
        config_path
            .parent()
            .map_or_else(|| path.to_path_buf(), |d| d.join(path))
    };

    // We can't use canonicalize() because the file might not exist yet
    normalize_path(&resolved)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        use Component as C;
        match component {
            C::Normal(c) => {
                result.push(c);
            }
            C::ParentDir => {
                result.pop();
            }
            C::CurDir => {}
            C::RootDir | C::Prefix(_) => {
                result.push(component);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idp(domain: &str) -> IdpConfig {
        IdpConfig {
            domain: domain.to_string(),
            client_id: "client".to_string(),
            client_secret: Arc::new(SecretString::from("secret")),
            callback_url: Url::parse("https://app.example.com/auth/callback").unwrap(),
            timeout_secs: default_timeout_secs(),
            leeway_secs: 0,
            jwks_max_age_secs: default_jwks_max_age_secs(),
        }
    }

    #[test]
    fn bare_domain_is_served_over_https() {
        let cfg = idp("tenant.eu.auth0.com");
        assert_eq!(cfg.issuer().unwrap(), "https://tenant.eu.auth0.com/");
        assert_eq!(
            cfg.authorize_url().unwrap().as_str(),
            "https://tenant.eu.auth0.com/authorize"
        );
        assert_eq!(
            cfg.token_url().unwrap().as_str(),
            "https://tenant.eu.auth0.com/oauth/token"
        );
        assert_eq!(
            cfg.jwks_url().unwrap().as_str(),
            "https://tenant.eu.auth0.com/.well-known/jwks.json"
        );
    }

    #[test]
    fn full_url_domain_is_kept() {
        let cfg = idp("http://127.0.0.1:9000/");
        assert_eq!(cfg.issuer().unwrap(), "http://127.0.0.1:9000/");
        assert_eq!(
            cfg.token_url().unwrap().as_str(),
            "http://127.0.0.1:9000/oauth/token"
        );
    }

    #[test]
    fn relative_paths_resolve_next_to_config() {
        let resolved =
            resolve_config_relative_paths(Path::new("/etc/sessiongate/config.toml"), "./s.db");
        assert_eq!(resolved, PathBuf::from("/etc/sessiongate/s.db"));
        let memory = resolve_config_relative_paths(Path::new("/etc/x.toml"), ":memory:");
        assert_eq!(memory, PathBuf::from(":memory:"));
    }
}
