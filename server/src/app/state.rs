use alloc::sync::Arc;
use core::time::Duration;
use std::path::Path;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use eyre::WrapErr as _;
use reqwest::redirect::Policy;
use secrecy::ExposeSecret as _;
use tracing::{info, warn};

use crate::{
    auth::{
        AllowListLookup, AuthObserver, Authenticator, CookieCodec, CsrfGuard, Expectations,
        FlowSettings, HttpTokenExchange, JwksClient, KeySource, LoginFlow, ReturnUrlPolicy,
        TokenExchange, TracingObserver, UserLookup, key_from_secret,
    },
    config::{GatewayConfig, StoreBackend, resolve_config_relative_paths},
    store::{AuthStore, MemoryStore, SqliteStore, spawn_purge_task},
};

/// Application state shared across request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Login and callback handling.
    pub flow: Arc<LoginFlow>,
    /// Session cookie resolution for protected routes.
    pub authenticator: Arc<Authenticator>,
    /// Double-submit check for state-changing requests.
    pub csrf: Arc<CsrfGuard>,
    pub cookies: Arc<CookieCodec>,
    /// Signs the session and state cookies.
    pub cookie_key: Key,
    /// Treat every request as HTTPS when deciding on `Secure` cookies.
    pub assume_tls: bool,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// The replaceable pieces the gateway talks to.
pub struct Collaborators {
    pub store: Arc<dyn AuthStore>,
    pub exchange: Arc<dyn TokenExchange>,
    pub keys: Arc<dyn KeySource>,
    pub users: Arc<dyn UserLookup>,
    pub observer: Arc<dyn AuthObserver>,
}

impl AppState {
    /// Wires the flow, authenticator and CSRF guard around `parts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider domain in `config` is not a valid host or URL.
    pub fn assemble(
        config: &GatewayConfig,
        parts: Collaborators,
        cookie_key: Key,
    ) -> eyre::Result<Self> {
        let settings = FlowSettings {
            authorize_url: config
                .idp
                .authorize_url()
                .wrap_err("Invalid idp.domain in config")?,
            client_id: config.idp.client_id.clone(),
            callback_url: config.idp.callback_url.clone(),
            return_urls: ReturnUrlPolicy::new(
                &config.login.return_hosts,
                config.login.default_return_url.clone(),
            ),
            expectations: Expectations {
                issuer: config.idp.issuer().wrap_err("Invalid idp.domain in config")?,
                audience: config.idp.client_id.clone(),
                leeway_secs: config.idp.leeway_secs,
            },
            session_ttl: config.session.ttl(),
            state_ttl: config.session.state_ttl(),
            tokens: config.tokens,
        };
        let Collaborators {
            store,
            exchange,
            keys,
            users,
            observer,
        } = parts;

        Ok(Self {
            flow: Arc::new(LoginFlow::new(
                settings,
                store.clone(),
                exchange,
                keys,
                users,
                observer.clone(),
            )),
            authenticator: Arc::new(Authenticator::new(store, observer.clone())),
            csrf: Arc::new(CsrfGuard::new(observer)),
            cookies: Arc::new(CookieCodec::new(
                config.session.cookie_name.clone(),
                config.session.ttl(),
                config.session.state_ttl(),
            )),
            cookie_key,
            assume_tls: config.server.assume_tls,
        })
    }

    /// Builds the production state: configured store (with its purge task),
    /// HTTP clients for the provider, the allow-list lookup and tracing observer.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened, the cookie secret is
    /// invalid or the provider endpoints cannot be derived.
    #[tracing::instrument(skip_all)]
    pub async fn from_config(config: &GatewayConfig, config_path: &Path) -> eyre::Result<Self> {
        let store = open_store(config, config_path).await?;
        spawn_purge_task(
            store.clone(),
            Duration::from_secs(config.store.purge_interval_secs.max(1)),
        );

        crate::init_rustls();
        let http = reqwest::Client::builder()
            .timeout(config.idp.timeout())
            .redirect(Policy::none())
            .build()
            .wrap_err("Failed to build HTTP client for the identity provider")?;
        let exchange = HttpTokenExchange::new(
            http.clone(),
            config.idp.token_url().wrap_err("Invalid idp.domain in config")?,
            config.idp.client_id.clone(),
            config.idp.client_secret.clone(),
            config.idp.callback_url.clone(),
        );
        let keys = JwksClient::new(
            http,
            config.idp.jwks_url().wrap_err("Invalid idp.domain in config")?,
            Duration::from_secs(config.idp.jwks_max_age_secs),
        );

        let cookie_key = key_from_secret(
            config
                .session
                .cookie_secret
                .as_ref()
                .map(|s| s.expose_secret()),
        )?;
        if config.session.cookie_secret.is_none() {
            warn!("No session.cookie_secret configured; sessions will not survive a restart");
        }
        if config.users.allow.is_empty() {
            info!("users.allow is empty; every verified principal is recognized");
        }

        Self::assemble(
            config,
            Collaborators {
                store,
                exchange: Arc::new(exchange),
                keys: Arc::new(keys),
                users: Arc::new(AllowListLookup::new(config.users.allow.iter().cloned())),
                observer: Arc::new(TracingObserver),
            },
            cookie_key,
        )
    }
}

async fn open_store(config: &GatewayConfig, config_path: &Path) -> eyre::Result<Arc<dyn AuthStore>> {
    Ok(match config.store.backend {
        StoreBackend::Memory => {
            info!("Session store: memory");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Sqlite { ref path } => {
            let resolved = resolve_config_relative_paths(config_path, path);
            info!("Session store: sqlite at {}", resolved.display());
            Arc::new(
                SqliteStore::open(&resolved)
                    .await
                    .wrap_err(format!("Failed to open session database at {}", resolved.display()))?,
            )
        }
    })
}
