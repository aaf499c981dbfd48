//! The login/callback flow.
//!
//! `initiate_login` records a pending login and builds the authorize URL.
//! `handle_callback` validates the browser's return from the provider step by
//! step. Each step fails closed and the order matters: the state cookie and
//! stored state are checked before anything is sent to the provider, so a
//! forged or replayed callback never reaches the token endpoint.

use alloc::sync::Arc;
use core::time::Duration;
use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use url::Url;

use sessiongate_common::{generate_token, tokens_match};

use crate::{
    auth::{
        AuthError, AuthEvent, AuthObserver, AuthenticatedUser, ClientMeta, Expectations,
        IdentityClaims, KeySource, TokenExchange, UserLookup, VerifyError, token_key_id,
        verify_id_token,
    },
    config::TokenConfig,
    store::{AuthStore, PendingLogin, Session, StoreError},
};

/// Scopes requested from the provider.
pub const SCOPES: &str = "openid profile email";

/// Which `return_url` values a login may carry.
#[derive(Debug, Clone)]
pub struct ReturnUrlPolicy {
    hosts: HashSet<String>,
    default: Url,
}

impl ReturnUrlPolicy {
    pub fn new<I, S>(hosts: I, default: Url) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().to_ascii_lowercase())
                .collect(),
            default,
        }
    }

    pub const fn default_url(&self) -> &Url {
        &self.default
    }

    /// Absent or empty means the default. Anything else must be an absolute
    /// http(s) URL on an allowed host.
    pub fn resolve(&self, requested: Option<&str>) -> Option<Url> {
        let Some(requested) = requested.filter(|r| !r.is_empty()) else {
            return Some(self.default.clone());
        };
        Url::parse(requested).ok().filter(|url| {
            matches!(url.scheme(), "http" | "https")
                && url
                    .host_str()
                    .is_some_and(|host| self.hosts.contains(&host.to_ascii_lowercase()))
        })
    }
}

/// Static parameters of the flow, derived from the configuration.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub authorize_url: Url,
    pub client_id: String,
    pub callback_url: Url,
    pub return_urls: ReturnUrlPolicy,
    pub expectations: Expectations,
    pub session_ttl: Duration,
    pub state_ttl: Duration,
    pub tokens: TokenConfig,
}

/// Query parameters of `/auth/callback`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Where to send the browser, plus the value for the state cookie.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub authorize_url: Url,
    pub state_key: String,
}

/// A freshly stored session plus the cookie values to hand to the browser.
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    pub session: Session,
    pub xsrf_token: String,
    pub return_url: String,
}

pub struct LoginFlow {
    settings: FlowSettings,
    store: Arc<dyn AuthStore>,
    exchange: Arc<dyn TokenExchange>,
    keys: Arc<dyn KeySource>,
    users: Arc<dyn UserLookup>,
    observer: Arc<dyn AuthObserver>,
}

impl LoginFlow {
    pub fn new(
        settings: FlowSettings,
        store: Arc<dyn AuthStore>,
        exchange: Arc<dyn TokenExchange>,
        keys: Arc<dyn KeySource>,
        users: Arc<dyn UserLookup>,
        observer: Arc<dyn AuthObserver>,
    ) -> Self {
        Self {
            settings,
            store,
            exchange,
            keys,
            users,
            observer,
        }
    }

    pub const fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// Records a pending login and returns the provider's authorize URL.
    ///
    /// # Errors
    ///
    /// [`AuthError::ReturnUrlNotAllowed`] if `return_url` is not permitted;
    /// nothing is stored in that case.
    pub async fn initiate_login(
        &self,
        return_url: Option<&str>,
        client: &ClientMeta,
    ) -> Result<LoginRedirect, AuthError> {
        let Some(target) = self.settings.return_urls.resolve(return_url) else {
            self.report(
                &AuthEvent::ReturnUrlRejected {
                    return_url: return_url.unwrap_or_default(),
                },
                client,
            );
            return Err(AuthError::ReturnUrlNotAllowed);
        };

        let state = generate_token(self.settings.tokens.state_bytes);
        let state_key = generate_token(self.settings.tokens.state_bytes);
        let pending = PendingLogin {
            state: state.clone(),
            return_url: target.into(),
            created_at: Utc::now(),
        };
        self.store
            .put_state(&state_key, &pending, self.settings.state_ttl)
            .await
            .map_err(|e| self.store_failure(&e, client))?;

        let mut authorize_url = self.settings.authorize_url.clone();
        authorize_url
            .query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", self.settings.callback_url.as_str())
            .append_pair("scope", SCOPES)
            .append_pair("state", &state);

        self.report(&AuthEvent::LoginStarted, client);
        Ok(LoginRedirect {
            authorize_url,
            state_key,
        })
    }

    /// Validates a callback and establishes a session.
    ///
    /// The pending login is consumed as soon as it is looked up, whatever the
    /// outcome of the later steps.
    ///
    /// # Errors
    ///
    /// Returns the first failing step as an [`AuthError`]; details go to the observer.
    pub async fn handle_callback(
        &self,
        params: &CallbackParams,
        state_cookie: Option<&str>,
        client: &ClientMeta,
    ) -> Result<EstablishedSession, AuthError> {
        let Some(state_key) = state_cookie.filter(|c| !c.is_empty()) else {
            self.report(&AuthEvent::StateCookieMissing, client);
            return Err(AuthError::StateCookieMissing);
        };

        let Some(pending) = self
            .store
            .take_state(state_key)
            .await
            .map_err(|e| self.store_failure(&e, client))?
        else {
            self.report(&AuthEvent::UnknownState, client);
            return Err(AuthError::InvalidState);
        };

        let state_matches = params
            .state
            .as_deref()
            .is_some_and(|state| tokens_match(state, &pending.state));
        if !state_matches {
            self.report(&AuthEvent::StateMismatch, client);
            return Err(AuthError::IllegalStateValue);
        }

        if let Some(ref error) = params.error {
            self.report(
                &AuthEvent::ProviderError {
                    error,
                    description: params.error_description.as_deref(),
                },
                client,
            );
            return Err(AuthError::ProviderRejected);
        }

        let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
            self.report(&AuthEvent::MissingCode, client);
            return Err(AuthError::MissingCode);
        };

        let tokens = match self.exchange.exchange(code).await {
            Ok(tokens) => tokens,
            Err(error) => {
                self.report(&AuthEvent::UpstreamFailure { error: &error }, client);
                return Err(AuthError::InvalidIdpResponse);
            }
        };

        let claims = match self.verify(&tokens.id_token).await {
            Ok(claims) => claims,
            Err(error) => {
                self.report(&AuthEvent::VerificationFailed { error: &error }, client);
                return Err(AuthError::TokenVerificationFailed);
            }
        };

        let principal = AuthenticatedUser::from(claims);
        let user = match self.users.lookup(&principal).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.report(
                    &AuthEvent::UserNotRecognized {
                        subject: &principal.subject,
                    },
                    client,
                );
                return Err(AuthError::UserNotRecognized);
            }
            Err(error) => {
                self.report(
                    &AuthEvent::LookupFailed {
                        error: &error.to_string(),
                    },
                    client,
                );
                return Err(AuthError::Internal);
            }
        };

        let now = Utc::now();
        let session = Session {
            id: generate_token(self.settings.tokens.session_bytes),
            user,
            created_at: now,
            expires_at: expires_after(now, self.settings.session_ttl),
        };
        self.store
            .put_session(&session, self.settings.session_ttl)
            .await
            .map_err(|e| self.store_failure(&e, client))?;

        self.report(
            &AuthEvent::LoginSucceeded {
                subject: &session.user.subject,
            },
            client,
        );
        Ok(EstablishedSession {
            session,
            xsrf_token: generate_token(self.settings.tokens.xsrf_bytes),
            return_url: pending.return_url,
        })
    }

    /// Rejects a callback whose query string could not be parsed.
    ///
    /// The state cookie is still checked first, and a pending login it names
    /// is consumed, exactly as for a well-formed callback.
    ///
    /// Returns [`AuthError::StateCookieMissing`] without a state cookie,
    /// otherwise [`AuthError::MalformedCallback`].
    pub async fn reject_malformed_callback(
        &self,
        reason: &str,
        state_cookie: Option<&str>,
        client: &ClientMeta,
    ) -> AuthError {
        let Some(state_key) = state_cookie.filter(|c| !c.is_empty()) else {
            self.report(&AuthEvent::StateCookieMissing, client);
            return AuthError::StateCookieMissing;
        };
        if let Err(e) = self.store.take_state(state_key).await {
            return self.store_failure(&e, client);
        }
        self.report(&AuthEvent::MalformedCallback { error: reason }, client);
        AuthError::MalformedCallback
    }

    /// Removes the session record; the cookie becomes useless immediately.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the store fails.
    pub async fn logout(&self, session: &Session, client: &ClientMeta) -> Result<(), AuthError> {
        self.store
            .remove_session(&session.id)
            .await
            .map_err(|e| self.store_failure(&e, client))?;
        self.report(
            &AuthEvent::LoggedOut {
                subject: &session.user.subject,
            },
            client,
        );
        Ok(())
    }

    async fn verify(&self, id_token: &str) -> Result<IdentityClaims, VerifyError> {
        let kid = token_key_id(id_token).ok_or(VerifyError::MissingKeyId)?;
        let key = self
            .keys
            .key_for(&kid)
            .await?
            .ok_or_else(|| VerifyError::UnknownKey(kid.clone()))?;
        verify_id_token(
            id_token,
            &key,
            &self.settings.expectations,
            Utc::now().timestamp(),
        )
    }

    fn report(&self, event: &AuthEvent<'_>, client: &ClientMeta) {
        self.observer.observe(event, client);
    }

    fn store_failure(&self, error: &StoreError, client: &ClientMeta) -> AuthError {
        self.report(&AuthEvent::StoreFailed { error }, client);
        AuthError::Internal
    }
}

fn expires_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
