//! Structured reporting of authentication events.
//!
//! Every rejection point in the login flow, the request authenticator and the
//! CSRF guard reports an [`AuthEvent`] together with the [`ClientMeta`] of
//! the request. The default [`TracingObserver`] turns them into log records.
//! Callback protocol violations are logged at error level with the client
//! address; a request without a session cookie is routine and stays at debug.

use core::net::SocketAddr;

use tracing::{debug, error, info, warn};

use crate::{
    auth::{ExchangeError, VerifyError},
    store::StoreError,
};

/// Where a request came from, for diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    /// Peer address of the TCP connection.
    pub remote_addr: Option<SocketAddr>,
    /// Raw `X-Forwarded-For` header, if a proxy set one.
    pub forwarded_for: Option<String>,
}

impl ClientMeta {
    /// Best guess at the originating address: the first forwarded hop, else the peer.
    pub fn origin(&self) -> String {
        self.forwarded_for
            .as_deref()
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .map(str::to_string)
            .or_else(|| self.remote_addr.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug)]
pub enum AuthEvent<'a> {
    ReturnUrlRejected { return_url: &'a str },
    LoginStarted,
    StateCookieMissing,
    UnknownState,
    StateMismatch,
    MalformedCallback { error: &'a str },
    ProviderError {
        error: &'a str,
        description: Option<&'a str>,
    },
    MissingCode,
    UpstreamFailure { error: &'a ExchangeError },
    VerificationFailed { error: &'a VerifyError },
    UserNotRecognized { subject: &'a str },
    LookupFailed { error: &'a str },
    StoreFailed { error: &'a StoreError },
    LoginSucceeded { subject: &'a str },
    SessionCookieMissing,
    SessionNotFound,
    XsrfHeaderMissing,
    XsrfCookieMissing,
    XsrfMismatch,
    OriginMismatch { origin: &'a str, host: &'a str },
    LoggedOut { subject: &'a str },
}

impl AuthEvent<'_> {
    /// Stable event name, used as the `event` log field.
    pub const fn name(&self) -> &'static str {
        match *self {
            Self::ReturnUrlRejected { .. } => "return_url_rejected",
            Self::LoginStarted => "login_started",
            Self::StateCookieMissing => "state_cookie_missing",
            Self::UnknownState => "unknown_state",
            Self::StateMismatch => "state_mismatch",
            Self::MalformedCallback { .. } => "malformed_callback",
            Self::ProviderError { .. } => "provider_error",
            Self::MissingCode => "missing_code",
            Self::UpstreamFailure { .. } => "upstream_failure",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::UserNotRecognized { .. } => "user_not_recognized",
            Self::LookupFailed { .. } => "lookup_failed",
            Self::StoreFailed { .. } => "store_failed",
            Self::LoginSucceeded { .. } => "login_succeeded",
            Self::SessionCookieMissing => "session_cookie_missing",
            Self::SessionNotFound => "session_not_found",
            Self::XsrfHeaderMissing => "xsrf_header_missing",
            Self::XsrfCookieMissing => "xsrf_cookie_missing",
            Self::XsrfMismatch => "xsrf_mismatch",
            Self::OriginMismatch { .. } => "origin_mismatch",
            Self::LoggedOut { .. } => "logged_out",
        }
    }
}

/// Sink for authentication events.
pub trait AuthObserver: Send + Sync {
    fn observe(&self, event: &AuthEvent<'_>, client: &ClientMeta);
}

/// Logs events through `tracing`. Protocol violations that hint at an attack
/// (state mismatch, CSRF failures) are logged with the originating address.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AuthObserver for TracingObserver {
    fn observe(&self, event: &AuthEvent<'_>, client: &ClientMeta) {
        let name = event.name();
        let origin = client.origin();
        match *event {
            AuthEvent::ReturnUrlRejected { return_url } => {
                warn!(event = name, %return_url, client = %origin, "login: return_url host not allowed");
            }
            AuthEvent::LoginStarted => debug!(event = name, "login: redirecting to provider"),
            AuthEvent::StateCookieMissing => {
                error!(event = name, client = %origin, "callback: state cookie missing");
            }
            AuthEvent::UnknownState => {
                error!(event = name, client = %origin, "callback: state unknown, expired or already used");
            }
            AuthEvent::StateMismatch => {
                error!(event = name, client = %origin, "callback: state parameter does not match");
            }
            AuthEvent::MalformedCallback { error } => {
                error!(event = name, %error, client = %origin, "callback: query string could not be parsed");
            }
            AuthEvent::ProviderError { error, description } => {
                warn!(event = name, %error, description = description.unwrap_or_default(), "callback: provider returned an error");
            }
            AuthEvent::MissingCode => {
                error!(event = name, client = %origin, "callback: authorization code missing");
            }
            AuthEvent::UpstreamFailure { error } => {
                error!(event = name, %error, payload = error.payload().unwrap_or_default(), "callback: token exchange failed");
            }
            AuthEvent::VerificationFailed { error } => {
                error!(event = name, check = error.check(), %error, "callback: identity token rejected");
            }
            AuthEvent::UserNotRecognized { subject } => {
                info!(event = name, %subject, client = %origin, "callback: principal is not a user of this application");
            }
            AuthEvent::LookupFailed { error } => {
                error!(event = name, %error, "callback: user lookup failed");
            }
            AuthEvent::StoreFailed { error } => error!(event = name, %error, "session store failure"),
            AuthEvent::LoginSucceeded { subject } => {
                info!(event = name, %subject, client = %origin, "login: session established");
            }
            AuthEvent::SessionCookieMissing => debug!(event = name, "request has no session cookie"),
            AuthEvent::SessionNotFound => info!(event = name, "session timed out or not found"),
            AuthEvent::XsrfHeaderMissing | AuthEvent::XsrfCookieMissing | AuthEvent::XsrfMismatch => {
                error!(
                    event = name,
                    forwarded_for = client.forwarded_for.as_deref().unwrap_or_default(),
                    client = %origin,
                    "xsrf check failed"
                );
            }
            AuthEvent::OriginMismatch { origin: claimed, host } => {
                warn!(event = name, origin = %claimed, %host, client = %origin, "origin/referer does not match host");
            }
            AuthEvent::LoggedOut { subject } => info!(event = name, %subject, "logout: session removed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_prefers_first_forwarded_hop() {
        let client = ClientMeta {
            remote_addr: Some("10.0.0.1:5000".parse().unwrap()),
            forwarded_for: Some(" 203.0.113.7 , 10.0.0.1".to_string()),
        };
        assert_eq!(client.origin(), "203.0.113.7");
    }

    #[test]
    fn origin_falls_back_to_peer_address() {
        let client = ClientMeta {
            remote_addr: Some("192.0.2.4:443".parse().unwrap()),
            forwarded_for: Some(String::new()),
        };
        assert_eq!(client.origin(), "192.0.2.4");
        assert_eq!(ClientMeta::default().origin(), "unknown");
    }
}
