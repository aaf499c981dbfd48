//! Cookie construction for the login flow and sessions.
//!
//! The session and state cookies are added to a signed jar; the xsrf cookie is
//! plain so that browser scripts can read it and echo it in [`XSRF_HEADER`].

use core::time::Duration;

use axum_extra::extract::cookie::Key;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use eyre::WrapErr as _;

pub const STATE_COOKIE: &str = "statecookie";
pub const XSRF_COOKIE: &str = "xsrf-token";
pub const XSRF_HEADER: &str = "x-xsrf-token";

/// Builds the cookie signing key from a base64 secret of at least 64 bytes,
/// or generates a random one.
///
/// # Errors
///
/// Returns an error if the secret is not base64 or too short.
pub fn key_from_secret(secret: Option<&str>) -> eyre::Result<Key> {
    let Some(secret) = secret else {
        return Ok(Key::generate());
    };
    let bytes = STANDARD
        .decode(secret.trim())
        .wrap_err("Invalid cookie_secret in config: not base64")?;
    Key::try_from(bytes.as_slice())
        .wrap_err("Invalid cookie_secret length in config: expected at least 64 bytes")
}

/// Names and lifetimes of the cookies the gateway sets.
#[derive(Debug, Clone)]
pub struct CookieCodec {
    session_name: String,
    session_ttl: CookieDuration,
    state_ttl: CookieDuration,
}

impl CookieCodec {
    pub fn new(session_name: impl Into<String>, session_ttl: Duration, state_ttl: Duration) -> Self {
        Self {
            session_name: session_name.into(),
            session_ttl: cookie_duration(session_ttl),
            state_ttl: cookie_duration(state_ttl),
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// HttpOnly, `SameSite=Strict`, valid for the session lifetime.
    pub fn session_cookie(&self, session_id: &str, secure: bool) -> Cookie<'static> {
        Cookie::build((self.session_name.clone(), session_id.to_string()))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Strict)
            .max_age(self.session_ttl)
            .path("/")
            .build()
    }

    /// Readable by scripts. `Lax` so it is present on the first navigation
    /// back from the provider.
    pub fn xsrf_cookie(&self, token: &str, secure: bool) -> Cookie<'static> {
        Cookie::build((XSRF_COOKIE, token.to_string()))
            .http_only(false)
            .secure(secure)
            .same_site(SameSite::Lax)
            .max_age(self.session_ttl)
            .path("/")
            .build()
    }

    /// Must survive the top-level redirect back from the provider, hence `Lax`.
    pub fn state_cookie(&self, state_key: &str, secure: bool) -> Cookie<'static> {
        Cookie::build((STATE_COOKIE, state_key.to_string()))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .max_age(self.state_ttl)
            .path("/")
            .build()
    }

    pub fn clear_session(&self) -> Cookie<'static> {
        Cookie::build(self.session_name.clone()).path("/").build()
    }

    pub fn clear_xsrf(&self) -> Cookie<'static> {
        Cookie::build(XSRF_COOKIE).path("/").build()
    }

    pub fn clear_state(&self) -> Cookie<'static> {
        Cookie::build(STATE_COOKIE).path("/").build()
    }
}

fn cookie_duration(ttl: Duration) -> CookieDuration {
    CookieDuration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}
