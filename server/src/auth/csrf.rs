//! Double-submit CSRF guard.
//!
//! The xsrf cookie is set at login; clients echo its value in the
//! `X-XSRF-TOKEN` header. A cross-site page cannot read the cookie, so it
//! cannot produce a matching header.

use alloc::sync::Arc;

use axum::http::{
    HeaderMap,
    header::{HOST, ORIGIN, REFERER},
};
use axum_extra::extract::cookie::CookieJar;
use url::Url;

use sessiongate_common::tokens_match;

use crate::auth::{AuthError, AuthEvent, AuthObserver, ClientMeta, XSRF_COOKIE, XSRF_HEADER};

pub struct CsrfGuard {
    observer: Arc<dyn AuthObserver>,
}

impl CsrfGuard {
    pub fn new(observer: Arc<dyn AuthObserver>) -> Self {
        Self { observer }
    }

    /// Checks the request's xsrf header against its xsrf cookie and returns
    /// the token on success.
    ///
    /// # Errors
    ///
    /// [`AuthError::XsrfCheckFailed`] if either is missing or they differ.
    pub fn check(&self, headers: &HeaderMap, client: &ClientMeta) -> Result<String, AuthError> {
        self.report_origin_mismatch(headers, client);
        let header = headers.get(XSRF_HEADER).and_then(|v| v.to_str().ok());
        let jar = CookieJar::from_headers(headers);
        let cookie = jar.get(XSRF_COOKIE).map(|c| c.value());
        self.check_values(header, cookie, client)
    }

    /// The comparison itself, on already extracted values.
    ///
    /// # Errors
    ///
    /// [`AuthError::XsrfCheckFailed`] if either is missing or they differ.
    pub fn check_values(
        &self,
        header: Option<&str>,
        cookie: Option<&str>,
        client: &ClientMeta,
    ) -> Result<String, AuthError> {
        let Some(header) = header else {
            self.observer.observe(&AuthEvent::XsrfHeaderMissing, client);
            return Err(AuthError::XsrfCheckFailed);
        };
        let Some(cookie) = cookie else {
            self.observer.observe(&AuthEvent::XsrfCookieMissing, client);
            return Err(AuthError::XsrfCheckFailed);
        };
        if !tokens_match(header, cookie) {
            self.observer.observe(&AuthEvent::XsrfMismatch, client);
            return Err(AuthError::XsrfCheckFailed);
        }
        Ok(cookie.to_string())
    }

    /// Logs (but does not reject) requests whose Origin or Referer names a
    /// different host than the one they were sent to.
    fn report_origin_mismatch(&self, headers: &HeaderMap, client: &ClientMeta) {
        let Some(origin) = headers
            .get(ORIGIN)
            .or_else(|| headers.get(REFERER))
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };
        let Some(host) = headers
            .get("x-forwarded-host")
            .or_else(|| headers.get(HOST))
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };
        let matches = origin_authority(origin).is_some_and(|a| a.eq_ignore_ascii_case(host.trim()));
        if !matches {
            self.observer
                .observe(&AuthEvent::OriginMismatch { origin, host }, client);
        }
    }
}

/// `host[:port]` of an Origin or Referer value.
fn origin_authority(value: &str) -> Option<String> {
    let url = Url::parse(value).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
