use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::SignedCookieJar;

use crate::{
    app::AppState,
    auth::{AuthError, ClientMeta},
};

/// Custom failure handling for the trace layer. 503 responses are logged
/// at `INFO` instead of `ERROR` so they don't fill the error log.
#[derive(Clone, Copy)]
pub(crate) struct LevelAdjustingOnFailure;

impl tower_http::trace::OnFailure<tower_http::classify::ServerErrorsFailureClass>
    for LevelAdjustingOnFailure
{
    fn on_failure(
        &mut self,
        failure_classification: tower_http::classify::ServerErrorsFailureClass,
        latency: core::time::Duration,
        span: &tracing::Span,
    ) {
        use tower_http::classify::ServerErrorsFailureClass as S;

        match failure_classification {
            S::StatusCode(StatusCode::SERVICE_UNAVAILABLE) => {
                tracing::info!(classification = %S::StatusCode(StatusCode::SERVICE_UNAVAILABLE), latency = %format!("{} ms", latency.as_millis()), "response failed (downgraded)");
            }
            value => {
                tower_http::trace::DefaultOnFailure::default().on_failure(value, latency, span);
            }
        }
    }
}

/// Middleware to set security headers on all responses.
///
/// The gateway serves no documents of its own, so everything is locked down.
pub(crate) async fn secure_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );
    response
}

/// Rejects requests without a live session and hands the [`crate::store::Session`]
/// to the handler as a request extension.
pub(crate) async fn require_session(
    State(state): State<AppState>,
    client: ClientMeta,
    jar: SignedCookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let cookie = jar
        .get(state.cookies.session_name())
        .map(|c| c.value().to_string());
    let session = state
        .authenticator
        .authenticate(cookie.as_deref(), &client)
        .await?;
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Applies the double-submit check to every request with an unsafe method.
pub(crate) async fn require_xsrf(
    State(state): State<AppState>,
    client: ClientMeta,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    if !req.method().is_safe() {
        state.csrf.check(req.headers(), &client)?;
    }
    Ok(next.run(req).await)
}
