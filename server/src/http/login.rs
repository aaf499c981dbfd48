//! Login, callback and logout handlers.

use axum::{
    Extension, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{CookieJar, SignedCookieJar};
use serde::Deserialize;

use crate::{
    app::AppState,
    auth::{AuthError, CallbackParams, ClientMeta, STATE_COOKIE},
    http::request_is_secure,
    store::Session,
};

/// Returns a router with the public authentication routes.
/// Logout needs a session and is mounted with the private routes.
pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginQuery {
    return_url: Option<String>,
}

/// Starts a login: stores the pending state, sets the state cookie and
/// redirects to the provider.
#[axum::debug_handler]
pub(crate) async fn login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    headers: HeaderMap,
    client: ClientMeta,
    Query(LoginQuery { return_url }): Query<LoginQuery>,
) -> Result<impl IntoResponse, AuthError> {
    let redirect = state
        .flow
        .initiate_login(return_url.as_deref(), &client)
        .await?;
    let secure = request_is_secure(&headers, state.assume_tls);
    let jar = jar.add(state.cookies.state_cookie(&redirect.state_key, secure));
    Ok((jar, Redirect::to(redirect.authorize_url.as_str())))
}

/// Provider redirect target. The state cookie is cleared whatever the outcome;
/// on success the session and xsrf cookies are set.
#[axum::debug_handler]
pub(crate) async fn callback(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    headers: HeaderMap,
    client: ClientMeta,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    let state_cookie = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(state.cookies.clear_state());

    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            let err = state
                .flow
                .reject_malformed_callback(&rejection.body_text(), state_cookie.as_deref(), &client)
                .await;
            return (jar, err).into_response();
        }
    };

    match state
        .flow
        .handle_callback(&params, state_cookie.as_deref(), &client)
        .await
    {
        Ok(established) => {
            let secure = request_is_secure(&headers, state.assume_tls);
            let jar = jar.add(
                state
                    .cookies
                    .session_cookie(&established.session.id, secure),
            );
            let xsrf = CookieJar::new().add(state.cookies.xsrf_cookie(&established.xsrf_token, secure));
            (jar, xsrf, Redirect::to(&established.return_url)).into_response()
        }
        Err(e) => (jar, e).into_response(),
    }
}

/// Ends the session. Mounted behind the session and xsrf middleware.
#[axum::debug_handler]
pub(crate) async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: SignedCookieJar,
    xsrf: CookieJar,
    client: ClientMeta,
) -> Result<impl IntoResponse, AuthError> {
    state.flow.logout(&session, &client).await?;
    let jar = jar.remove(state.cookies.clear_session());
    let xsrf = xsrf.remove(state.cookies.clear_xsrf());
    let target = state.flow.settings().return_urls.default_url().clone();
    Ok((jar, xsrf, Redirect::to(target.as_str())))
}
