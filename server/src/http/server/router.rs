use core::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{
        HeaderName, Request, StatusCode,
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    },
    middleware::{self as ax_middleware},
    routing::{self, post},
};
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt as _, request_id::MakeRequestUuid, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::{
    app::AppState,
    auth::XSRF_HEADER,
    http::{
        api, login,
        server::middleware::{
            LevelAdjustingOnFailure, require_session, require_xsrf, secure_headers_middleware,
        },
    },
};

/// Creates the application router by merging public and private routes.
///
/// Public routes are the login endpoints and the health check. Private routes
/// require a session, and state-changing requests among them additionally
/// pass the xsrf check.
pub(crate) fn create_app_router(app_state: &AppState) -> Router<AppState> {
    let public = Router::new().merge(login::routes()).merge(api::public_routes());

    let private = Router::new()
        .route("/auth/logout", post(login::logout))
        .nest("/api", api::routes())
        .route_layer(ax_middleware::from_fn_with_state(
            app_state.clone(),
            require_xsrf,
        ))
        .route_layer(ax_middleware::from_fn_with_state(
            app_state.clone(),
            require_session,
        ));

    public.merge(private)
}

/// The complete service: routes plus the tracing, request-id, timeout and
/// security-header middleware. Serve it with connect info so client
/// addresses show up in the logs.
pub fn create_app(app_state: AppState) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .sensitive_headers([
            AUTHORIZATION,
            COOKIE,
            SET_COOKIE,
            HeaderName::from_static(XSRF_HEADER),
        ])
        .set_x_request_id(MakeRequestUuid)
        .propagate_x_request_id()
        .layer(TraceLayer::new_for_http().on_failure(LevelAdjustingOnFailure))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(ax_middleware::from_fn(secure_headers_middleware));

    create_app_router(&app_state)
        .with_state(app_state)
        .fallback(routing::any(|req: Request<Body>| async move {
            tracing::warn!(method = %req.method(), uri = %req.uri(), "Unhandled request");
            StatusCode::NOT_FOUND
        }))
        .layer(middleware_stack)
}
