use axum::{Extension, Json, Router, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{app::AppState, auth::AuthenticatedUser, store::Session};

/// Routes nested under `/api`. Every one of them sits behind the session middleware.
pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

/// Routes that need no session.
pub(crate) fn public_routes() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

#[derive(Debug, Serialize)]
pub(crate) struct MeResponse {
    user: AuthenticatedUser,
    expires_at: DateTime<Utc>,
}

/// The authenticated principal behind the current session.
#[axum::debug_handler(state = AppState)]
async fn me(Extension(session): Extension<Session>) -> Json<MeResponse> {
    Json(MeResponse {
        user: session.user,
        expires_at: session.expires_at,
    })
}

async fn healthz() -> &'static str {
    "ok"
}
