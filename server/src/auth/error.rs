//! Errors surfaced to clients by the authentication endpoints and middleware.
//!
//! Details of a failure are reported through the observer; the response body
//! only carries a short generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

/// Coarse classification of an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or mismatched cookies, states, codes or headers.
    ProtocolViolation,
    /// The provider's token endpoint misbehaved.
    UpstreamFailure,
    /// The identity token failed a check.
    VerificationFailure,
    /// Unknown user or session.
    LookupFailure,
    /// Storage or other local failure.
    Internal,
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum AuthError {
    #[error("return url not allowed")]
    ReturnUrlNotAllowed,
    #[error("state cookie missing")]
    StateCookieMissing,
    #[error("invalid state")]
    InvalidState,
    #[error("illegal state value")]
    IllegalStateValue,
    #[error("malformed callback")]
    MalformedCallback,
    #[error("login rejected by the identity provider")]
    ProviderRejected,
    #[error("authorization code missing")]
    MissingCode,
    #[error("invalid response from IdP")]
    InvalidIdpResponse,
    #[error("token verification failed")]
    TokenVerificationFailed,
    #[error("user not recognized")]
    UserNotRecognized,
    #[error("session cookie not found")]
    SessionCookieMissing,
    #[error("session timed out or not found")]
    SessionNotFound,
    #[error("xsrf check failed")]
    XsrfCheckFailed,
    #[error("internal error")]
    Internal,
}

impl AuthError {
    pub const fn kind(&self) -> ErrorKind {
        match *self {
            Self::ReturnUrlNotAllowed
            | Self::StateCookieMissing
            | Self::InvalidState
            | Self::IllegalStateValue
            | Self::MalformedCallback
            | Self::ProviderRejected
            | Self::MissingCode
            | Self::SessionCookieMissing
            | Self::XsrfCheckFailed => ErrorKind::ProtocolViolation,
            Self::InvalidIdpResponse => ErrorKind::UpstreamFailure,
            Self::TokenVerificationFailed => ErrorKind::VerificationFailure,
            Self::UserNotRecognized | Self::SessionNotFound => ErrorKind::LookupFailure,
            Self::Internal => ErrorKind::Internal,
        }
    }

    pub const fn status(&self) -> StatusCode {
        match *self {
            Self::StateCookieMissing
            | Self::UserNotRecognized
            | Self::SessionCookieMissing
            | Self::SessionNotFound => StatusCode::UNAUTHORIZED,
            Self::ReturnUrlNotAllowed
            | Self::InvalidState
            | Self::IllegalStateValue
            | Self::MalformedCallback
            | Self::ProviderRejected
            | Self::MissingCode
            | Self::XsrfCheckFailed => StatusCode::BAD_REQUEST,
            Self::InvalidIdpResponse => StatusCode::BAD_GATEWAY,
            Self::TokenVerificationFailed | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
