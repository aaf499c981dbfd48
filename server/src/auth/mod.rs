//! Authentication for the gateway: OIDC authorization-code login against a
//! single trusted provider, server-side sessions and a double-submit CSRF guard.
//!
//! - [`LoginFlow`] starts logins and validates callbacks.
//! - [`Authenticator`] resolves the session cookie of later requests.
//! - [`CsrfGuard`] protects state-changing requests of authenticated users.
//!
//! The provider is reached through the narrow [`TokenExchange`] and
//! [`KeySource`] traits, the application decides who is a user through
//! [`UserLookup`], and every rejection is reported to an [`AuthObserver`].

mod authenticator;
mod claims;
mod cookies;
mod csrf;
mod error;
mod exchange;
mod flow;
mod jwks;
mod lookup;
mod observer;
mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use authenticator::Authenticator;
pub use claims::{Audience, AuthenticatedUser, IdentityClaims};
pub use cookies::{CookieCodec, STATE_COOKIE, XSRF_COOKIE, XSRF_HEADER, key_from_secret};
pub use csrf::CsrfGuard;
pub use error::{AuthError, ErrorKind};
pub use exchange::{ExchangeError, HttpTokenExchange, TokenExchange, TokenResponse};
pub use flow::{
    CallbackParams, EstablishedSession, FlowSettings, LoginFlow, LoginRedirect, ReturnUrlPolicy,
    SCOPES,
};
pub use jwks::{JwksClient, KeySetError, KeySource};
pub use lookup::{AllowListLookup, LookupError, UserLookup};
pub use observer::{AuthEvent, AuthObserver, ClientMeta, TracingObserver};
pub use verifier::{
    Expectations, VerifyError, decode_segment_lenient, token_key_id, verify_id_token,
};
