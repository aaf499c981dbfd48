//! Resolving the session cookie of an incoming request.

use alloc::sync::Arc;

use crate::{
    auth::{AuthError, AuthEvent, AuthObserver, ClientMeta},
    store::{AuthStore, Session},
};

/// Read-only: authenticating a request never extends or otherwise touches
/// the stored session.
pub struct Authenticator {
    store: Arc<dyn AuthStore>,
    observer: Arc<dyn AuthObserver>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn AuthStore>, observer: Arc<dyn AuthObserver>) -> Self {
        Self { store, observer }
    }

    /// Looks up the session named by the (already signature-checked) cookie value.
    ///
    /// # Errors
    ///
    /// [`AuthError::SessionCookieMissing`] without a cookie, and
    /// [`AuthError::SessionNotFound`] for unknown and expired sessions alike.
    pub async fn authenticate(
        &self,
        session_cookie: Option<&str>,
        client: &ClientMeta,
    ) -> Result<Session, AuthError> {
        let Some(id) = session_cookie.filter(|c| !c.is_empty()) else {
            self.observer.observe(&AuthEvent::SessionCookieMissing, client);
            return Err(AuthError::SessionCookieMissing);
        };
        match self.store.get_session(id).await {
            Ok(Some(session)) if !session.is_expired() => Ok(session),
            Ok(_) => {
                self.observer.observe(&AuthEvent::SessionNotFound, client);
                Err(AuthError::SessionNotFound)
            }
            Err(error) => {
                self.observer
                    .observe(&AuthEvent::StoreFailed { error: &error }, client);
                Err(AuthError::Internal)
            }
        }
    }
}
