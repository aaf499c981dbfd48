//! Mapping a verified principal to an application user.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::auth::AuthenticatedUser;

pub type LookupError = Box<dyn core::error::Error + Send + Sync>;

/// Decides whether a verified principal is a user of this application.
///
/// `Ok(None)` means the principal is unknown; the login is then rejected.
/// The returned value is what gets stored in the session, so implementations
/// may enrich the principal.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn lookup(
        &self,
        principal: &AuthenticatedUser,
    ) -> Result<Option<AuthenticatedUser>, LookupError>;
}

/// Recognizes principals whose subject or e-mail is on a configured list.
/// An empty list recognizes every verified principal.
#[derive(Debug, Clone, Default)]
pub struct AllowListLookup {
    allow: HashSet<String>,
}

impl AllowListLookup {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: entries.into_iter().map(Into::into).collect(),
        }
    }

    fn recognizes(&self, principal: &AuthenticatedUser) -> bool {
        self.allow.is_empty()
            || self.allow.contains(&principal.subject)
            || principal
                .email
                .as_ref()
                .is_some_and(|email| self.allow.contains(email))
    }
}

#[async_trait]
impl UserLookup for AllowListLookup {
    async fn lookup(
        &self,
        principal: &AuthenticatedUser,
    ) -> Result<Option<AuthenticatedUser>, LookupError> {
        Ok(self.recognizes(principal).then(|| principal.clone()))
    }
}
