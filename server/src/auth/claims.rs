//! Identity token claims and the principal derived from them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The `aud` claim: a single client id or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, client_id: &str) -> bool {
        match *self {
            Self::One(ref aud) => aud == client_id,
            Self::Many(ref auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

/// Claims of a decoded identity token. Only trusted once returned by
/// [`crate::auth::verify_id_token`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub iss: String,
    pub aud: Audience,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    /// Provider-specific profile fields (`email`, `name`, `picture`, ...).
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

/// Protocol claims that say nothing about the user and are not kept in sessions.
const PROTOCOL_CLAIMS: &[&str] = &["nonce", "at_hash", "c_hash", "azp", "auth_time", "nbf", "sid"];

/// A verified principal, as stored in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub subject: String,
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub profile: Map<String, Value>,
}

impl AuthenticatedUser {
    #[cfg(test)]
    pub(crate) fn for_subject(subject: &str, issuer: &str) -> Self {
        Self {
            subject: subject.to_string(),
            issuer: issuer.to_string(),
            email: None,
            name: None,
            picture: None,
            profile: Map::new(),
        }
    }
}

impl From<IdentityClaims> for AuthenticatedUser {
    fn from(claims: IdentityClaims) -> Self {
        let mut profile = claims.profile;
        for claim in PROTOCOL_CLAIMS {
            profile.remove(*claim);
        }
        let mut take_string = |key: &str| match profile.remove(key) {
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                profile.insert(key.to_string(), other);
                None
            }
            None => None,
        };
        let email = take_string("email");
        let name = take_string("name");
        let picture = take_string("picture");
        Self {
            subject: claims.sub,
            issuer: claims.iss,
            email,
            name,
            picture,
            profile,
        }
    }
}
