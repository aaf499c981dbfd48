//! Identity token verification.
//!
//! Checks run in a fixed order so that a failure names exactly one check:
//! signature, then issuer, then audience, then expiry.

use std::collections::HashSet;

use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error as ThisError;

use crate::auth::{Audience, IdentityClaims, KeySetError};

/// Accepts base64url segments with or without padding.
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// What an identity token must assert to be accepted.
#[derive(Debug, Clone)]
pub struct Expectations {
    /// Exact `iss` value (`https://<domain>/`).
    pub issuer: String,
    /// Client id that must appear in `aud`.
    pub audience: String,
    /// Accepted clock skew for `exp`, in seconds.
    pub leeway_secs: u64,
}

#[derive(Debug, ThisError)]
pub enum VerifyError {
    #[error("token header carries no key id")]
    MissingKeyId,
    #[error("no signing key published for kid {0:?}")]
    UnknownKey(String),
    #[error("signing keys unavailable: {0}")]
    KeySet(#[from] KeySetError),
    #[error("signature or encoding invalid: {0}")]
    Signature(#[source] jsonwebtoken::errors::Error),
    #[error("claims are malformed: {0}")]
    MalformedClaims(#[source] serde_json::Error),
    #[error("issuer mismatch: expected {expected:?}, got {actual:?}")]
    Issuer { expected: String, actual: String },
    #[error("audience mismatch: expected {expected:?}, got {actual:?}")]
    Audience { expected: String, actual: Audience },
    #[error("token expired at {exp} (now {now})")]
    Expired { exp: i64, now: i64 },
}

impl VerifyError {
    /// Which check rejected the token, for log fields.
    pub const fn check(&self) -> &'static str {
        match *self {
            Self::MissingKeyId | Self::UnknownKey(_) | Self::KeySet(_) => "key",
            Self::Signature(_) | Self::MalformedClaims(_) => "signature",
            Self::Issuer { .. } => "issuer",
            Self::Audience { .. } => "audience",
            Self::Expired { .. } => "expiry",
        }
    }
}

/// Decodes one base64url token segment to text. Undecodable input yields an
/// empty string instead of an error.
pub fn decode_segment_lenient(segment: &str) -> String {
    LENIENT_URL_SAFE
        .decode(segment)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

/// Reads the `kid` from the (unverified) token header.
pub fn token_key_id(token: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct RawHeader {
        kid: Option<String>,
    }

    let header = token
        .split('.')
        .next()
        .map(decode_segment_lenient)
        .unwrap_or_default();
    serde_json::from_str::<RawHeader>(&header)
        .ok()?
        .kid
        .filter(|kid| !kid.is_empty())
}

/// Verifies `token` against `key` and `expected`, evaluated at unix time `now`.
///
/// # Errors
///
/// Returns the first failing check.
pub fn verify_id_token(
    token: &str,
    key: &DecodingKey,
    expected: &Expectations,
    now: i64,
) -> Result<IdentityClaims, VerifyError> {
    // only the signature is checked by the library; claims are checked below in order
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = decode::<Value>(token, key, &validation).map_err(VerifyError::Signature)?;
    let claims: IdentityClaims =
        serde_json::from_value(data.claims).map_err(VerifyError::MalformedClaims)?;

    if claims.iss != expected.issuer {
        return Err(VerifyError::Issuer {
            expected: expected.issuer.clone(),
            actual: claims.iss,
        });
    }
    if !claims.aud.contains(&expected.audience) {
        return Err(VerifyError::Audience {
            expected: expected.audience.clone(),
            actual: claims.aud,
        });
    }
    let leeway = i64::try_from(expected.leeway_secs).unwrap_or(i64::MAX);
    if claims.exp.saturating_add(leeway) <= now {
        return Err(VerifyError::Expired {
            exp: claims.exp,
            now,
        });
    }
    Ok(claims)
}
