//! Opaque token generation and comparison.
//!
//! Tokens are drawn from the thread-local CSPRNG (`rand`'s `ThreadRng`, a ChaCha
//! generator periodically reseeded from the operating system) and hex-encoded,
//! so a token of `n` bytes is `2 * n` characters long.

use subtle::ConstantTimeEq as _;

/// Byte length of session identifiers.
pub const SESSION_ID_BYTES: usize = 64;
/// Byte length of the pending-login `state` value.
pub const STATE_BYTES: usize = 16;
/// Byte length of anti-CSRF tokens.
pub const XSRF_TOKEN_BYTES: usize = 32;

/// Generates `len` random bytes and returns them hex-encoded.
#[must_use]
pub fn generate_token(len: usize) -> String {
    let bytes: Vec<u8> = rand::random_iter().take(len).collect();
    hex::encode(bytes)
}

/// Compares two tokens without short-circuiting on the first differing byte.
///
/// Strings of different length never match.
#[must_use]
pub fn tokens_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
