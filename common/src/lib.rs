//! Common token utilities shared by the gateway and its tests.
//!
//! This crate provides:
//! - Cryptographically random, hex-encoded opaque tokens (session ids, login state, xsrf tokens)
//! - Constant-time comparison of token strings

mod secrets;

pub use secrets::*;
