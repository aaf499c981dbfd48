//! HTTP surface of the gateway.
//!
//! Defines the login endpoints, the protected API, request metadata extraction
//! and the server middleware.

pub mod api;
pub mod client;
pub mod login;
pub mod server;

pub use client::request_is_secure;
pub use server::router::create_app;
