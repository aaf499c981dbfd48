//! HTTP server assembly for the gateway.
//!
//! Split into `router` (routes and the middleware stack) and `middleware`
//! (session, xsrf and security-header layers).

pub mod middleware;
pub mod router;
