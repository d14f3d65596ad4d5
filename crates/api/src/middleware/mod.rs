//! Request extractors shared by handlers.
//!
//! - [`auth::AuthUser`] -- the authenticated account from a JWT Bearer token.
//! - [`client_ip::ClientIp`] -- the caller's address, for the free quota.
//! - [`rate_limit::RateLimiter`] -- per-address throttling of job creation.

pub mod auth;
pub mod client_ip;
pub mod rate_limit;
