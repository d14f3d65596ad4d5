//! Authentication primitives.
//!
//! - [`jwt`] -- access-token generation and validation.
//!
//! Accounts are signed up and logged in by a separate service; this server
//! only verifies the tokens it issues.

pub mod jwt;
