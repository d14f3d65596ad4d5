//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that take
//! a Postgres executor as the first argument.

pub mod account_repo;
pub mod credit_repo;
pub mod job_repo;
pub mod quota_repo;

pub use account_repo::AccountRepo;
pub use credit_repo::CreditRepo;
pub use job_repo::JobRepo;
pub use quota_repo::QuotaRepo;

/// Maximum page size for listings.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for listings.
pub const DEFAULT_LIMIT: i64 = 20;

/// Clamp a caller-supplied page size into `1..=MAX_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Clamp a caller-supplied offset to be non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}
