//! Row types and DTOs, one module per table family.

pub mod account;
pub mod credit;
pub mod job;
pub mod quota;
pub mod status;
