//! Domain logic shared by every crate in the workspace.
//!
//! Nothing in here touches the database or the network: request
//! validation, quota period math, the credit pack catalog, provider
//! notification parsing and payload signing all live here so they can be
//! unit tested in isolation.

pub mod credits;
pub mod error;
pub mod generation;
pub mod notification;
pub mod quota;
pub mod signing;
pub mod types;
