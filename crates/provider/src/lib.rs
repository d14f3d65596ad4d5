//! Client for the remote image-edit compute provider.
//!
//! [`api`] wraps the provider's REST endpoints; [`dispatcher`] exposes the
//! narrow [`TaskDispatcher`] interface the generation pipeline depends on.

pub mod api;
pub mod dispatcher;

pub use api::{ProviderApi, ProviderApiError};
pub use dispatcher::{DispatchError, TaskDispatcher};
