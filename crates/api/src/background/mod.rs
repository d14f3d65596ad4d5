//! Background work owned by the server.
//!
//! All tasks are tracked and observe a shared [`CancellationToken`] so that
//! shutdown can stop and drain them.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod reconciler;

pub use reconciler::Reconciler;
