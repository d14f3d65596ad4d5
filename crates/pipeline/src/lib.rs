//! The generation pipeline: admission, dispatch and outcome reconciliation.
//!
//! [`admission`] turns a validated request into a dispatched job.
//! [`processor`] reconciles a provider outcome with the job and its ledger
//! exactly once, however many times it is reported. [`poller`] is the
//! fallback for notifications that never arrive.
//!
//! Artifact I/O is reached through the collaborator traits in [`fetch`],
//! [`watermark`] and [`storage`].

pub mod admission;
pub mod config;
pub mod error;
pub mod fetch;
pub mod poller;
pub mod processor;
pub mod storage;
pub mod watermark;

pub use admission::{Admission, GenerationRequest};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use poller::Poller;
pub use processor::{OutcomeProcessor, Resolution};
