#![forbid(unsafe_code)]

//! `statement-runner`: drains one interactive session's statement queue.
//!
//! The [`orchestrator`] module holds the session driver and its query loop;
//! the remaining modules provide the collaborators it runs against.

pub mod config;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod registry;
pub mod store;
pub mod writer;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
