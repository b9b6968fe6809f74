//! Eventual: single-assignment futures for blocking operations
//!
//! A [`Future`] runs a blocking operation on a background context and hands its
//! [`Try`] outcome to blocking readers and to continuations, each exactly once and in
//! registration order.

pub mod config;
pub mod error;
pub mod executor;
pub mod future;
pub mod logging;
pub mod outcome;

pub use executor::{current_context, ExecutionContext, Inline, Job, SerialQueue, ThreadPerTask};
pub use future::Future;
pub use outcome::Try;

/// Held by unit tests that read or write `EVENTUAL*` environment variables
#[cfg(test)]
pub(crate) static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
