//! taskstat core: the named task counter registry and the shared error type.
//!
//! This crate carries no async runtime or transport dependencies so the
//! tracker can be embedded in any host, threaded or async.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Lock poisoning is
//! recovered rather than propagated, so a panicking caller cannot wedge the
//! tracker for everyone else.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod tracker;

/// Shared result type.
pub use error::{ErrorCode, Result, TaskStatError};
pub use tracker::{TaskGuard, TaskTracker};
