//! Cooperative cancellation.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation with parent/child links
//! - ExecutionContext, the cancellation/deadline carrier handed to handlers

mod context;
mod token;

pub use context::{CancelCause, ExecutionContext};
pub use token::{CancelCallback, CancellationToken};
