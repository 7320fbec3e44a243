//! Ordered pipelines.
//!
//! This module provides:
//! - A sequential abort-on-error pipeline
//! - A bounded-concurrency pipeline with ordered admission
//! - The backward rollback cascade both run after an abort

mod bounded;
mod integration_tests;
mod rollback;
mod sequential;

pub use bounded::BoundedPipeline;
pub use sequential::SequentialPipeline;
