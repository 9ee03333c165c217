//! Batch engine: one claim → dispatch → collect → commit cycle per invocation.

pub mod batch;

pub use batch::{BatchConfig, BatchCoordinator};
