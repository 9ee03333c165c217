//! # dispatchq
//!
//! Batch consumer for a table of pending URLs.
//!
//! Each invocation runs one cycle: claim a bounded batch of `PENDING` rows,
//! mark them `PROCESSING`, send each URL to an external processor with
//! bounded concurrency, and upsert one result per item into a target table.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod processor;
pub mod store;
pub mod telemetry;
