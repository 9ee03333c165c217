//! Core data model.
//!
//! A work item is a URL waiting in the source table. A result record is
//! what one cycle learned about it, written to the target table.

pub mod work;
