//! The store contract the batch coordinator depends on.
//!
//! Three calls, always in this order within a cycle and never interleaved
//! with processor calls: `fetch_pending`, `mark_processing`, `write_results`.
//! Implementations: [`crate::db::Db`] (Postgres) and [`MemoryStore`].

pub mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::model::work::{ResultRecord, WorkId, WorkItem};
use async_trait::async_trait;

#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Up to `limit` items whose status is `PENDING`. No ordering promised.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<WorkItem>>;

    /// Move exactly these items from `PENDING` to `PROCESSING`.
    ///
    /// All-or-nothing: if any id is no longer pending (another invocation
    /// claimed it), nothing is changed and `Error::ClaimConflict` is returned.
    async fn mark_processing(&self, ids: &[WorkId]) -> Result<()>;

    /// Upsert result records keyed by id and retire their source items.
    /// Writing the same set twice leaves the same stored state.
    async fn write_results(&self, records: &[ResultRecord]) -> Result<()>;
}
