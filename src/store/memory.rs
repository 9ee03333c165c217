//! In-process store with the same conditional semantics as the Postgres one.

use super::WorkStore;
use crate::error::{Error, Result};
use crate::model::work::{ResultRecord, WorkId, WorkItem, WorkStatus};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Tables {
    /// Source rows in insertion order.
    source: Vec<WorkItem>,
    /// Target rows keyed by id.
    target: BTreeMap<WorkId, ResultRecord>,
}

/// A `WorkStore` backed by two in-memory tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with pending items, in order.
    pub fn with_pending<I, K, U>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, U)>,
        K: Into<WorkId>,
        U: Into<String>,
    {
        let store = Self::new();
        for (id, url) in items {
            store.insert(WorkItem::pending(id, url));
        }
        store
    }

    /// Insert or replace a source row.
    pub fn insert(&self, item: WorkItem) {
        let mut tables = self.lock();
        match tables.source.iter_mut().find(|row| row.id == item.id) {
            Some(row) => *row = item,
            None => tables.source.push(item),
        }
    }

    /// Current source row for an id.
    pub fn item(&self, id: &WorkId) -> Option<WorkItem> {
        self.lock().source.iter().find(|row| &row.id == id).cloned()
    }

    /// All source rows with the given status, in insertion order.
    pub fn items_with_status(&self, status: WorkStatus) -> Vec<WorkItem> {
        self.lock()
            .source
            .iter()
            .filter(|row| row.status == status)
            .cloned()
            .collect()
    }

    /// Committed result for an id.
    pub fn result(&self, id: &WorkId) -> Option<ResultRecord> {
        self.lock().target.get(id).cloned()
    }

    /// All committed results, ordered by id.
    pub fn results(&self) -> Vec<ResultRecord> {
        self.lock().target.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // Mutations validate before applying, so poisoned tables are still consistent.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl WorkStore for MemoryStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<WorkItem>> {
        Ok(self
            .lock()
            .source
            .iter()
            .filter(|row| row.status == WorkStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_processing(&self, ids: &[WorkId]) -> Result<()> {
        let mut tables = self.lock();

        let claimable: Vec<usize> = tables
            .source
            .iter()
            .enumerate()
            .filter(|(_, row)| row.status == WorkStatus::Pending && ids.contains(&row.id))
            .map(|(idx, _)| idx)
            .collect();

        if claimable.len() != ids.len() {
            return Err(Error::ClaimConflict {
                requested: ids.len(),
                claimed: claimable.len(),
            });
        }

        for idx in claimable {
            tables.source[idx].status = WorkStatus::Processing;
        }
        Ok(())
    }

    async fn write_results(&self, records: &[ResultRecord]) -> Result<()> {
        let mut tables = self.lock();
        for record in records {
            tables.target.insert(record.id.clone(), record.clone());
            if let Some(row) = tables
                .source
                .iter_mut()
                .find(|row| row.id == record.id && row.status == WorkStatus::Processing)
            {
                row.status = WorkStatus::Done;
            }
        }
        Ok(())
    }
}
