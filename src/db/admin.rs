//! Operator queries: seeding, recovery of stuck claims, status counts.
//!
//! None of these run as part of a batch cycle.

use crate::error::Result;
use crate::model::work::{WorkId, WorkItem, WorkStatus};

/// Row counts per status value, for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts(pub Vec<(String, i64)>);

impl StatusCounts {
    pub fn get(&self, status: &str) -> i64 {
        self.0
            .iter()
            .find(|(s, _)| s == status)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn total(&self) -> i64 {
        self.0.iter().map(|(_, n)| n).sum()
    }
}

impl super::Db {
    /// Insert pending items for the given URLs. Returns the new items.
    pub async fn seed(&self, urls: &[String]) -> Result<Vec<WorkItem>> {
        let items: Vec<WorkItem> = urls
            .iter()
            .map(|url| WorkItem::pending(WorkId::generate(), url.as_str()))
            .collect();

        let mut tx = self.pool().begin().await?;
        for item in &items {
            sqlx::query(&format!(
                "INSERT INTO {} (id, url, status) VALUES ($1, $2, $3)",
                self.location.source()
            ))
            .bind(item.id.as_str())
            .bind(&item.url)
            .bind(item.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(items)
    }

    /// Reset every `PROCESSING` source row to `PENDING`.
    ///
    /// Recovers items stranded by a failed commit. Any cycle still in
    /// flight will have its claimed items re-exposed, so only run this
    /// when no cycle is running. Returns the number of rows reset.
    pub async fn requeue_processing(&self) -> Result<u64> {
        let reset = sqlx::query(&format!(
            "UPDATE {} SET status = $1 WHERE status = $2",
            self.location.source()
        ))
        .bind(WorkStatus::Pending.as_str())
        .bind(WorkStatus::Processing.as_str())
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(reset)
    }

    /// Per-status counts for the source table.
    pub async fn source_counts(&self) -> Result<StatusCounts> {
        self.status_counts(&self.location.source()).await
    }

    /// Per-status counts for the target table.
    pub async fn target_counts(&self) -> Result<StatusCounts> {
        self.status_counts(&self.location.target()).await
    }

    async fn status_counts(&self, table: &str) -> Result<StatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT status, COUNT(*) FROM {table} GROUP BY status ORDER BY status"
        ))
        .fetch_all(self.pool())
        .await?;
        Ok(StatusCounts(rows))
    }
}
