//! `WorkStore` over Postgres: claim with a conditional update, commit with an upsert.

use crate::error::{Error, Result};
use crate::model::work::{ResultRecord, WorkId, WorkItem, WorkStatus};
use crate::store::WorkStore;
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;

fn record_store_op(operation: &'static str, ok: bool) {
    metrics::store_operations().add(
        1,
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("result", if ok { "ok" } else { "error" }),
        ],
    );
}

impl super::Db {
    async fn select_pending(&self, limit: usize) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(&format!(
            "SELECT id, url, status FROM {} WHERE status = $1 LIMIT $2",
            self.location.source()
        ))
        .bind(WorkStatus::Pending.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(WorkItemRow::try_into_work_item).collect()
    }

    async fn claim_rows(&self, ids: &[WorkId]) -> Result<()> {
        let ids: Vec<&str> = ids.iter().map(WorkId::as_str).collect();
        let mut tx = self.pool().begin().await?;

        let claimed = sqlx::query(&format!(
            "UPDATE {} SET status = $1 WHERE id = ANY($2) AND status = $3",
            self.location.source()
        ))
        .bind(WorkStatus::Processing.as_str())
        .bind(&ids)
        .bind(WorkStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected() as usize;

        if claimed != ids.len() {
            // Another invocation claimed some of these rows; release ours.
            tx.rollback().await?;
            return Err(Error::ClaimConflict {
                requested: ids.len(),
                claimed,
            });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_results(&self, records: &[ResultRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let contexts: Vec<&str> = records.iter().map(|r| r.context.as_str()).collect();
        let statuses: Vec<&str> = records.iter().map(|r| r.status.as_str()).collect();

        let mut tx = self.pool().begin().await?;

        sqlx::query(&format!(
            "INSERT INTO {} (id, context, status, updated_at)
             SELECT u.id, u.context, u.status, now()
             FROM UNNEST($1::text[], $2::text[], $3::text[]) AS u(id, context, status)
             ON CONFLICT (id) DO UPDATE
             SET context = EXCLUDED.context, status = EXCLUDED.status, updated_at = EXCLUDED.updated_at",
            self.location.target()
        ))
        .bind(&ids)
        .bind(&contexts)
        .bind(&statuses)
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "UPDATE {} SET status = $1 WHERE id = ANY($2) AND status = $3",
            self.location.source()
        ))
        .bind(WorkStatus::Done.as_str())
        .bind(&ids)
        .bind(WorkStatus::Processing.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl WorkStore for super::Db {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<WorkItem>> {
        let result = self.select_pending(limit).await;
        record_store_op("fetch_pending", result.is_ok());
        result
    }

    async fn mark_processing(&self, ids: &[WorkId]) -> Result<()> {
        let result = self.claim_rows(ids).await;
        record_store_op("mark_processing", result.is_ok());
        result
    }

    async fn write_results(&self, records: &[ResultRecord]) -> Result<()> {
        let result = self.upsert_results(records).await;
        record_store_op("write_results", result.is_ok());
        result
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkItemRow {
    id: String,
    url: String,
    status: String,
}

impl WorkItemRow {
    fn try_into_work_item(self) -> Result<WorkItem> {
        Ok(WorkItem {
            id: WorkId(self.id),
            url: self.url,
            status: self.status.parse()?,
        })
    }
}
