//! Work items, result records, and cycle summaries.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A queued URL in the source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Opaque identifier, stable for the item's lifetime.
    pub id: WorkId,

    /// Resource handed to the processor. Never mutated.
    pub url: String,

    /// Lifecycle state. Only the coordinator moves it.
    pub status: WorkStatus,
}

impl WorkItem {
    /// A fresh pending item.
    pub fn pending(id: impl Into<WorkId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            status: WorkStatus::Pending,
        }
    }
}

/// Newtype for work item IDs. The store owns the format; we never parse it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub String);

impl WorkId {
    /// Generate a random ID for newly seeded items.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Work Status
// ---------------------------------------------------------------------------

/// Status column of the source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a cycle; result not yet committed.
    Processing,
    /// Result committed to the target table.
    Done,
}

impl WorkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkStatus::Pending => "PENDING",
            WorkStatus::Processing => "PROCESSING",
            WorkStatus::Done => "DONE",
        }
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(WorkStatus::Pending),
            "PROCESSING" => Ok(WorkStatus::Processing),
            "DONE" => Ok(WorkStatus::Done),
            other => Err(Error::Other(format!("unknown work status: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Result Record
// ---------------------------------------------------------------------------

/// Outcome of processing one work item. Written once per claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Same ID as the source work item.
    pub id: WorkId,
    /// Processor response body. Empty on failure.
    pub context: String,
    pub status: ResultStatus,
}

impl ResultRecord {
    pub fn completed(id: WorkId, context: impl Into<String>) -> Self {
        Self {
            id,
            context: context.into(),
            status: ResultStatus::Completed,
        }
    }

    pub fn failed(id: WorkId) -> Self {
        Self {
            id,
            context: String::new(),
            status: ResultStatus::FailedProcessing,
        }
    }
}

/// Status column of the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Completed,
    FailedProcessing,
}

impl ResultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultStatus::Completed => "COMPLETED",
            ResultStatus::FailedProcessing => "FAILED_PROCESSING",
        }
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResultStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "COMPLETED" => Ok(ResultStatus::Completed),
            "FAILED_PROCESSING" => Ok(ResultStatus::FailedProcessing),
            other => Err(Error::Other(format!("unknown result status: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle Summary
// ---------------------------------------------------------------------------

/// Aggregate outcome of one claim → dispatch → commit cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub run_id: Uuid,
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CycleSummary {
    /// Tally a committed record set.
    pub fn from_records(
        run_id: Uuid,
        claimed: usize,
        records: &[ResultRecord],
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed = records
            .iter()
            .filter(|r| r.status == ResultStatus::Completed)
            .count();
        Self {
            run_id,
            claimed,
            completed,
            failed: records.len() - completed,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Number of result records produced. Equals `claimed` for every
    /// cycle that reaches commit.
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
