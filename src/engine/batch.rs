//! The batch coordinator.
//!
//! A cycle claims up to `batch_size` pending items, marks them all
//! `PROCESSING` before anything is dispatched, fans them out to the
//! processor with at most `max_concurrent` calls in flight, waits for every
//! call to resolve, and commits one result per item in a single write.
//!
//! Store failures end the cycle with an `Error::Cycle` naming the phase.
//! Processor failures never do; they become `FAILED_PROCESSING` records.
//!
//! Known gap: if the commit fails, the claimed items stay `PROCESSING`
//! with no result row until an operator runs `dispatchq requeue`.

use crate::error::{Phase, Result};
use crate::model::work::{CycleSummary, ResultRecord, WorkId, WorkItem};
use crate::processor::Processor;
use crate::store::WorkStore;
use crate::telemetry::metrics;
use crate::telemetry::work::{
    record_item_status, record_phase, start_cycle_span, start_item_span,
};
use opentelemetry::KeyValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

/// Limits for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Most items claimed per cycle.
    pub batch_size: usize,
    /// Most processor calls in flight at once.
    pub max_concurrent: usize,
    /// Deadline for each processor call.
    pub call_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_concurrent: 5,
            call_timeout: Duration::from_secs(600),
        }
    }
}

/// Runs batch cycles against a store and a processor.
pub struct BatchCoordinator<S, P> {
    store: Arc<S>,
    processor: Arc<P>,
    config: BatchConfig,
}

impl<S, P> Clone for BatchCoordinator<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            processor: Arc::clone(&self.processor),
            config: self.config.clone(),
        }
    }
}

impl<S: WorkStore, P: Processor> BatchCoordinator<S, P> {
    pub fn new(store: Arc<S>, processor: Arc<P>, config: BatchConfig) -> Self {
        Self {
            store,
            processor,
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run exactly one cycle and report what happened.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let run_id = Uuid::new_v4();
        let span = start_cycle_span(&run_id, self.config.batch_size, self.config.max_concurrent);

        let result = self.cycle(run_id, &span).instrument(span.clone()).await;

        let label = match &result {
            Ok(summary) if summary.claimed == 0 => "empty",
            Ok(_) => "ok",
            Err(e) => {
                span.in_scope(|| error!(error = %e, "batch cycle aborted"));
                "error"
            }
        };
        metrics::cycles().add(1, &[KeyValue::new("result", label)]);

        result
    }

    async fn cycle(&self, run_id: Uuid, span: &tracing::Span) -> Result<CycleSummary> {
        let started_at = chrono::Utc::now();

        // Claim
        record_phase(span, "claim");
        let mut items = self
            .store
            .fetch_pending(self.config.batch_size)
            .await
            .map_err(|e| e.in_phase(Phase::Claim))?;

        if items.is_empty() {
            info!("no pending work items");
            return Ok(CycleSummary::from_records(run_id, 0, &[], started_at));
        }
        if items.len() > self.config.batch_size {
            warn!(
                returned = items.len(),
                limit = self.config.batch_size,
                "store returned more items than requested, truncating"
            );
            items.truncate(self.config.batch_size);
        }

        // Mark. Must finish before any dispatch so no other invocation can
        // fetch these rows as pending.
        record_phase(span, "mark");
        let ids: Vec<WorkId> = items.iter().map(|item| item.id.clone()).collect();
        self.store
            .mark_processing(&ids)
            .await
            .map_err(|e| e.in_phase(Phase::Mark))?;
        metrics::items_claimed().add(ids.len() as u64, &[]);
        info!(claimed = ids.len(), "claimed work items");

        // Dispatch + collect
        record_phase(span, "dispatch");
        let records = self.dispatch(items).await;

        // Commit
        record_phase(span, "commit");
        self.store
            .write_results(&records)
            .await
            .map_err(|e| e.in_phase(Phase::Commit))?;

        for record in &records {
            metrics::results_recorded()
                .add(1, &[KeyValue::new("status", record.status.as_str())]);
        }

        let summary = CycleSummary::from_records(run_id, ids.len(), &records, started_at);
        info!(
            claimed = summary.claimed,
            completed = summary.completed,
            failed = summary.failed,
            duration_ms = summary.duration_ms(),
            "batch cycle finished"
        );
        Ok(summary)
    }

    /// Process every item, at most `max_concurrent` at a time, and return
    /// exactly one record per item once all calls have resolved.
    async fn dispatch(&self, items: Vec<WorkItem>) -> Vec<ResultRecord> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, WorkId> = HashMap::with_capacity(items.len());

        for item in items {
            let id = item.id.clone();
            let span = start_item_span(&item.id, &item.url);
            let handle = tasks.spawn(
                process_item(
                    item,
                    Arc::clone(&self.processor),
                    Arc::clone(&permits),
                    self.config.call_timeout,
                )
                .instrument(span),
            );
            in_flight.insert(handle.id(), id);
        }

        let mut records = Vec::with_capacity(in_flight.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((task_id, record)) => {
                    in_flight.remove(&task_id);
                    records.push(record);
                }
                Err(join_error) => {
                    if let Some(id) = in_flight.remove(&join_error.id()) {
                        error!(id = %id, error = %join_error, "processing task died");
                        records.push(ResultRecord::failed(id));
                    }
                }
            }
        }
        records
    }
}

/// Wait for a slot, call the processor, and map the outcome to a record.
async fn process_item<P: Processor>(
    item: WorkItem,
    processor: Arc<P>,
    permits: Arc<Semaphore>,
    timeout: Duration,
) -> ResultRecord {
    let span = tracing::Span::current();

    // Only fails if the semaphore is closed, which this module never does.
    let Ok(_permit) = permits.acquire().await else {
        record_item_status(&span, "FAILED_PROCESSING");
        return ResultRecord::failed(item.id);
    };

    let in_flight = metrics::processor_in_flight();
    in_flight.add(1, &[]);
    let start = Instant::now();
    let outcome = processor.process(&item.url, timeout).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    in_flight.add(-1, &[]);

    let (record, label) = match outcome {
        Ok(context) => (ResultRecord::completed(item.id, context), "ok"),
        Err(e) => {
            warn!(url = %item.url, error = %e, "processing failed");
            (ResultRecord::failed(item.id), e.kind())
        }
    };

    metrics::processor_duration_ms().record(elapsed_ms, &[KeyValue::new("outcome", label)]);
    record_item_status(&span, record.status.as_str());
    record
}
