//! Integration tests for the batch coordinator.

use async_trait::async_trait;
use dispatchq::engine::{BatchConfig, BatchCoordinator};
use dispatchq::error::{Error, Phase, Result};
use dispatchq::model::work::{ResultRecord, ResultStatus, WorkId, WorkItem, WorkStatus};
use dispatchq::processor::{ProcessError, Processor};
use dispatchq::store::{MemoryStore, WorkStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Reply {
    Text(&'static str),
    HttpStatus(u16),
    Slow(Duration, &'static str),
    Panic,
}

/// Answers per URL; unknown URLs echo back.
#[derive(Default)]
struct ScriptedProcessor {
    replies: HashMap<String, Reply>,
    calls: AtomicUsize,
}

impl ScriptedProcessor {
    fn with(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Processor for ScriptedProcessor {
    async fn process(&self, url: &str, timeout: Duration) -> std::result::Result<String, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.get(url).cloned() {
            None => Ok(format!("processed {url}")),
            Some(Reply::Text(text)) => Ok(text.to_string()),
            Some(Reply::HttpStatus(code)) => Err(ProcessError::Status(code)),
            Some(Reply::Slow(delay, text)) => {
                tokio::time::timeout(timeout, tokio::time::sleep(delay))
                    .await
                    .map_err(|_| ProcessError::Timeout(timeout))?;
                Ok(text.to_string())
            }
            Some(Reply::Panic) => panic!("processor blew up on {url}"),
        }
    }
}

/// Tracks how many calls overlap.
struct GaugedProcessor {
    delay: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl GaugedProcessor {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Processor for GaugedProcessor {
    async fn process(&self, url: &str, _timeout: Duration) -> std::result::Result<String, ProcessError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(url.to_string())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum FailAt {
    Fetch,
    Mark,
    Write,
}

/// Delegates to a MemoryStore but fails one operation.
struct FaultyStore {
    inner: MemoryStore,
    fail_at: FailAt,
}

#[async_trait]
impl WorkStore for FaultyStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<WorkItem>> {
        if self.fail_at == FailAt::Fetch {
            return Err(Error::Other("source table unreachable".to_string()));
        }
        self.inner.fetch_pending(limit).await
    }

    async fn mark_processing(&self, ids: &[WorkId]) -> Result<()> {
        if self.fail_at == FailAt::Mark {
            return Err(Error::Other("update rejected".to_string()));
        }
        self.inner.mark_processing(ids).await
    }

    async fn write_results(&self, records: &[ResultRecord]) -> Result<()> {
        if self.fail_at == FailAt::Write {
            return Err(Error::Other("target table unreachable".to_string()));
        }
        self.inner.write_results(records).await
    }
}

/// Lets a rival invocation claim the first fetched item between our fetch and mark.
struct RacingStore {
    inner: MemoryStore,
}

#[async_trait]
impl WorkStore for RacingStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<WorkItem>> {
        let items = self.inner.fetch_pending(limit).await?;
        if let Some(first) = items.first() {
            self.inner.mark_processing(&[first.id.clone()]).await?;
        }
        Ok(items)
    }

    async fn mark_processing(&self, ids: &[WorkId]) -> Result<()> {
        self.inner.mark_processing(ids).await
    }

    async fn write_results(&self, records: &[ResultRecord]) -> Result<()> {
        self.inner.write_results(records).await
    }
}

/// Ignores the limit it is given.
struct GreedyStore {
    inner: MemoryStore,
}

#[async_trait]
impl WorkStore for GreedyStore {
    async fn fetch_pending(&self, _limit: usize) -> Result<Vec<WorkItem>> {
        self.inner.fetch_pending(usize::MAX).await
    }

    async fn mark_processing(&self, ids: &[WorkId]) -> Result<()> {
        self.inner.mark_processing(ids).await
    }

    async fn write_results(&self, records: &[ResultRecord]) -> Result<()> {
        self.inner.write_results(records).await
    }
}

fn config(batch_size: usize, max_concurrent: usize, timeout: Duration) -> BatchConfig {
    BatchConfig {
        batch_size,
        max_concurrent,
        call_timeout: timeout,
    }
}

fn numbered(n: usize) -> MemoryStore {
    MemoryStore::with_pending((1..=n).map(|i| (i.to_string(), format!("https://example.com/{i}"))))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mixed_batch_records_completed_and_failed() {
    let store = Arc::new(MemoryStore::with_pending([("1", "ok-url"), ("2", "bad-url")]));
    let processor = Arc::new(
        ScriptedProcessor::default()
            .with("ok-url", Reply::Text("summary text"))
            .with("bad-url", Reply::HttpStatus(500)),
    );
    let coordinator = BatchCoordinator::new(store.clone(), processor, BatchConfig::default());

    let summary = coordinator.run_cycle().await.unwrap();

    assert_eq!(summary.claimed, 2);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        store.results(),
        vec![
            ResultRecord {
                id: WorkId::from("1"),
                context: "summary text".to_string(),
                status: ResultStatus::Completed,
            },
            ResultRecord {
                id: WorkId::from("2"),
                context: String::new(),
                status: ResultStatus::FailedProcessing,
            },
        ]
    );
    assert_eq!(store.items_with_status(WorkStatus::Done).len(), 2);
}

#[tokio::test]
async fn empty_source_finishes_with_nothing_written() {
    let store = Arc::new(MemoryStore::new());
    let processor = Arc::new(ScriptedProcessor::default());
    let coordinator = BatchCoordinator::new(store.clone(), processor.clone(), BatchConfig::default());

    let summary = coordinator.run_cycle().await.unwrap();

    assert_eq!(summary.claimed, 0);
    assert_eq!(summary.total(), 0);
    assert!(store.results().is_empty());
    assert_eq!(processor.calls(), 0);
}

#[tokio::test]
async fn claims_no_more_than_batch_size() {
    let store = Arc::new(numbered(12));
    let coordinator = BatchCoordinator::new(
        store.clone(),
        Arc::new(ScriptedProcessor::default()),
        config(5, 5, Duration::from_secs(5)),
    );

    let summary = coordinator.run_cycle().await.unwrap();

    assert_eq!(summary.claimed, 5);
    assert_eq!(store.results().len(), 5);
    assert_eq!(store.items_with_status(WorkStatus::Pending).len(), 7);
    assert!(store.items_with_status(WorkStatus::Processing).is_empty());
}

#[tokio::test]
async fn truncates_when_store_returns_too_many() {
    let store = Arc::new(GreedyStore { inner: numbered(8) });
    let coordinator = BatchCoordinator::new(
        store.clone(),
        Arc::new(ScriptedProcessor::default()),
        config(3, 2, Duration::from_secs(5)),
    );

    let summary = coordinator.run_cycle().await.unwrap();

    assert_eq!(summary.claimed, 3);
    assert_eq!(store.inner.results().len(), 3);
    assert_eq!(store.inner.items_with_status(WorkStatus::Pending).len(), 5);
}

#[tokio::test]
async fn every_claimed_item_gets_exactly_one_result() {
    let store = Arc::new(numbered(9));
    let processor = Arc::new(
        ScriptedProcessor::default()
            .with("https://example.com/2", Reply::HttpStatus(404))
            .with("https://example.com/5", Reply::HttpStatus(503))
            .with("https://example.com/7", Reply::Text("")),
    );
    let coordinator =
        BatchCoordinator::new(store.clone(), processor, config(9, 4, Duration::from_secs(5)));

    let summary = coordinator.run_cycle().await.unwrap();

    assert_eq!(summary.claimed, 9);
    assert_eq!(summary.total(), 9);
    assert_eq!(summary.failed, 2);
    let results = store.results();
    assert_eq!(results.len(), 9);
    for i in 1..=9 {
        assert!(store.result(&WorkId::from(i.to_string())).is_some(), "missing result for {i}");
    }
}

#[tokio::test]
async fn timed_out_call_fails_without_holding_up_siblings() {
    let store = Arc::new(MemoryStore::with_pending([
        ("slow", "https://slow.example"),
        ("a", "https://a.example"),
        ("b", "https://b.example"),
    ]));
    let processor = Arc::new(
        ScriptedProcessor::default()
            .with("https://slow.example", Reply::Slow(Duration::from_secs(10), "too late"))
            .with("https://a.example", Reply::Slow(Duration::from_millis(10), "a done"))
            .with("https://b.example", Reply::Text("b done")),
    );
    let coordinator = BatchCoordinator::new(
        store.clone(),
        processor,
        config(5, 5, Duration::from_millis(200)),
    );

    let started = Instant::now();
    let summary = coordinator.run_cycle().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);

    let slow = store.result(&WorkId::from("slow")).unwrap();
    assert_eq!(slow.status, ResultStatus::FailedProcessing);
    assert!(slow.context.is_empty());
    assert_eq!(store.result(&WorkId::from("a")).unwrap().context, "a done");
    assert_eq!(store.result(&WorkId::from("b")).unwrap().context, "b done");
}

// ---------------------------------------------------------------------------
// Concurrency bound
// ---------------------------------------------------------------------------

#[tokio::test]
async fn never_exceeds_max_concurrent_calls() {
    let store = Arc::new(numbered(20));
    let processor = Arc::new(GaugedProcessor::new(Duration::from_millis(20)));
    let coordinator = BatchCoordinator::new(
        store.clone(),
        processor.clone(),
        config(20, 3, Duration::from_secs(5)),
    );

    let summary = coordinator.run_cycle().await.unwrap();

    assert_eq!(summary.completed, 20);
    let peak = processor.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeded limit 3");
    assert!(peak >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_bound_holds_on_multi_thread_runtime() {
    for max_concurrent in [1, 2, 5] {
        let store = Arc::new(numbered(12));
        let processor = Arc::new(GaugedProcessor::new(Duration::from_millis(10)));
        let coordinator = BatchCoordinator::new(
            store.clone(),
            processor.clone(),
            config(12, max_concurrent, Duration::from_secs(5)),
        );

        let summary = coordinator.run_cycle().await.unwrap();

        assert_eq!(summary.completed, 12);
        assert!(processor.peak.load(Ordering::SeqCst) <= max_concurrent);
    }
}

// ---------------------------------------------------------------------------
// Claim exclusivity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_cycle_does_not_reclaim_committed_items() {
    let store = Arc::new(numbered(3));
    let processor = Arc::new(ScriptedProcessor::default());
    let coordinator = BatchCoordinator::new(store.clone(), processor.clone(), BatchConfig::default());

    assert_eq!(coordinator.run_cycle().await.unwrap().claimed, 3);
    assert_eq!(coordinator.run_cycle().await.unwrap().claimed, 0);
    assert_eq!(processor.calls(), 3);
}

#[tokio::test]
async fn lost_claim_race_aborts_before_dispatch() {
    let store = Arc::new(RacingStore { inner: numbered(3) });
    let processor = Arc::new(ScriptedProcessor::default());
    let coordinator = BatchCoordinator::new(store.clone(), processor.clone(), BatchConfig::default());

    let err = coordinator.run_cycle().await.unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Mark));
    assert_eq!(processor.calls(), 0);
    // The rival's item stays claimed; ours were never half-claimed.
    assert_eq!(store.inner.items_with_status(WorkStatus::Processing).len(), 1);
    assert_eq!(store.inner.items_with_status(WorkStatus::Pending).len(), 2);
    assert!(store.inner.results().is_empty());
}

// ---------------------------------------------------------------------------
// Fatal store failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_failure_is_reported_as_claim_phase() {
    let store = Arc::new(FaultyStore {
        inner: numbered(2),
        fail_at: FailAt::Fetch,
    });
    let processor = Arc::new(ScriptedProcessor::default());
    let coordinator = BatchCoordinator::new(store, processor.clone(), BatchConfig::default());

    let err = coordinator.run_cycle().await.unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Claim));
    assert!(err.to_string().starts_with("claim phase failed"));
    assert_eq!(processor.calls(), 0);
}

#[tokio::test]
async fn mark_failure_aborts_before_any_processing() {
    let store = Arc::new(FaultyStore {
        inner: numbered(4),
        fail_at: FailAt::Mark,
    });
    let processor = Arc::new(ScriptedProcessor::default());
    let coordinator = BatchCoordinator::new(store.clone(), processor.clone(), BatchConfig::default());

    let err = coordinator.run_cycle().await.unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Mark));
    assert_eq!(processor.calls(), 0);
    assert_eq!(store.inner.items_with_status(WorkStatus::Pending).len(), 4);
}

#[tokio::test]
async fn commit_failure_leaves_items_processing() {
    let store = Arc::new(FaultyStore {
        inner: numbered(3),
        fail_at: FailAt::Write,
    });
    let processor = Arc::new(ScriptedProcessor::default());
    let coordinator = BatchCoordinator::new(store.clone(), processor.clone(), BatchConfig::default());

    let err = coordinator.run_cycle().await.unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Commit));
    assert!(err.to_string().contains("target table unreachable"));
    assert_eq!(processor.calls(), 3);
    assert_eq!(store.inner.items_with_status(WorkStatus::Processing).len(), 3);
    assert!(store.inner.results().is_empty());
}

#[tokio::test]
async fn panicking_call_still_produces_a_failed_record() {
    let store = Arc::new(MemoryStore::with_pending([
        ("1", "https://fine.example"),
        ("2", "https://boom.example"),
    ]));
    let processor = Arc::new(ScriptedProcessor::default().with("https://boom.example", Reply::Panic));
    let coordinator = BatchCoordinator::new(store.clone(), processor, BatchConfig::default());

    let summary = coordinator.run_cycle().await.unwrap();

    assert_eq!(summary.claimed, 2);
    assert_eq!(summary.total(), 2);
    assert_eq!(
        store.result(&WorkId::from("2")).unwrap().status,
        ResultStatus::FailedProcessing
    );
    assert_eq!(
        store.result(&WorkId::from("1")).unwrap().status,
        ResultStatus::Completed
    );
}
