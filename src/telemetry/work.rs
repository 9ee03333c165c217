//! Span helpers for batch cycles and per-item processing.

use crate::model::work::WorkId;
use tracing::Span;
use uuid::Uuid;

/// Start the span that wraps one whole cycle.
///
/// `batch.phase` is declared empty and updated via [`record_phase`].
pub fn start_cycle_span(run_id: &Uuid, batch_size: usize, max_concurrent: usize) -> Span {
    tracing::info_span!(
        "batch.cycle",
        "batch.run_id" = %run_id,
        "batch.size" = batch_size,
        "batch.max_concurrent" = max_concurrent,
        "batch.phase" = tracing::field::Empty,
    )
}

/// Record that the cycle entered `phase`.
pub fn record_phase(span: &Span, phase: &str) {
    span.record("batch.phase", phase);
    span.in_scope(|| {
        tracing::debug!(phase, "phase_entered");
    });
}

/// Start the span for one processor call.
///
/// `work.status` is declared empty and filled via [`record_item_status`].
pub fn start_item_span(id: &WorkId, url: &str) -> Span {
    tracing::info_span!(
        "work.process",
        "work.id" = %id,
        "work.url" = url,
        "work.status" = tracing::field::Empty,
    )
}

/// Record the result status on an item span.
pub fn record_item_status(span: &Span, status: &str) {
    span.record("work.status", status);
}
