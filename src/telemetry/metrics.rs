//! Metric instrument factories for dispatchq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};

fn meter() -> Meter {
    opentelemetry::global::meter("dispatchq")
}

/// Counter: batch cycles run.
/// Labels: `result` ("ok" | "empty" | "error").
pub fn cycles() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.cycles")
        .with_description("Number of batch cycles run")
        .build()
}

/// Counter: work items claimed (marked PROCESSING).
pub fn items_claimed() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.items.claimed")
        .with_description("Number of work items claimed")
        .build()
}

/// Counter: result records produced.
/// Labels: `status` ("COMPLETED" | "FAILED_PROCESSING").
pub fn results_recorded() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.results.recorded")
        .with_description("Number of result records produced")
        .build()
}

/// Counter: store calls.
/// Labels: `operation`, `result` ("ok" | "error").
pub fn store_operations() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.store.operations")
        .with_description("Number of store operations")
        .build()
}

/// Histogram: processor call duration in milliseconds.
/// Labels: `outcome` ("ok" | "timeout" | "status" | "transport").
pub fn processor_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("dispatchq.processor.duration_ms")
        .with_description("Processor call duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Up/down counter: processor calls currently in flight.
pub fn processor_in_flight() -> UpDownCounter<i64> {
    meter()
        .i64_up_down_counter("dispatchq.processor.in_flight")
        .with_description("Processor calls currently in flight")
        .build()
}
