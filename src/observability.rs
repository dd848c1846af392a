//! Metric names. The library only emits through the `metrics` facade; the
//! embedding host decides whether and where to install a recorder.

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: committed bookings. Labels: kind (single, panel).
pub const BOOKINGS_TOTAL: &str = "slotwise_bookings_total";

/// Counter: cancelled booking requests (panel children counted individually).
pub const CANCELLATIONS_TOTAL: &str = "slotwise_cancellations_total";

/// Counter: failed operations. Labels: op, error.
pub const OPERATION_ERRORS_TOTAL: &str = "slotwise_operation_errors_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "slotwise_operation_duration_seconds";

/// Counter: notifier calls that returned an error.
pub const NOTIFY_FAILURES_TOTAL: &str = "slotwise_notify_failures_total";

/// Counter: slots dropped from an availability listing because projection failed.
pub const SEARCH_SKIPPED_TOTAL: &str = "slotwise_search_skipped_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotwise_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (transactions per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotwise_wal_flush_batch_size";

/// Run one engine operation, recording its latency and, on failure, its error label.
pub async fn observe<T, F>(op: &'static str, fut: F) -> Result<T, crate::engine::EngineError>
where
    F: std::future::Future<Output = Result<T, crate::engine::EngineError>>,
{
    let started = std::time::Instant::now();
    let result = fut.await;
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        metrics::counter!(OPERATION_ERRORS_TOTAL, "op" => op, "error" => e.label()).increment(1);
    }
    result
}
