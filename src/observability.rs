use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests handled. Labels: route, status.
pub const REQUESTS_TOTAL: &str = "stagegate_requests_total";

/// Histogram: HTTP handler latency in seconds. Labels: route.
pub const REQUEST_DURATION_SECONDS: &str = "stagegate_request_duration_seconds";

/// Counter: admission decisions. Labels: outcome, reason (deferrals only).
pub const DECISIONS_TOTAL: &str = "stagegate_decisions_total";

/// Counter: bookings committed (immediate, side and reconciled).
pub const COMMITS_TOTAL: &str = "stagegate_commits_total";

/// Counter: callback deliveries. Labels: status.
pub const CALLBACKS_TOTAL: &str = "stagegate_callbacks_total";

/// Counter: replan requests forwarded to the orchestrator. Labels: status.
pub const REPLANS_TOTAL: &str = "stagegate_replans_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: requests parked in the waiting list.
pub const WAITING_REQUESTS: &str = "stagegate_waiting_requests";

/// Gauge: entry re-arrivals held in the replanned area.
pub const REPLANNED_REQUESTS: &str = "stagegate_replanned_requests";

/// Gauge: latest new-entity entry arrival, in simulation minutes.
pub const WATERMARK_MINUTES: &str = "stagegate_watermark_minutes";

/// Histogram: reconcile pass duration in seconds.
pub const RECONCILE_DURATION_SECONDS: &str = "stagegate_reconcile_duration_seconds";

/// Counter: ledger appends that failed after the booking was committed.
pub const LEDGER_FAILURES_TOTAL: &str = "stagegate_ledger_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "stagegate_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (appends per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "stagegate_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an error to a short label for metrics.
pub fn error_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::MissingField(_) => "missing_field",
        EngineError::InvalidNumber { .. } => "invalid_number",
        EngineError::BeyondHorizon { .. } => "beyond_horizon",
        EngineError::UnknownStage(_) => "unknown_stage",
        EngineError::UnknownPatientType(_) => "unknown_patient_type",
        EngineError::InvalidDomain(_) => "invalid_domain",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::WalError(_) => "wal_error",
        EngineError::Orchestrator(_) => "orchestrator",
    }
}
