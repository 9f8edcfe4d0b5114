use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: command, status.
pub const REQUESTS_TOTAL: &str = "roombook_requests_total";

/// Histogram: request latency in seconds. Labels: command.
pub const REQUEST_DURATION_SECONDS: &str = "roombook_request_duration_seconds";

/// Counter: requests refused by the engine. Labels: code.
pub const REJECTIONS_TOTAL: &str = "roombook_rejections_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "roombook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "roombook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "roombook_connections_rejected_total";

/// Gauge: reservations currently stored.
pub const RESERVATIONS_STORED: &str = "roombook_reservations_stored";

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
