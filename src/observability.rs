use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total mutations applied. Labels: op.
pub const OPS_TOTAL: &str = "lendhub_ops_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "lendhub_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "lendhub_wal_flush_batch_size";

/// Count one applied mutation. Called once per successful operation;
/// failed operations never reach the counter.
pub fn record_op(op: &'static str) {
    metrics::counter!(OPS_TOTAL, "op" => op).increment(1);
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install the default fmt tracing subscriber. Embedders that bring their
/// own subscriber skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
