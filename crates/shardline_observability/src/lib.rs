//! Observability setup: structured logging and executor metrics.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with structured logging.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shardline=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

/// Record the outcome of one unit invocation.
pub fn record_unit_metrics(kind: &'static str, success: bool) {
    metrics::counter!("shardline_units_total", "kind" => kind, "success" => success.to_string())
        .increment(1);
}

/// Record one executor call (query/update/execute) end to end.
pub fn record_execution_metrics(kind: &'static str, duration_us: u64, success: bool) {
    metrics::counter!("shardline_executions_total", "kind" => kind, "success" => success.to_string())
        .increment(1);
    metrics::histogram!("shardline_execution_duration_us", "kind" => kind)
        .record(duration_us as f64);
}

/// Record groups produced by the grouping stage, labelled by connection mode.
pub fn record_group_metrics(mode: &'static str, groups: usize) {
    metrics::counter!("shardline_groups_total", "mode" => mode).increment(groups as u64);
}

/// Current size of the worker pool.
pub fn record_pool_size(threads: usize) {
    metrics::gauge!("shardline_worker_pool_threads").set(threads as f64);
}
