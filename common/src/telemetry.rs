// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence over the configured level. JSON output is
/// used when `json` is set, compact human-readable output otherwise. Logs go
/// to stderr.
pub fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let layer = if json {
        fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::debug!(log_level = log_level, json = json, "Logging initialized");
    Ok(())
}

/// Initialize Prometheus metrics exporter
///
/// Registers:
/// - autocommit_runs_total: executions by outcome
/// - autocommit_reconciliations_total: reconciliations by result
/// - autocommit_dispatch_skipped_total: due ticks skipped because a run was in flight
/// - autocommit_scheduled_tasks: tasks currently in the live schedule
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("autocommit_runs_total", "Task executions by outcome");
    describe_counter!(
        "autocommit_reconciliations_total",
        "Schedule reconciliations by result"
    );
    describe_counter!(
        "autocommit_dispatch_skipped_total",
        "Due dispatches skipped because the previous run was still in flight"
    );
    describe_gauge!(
        "autocommit_scheduled_tasks",
        "Number of tasks in the live schedule"
    );

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_run_outcome(outcome: &'static str) {
    counter!("autocommit_runs_total", "outcome" => outcome).increment(1);
}

#[inline]
pub fn record_reconciliation(success: bool) {
    let result = if success { "ok" } else { "error" };
    counter!("autocommit_reconciliations_total", "result" => result).increment(1);
}

#[inline]
pub fn record_dispatch_skipped() {
    counter!("autocommit_dispatch_skipped_total").increment(1);
}

#[inline]
pub fn update_scheduled_tasks(count: usize) {
    gauge!("autocommit_scheduled_tasks").set(count as f64);
}

/// Mask an API key for display, keeping the first and last four characters
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => "<not set>".to_string(),
        n if n <= 8 => "*".repeat(n),
        n => {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[n - 4..].iter().collect();
            format!("{}{}{}", head, "*".repeat(n - 8), tail)
        }
    }
}
