//! Prometheus metrics exposition
//!
//! - `analysis_requests_total` (counter): label `outcome`
//! - `analysis_duration_seconds` (histogram): label `outcome`
//! - `provider_failover_total` (counter): no labels
//! - `credits_deducted_total` (counter): no labels

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[
    0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `analysis_duration_seconds` with explicit histogram buckets so
/// it renders as a Prometheus histogram (with `_bucket` lines usable in
/// `histogram_quantile()` queries) rather than the default summary. Bucket
/// boundaries span 500ms up to the 600s task ceiling.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("analysis_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a finished analysis with its outcome and duration.
pub fn record_analysis(outcome: &str, duration_secs: f64) {
    metrics::counter!("analysis_requests_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("analysis_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// Record one failover from the primary to the fallback provider.
pub fn record_failover() {
    metrics::counter!("provider_failover_total").increment(1);
}

/// Record credits deducted for a submission.
pub fn record_credits_deducted(amount: u32) {
    metrics::counter!("credits_deducted_total").increment(u64::from(amount));
}
