//! # Prometheus Metrics: Exposition for Scraping
//!
//! Exposes riverwatch operational metrics in the Prometheus text exposition
//! format for scraping by Prometheus, Grafana Agent, or any
//! OpenMetrics-compatible collector.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `riverwatch_model_operations_total` | Counter | `operation`, `outcome` | Train/predict/tune outcomes |
//! | `riverwatch_rollbacks_total` | Counter | `result` | Pending-row deletions after failed training |
//! | `riverwatch_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency |
//!
//! The `/metrics` endpoint renders the current registry state on each scrape.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use tracing::warn;

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct OperationLabel {
    pub operation: String,
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct RollbackLabel {
    pub result: String,
}

/// Label set for HTTP request metrics. `path` is normalized so numeric ids
/// collapse into one series.
#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

/// Thread-safe metrics registry.
///
/// All fields use atomic types and are safe to update from any task.
pub struct Metrics {
    pub registry: Registry,
    pub model_operations: Family<OperationLabel, Counter>,
    pub rollbacks: Family<RollbackLabel, Counter>,
    pub http_request_duration: Family<HttpLabel, Histogram>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let model_operations = Family::<OperationLabel, Counter>::default();
        registry.register(
            "riverwatch_model_operations",
            "Model lifecycle operations by outcome",
            model_operations.clone(),
        );

        let rollbacks = Family::<RollbackLabel, Counter>::default();
        registry.register(
            "riverwatch_rollbacks",
            "Pending model rows deleted after a failed training call",
            rollbacks.clone(),
        );

        let http_request_duration = Family::<HttpLabel, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.005, 2.0, 18))
        });
        registry.register(
            "riverwatch_http_request_duration_seconds",
            "HTTP request latency",
            http_request_duration.clone(),
        );

        Self {
            registry,
            model_operations,
            rollbacks,
            http_request_duration,
        }
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.model_operations
            .get_or_create(&OperationLabel {
                operation: operation.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_rollback(&self, deleted: bool) {
        let result = if deleted { "deleted" } else { "failed" };
        self.rollbacks
            .get_or_create(&RollbackLabel {
                result: result.to_string(),
            })
            .inc();
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            warn!(error = %e, "failed to encode metrics");
        }
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_encode_returns_valid_text() {
        let m = Metrics::new();
        m.record_operation("train", "success");
        m.record_rollback(true);

        let output = m.encode();
        assert!(output.contains("riverwatch_model_operations_total"));
        assert!(output.contains("operation=\"train\""));
        assert!(output.contains("riverwatch_rollbacks_total"));
        assert!(output.contains("result=\"deleted\""));
    }

    #[test]
    fn operation_counters_are_independent() {
        let m = Metrics::new();
        m.record_operation("train", "failure");
        m.record_operation("train", "failure");
        m.record_operation("predict", "success");

        let failed = m
            .model_operations
            .get_or_create(&OperationLabel {
                operation: "train".into(),
                outcome: "failure".into(),
            })
            .get();
        assert_eq!(failed, 2);
    }

    #[test]
    fn request_histogram_is_registered() {
        let m = Metrics::new();
        m.http_request_duration
            .get_or_create(&HttpLabel {
                method: "GET".into(),
                path: "/healthz".into(),
            })
            .observe(0.01);
        assert!(m.encode().contains("riverwatch_http_request_duration_seconds"));
    }
}
