//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `vs_cert_shim_reconciliations_total` - Total number of reconciliations
//! - `vs_cert_shim_reconciliation_errors_total` - Total number of failed reconciliations
//! - `vs_cert_shim_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `vs_cert_shim_certificate_operations_total` - Certificate writes by operation (create, update, delete)
//! - `vs_cert_shim_queue_depth` - Keys waiting in the work queue

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Controller metrics and the registry they are exposed from
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    reconciliations_total: IntCounter,
    reconciliation_errors_total: IntCounter,
    reconciliation_duration: Histogram,
    certificate_operations_total: IntCounterVec,
    queue_depth: IntGauge,
}

impl Metrics {
    /// Create the metrics and register them in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations_total =
            IntCounter::new("vs_cert_shim_reconciliations_total", "Total number of reconciliations")?;
        let reconciliation_errors_total = IntCounter::new(
            "vs_cert_shim_reconciliation_errors_total",
            "Total number of reconciliation errors",
        )?;
        let reconciliation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "vs_cert_shim_reconciliation_duration_seconds",
                "Duration of reconciliation in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;
        let certificate_operations_total = IntCounterVec::new(
            Opts::new(
                "vs_cert_shim_certificate_operations_total",
                "Total number of Certificate writes",
            ),
            &["operation"],
        )?;
        let queue_depth = IntGauge::new("vs_cert_shim_queue_depth", "Number of keys waiting in the work queue")?;

        registry.register(Box::new(reconciliations_total.clone()))?;
        registry.register(Box::new(reconciliation_errors_total.clone()))?;
        registry.register(Box::new(reconciliation_duration.clone()))?;
        registry.register(Box::new(certificate_operations_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            reconciliations_total,
            reconciliation_errors_total,
            reconciliation_duration,
            certificate_operations_total,
            queue_depth,
        })
    }

    /// Count one finished reconcile pass
    pub fn increment_reconciliations(&self) {
        self.reconciliations_total.inc();
    }

    /// Count one reconcile pass that returned an error
    pub fn increment_reconciliation_errors(&self) {
        self.reconciliation_errors_total.inc();
    }

    /// Record how long one reconcile pass took
    pub fn observe_reconciliation_duration(&self, seconds: f64) {
        self.reconciliation_duration.observe(seconds);
    }

    /// Count one Certificate write (`create`, `update` or `delete`)
    pub fn increment_certificate_operations(&self, operation: &str) {
        self.certificate_operations_total.with_label_values(&[operation]).inc();
    }

    /// Gauge the work queue keeps at its number of ready keys
    pub fn queue_depth(&self) -> IntGauge {
        self.queue_depth.clone()
    }

    /// Render every metric in the Prometheus text format
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_all_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.increment_reconciliations();
        metrics.increment_reconciliation_errors();
        metrics.observe_reconciliation_duration(0.2);
        metrics.increment_certificate_operations("create");
        metrics.queue_depth().set(3);

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains("vs_cert_shim_reconciliations_total 1"));
        assert!(text.contains("vs_cert_shim_reconciliation_errors_total 1"));
        assert!(text.contains("vs_cert_shim_reconciliation_duration_seconds_count 1"));
        assert!(text.contains("vs_cert_shim_certificate_operations_total{operation=\"create\"} 1"));
        assert!(text.contains("vs_cert_shim_queue_depth 3"));
    }

    #[test]
    fn test_instances_do_not_share_registries() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.increment_reconciliations();
        let text = String::from_utf8(second.encode().unwrap()).unwrap();
        assert!(text.contains("vs_cert_shim_reconciliations_total 0"));
    }
}
