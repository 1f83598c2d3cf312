//! Prometheus metrics for appliance traffic

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounterVec, Opts, TextEncoder};
use std::sync::OnceLock;

/// Counters shared by every provider
pub struct DriverMetrics {
    /// Appliance requests by HTTP method and status class
    pub appliance_requests: IntCounterVec,
    /// Session renewals by endpoint
    pub relogins: IntCounterVec,
    /// Asynchronous jobs by outcome (done, failed, timeout)
    pub async_jobs: IntCounterVec,
}

static METRICS: OnceLock<DriverMetrics> = OnceLock::new();

/// Global metrics, registered on first use
pub fn metrics() -> &'static DriverMetrics {
    METRICS.get_or_init(|| {
        let metrics = DriverMetrics {
            appliance_requests: counter_vec(
                "nexentastor_csi_appliance_requests_total",
                "Requests sent to NexentaStor appliances",
                &["method", "status"],
            ),
            relogins: counter_vec(
                "nexentastor_csi_relogins_total",
                "Session renewals after an expired token",
                &["endpoint"],
            ),
            async_jobs: counter_vec(
                "nexentastor_csi_async_jobs_total",
                "Asynchronous appliance jobs by outcome",
                &["outcome"],
            ),
        };

        // Already registered collectors are fine (e.g. tests in one process)
        let _ = prometheus::register(Box::new(metrics.appliance_requests.clone()));
        let _ = prometheus::register(Box::new(metrics.relogins.clone()));
        let _ = prometheus::register(Box::new(metrics.async_jobs.clone()));

        metrics
    })
}

/// Status class label, e.g. `2xx`
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

/// Render every registered metric in the text exposition format
pub fn gather_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| Error::Internal(format!("metrics encoding failed: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics not UTF-8: {}", e)))
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    // Names and labels are static and valid
    IntCounterVec::new(Opts::new(name, help), labels)
        .unwrap_or_else(|e| panic!("invalid metric {}: {}", name, e))
}
