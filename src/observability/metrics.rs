//! Metrics collection and exposition.
//!
//! # Metrics
//! - `misp_notifications_forwarded_total` (counter): events published, by notification topic
//! - `misp_notifications_dropped_total` (counter): events the fabric rejected, by topic
//! - `misp_bridge_poll_errors_total` (counter): transient upstream receive errors
//! - `misp_requests_total` (counter): handled requests, by API method and outcome
//! - `misp_request_duration_seconds` (histogram): API call latency, by API method

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_notification_forwarded(topic: &str) {
    counter!("misp_notifications_forwarded_total", "topic" => topic.to_string()).increment(1);
}

pub fn record_notification_dropped(topic: &str) {
    counter!("misp_notifications_dropped_total", "topic" => topic.to_string()).increment(1);
}

pub fn record_bridge_poll_error() {
    counter!("misp_bridge_poll_errors_total").increment(1);
}

/// Record one handled request. `outcome` is `"success"` or `"error"`.
pub fn record_request(api: &str, outcome: &'static str, start: Instant) {
    counter!("misp_requests_total", "api" => api.to_string(), "outcome" => outcome).increment(1);
    histogram!("misp_request_duration_seconds", "api" => api.to_string())
        .record(start.elapsed().as_secs_f64());
}
