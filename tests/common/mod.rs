//! Shared utilities for integration tests.

use std::time::Duration;

use misp_fabric_bridge::config::{GatewayConfig, NotificationConfig, ObservabilityConfig, ServiceConfig};
use misp_fabric_bridge::fabric::Event;
use tokio::sync::broadcast;

/// Configuration with no API client and no bridge; tests fill in what they need.
pub fn base_config(api_names: &[&str], unique_id: Option<&str>) -> ServiceConfig {
    ServiceConfig {
        service_unique_id: unique_id.map(str::to_string),
        host: "127.0.0.1".to_string(),
        api_names: api_names.iter().map(|s| s.to_string()).collect(),
        api: None,
        notifications: None,
        observability: ObservabilityConfig::default(),
        gateway: GatewayConfig::default(),
    }
}

#[allow(dead_code)]
pub fn notification_config(port: u16, topics: &[&str]) -> NotificationConfig {
    NotificationConfig {
        host: "127.0.0.1".to_string(),
        port,
        topics: topics.iter().map(|s| s.to_string()).collect(),
        connect_timeout_secs: 5,
    }
}

/// Next event, failing the test after `secs` seconds.
#[allow(dead_code)]
pub async fn next_event(events: &mut broadcast::Receiver<Event>, secs: u64) -> Event {
    tokio::time::timeout(Duration::from_secs(secs), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}
