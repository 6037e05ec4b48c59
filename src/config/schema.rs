//! Configuration schema definitions.
//!
//! `ServiceConfig` is the validated, immutable result of loading a config
//! file. The `[general]` section is resolved setting by setting through
//! [`SettingResolver`](crate::config::settings::SettingResolver); the ambient
//! sections derive Serde traits and fall back to defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default port of the MISP REST API.
pub const DEFAULT_API_PORT: u16 = 443;

/// Default port of the MISP ZeroMQ publisher.
pub const DEFAULT_ZEROMQ_PORT: u16 = 50000;

/// Root configuration for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Optional discriminator inserted into every request and event topic.
    pub service_unique_id: Option<String>,

    /// Host name or IP address of the MISP server.
    pub host: String,

    /// Names of the MISP API operations exposed on the fabric.
    pub api_names: Vec<String>,

    /// MISP API client settings. `None` when `api_names` is empty.
    pub api: Option<ApiConfig>,

    /// ZeroMQ notification settings. `None` when no topics are configured.
    pub notifications: Option<NotificationConfig>,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// HTTP gateway settings.
    pub gateway: GatewayConfig,
}

/// Connection settings for the MISP REST API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://misp.local:443`.
    pub url: String,

    /// Authorization key sent with every API call.
    pub api_key: String,

    /// Server certificate verification mode.
    pub verify: CertificateVerification,

    /// Optional client certificate for mutual TLS.
    pub client_certificate: Option<ClientCertificate>,

    /// Per-call HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

/// How the MISP server certificate is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateVerification {
    /// Accept any server certificate.
    Disabled,
    /// Verify against the system trust store.
    System,
    /// Verify against a CA bundle file.
    Bundle(PathBuf),
}

/// Client certificate (PEM) and, optionally, a separate private key file.
///
/// Without `key`, the certificate file must also hold the private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    pub certificate: PathBuf,
    pub key: Option<PathBuf>,
}

/// ZeroMQ notification bridge settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub host: String,
    pub port: u16,

    /// Subscription filters (ZeroMQ prefix semantics). Never empty.
    pub topics: Vec<String>,

    /// Upper bound for establishing the upstream connection.
    pub connect_timeout_secs: u64,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Enable the HTTP gateway.
    pub enabled: bool,

    /// Gateway bind address.
    pub bind_address: String,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: String::new(),
        }
    }
}
