//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{
    ApiConfig, CertificateVerification, ClientCertificate, GatewayConfig, NotificationConfig,
    ObservabilityConfig, ServiceConfig, DEFAULT_API_PORT, DEFAULT_ZEROMQ_PORT,
};
use crate::config::settings::SettingResolver;

/// Name of the section holding the service settings.
pub const GENERAL_SECTION: &str = "general";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Required setting {setting} not found in {section} section")]
    MissingSetting { setting: String, section: String },

    #[error("Required setting {setting} in section {section} is empty")]
    EmptySetting { setting: String, section: String },

    #[error("Unexpected value for setting {setting} in section {section}: {reason}")]
    UnexpectedValue {
        setting: String,
        section: String,
        reason: String,
    },

    #[error("Cannot find file for setting {setting} in section {section}: {}", .path.display())]
    FileNotFound {
        setting: String,
        section: String,
        path: PathBuf,
    },

    #[error("Invalid {section} section: {reason}")]
    InvalidSection { section: String, reason: String },
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_config(&content, base_dir)
}

/// Parse configuration text. Relative file paths resolve against `base_dir`.
pub fn parse_config(content: &str, base_dir: &Path) -> Result<ServiceConfig, ConfigError> {
    let document: toml::Table = toml::from_str(content)?;
    let general = SettingResolver::new(&document, GENERAL_SECTION, base_dir);

    let service_unique_id = general
        .optional::<String>("service_unique_id")?
        .filter(|id| !id.is_empty());

    let host: String = general.required("host")?;
    let api_port: u16 = general.with_default("api_port", DEFAULT_API_PORT)?;
    let api_names: Vec<String> = general.with_default("api_names", Vec::new())?;

    // The API settings are only validated when at least one API is exposed.
    let api = if api_names.is_empty() {
        None
    } else {
        Some(resolve_api(&general, &host, api_port)?)
    };

    let topics: Vec<String> = general.with_default("zeromq_notification_topics", Vec::new())?;

    let notifications = if topics.is_empty() {
        None
    } else {
        Some(NotificationConfig {
            host: host.clone(),
            port: general.with_default("zeromq_port", DEFAULT_ZEROMQ_PORT)?,
            topics,
            connect_timeout_secs: general.with_default("zeromq_connect_timeout_secs", 10u64)?,
        })
    };

    let observability: ObservabilityConfig = section(&document, "observability")?;
    let gateway: GatewayConfig = section(&document, "gateway")?;

    if gateway.enabled && gateway.api_key.trim().is_empty() {
        return Err(ConfigError::InvalidSection {
            section: "gateway".to_string(),
            reason: "api_key must be set when the gateway is enabled".to_string(),
        });
    }

    Ok(ServiceConfig {
        service_unique_id,
        host,
        api_names,
        api,
        notifications,
        observability,
        gateway,
    })
}

fn resolve_api(
    general: &SettingResolver<'_>,
    host: &str,
    api_port: u16,
) -> Result<ApiConfig, ConfigError> {
    let api_key: String = general.required("api_key")?;

    let verify = if general.with_default("verify_certificate", true)? {
        match general.file_path("verify_cert_bundle")? {
            Some(bundle) => CertificateVerification::Bundle(bundle),
            None => CertificateVerification::System,
        }
    } else {
        CertificateVerification::Disabled
    };

    let certificate = general.file_path("client_certificate")?;
    let key = general.file_path("client_key")?;
    let client_certificate = certificate.map(|certificate| ClientCertificate { certificate, key });

    Ok(ApiConfig {
        url: format!("https://{}:{}", host, api_port),
        api_key,
        verify,
        client_certificate,
        request_timeout_secs: general.with_default("request_timeout_secs", 30u64)?,
    })
}

fn section<T>(document: &toml::Table, name: &str) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match document.get(name) {
        Some(value) => value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::InvalidSection {
                section: name.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(T::default()),
    }
}
