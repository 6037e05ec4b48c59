//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & parse)
//!     → settings.rs (typed [general] lookups: defaults, required, file paths)
//!     → ServiceConfig (validated, immutable)
//!     → consumed once by lifecycle::startup
//! ```
//!
//! # Design Decisions
//! - API settings are only read when at least one API name is configured
//! - ZeroMQ settings are only read when at least one topic is configured
//! - Any configuration error is fatal at startup

pub mod loader;
pub mod schema;
pub mod settings;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ApiConfig, CertificateVerification, ClientCertificate, GatewayConfig, NotificationConfig,
    ObservabilityConfig, ServiceConfig,
};
