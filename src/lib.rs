//! MISP fabric bridge library.
//!
//! Exposes MISP REST operations as request/response services on a message-bus
//! fabric and republishes MISP ZeroMQ notifications as fabric events.

// Core subsystems
pub mod api;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod fabric;

// Cross-cutting concerns
pub mod gateway;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ServiceConfig;
pub use fabric::{Fabric, LocalFabric};
pub use lifecycle::{MispService, Shutdown};
