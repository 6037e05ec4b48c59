//! Message-bus fabric subsystem.
//!
//! # Data Flow
//! ```text
//! Requests:
//!     fabric → RequestHandler::on_request (dispatch)
//!            → Fabric::send_response / send_error_response
//!
//! Events:
//!     bridge → Fabric::publish_event → subscribers
//! ```
//!
//! # Design Decisions
//! - The fabric transport is a collaborator behind the `Fabric` trait
//! - `local.rs` provides an in-process fabric for embedding and tests
//! - Topic names are computed in one place (`topics.rs`)

pub mod local;
pub mod message;
pub mod topics;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use local::LocalFabric;
pub use message::{Event, Request, Response};

/// Errors raised by a fabric implementation.
#[derive(Debug, Error)]
pub enum FabricError {
    /// No service handles the requested topic.
    #[error("No service registered for topic {0}")]
    NoHandler(String),

    /// Another registered service already handles this topic.
    #[error("Topic already registered: {0}")]
    AlreadyRegistered(String),

    /// The request was handled but no response arrived.
    #[error("No response received for request on {0}")]
    NoResponse(String),

    /// The request did not complete in time.
    #[error("Request on {topic} timed out after {secs} seconds")]
    Timeout { topic: String, secs: u64 },

    /// The fabric connection is gone.
    #[error("Fabric unavailable: {0}")]
    Unavailable(String),
}

/// Identifies one registered service instance.
///
/// Several instances may share a service type; each registration gets its own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(Uuid);

impl ServiceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ServiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback invoked for every request received on a registered topic.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle `request`. Implementations send exactly one response through `fabric`.
    async fn on_request(&self, request: Request, fabric: &dyn Fabric);
}

/// A set of request topics registered together under one service type.
#[derive(Clone)]
pub struct ServiceRegistration {
    service_type: String,
    handlers: Vec<(String, Arc<dyn RequestHandler>)>,
}

impl ServiceRegistration {
    pub fn new(service_type: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            handlers: Vec::new(),
        }
    }

    /// Route requests on `topic` to `handler`.
    pub fn add_request_handler(&mut self, topic: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        self.handlers.push((topic.into(), handler));
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn handlers(&self) -> &[(String, Arc<dyn RequestHandler>)] {
        &self.handlers
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(topic, _)| topic.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("service_type", &self.service_type)
            .field("topics", &self.topics().collect::<Vec<_>>())
            .finish()
    }
}

/// The operations the service needs from a message-bus fabric.
#[async_trait]
pub trait Fabric: Send + Sync {
    /// Register every request handler of `registration`.
    ///
    /// Fails without registering anything if one of its topics is taken.
    async fn register_service(&self, registration: ServiceRegistration) -> Result<ServiceId, FabricError>;

    /// Remove a previously registered service and its request topics.
    ///
    /// Unknown ids are ignored.
    async fn unregister_service(&self, id: ServiceId) -> Result<(), FabricError>;

    /// Reply to `request` with a successful result.
    async fn send_response(&self, request: &Request, body: Vec<u8>) -> Result<(), FabricError>;

    /// Reply to `request` with an error message.
    async fn send_error_response(&self, request: &Request, message: String) -> Result<(), FabricError>;

    /// Publish `event` to all subscribers of its topic.
    async fn publish_event(&self, event: Event) -> Result<(), FabricError>;
}
