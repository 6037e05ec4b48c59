//! Startup and shutdown orchestration.
//!
//! # Responsibilities
//! - Build the MISP API client when API names are configured
//! - Open the notification bridge when notification topics are configured
//! - Register one request handler per resolved API name
//! - Undo all of the above exactly once on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and releases earlier steps
//! - Subsystems initialize in order, not concurrently
//! - An unreachable notification publisher is not a startup error; the bridge
//!   keeps connecting in the background

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::api::{ApiCatalog, ApiError, MispClient};
use crate::bridge::{NotificationBridge, NotificationSource};
use crate::config::ServiceConfig;
use crate::dispatch::{build_registration, resolve_bindings};
use crate::fabric::{Fabric, FabricError, ServiceId};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to create MISP API client: {0}")]
    Api(#[from] ApiError),

    #[error("Failed to register service: {0}")]
    Fabric(#[from] FabricError),
}

/// Snapshot of a running service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub service_unique_id: Option<String>,
    pub request_topics: Vec<String>,
    pub bridge: Option<BridgeStatus>,
    pub stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    pub upstream: String,
    pub running: bool,
}

/// The MISP service attached to a fabric.
pub struct MispService {
    fabric: Arc<dyn Fabric>,
    unique_id: Option<String>,
    request_topics: Vec<String>,
    registration: Option<ServiceId>,
    bridge: Option<NotificationBridge>,

    /// Serializes shutdown.
    shutdown_lock: Mutex<()>,
    stopped: AtomicBool,
}

impl MispService {
    /// Start the service from configuration alone.
    pub async fn start(config: &ServiceConfig, fabric: Arc<dyn Fabric>) -> Result<Self, StartupError> {
        Self::start_with(config, fabric, None, None).await
    }

    /// Start the service with injected parts.
    ///
    /// `catalog` replaces the MISP client built from `config.api`. `source`
    /// replaces the ZeroMQ connection and starts the bridge even when no
    /// notification topics are configured.
    pub async fn start_with(
        config: &ServiceConfig,
        fabric: Arc<dyn Fabric>,
        catalog: Option<ApiCatalog>,
        source: Option<Box<dyn NotificationSource>>,
    ) -> Result<Self, StartupError> {
        let unique_id = config.service_unique_id.clone().filter(|id| !id.is_empty());

        let catalog = match (catalog, &config.api) {
            (Some(catalog), _) => Some(catalog),
            (None, Some(api)) => Some(Arc::new(MispClient::new(api)?).catalog()),
            (None, None) => None,
        };

        let bridge = match (source, &config.notifications) {
            (Some(source), _) => Some(NotificationBridge::setup(source, unique_id.clone(), fabric.clone())),
            (None, Some(notifications)) => Some(NotificationBridge::connect(
                notifications,
                unique_id.clone(),
                fabric.clone(),
            )),
            (None, None) => {
                info!("No ZeroMQ notification topics configured, notification bridge disabled");
                None
            }
        };

        let registration = catalog.and_then(|catalog| {
            let bindings = resolve_bindings(&catalog, &config.api_names, unique_id.as_deref());
            build_registration(bindings, unique_id.as_deref())
        });

        let mut request_topics = Vec::new();
        let mut service_id = None;
        if let Some(registration) = registration {
            request_topics = registration.topics().map(str::to_string).collect();
            match fabric.register_service(registration).await {
                Ok(id) => service_id = Some(id),
                Err(e) => {
                    if let Some(bridge) = &bridge {
                        bridge.teardown().await;
                    }
                    return Err(e.into());
                }
            }
        }

        info!(
            request_topics = request_topics.len(),
            bridge = bridge.is_some(),
            "MISP service started"
        );

        Ok(Self {
            fabric,
            unique_id,
            request_topics,
            registration: service_id,
            bridge,
            shutdown_lock: Mutex::new(()),
            stopped: AtomicBool::new(false),
        })
    }

    /// Topics on which requests are served, in registration order.
    pub fn request_topics(&self) -> &[String] {
        &self.request_topics
    }

    pub fn bridge(&self) -> Option<&NotificationBridge> {
        self.bridge.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            service_unique_id: self.unique_id.clone(),
            request_topics: self.request_topics.clone(),
            bridge: self.bridge.as_ref().map(|bridge| BridgeStatus {
                upstream: bridge.upstream().to_string(),
                running: bridge.is_running(),
            }),
            stopped: self.is_stopped(),
        }
    }

    /// Unregister the service and tear down the bridge.
    ///
    /// Concurrent callers wait for the first one; later calls return immediately.
    pub async fn shutdown(&self) {
        let _guard = self.shutdown_lock.lock().await;
        if self.is_stopped() {
            return;
        }
        info!("Stopping MISP service");

        if let Some(id) = self.registration {
            if let Err(e) = self.fabric.unregister_service(id).await {
                error!(error = %e, "Failed to unregister service");
            }
        }
        if let Some(bridge) = &self.bridge {
            bridge.teardown().await;
        }

        self.stopped.store(true, Ordering::Release);
        info!("MISP service stopped");
    }
}

impl std::fmt::Debug for MispService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MispService")
            .field("unique_id", &self.unique_id)
            .field("request_topics", &self.request_topics)
            .field("bridge", &self.bridge)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
