//! MISP fabric bridge service.
//!
//! ```text
//!                  ┌──────────────────────────────────────────────┐
//!                  │              misp-fabric-bridge               │
//!                  │                                              │
//!   fabric request │  ┌──────────┐    ┌──────────┐               │  REST
//!   ───────────────┼─▶│ dispatch │───▶│   api    │───────────────┼────────▶ MISP
//!   ◀──────────────┼──│          │◀───│  (misp)  │◀──────────────┼────────
//!   fabric response│  └──────────┘    └──────────┘               │
//!                  │                                              │
//!   fabric event   │  ┌──────────┐    ┌──────────┐               │  ZeroMQ
//!   ◀──────────────┼──│  bridge  │◀───│ zmq SUB  │◀──────────────┼──────── MISP
//!                  │  └──────────┘    └──────────┘               │
//!                  └──────────────────────────────────────────────┘
//! ```
//!
//! Runs the service on an in-process fabric. The optional HTTP gateway lets
//! operators send requests to it; forwarded events are logged.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

use misp_fabric_bridge::config::load_config;
use misp_fabric_bridge::fabric::{topics, LocalFabric};
use misp_fabric_bridge::gateway::{setup_gateway_router, AppState};
use misp_fabric_bridge::lifecycle::signals::wait_for_shutdown_signal;
use misp_fabric_bridge::lifecycle::MispService;
use misp_fabric_bridge::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "misp-fabric-bridge")]
#[command(about = "Expose MISP on a message-bus fabric", long_about = None)]
struct Cli {
    /// Path to the service configuration file.
    #[arg(short, long, default_value = "config/misp-bridge.toml")]
    config: PathBuf,
}

/// Log every event published on the notification topics.
fn spawn_event_logger(fabric: &LocalFabric) -> tokio::task::JoinHandle<()> {
    let mut events = fabric.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.topic.starts_with(topics::NOTIFICATION_EVENT_TOPIC) => {
                    tracing::info!(
                        topic = %event.topic,
                        payload = %String::from_utf8_lossy(&event.payload),
                        "Event received"
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging("info");
            tracing::error!(path = %cli.config.display(), error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    logging::init_logging(&config.observability.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "misp-fabric-bridge starting");
    tracing::info!(
        host = %config.host,
        api_names = config.api_names.len(),
        notifications = config.notifications.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let fabric = Arc::new(LocalFabric::new());
    let event_logger = spawn_event_logger(&fabric);

    let service = Arc::new(MispService::start(&config, fabric.clone()).await?);

    if config.gateway.enabled {
        let listener = TcpListener::bind(&config.gateway.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Gateway listening");

        let router = setup_gateway_router(AppState::new(
            fabric.clone(),
            service.clone(),
            &config.gateway.api_key,
        ));
        axum::serve(listener, router)
            .with_graceful_shutdown(wait_for_shutdown_signal())
            .await?;
    } else {
        wait_for_shutdown_signal().await;
    }

    service.shutdown().await;
    event_logger.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
