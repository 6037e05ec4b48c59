//! Notification bridge: background poll loop and teardown.
//!
//! # State
//! ```text
//! setup() ──▶ Running ──teardown()──▶ Destroyed (terminal)
//! ```
//!
//! The worker waits on the upstream source and the shutdown sentinel at the
//! same time, with no timeout. The state is checked before every wait, so a
//! frame already being forwarded is always published before the worker exits.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::message::BridgeMessage;
use crate::bridge::source::{NotificationSource, SourceError};
use crate::bridge::zmq::ZmqNotificationSource;
use crate::config::NotificationConfig;
use crate::fabric::{topics, Event, Fabric};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

const ERROR_BACKOFF_BASE_MS: u64 = 50;
const ERROR_BACKOFF_MAX_MS: u64 = 5_000;

/// Lifecycle state of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeState {
    Running = 0,
    Destroyed = 1,
}

#[derive(Debug, Default)]
struct StateCell(AtomicU8);

impl StateCell {
    fn load(&self) -> BridgeState {
        match self.0.load(Ordering::Acquire) {
            0 => BridgeState::Running,
            _ => BridgeState::Destroyed,
        }
    }

    fn mark_destroyed(&self) {
        self.0.store(BridgeState::Destroyed as u8, Ordering::Release);
    }
}

/// Resources released by teardown, guarded by the teardown lock.
struct Resources {
    shutdown: Option<Shutdown>,
    worker: Option<JoinHandle<Box<dyn NotificationSource>>>,
}

/// Forwards upstream notifications to the fabric as events.
pub struct NotificationBridge {
    state: Arc<StateCell>,
    resources: Mutex<Resources>,
    upstream: String,
}

impl NotificationBridge {
    /// Forward notifications from the configured ZeroMQ publisher.
    ///
    /// The worker opens the socket itself. An unreachable publisher is
    /// retried with backoff until teardown.
    pub fn connect(
        config: &NotificationConfig,
        unique_id: Option<String>,
        fabric: Arc<dyn Fabric>,
    ) -> Self {
        let source = ZmqNotificationSource::new(
            &config.host,
            config.port,
            &config.topics,
            Duration::from_secs(config.connect_timeout_secs),
        );
        Self::setup(Box::new(source), unique_id, fabric)
    }

    /// Start forwarding frames from `source`.
    ///
    /// Spawns the worker on the current Tokio runtime.
    pub fn setup(
        source: Box<dyn NotificationSource>,
        unique_id: Option<String>,
        fabric: Arc<dyn Fabric>,
    ) -> Self {
        let state = Arc::new(StateCell::default());
        let upstream = source.describe();

        let shutdown = Shutdown::new();
        let sentinel = shutdown.subscribe();

        let forwarder = EventForwarder {
            fabric,
            unique_id: unique_id.filter(|id| !id.is_empty()),
        };
        let worker = tokio::spawn(poll_loop(source, sentinel, Arc::clone(&state), forwarder));

        info!(upstream = %upstream, "Notification bridge started");

        Self {
            state,
            resources: Mutex::new(Resources {
                shutdown: Some(shutdown),
                worker: Some(worker),
            }),
            upstream,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state() == BridgeState::Running
    }

    /// Endpoint description of the upstream source.
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Stop the worker and release every resource.
    ///
    /// Returns once the worker has exited. Later calls do nothing.
    pub async fn teardown(&self) {
        let mut resources = self.resources.lock().await;
        if self.state.load() == BridgeState::Destroyed {
            return;
        }
        self.state.mark_destroyed();
        info!(upstream = %self.upstream, "Stopping notification bridge");

        // Wakes a worker blocked waiting on the upstream source.
        if let Some(shutdown) = resources.shutdown.as_ref() {
            debug!("Sending shutdown sentinel");
            shutdown.trigger();
        }

        if let Some(worker) = resources.worker.take() {
            debug!("Waiting for notification worker to terminate ...");
            match worker.await {
                Ok(source) => {
                    debug!("Notification worker terminated");
                    if let Err(e) = source.close().await {
                        warn!(error = %e, "Failed to close notification source");
                    }
                }
                Err(e) => warn!(error = %e, "Notification worker did not terminate cleanly"),
            }
        }

        if resources.shutdown.take().is_some() {
            debug!("Shutdown sentinel closed");
        }
        info!("Notification bridge stopped");
    }
}

impl std::fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBridge")
            .field("upstream", &self.upstream)
            .field("state", &self.state())
            .finish()
    }
}

/// Builds one fabric event per upstream frame.
struct EventForwarder {
    fabric: Arc<dyn Fabric>,
    unique_id: Option<String>,
}

impl EventForwarder {
    async fn forward(&self, frame: &[u8]) {
        let message = BridgeMessage::parse(frame);
        debug!(topic = %message.topic, "Received notification");

        let event_topic = topics::event_topic(self.unique_id.as_deref(), &message.topic);
        debug!(event_topic = %event_topic, "Forwarding notification");

        match self.fabric.publish_event(Event::new(event_topic, message.payload)).await {
            Ok(()) => metrics::record_notification_forwarded(&message.topic),
            Err(e) => {
                metrics::record_notification_dropped(&message.topic);
                warn!(topic = %message.topic, error = %e, "Failed to publish notification event");
            }
        }
    }
}

enum Wake {
    Frame(Result<Vec<u8>, SourceError>),
    Sentinel(Result<(), broadcast::error::RecvError>),
}

async fn poll_loop(
    mut source: Box<dyn NotificationSource>,
    mut sentinel: broadcast::Receiver<()>,
    state: Arc<StateCell>,
    forwarder: EventForwarder,
) -> Box<dyn NotificationSource> {
    let mut failures: u32 = 0;

    while state.load() == BridgeState::Running {
        let wake = tokio::select! {
            biased;
            received = source.recv() => Wake::Frame(received),
            signal = sentinel.recv() => Wake::Sentinel(signal),
        };

        match wake {
            Wake::Frame(Ok(frame)) => {
                failures = 0;
                forwarder.forward(&frame).await;
            }
            Wake::Frame(Err(e)) => {
                failures = failures.saturating_add(1);
                metrics::record_bridge_poll_error();
                let delay = calculate_backoff(failures, ERROR_BACKOFF_BASE_MS, ERROR_BACKOFF_MAX_MS);
                debug!(error = %e, attempt = failures, delay = ?delay, "Notification poll interrupted");

                let interrupted = tokio::select! {
                    _ = tokio::time::sleep(delay) => None,
                    signal = sentinel.recv() => Some(signal),
                };
                if let Some(Err(broadcast::error::RecvError::Closed)) = interrupted {
                    break;
                }
            }
            Wake::Sentinel(Ok(())) | Wake::Sentinel(Err(broadcast::error::RecvError::Lagged(_))) => {
                debug!("Shutdown sentinel received");
            }
            Wake::Sentinel(Err(broadcast::error::RecvError::Closed)) => {
                // The bridge was dropped without teardown.
                break;
            }
        }
    }

    source
}
