//! In-process fabric.
//!
//! Request handlers live in a concurrent topic table; every in-flight request
//! owns a oneshot slot that `send_response`/`send_error_response` fills.
//! Events fan out over a broadcast channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot};
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::fabric::{
    Event, Fabric, FabricError, Request, RequestHandler, Response, ServiceId, ServiceRegistration,
};

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Default time a caller waits for a response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// In-memory implementation of [`Fabric`].
pub struct LocalFabric {
    /// Request handlers by topic.
    handlers: DashMap<String, Arc<dyn RequestHandler>>,

    /// Registered topics by service instance.
    services: DashMap<ServiceId, Vec<String>>,

    /// Response slots of in-flight requests.
    pending: DashMap<Uuid, oneshot::Sender<Response>>,

    /// Broadcast sender for events.
    events: broadcast::Sender<Event>,

    /// Total events published.
    events_published: AtomicU64,

    request_timeout: Duration,
}

impl LocalFabric {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a fabric whose event channel buffers `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            handlers: DashMap::new(),
            services: DashMap::new(),
            pending: DashMap::new(),
            events,
            events_published: AtomicU64::new(0),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override how long [`request`](Self::request) waits for a response.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Send a request to `topic` and wait for its response.
    pub async fn request(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<Response, FabricError> {
        let handler = self
            .handlers
            .get(topic)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FabricError::NoHandler(topic.to_string()))?;

        let request = Request::new(topic, payload);
        let request_id = request.message_id;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);

        let outcome = timeout(self.request_timeout, async {
            handler.on_request(request, self).await;
            rx.await
        })
        .await;

        self.pending.remove(&request_id);

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(FabricError::NoResponse(topic.to_string())),
            Err(_) => Err(FabricError::Timeout {
                topic: topic.to_string(),
                secs: self.request_timeout.as_secs(),
            }),
        }
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Sorted list of topics with a registered request handler.
    pub fn registered_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        topics.sort();
        topics
    }

    /// Total number of events published.
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    fn complete(&self, request: &Request, response: Response) -> Result<(), FabricError> {
        let (_, slot) = self.pending.remove(&request.message_id).ok_or_else(|| {
            FabricError::NoResponse(request.destination_topic.clone())
        })?;
        // The caller may have timed out in the meantime.
        let _ = slot.send(response);
        Ok(())
    }
}

impl Default for LocalFabric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fabric for LocalFabric {
    async fn register_service(&self, registration: ServiceRegistration) -> Result<ServiceId, FabricError> {
        let mut claimed: Vec<String> = Vec::with_capacity(registration.handlers().len());
        for (topic, handler) in registration.handlers() {
            let taken = match self.handlers.entry(topic.clone()) {
                Entry::Occupied(_) => true,
                Entry::Vacant(slot) => {
                    slot.insert(handler.clone());
                    false
                }
            };
            if taken {
                for claimed_topic in &claimed {
                    self.handlers.remove(claimed_topic);
                }
                return Err(FabricError::AlreadyRegistered(topic.clone()));
            }
            claimed.push(topic.clone());
        }

        let id = ServiceId::new();
        debug!(
            service_type = registration.service_type(),
            service_id = %id,
            topics = claimed.len(),
            "Service registered"
        );
        self.services.insert(id, claimed);
        Ok(id)
    }

    async fn unregister_service(&self, id: ServiceId) -> Result<(), FabricError> {
        if let Some((_, topics)) = self.services.remove(&id) {
            for topic in topics {
                self.handlers.remove(&topic);
            }
            debug!(service_id = %id, "Service unregistered");
        }
        Ok(())
    }

    async fn send_response(&self, request: &Request, body: Vec<u8>) -> Result<(), FabricError> {
        self.complete(
            request,
            Response::Success {
                request_id: request.message_id,
                payload: body,
            },
        )
    }

    async fn send_error_response(&self, request: &Request, message: String) -> Result<(), FabricError> {
        self.complete(
            request,
            Response::Error {
                request_id: request.message_id,
                message,
            },
        )
    }

    async fn publish_event(&self, event: Event) -> Result<(), FabricError> {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic.clone();

        // No subscribers is not an error: events are fire-and-forget.
        let receivers = self.events.send(event).unwrap_or(0);
        debug!(topic = %topic, receivers, "Event published");
        Ok(())
    }
}
