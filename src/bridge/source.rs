//! Upstream notification sources.
//!
//! A source yields raw frames in receipt order. Subscriptions follow ZeroMQ
//! semantics: a frame is delivered when it starts with one of the configured
//! filters, and a source with no filters delivers nothing.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors returned while receiving from or closing a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source can no longer deliver frames.
    #[error("Notification source closed")]
    Closed,

    /// Transport-level failure; the next receive may succeed.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// The subscribing side of the upstream publish/subscribe connection.
#[async_trait]
pub trait NotificationSource: Send {
    /// Human-readable endpoint description for logs.
    fn describe(&self) -> String;

    /// Wait for the next frame. Must be cancel-safe.
    async fn recv(&mut self) -> Result<Vec<u8>, SourceError>;

    /// Release the underlying transport.
    async fn close(self: Box<Self>) -> Result<(), SourceError>;
}

/// Prefix-based subscription filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicFilter {
    prefixes: Vec<Vec<u8>>,
}

impl TopicFilter {
    pub fn new<S: AsRef<str>>(filters: &[S]) -> Self {
        Self {
            prefixes: filters.iter().map(|f| f.as_ref().as_bytes().to_vec()).collect(),
        }
    }

    /// Whether `frame` passes any subscription. No subscriptions match nothing.
    pub fn matches(&self, frame: &[u8]) -> bool {
        self.prefixes.iter().any(|prefix| frame.starts_with(prefix))
    }
}

/// Create an in-process source and the publisher feeding it.
pub fn memory_channel<S: AsRef<str>>(filters: &[S]) -> (MemoryPublisher, MemorySource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryPublisher { tx },
        MemorySource {
            filter: TopicFilter::new(filters),
            rx,
        },
    )
}

/// Sending half of [`memory_channel`].
#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl MemoryPublisher {
    /// Publish one frame. Returns `false` once the source is gone.
    pub fn publish(&self, frame: impl Into<Vec<u8>>) -> bool {
        self.tx.send(frame.into()).is_ok()
    }
}

/// In-process [`NotificationSource`] fed by a [`MemoryPublisher`].
#[derive(Debug)]
pub struct MemorySource {
    filter: TopicFilter,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl NotificationSource for MemorySource {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn recv(&mut self) -> Result<Vec<u8>, SourceError> {
        loop {
            match self.rx.recv().await {
                Some(frame) if self.filter.matches(&frame) => return Ok(frame),
                Some(_) => continue,
                None => return Err(SourceError::Closed),
            }
        }
    }

    async fn close(mut self: Box<Self>) -> Result<(), SourceError> {
        self.rx.close();
        Ok(())
    }
}
