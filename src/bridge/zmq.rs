//! ZeroMQ SUB socket connected to the MISP publisher.
//!
//! The socket is opened by the first receive, on the bridge worker. A failed
//! connect or a lost publisher is reported as a transport error; the next
//! receive opens a fresh socket and subscribes again.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use zeromq::{Socket, SocketEvent, SocketRecv, SubSocket, ZmqError, ZmqMessage};

use crate::bridge::source::{NotificationSource, SourceError};

struct Connection {
    socket: SubSocket,
    events: Pin<Box<dyn Stream<Item = SocketEvent> + Send + Sync>>,
}

enum Wake {
    Message(Result<ZmqMessage, ZmqError>),
    Monitor(Option<SocketEvent>),
}

/// [`NotificationSource`] backed by a ZeroMQ subscriber.
pub struct ZmqNotificationSource {
    endpoint: String,
    topics: Vec<String>,
    connect_timeout: Duration,
    connection: Option<Connection>,
    /// Frames of a multipart message not yet handed out.
    pending: VecDeque<Vec<u8>>,
}

impl ZmqNotificationSource {
    /// Source for `tcp://host:port` subscribed to every topic in `topics`.
    ///
    /// Nothing is opened until the first receive. With no topics the socket
    /// receives nothing.
    pub fn new(host: &str, port: u16, topics: &[String], connect_timeout: Duration) -> Self {
        Self {
            endpoint: format!("tcp://{}:{}", host, port),
            topics: topics.to_vec(),
            connect_timeout,
            connection: None,
            pending: VecDeque::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn open(&self) -> Result<Connection, SourceError> {
        let mut socket = SubSocket::new();
        let events: Pin<Box<dyn Stream<Item = SocketEvent> + Send + Sync>> =
            Box::pin(socket.monitor());

        info!(endpoint = %self.endpoint, "Connecting to MISP ZeroMQ URL");
        match timeout(self.connect_timeout, socket.connect(&self.endpoint)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(SourceError::Transport(format!(
                    "Failed to connect to {}: {}",
                    self.endpoint, e
                )))
            }
            Err(_) => {
                return Err(SourceError::Transport(format!(
                    "Timed out connecting to {} after {} seconds",
                    self.endpoint,
                    self.connect_timeout.as_secs()
                )))
            }
        }

        for topic in &self.topics {
            info!(topic = %topic, "Subscribing to MISP ZeroMQ topic");
            socket.subscribe(topic).await.map_err(|e| {
                SourceError::Transport(format!("Failed to subscribe to topic {}: {}", topic, e))
            })?;
        }

        Ok(Connection { socket, events })
    }

    async fn disconnect(&mut self, reason: String) -> SourceError {
        warn!(endpoint = %self.endpoint, reason = %reason, "Lost MISP ZeroMQ publisher, reconnecting");
        if let Some(connection) = self.connection.take() {
            let _ = connection.socket.close().await;
        }
        SourceError::Transport(reason)
    }
}

#[async_trait]
impl NotificationSource for ZmqNotificationSource {
    fn describe(&self) -> String {
        self.endpoint.clone()
    }

    async fn recv(&mut self) -> Result<Vec<u8>, SourceError> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }

        if self.connection.is_none() {
            let connection = self.open().await.map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "MISP ZeroMQ publisher unavailable");
                e
            })?;
            info!(endpoint = %self.endpoint, "Connected to MISP ZeroMQ publisher");
            self.connection = Some(connection);
        }

        loop {
            let wake = {
                let Some(connection) = self.connection.as_mut() else {
                    return Err(SourceError::Closed);
                };
                tokio::select! {
                    received = connection.socket.recv() => Wake::Message(received),
                    event = connection.events.next() => Wake::Monitor(event),
                }
            };

            match wake {
                Wake::Message(Ok(message)) => {
                    // Every frame is a separate notification.
                    self.pending
                        .extend(message.into_vec().into_iter().map(|frame| frame.to_vec()));
                    if let Some(frame) = self.pending.pop_front() {
                        return Ok(frame);
                    }
                }
                Wake::Message(Err(e)) => return Err(self.disconnect(e.to_string()).await),
                Wake::Monitor(Some(SocketEvent::Disconnected(_))) => {
                    return Err(self.disconnect("publisher disconnected".to_string()).await)
                }
                Wake::Monitor(None) => {
                    return Err(self.disconnect("socket monitor closed".to_string()).await)
                }
                Wake::Monitor(Some(event)) => debug!(event = ?event, "ZeroMQ socket event"),
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), SourceError> {
        let this = *self;
        let Some(connection) = this.connection else {
            return Ok(());
        };

        debug!(endpoint = %this.endpoint, "Closing ZeroMQ MISP socket");
        let errors = connection.socket.close().await;
        if errors.is_empty() {
            debug!("ZeroMQ MISP socket closed");
            Ok(())
        } else {
            let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
            Err(SourceError::Transport(reasons.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_publisher_is_transient() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut source = ZmqNotificationSource::new(
            "127.0.0.1",
            port,
            &["misp_json".to_string()],
            Duration::from_millis(200),
        );
        assert!(!source.is_connected());

        let err = source.recv().await.unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
        assert!(!source.is_connected());

        Box::new(source).close().await.unwrap();
    }
}
