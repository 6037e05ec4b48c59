//! Messages exchanged over the fabric.

use uuid::Uuid;

/// An inbound request addressed to a registered service topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Unique id used to correlate the response.
    pub message_id: Uuid,

    /// Topic the request was sent to.
    pub destination_topic: String,

    /// Raw request body (JSON text, possibly empty).
    pub payload: Vec<u8>,
}

impl Request {
    pub fn new(destination_topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            destination_topic: destination_topic.into(),
            payload: payload.into(),
        }
    }
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Successful call; `payload` is the JSON-encoded result.
    Success { request_id: Uuid, payload: Vec<u8> },

    /// Failed call with a human-readable message.
    Error { request_id: Uuid, message: String },
}

impl Response {
    /// Id of the request this response answers.
    pub fn request_id(&self) -> Uuid {
        match self {
            Response::Success { request_id, .. } | Response::Error { request_id, .. } => {
                *request_id
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}
