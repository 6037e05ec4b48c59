//! Request handling for one bound API method.
//!
//! # Responsibilities
//! - Decode the JSON payload into keyword arguments
//! - Coerce the `event` identifier from a digit string to an integer
//! - Invoke the bound method and turn its result or failure into a response
//! - Send exactly one response per request

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{Number, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::api::{ApiArgs, ApiError, ApiMethod};
use crate::fabric::{Fabric, Request, RequestHandler, Response};
use crate::observability::metrics;

/// Argument holding a platform event identifier.
pub const EVENT_ID_FIELD: &str = "event";

/// Errors raised while handling one request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid JSON payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Request payload must be a JSON object")]
    NotAnObject,

    #[error("Invalid value for {field}: {value}")]
    Coercion { field: String, value: String },

    /// The method raised; the message is the error's own text.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// The method returned a result with a non-empty `errors` collection.
    #[error("{0}")]
    Rejected(String),

    #[error("API method panicked: {0}")]
    Panicked(String),

    #[error("Failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decode a request payload into keyword arguments. Empty means no arguments.
pub fn decode_args(payload: &[u8]) -> Result<ApiArgs, DispatchError> {
    if payload.is_empty() {
        return Ok(ApiArgs::new());
    }
    match serde_json::from_slice(payload).map_err(DispatchError::Decode)? {
        Value::Object(args) => Ok(args),
        _ => Err(DispatchError::NotAnObject),
    }
}

/// Convert a decimal-digit string under [`EVENT_ID_FIELD`] into an integer.
///
/// No other argument is touched.
pub fn coerce_event_id(args: &mut ApiArgs) -> Result<(), DispatchError> {
    let digits = match args.get(EVENT_ID_FIELD) {
        Some(Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.clone(),
        _ => return Ok(()),
    };

    let id: u64 = digits.parse().map_err(|_| DispatchError::Coercion {
        field: EVENT_ID_FIELD.to_string(),
        value: digits.clone(),
    })?;
    args.insert(EVENT_ID_FIELD.to_string(), Value::Number(Number::from(id)));
    Ok(())
}

/// Message of the first entry of a non-empty `errors` collection, if any.
pub fn reported_error(result: &Value) -> Option<String> {
    let errors = result.as_object()?.get("errors")?;
    let first = match errors {
        Value::Array(items) => items.first()?,
        Value::Object(map) => map.values().next()?,
        Value::String(s) if s.is_empty() => return None,
        Value::Null | Value::Bool(false) => return None,
        other => other,
    };
    Some(match first {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Serves requests for one API method.
pub struct RequestDispatcher {
    topic: String,
    method: Arc<dyn ApiMethod>,
}

impl RequestDispatcher {
    pub fn new(topic: impl Into<String>, method: Arc<dyn ApiMethod>) -> Self {
        Self {
            topic: topic.into(),
            method,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn method_name(&self) -> &str {
        self.method.name()
    }

    /// Turn a request into its response. Never fails.
    pub async fn handle(&self, request: &Request) -> Response {
        let request_id = request.message_id;
        match self.process(&request.payload).await {
            Ok(payload) => Response::Success { request_id, payload },
            Err(e) => {
                error!(
                    topic = %request.destination_topic,
                    api = self.method.name(),
                    error = %e,
                    "Error handling request"
                );
                Response::Error {
                    request_id,
                    message: e.to_string(),
                }
            }
        }
    }

    async fn process(&self, payload: &[u8]) -> Result<Vec<u8>, DispatchError> {
        let mut args = decode_args(payload)?;
        coerce_event_id(&mut args)?;

        let result = AssertUnwindSafe(self.method.call(args))
            .catch_unwind()
            .await
            .map_err(|panic| DispatchError::Panicked(panic_message(panic.as_ref())))??;

        if let Some(message) = reported_error(&result) {
            return Err(DispatchError::Rejected(message));
        }
        serde_json::to_vec(&result).map_err(DispatchError::Encode)
    }
}

#[async_trait]
impl RequestHandler for RequestDispatcher {
    async fn on_request(&self, request: Request, fabric: &dyn Fabric) {
        let start = Instant::now();
        info!(topic = %request.destination_topic, "Request received");
        debug!(
            topic = %request.destination_topic,
            payload = %String::from_utf8_lossy(&request.payload),
            "Request payload"
        );

        let response = self.handle(&request).await;
        let sent = match response {
            Response::Success { payload, .. } => {
                metrics::record_request(self.method.name(), "success", start);
                fabric.send_response(&request, payload).await
            }
            Response::Error { message, .. } => {
                metrics::record_request(self.method.name(), "error", start);
                fabric.send_error_response(&request, message).await
            }
        };

        if let Err(e) = sent {
            error!(topic = %request.destination_topic, error = %e, "Failed to send response");
        }
    }
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("topic", &self.topic)
            .field("method", &self.method.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FnMethod;
    use serde_json::json;
    use std::sync::Mutex;

    fn dispatcher<F, Fut>(f: F) -> RequestDispatcher
    where
        F: Fn(ApiArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        RequestDispatcher::new("/svc/test", Arc::new(FnMethod::new("test", f)))
    }

    fn success_json(response: Response) -> Value {
        match response {
            Response::Success { payload, .. } => serde_json::from_slice(&payload).unwrap(),
            Response::Error { message, .. } => panic!("unexpected error response: {}", message),
        }
    }

    fn error_message(response: Response) -> String {
        match response {
            Response::Error { message, .. } => message,
            Response::Success { .. } => panic!("expected an error response"),
        }
    }

    #[tokio::test]
    async fn test_event_id_is_coerced() {
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let dispatcher = dispatcher(move |args| {
            *captured.lock().unwrap() = Some(args.clone());
            async move { Ok(json!({"ok": true})) }
        });

        let response = dispatcher
            .handle(&Request::new("/svc/test", r#"{"event": "42", "value": "7"}"#))
            .await;
        assert_eq!(success_json(response), json!({"ok": true}));

        let args = seen.lock().unwrap().clone().unwrap();
        assert_eq!(args["event"], json!(42));
        assert!(args["event"].is_u64());
        assert_eq!(args["value"], json!("7"));
    }

    #[test]
    fn test_non_digit_event_is_untouched() {
        let mut args = decode_args(br#"{"event": "4a2"}"#).unwrap();
        coerce_event_id(&mut args).unwrap();
        assert_eq!(args["event"], json!("4a2"));

        let mut args = decode_args(br#"{"event": ""}"#).unwrap();
        coerce_event_id(&mut args).unwrap();
        assert_eq!(args["event"], json!(""));

        let mut args = decode_args(br#"{"event": 5}"#).unwrap();
        coerce_event_id(&mut args).unwrap();
        assert_eq!(args["event"], json!(5));
    }

    #[test]
    fn test_oversized_event_id() {
        let mut args = decode_args(br#"{"event": "99999999999999999999999"}"#).unwrap();
        assert!(matches!(
            coerce_event_id(&mut args),
            Err(DispatchError::Coercion { .. })
        ));
    }

    #[tokio::test]
    async fn test_raised_error_is_surfaced() {
        let dispatcher = dispatcher(|args| async move {
            if args.contains_key("explode") {
                Err(ApiError::Failed("boom".into()))
            } else {
                Ok(json!({"Event": {"id": "1"}}))
            }
        });

        let response = dispatcher
            .handle(&Request::new("/svc/test", r#"{"explode": true}"#))
            .await;
        assert_eq!(error_message(response), "boom");

        let response = dispatcher.handle(&Request::new("/svc/test", "{}")).await;
        assert_eq!(success_json(response), json!({"Event": {"id": "1"}}));
    }

    #[tokio::test]
    async fn test_errors_collection_is_surfaced() {
        let dispatcher = dispatcher(|_| async {
            Ok(json!({"errors": ["Invalid event id", "second"]}))
        });
        let response = dispatcher.handle(&Request::new("/svc/test", "")).await;
        assert_eq!(error_message(response), "Invalid event id");

        let dispatcher = dispatcher_with_empty_errors();
        let response = dispatcher.handle(&Request::new("/svc/test", "")).await;
        assert_eq!(success_json(response), json!({"errors": [], "id": 3}));
    }

    fn dispatcher_with_empty_errors() -> RequestDispatcher {
        dispatcher(|_| async { Ok(json!({"errors": [], "id": 3})) })
    }

    #[test]
    fn test_reported_error_shapes() {
        assert_eq!(
            reported_error(&json!({"errors": [[403, {"message": "denied"}]]})).unwrap(),
            r#"[403,{"message":"denied"}]"#
        );
        assert_eq!(reported_error(&json!({"errors": "plain"})).unwrap(), "plain");
        assert!(reported_error(&json!({"errors": null})).is_none());
        assert!(reported_error(&json!([{"errors": ["x"]}])).is_none());
    }

    #[tokio::test]
    async fn test_invalid_payloads() {
        let dispatcher = dispatcher(|_| async { Ok(Value::Null) });

        let message = error_message(dispatcher.handle(&Request::new("/svc/test", "{not json")).await);
        assert!(message.starts_with("Invalid JSON payload"));

        let message = error_message(dispatcher.handle(&Request::new("/svc/test", "[1, 2]")).await);
        assert_eq!(message, "Request payload must be a JSON object");
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let dispatcher = dispatcher(|args| async move {
            if args.is_empty() {
                panic!("bad state");
            }
            Ok(json!(1))
        });

        let message = error_message(dispatcher.handle(&Request::new("/svc/test", "")).await);
        assert_eq!(message, "API method panicked: bad state");

        let response = dispatcher.handle(&Request::new("/svc/test", r#"{"a": 1}"#)).await;
        assert_eq!(success_json(response), json!(1));
    }
}
