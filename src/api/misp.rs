//! MISP REST API client.
//!
//! # Responsibilities
//! - Build the HTTP client (API key, TLS verification, client certificate)
//! - Translate each supported operation's keyword arguments into a REST call
//! - Map HTTP failures into a result object carrying an `errors` list

use std::fs;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{json, Map, Value};
use url::Url;

use crate::api::{ApiArgs, ApiCatalog, ApiError, ApiMethod};
use crate::config::{ApiConfig, CertificateVerification};

/// Operations the MISP client exposes on the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MispOperation {
    NewEvent,
    GetEvent,
    UpdateEvent,
    DeleteEvent,
    Search,
    AddInternalComment,
    Tag,
    Untag,
    Sighting,
}

/// A fully-built REST call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiCall {
    fn get(path: impl Into<String>) -> Self {
        Self { method: Method::GET, path: path.into(), body: None }
    }

    fn post(path: impl Into<String>, body: Value) -> Self {
        Self { method: Method::POST, path: path.into(), body: Some(body) }
    }

    fn delete(path: impl Into<String>) -> Self {
        Self { method: Method::DELETE, path: path.into(), body: None }
    }
}

const NEW_EVENT_ARGS: &[&str] = &[
    "distribution",
    "threat_level_id",
    "analysis",
    "info",
    "date",
    "published",
    "orgc_id",
    "org_id",
    "sharing_group_id",
];

const INTERNAL_COMMENT_ARGS: &[&str] = &[
    "event",
    "reference",
    "category",
    "to_ids",
    "comment",
    "distribution",
    "proposal",
];

const SIGHTING_ARGS: &[&str] = &[
    "id", "uuid", "value", "values", "source", "type", "timestamp", "date", "time",
];

const SEARCH_CONTROLLERS: &[&str] = &["events", "attributes", "objects"];

impl MispOperation {
    pub const ALL: [MispOperation; 9] = [
        MispOperation::NewEvent,
        MispOperation::GetEvent,
        MispOperation::UpdateEvent,
        MispOperation::DeleteEvent,
        MispOperation::Search,
        MispOperation::AddInternalComment,
        MispOperation::Tag,
        MispOperation::Untag,
        MispOperation::Sighting,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MispOperation::NewEvent => "new_event",
            MispOperation::GetEvent => "get_event",
            MispOperation::UpdateEvent => "update_event",
            MispOperation::DeleteEvent => "delete_event",
            MispOperation::Search => "search",
            MispOperation::AddInternalComment => "add_internal_comment",
            MispOperation::Tag => "tag",
            MispOperation::Untag => "untag",
            MispOperation::Sighting => "sighting",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Translate keyword arguments into a REST call.
    pub fn build_call(self, args: &ApiArgs) -> Result<ApiCall, ApiError> {
        match self {
            MispOperation::NewEvent => {
                check_allowed(args, NEW_EVENT_ARGS)?;
                let event: Map<String, Value> = args
                    .iter()
                    .filter(|(_, value)| !value.is_null())
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Ok(ApiCall::post("events", json!({ "Event": event })))
            }
            MispOperation::GetEvent => {
                check_allowed(args, &["event_id"])?;
                let id = event_id(args, "event_id")?;
                Ok(ApiCall::get(format!("events/{}", id)))
            }
            MispOperation::UpdateEvent => {
                check_allowed(args, &["event_id", "event"])?;
                let id = event_id(args, "event_id")?;
                let event = match required(args, "event")? {
                    Value::Object(event) if event.contains_key("Event") => Value::Object(event.clone()),
                    Value::Object(event) => json!({ "Event": event }),
                    _ => return Err(invalid("event", "expected an object")),
                };
                Ok(ApiCall::post(format!("events/{}", id), event))
            }
            MispOperation::DeleteEvent => {
                check_allowed(args, &["event_id"])?;
                let id = event_id(args, "event_id")?;
                Ok(ApiCall::delete(format!("events/{}", id)))
            }
            MispOperation::Search => {
                let mut query = args.clone();
                let controller = match query.remove("controller") {
                    None => "events".to_string(),
                    Some(Value::String(c)) if SEARCH_CONTROLLERS.contains(&c.as_str()) => c,
                    Some(other) => {
                        return Err(invalid(
                            "controller",
                            &format!("expected one of {:?}, got {}", SEARCH_CONTROLLERS, other),
                        ))
                    }
                };
                Ok(ApiCall::post(
                    format!("{}/restSearch/download", controller),
                    json!({ "request": query }),
                ))
            }
            MispOperation::AddInternalComment => {
                check_allowed(args, INTERNAL_COMMENT_ARGS)?;
                let id = event_id(args, "event")?;
                let reference = required(args, "reference")?.clone();

                let mut attribute = Map::new();
                attribute.insert("type".into(), json!("comment"));
                attribute.insert(
                    "category".into(),
                    args.get("category").cloned().unwrap_or_else(|| json!("Internal reference")),
                );
                attribute.insert("value".into(), reference);
                attribute.insert(
                    "to_ids".into(),
                    args.get("to_ids").cloned().unwrap_or(Value::Bool(false)),
                );
                for optional in ["comment", "distribution"] {
                    if let Some(value) = args.get(optional).filter(|v| !v.is_null()) {
                        attribute.insert(optional.into(), value.clone());
                    }
                }

                let proposal = matches!(args.get("proposal"), Some(Value::Bool(true)));
                let path = if proposal {
                    format!("shadow_attributes/add/{}", id)
                } else {
                    format!("attributes/add/{}", id)
                };
                Ok(ApiCall::post(path, json!({ "Attribute": attribute })))
            }
            MispOperation::Tag | MispOperation::Untag => {
                check_allowed(args, &["uuid", "tag"])?;
                let uuid = required_str(args, "uuid")?;
                let tag = required_str(args, "tag")?;
                let path = if self == MispOperation::Tag {
                    "tags/attachTagToObject"
                } else {
                    "tags/removeTagFromObject"
                };
                Ok(ApiCall::post(path, json!({ "uuid": uuid, "tag": tag })))
            }
            MispOperation::Sighting => {
                check_allowed(args, SIGHTING_ARGS)?;
                if !["id", "uuid", "value", "values"].iter().any(|key| args.contains_key(*key)) {
                    return Err(ApiError::MissingArgument("one of id, uuid, value, values".into()));
                }
                Ok(ApiCall::post("sightings/add/", Value::Object(args.clone())))
            }
        }
    }
}

fn check_allowed(args: &ApiArgs, allowed: &[&str]) -> Result<(), ApiError> {
    match args.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(ApiError::UnexpectedArgument(key.clone())),
        None => Ok(()),
    }
}

fn required<'a>(args: &'a ApiArgs, name: &str) -> Result<&'a Value, ApiError> {
    args.get(name)
        .filter(|value| !value.is_null())
        .ok_or_else(|| ApiError::MissingArgument(name.to_string()))
}

fn required_str<'a>(args: &'a ApiArgs, name: &str) -> Result<&'a str, ApiError> {
    required(args, name)?
        .as_str()
        .ok_or_else(|| invalid(name, "expected a string"))
}

fn invalid(name: &str, reason: &str) -> ApiError {
    ApiError::InvalidArgument {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Extract an event id from a number, a digit string, or an event object.
fn event_id(args: &ApiArgs, name: &str) -> Result<String, ApiError> {
    fn from_value(value: &Value) -> Option<String> {
        match value {
            Value::Number(n) => n.as_u64().map(|id| id.to_string()),
            Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') => {
                Some(s.clone())
            }
            Value::Object(obj) => obj
                .get("Event")
                .and_then(|event| event.get("id"))
                .or_else(|| obj.get("id"))
                .and_then(from_value),
            _ => None,
        }
    }

    from_value(required(args, name)?).ok_or_else(|| invalid(name, "expected an event id or event object"))
}

/// Every certificate of a PEM bundle, in file order.
fn ca_bundle(pem: &[u8]) -> Result<Vec<reqwest::Certificate>, ApiError> {
    let ders = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::Configuration(format!("Invalid CA bundle: {}", e)))?;
    if ders.is_empty() {
        return Err(ApiError::Configuration("CA bundle contains no certificates".into()));
    }
    ders.iter()
        .map(|der| reqwest::Certificate::from_der(der.as_ref()).map_err(ApiError::from))
        .collect()
}

/// HTTP client for one MISP server.
pub struct MispClient {
    http: reqwest::Client,
    base_url: Url,
}

impl MispClient {
    /// Build a client from the API configuration.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let base_url: Url = format!("{}/", config.url.trim_end_matches('/'))
            .parse()
            .map_err(|e| ApiError::Configuration(format!("Invalid API URL '{}': {}", config.url, e)))?;

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| ApiError::Configuration("API key is not a valid header value".into()))?;
        key.set_sensitive(true);
        headers.insert(AUTHORIZATION, key);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("misp-fabric-bridge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs));

        builder = match &config.verify {
            CertificateVerification::Disabled => {
                tracing::warn!("MISP server certificate verification is disabled");
                builder.danger_accept_invalid_certs(true)
            }
            CertificateVerification::System => builder,
            CertificateVerification::Bundle(path) => {
                let pem = fs::read(path).map_err(|e| {
                    ApiError::Configuration(format!("Cannot read CA bundle {}: {}", path.display(), e))
                })?;
                ca_bundle(&pem)?
                    .into_iter()
                    .fold(builder, |builder, certificate| builder.add_root_certificate(certificate))
            }
        };

        if let Some(client_cert) = &config.client_certificate {
            let read = |path: &std::path::Path| {
                fs::read(path).map_err(|e| {
                    ApiError::Configuration(format!("Cannot read {}: {}", path.display(), e))
                })
            };
            let certificate = read(&client_cert.certificate)?;
            let key = match &client_cert.key {
                Some(path) => read(path)?,
                None => certificate.clone(),
            };
            builder = builder.identity(reqwest::Identity::from_pkcs8_pem(&certificate, &key)?);
        }

        tracing::info!(url = %base_url, "MISP API client configured");

        Ok(Self {
            http: builder.build()?,
            base_url,
        })
    }

    /// Run `operation` with keyword arguments.
    pub async fn execute(&self, operation: MispOperation, args: ApiArgs) -> Result<Value, ApiError> {
        let call = operation.build_call(&args)?;
        let url = self
            .base_url
            .join(&call.path)
            .map_err(|e| ApiError::Configuration(format!("Invalid API path '{}': {}", call.path, e)))?;

        tracing::debug!(operation = operation.name(), method = %call.method, url = %url, "Calling MISP API");

        let mut request = self.http.request(call.method, url);
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Option<Value> = if text.trim().is_empty() {
            Some(Value::Null)
        } else {
            serde_json::from_str(&text).ok()
        };

        if status.is_success() {
            return body.ok_or_else(|| ApiError::Failed(format!("Unknown error: {}", text)));
        }

        tracing::warn!(operation = operation.name(), status = %status, "MISP API call failed");

        // Keep error objects the server already produced.
        match body {
            Some(Value::Object(obj)) if obj.contains_key("errors") => Ok(Value::Object(obj)),
            _ => Ok(json!({ "errors": [format!("{}: {}", status, text.trim())] })),
        }
    }

    /// Catalog exposing every [`MispOperation`] of this client.
    pub fn catalog(self: &Arc<Self>) -> ApiCatalog {
        let mut catalog = ApiCatalog::new();
        for operation in MispOperation::ALL {
            catalog.insert(Arc::new(MispMethod {
                client: Arc::clone(self),
                operation,
            }));
        }
        catalog
    }
}

impl std::fmt::Debug for MispClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MispClient")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

struct MispMethod {
    client: Arc<MispClient>,
    operation: MispOperation,
}

#[async_trait]
impl ApiMethod for MispMethod {
    fn name(&self) -> &str {
        self.operation.name()
    }

    async fn call(&self, args: ApiArgs) -> Result<Value, ApiError> {
        self.client.execute(self.operation, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> ApiArgs {
        match value {
            Value::Object(map) => map,
            _ => panic!("args must be an object"),
        }
    }

    fn test_config() -> ApiConfig {
        ApiConfig {
            url: "https://misp.local:8443".to_string(),
            api_key: "secret".to_string(),
            verify: CertificateVerification::System,
            client_certificate: None,
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in MispOperation::ALL {
            assert_eq!(MispOperation::from_name(op.name()), Some(op));
        }
        assert_eq!(MispOperation::from_name("freetext"), None);
    }

    #[test]
    fn test_new_event_call() {
        let call = MispOperation::NewEvent
            .build_call(&args(json!({
                "distribution": 3,
                "info": "OpenDXL MISP new event example",
                "analysis": 1,
                "threat_level_id": 3,
                "date": null
            })))
            .unwrap();
        assert_eq!(call.method, Method::POST);
        assert_eq!(call.path, "events");
        assert_eq!(
            call.body.unwrap(),
            json!({"Event": {
                "distribution": 3,
                "info": "OpenDXL MISP new event example",
                "analysis": 1,
                "threat_level_id": 3
            }})
        );
    }

    #[test]
    fn test_unexpected_argument() {
        let err = MispOperation::NewEvent
            .build_call(&args(json!({"bogus": 1})))
            .unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedArgument(ref key) if key == "bogus"));
    }

    #[test]
    fn test_internal_comment_call() {
        let call = MispOperation::AddInternalComment
            .build_call(&args(json!({
                "event": 42,
                "reference": "Added by example",
                "comment": "This is only a test"
            })))
            .unwrap();
        assert_eq!(call.path, "attributes/add/42");
        let attribute = &call.body.unwrap()["Attribute"];
        assert_eq!(attribute["type"], "comment");
        assert_eq!(attribute["category"], "Internal reference");
        assert_eq!(attribute["value"], "Added by example");
        assert_eq!(attribute["comment"], "This is only a test");
        assert_eq!(attribute["to_ids"], false);
    }

    #[test]
    fn test_event_id_forms() {
        let from_object = MispOperation::GetEvent
            .build_call(&args(json!({"event_id": {"Event": {"id": "7"}}})))
            .unwrap();
        assert_eq!(from_object.path, "events/7");

        let err = MispOperation::DeleteEvent
            .build_call(&args(json!({"event_id": "../admin"})))
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument { .. }));

        let err = MispOperation::GetEvent.build_call(&ApiArgs::new()).unwrap_err();
        assert!(matches!(err, ApiError::MissingArgument(_)));
    }

    #[test]
    fn test_search_controller() {
        let call = MispOperation::Search
            .build_call(&args(json!({"eventid": 12})))
            .unwrap();
        assert_eq!(call.path, "events/restSearch/download");
        assert_eq!(call.body.unwrap(), json!({"request": {"eventid": 12}}));

        let call = MispOperation::Search
            .build_call(&args(json!({"controller": "attributes", "value": "1.2.3.4"})))
            .unwrap();
        assert_eq!(call.path, "attributes/restSearch/download");
        assert_eq!(call.body.unwrap(), json!({"request": {"value": "1.2.3.4"}}));

        assert!(MispOperation::Search
            .build_call(&args(json!({"controller": "users"})))
            .is_err());
    }

    #[test]
    fn test_tag_and_sighting_calls() {
        let call = MispOperation::Untag
            .build_call(&args(json!({"uuid": "abc", "tag": "tlp:white"})))
            .unwrap();
        assert_eq!(call.path, "tags/removeTagFromObject");

        let call = MispOperation::Sighting
            .build_call(&args(json!({"uuid": "abc", "type": "0", "source": "example"})))
            .unwrap();
        assert_eq!(call.path, "sightings/add/");

        assert!(MispOperation::Sighting
            .build_call(&args(json!({"source": "example"})))
            .is_err());
    }

    #[test]
    fn test_client_catalog() {
        let client = Arc::new(MispClient::new(&test_config()).unwrap());
        let catalog = client.catalog();
        assert_eq!(catalog.len(), MispOperation::ALL.len());
        assert!(catalog.resolve("new_event").is_some());
        assert!(catalog.resolve("__init__").is_none());
    }

    #[test]
    fn test_missing_bundle_file() {
        let mut config = test_config();
        config.verify = CertificateVerification::Bundle("/nonexistent/ca.pem".into());
        let err = MispClient::new(&config).unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }

    const CA_BUNDLE: &[u8] = include_bytes!("../../tests/fixtures/ca-bundle.pem");

    #[test]
    fn test_ca_bundle_keeps_every_certificate() {
        assert_eq!(ca_bundle(CA_BUNDLE).unwrap().len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca-bundle.pem");
        fs::write(&path, CA_BUNDLE).unwrap();

        let mut config = test_config();
        config.verify = CertificateVerification::Bundle(path);
        assert!(MispClient::new(&config).is_ok());
    }

    #[test]
    fn test_ca_bundle_without_certificates() {
        let err = ca_bundle(b"not a certificate\n").unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }
}
