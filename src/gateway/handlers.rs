use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::fabric::{FabricError, Response as FabricResponse};
use crate::gateway::AppState;
use crate::lifecycle::ServiceStatus;

#[derive(Serialize)]
pub struct GatewayStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub service: ServiceStatus,
    pub registered_topics: Vec<String>,
    pub events_published: u64,
}

pub async fn get_status(State(state): State<AppState>) -> Json<GatewayStatus> {
    let service = state.service.status();
    Json(GatewayStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if service.stopped { "stopped" } else { "operational" },
        service,
        registered_topics: state.fabric.registered_topics(),
        events_published: state.fabric.events_published(),
    })
}

/// Forward the body as a fabric request and relay the response.
///
/// Success bodies are returned as-is; error responses become
/// `422 {"error": <message>}`.
pub async fn post_request(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    body: Bytes,
) -> Response {
    let topic = format!("/{}", topic.trim_start_matches('/'));

    match state.fabric.request(&topic, body.to_vec()).await {
        Ok(FabricResponse::Success { payload, .. }) => {
            (StatusCode::OK, [(CONTENT_TYPE, "application/json")], payload).into_response()
        }
        Ok(FabricResponse::Error { message, .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": message }))).into_response()
        }
        Err(e) => {
            let status = match e {
                FabricError::NoHandler(_) => StatusCode::NOT_FOUND,
                FabricError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiCatalog;
    use crate::config::{GatewayConfig, ObservabilityConfig, ServiceConfig};
    use crate::fabric::LocalFabric;
    use crate::gateway::setup_gateway_router;
    use crate::lifecycle::MispService;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> (axum::Router, Arc<MispService>) {
        let fabric = Arc::new(LocalFabric::new());
        let config = ServiceConfig {
            service_unique_id: None,
            host: "misp.local".into(),
            api_names: vec!["get_event".into()],
            api: None,
            notifications: None,
            observability: ObservabilityConfig::default(),
            gateway: GatewayConfig::default(),
        };
        let catalog = ApiCatalog::new().with_fn("get_event", |args| async move {
            Ok(json!({ "Event": { "id": args.get("event").cloned() } }))
        });
        let service = Arc::new(
            MispService::start_with(&config, fabric.clone(), Some(catalog), None)
                .await
                .unwrap(),
        );
        let state = AppState::new(fabric, service.clone(), "secret");
        (setup_gateway_router(state), service)
    }

    fn post(uri: &str, key: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", format!("Bearer {}", key))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_is_forwarded() {
        let (app, _service) = app().await;
        let response = app
            .oneshot(post("/gateway/request/opendxl-misp/service/misp-api/get_event", "secret", r#"{"event": "12"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "Event": { "id": 12 } }));
    }

    #[tokio::test]
    async fn test_unknown_topic_and_bad_key() {
        let (app, _service) = app().await;
        let response = app
            .clone()
            .oneshot(post("/gateway/request/nowhere", "secret", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(post("/gateway/request/nowhere", "wrong", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_status_reports_topics() {
        let (app, service) = app().await;
        let request = Request::builder()
            .uri("/gateway/status")
            .header("Authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "operational");
        assert_eq!(
            value["registered_topics"],
            json!(["/opendxl-misp/service/misp-api/get_event"])
        );
        service.shutdown().await;
    }
}
