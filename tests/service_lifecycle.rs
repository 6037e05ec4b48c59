//! End-to-end service tests on the in-process fabric.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use misp_fabric_bridge::api::{ApiCatalog, ApiError};
use misp_fabric_bridge::bridge::{memory_channel, BridgeState};
use misp_fabric_bridge::config::load_config;
use misp_fabric_bridge::fabric::{FabricError, LocalFabric, Response};
use misp_fabric_bridge::lifecycle::MispService;
use serde_json::{json, Value};

mod common;

fn catalog(calls: Arc<AtomicUsize>) -> ApiCatalog {
    ApiCatalog::new()
        .with_fn("get_event", move |args| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                match args.get("event") {
                    Some(Value::Number(id)) => Ok(json!({"Event": {"id": id}})),
                    Some(other) => Err(ApiError::Failed(format!("Invalid event id: {}", other))),
                    None => Err(ApiError::MissingArgument("event".into())),
                }
            }
        })
        .with_fn("tag", |_| async { Ok(json!({"errors": [[403, {"message": "denied"}]]})) })
}

fn success(response: Response) -> Value {
    match response {
        Response::Success { payload, .. } => serde_json::from_slice(&payload).unwrap(),
        Response::Error { message, .. } => panic!("unexpected error: {}", message),
    }
}

fn failure(response: Response) -> String {
    match response {
        Response::Error { message, .. } => message,
        Response::Success { payload, .. } => {
            panic!("unexpected success: {}", String::from_utf8_lossy(&payload))
        }
    }
}

#[tokio::test]
async fn test_service_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[general]
service_unique_id = "east"
host = "misp.local"
api_names = "get_event, tag, nonexistent"
api_key = "secret"
"#
    )
    .unwrap();
    let config = load_config(file.path()).unwrap();
    assert!(config.notifications.is_none());

    let calls = Arc::new(AtomicUsize::new(0));
    let fabric = Arc::new(LocalFabric::new());
    let service = MispService::start_with(&config, fabric.clone(), Some(catalog(calls.clone())), None)
        .await
        .unwrap();

    assert_eq!(
        fabric.registered_topics(),
        vec![
            "/opendxl-misp/service/misp-api/east/get_event".to_string(),
            "/opendxl-misp/service/misp-api/east/tag".to_string(),
        ]
    );

    let response = fabric
        .request("/opendxl-misp/service/misp-api/east/get_event", r#"{"event": "42"}"#)
        .await
        .unwrap();
    assert_eq!(success(response), json!({"Event": {"id": 42}}));

    let response = fabric
        .request("/opendxl-misp/service/misp-api/east/get_event", r#"{"event": "x1"}"#)
        .await
        .unwrap();
    assert_eq!(failure(response), "Invalid event id: \"x1\"");

    let response = fabric
        .request("/opendxl-misp/service/misp-api/east/get_event", "")
        .await
        .unwrap();
    assert_eq!(failure(response), "Missing required argument: event");

    let response = fabric
        .request("/opendxl-misp/service/misp-api/east/tag", "{}")
        .await
        .unwrap();
    assert_eq!(failure(response), r#"[403,{"message":"denied"}]"#);

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    service.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fabric = Arc::new(LocalFabric::new());
    let service = MispService::start_with(
        &common::base_config(&["get_event"], None),
        fabric.clone(),
        Some(catalog(calls.clone())),
        None,
    )
    .await
    .unwrap();

    let mut tasks = Vec::new();
    for i in 0..16u64 {
        let fabric = fabric.clone();
        tasks.push(tokio::spawn(async move {
            let payload = if i % 2 == 0 {
                format!(r#"{{"event": "{}"}}"#, i)
            } else {
                format!(r#"{{"event": "bad{}"}}"#, i)
            };
            let response = fabric
                .request("/opendxl-misp/service/misp-api/get_event", payload)
                .await
                .unwrap();
            (i, response)
        }));
    }

    for task in tasks {
        let (i, response) = task.await.unwrap();
        if i % 2 == 0 {
            assert_eq!(success(response), json!({"Event": {"id": i}}));
        } else {
            assert_eq!(failure(response), format!("Invalid event id: \"bad{}\"", i));
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 16);
    service.shutdown().await;
}

#[tokio::test]
async fn test_bridge_and_requests_shut_down_together() {
    let fabric = Arc::new(LocalFabric::new());
    let mut events = fabric.subscribe_events();
    let (publisher, source) = memory_channel(&["misp_json_event", "misp_json_sighting"]);

    let service = Arc::new(
        MispService::start_with(
            &common::base_config(&["get_event"], Some("abc")),
            fabric.clone(),
            Some(catalog(Arc::new(AtomicUsize::new(0)))),
            Some(Box::new(source)),
        )
        .await
        .unwrap(),
    );

    assert!(publisher.publish("misp_json_event {\"Event\": {}}"));
    assert!(publisher.publish("misp_zmq_status {}"));
    assert!(publisher.publish("misp_json_sighting"));

    let event = common::next_event(&mut events, 2).await;
    assert_eq!(event.topic, "/opendxl-misp/event/zeromq-notifications/abc/misp_json_event");
    assert_eq!(event.payload, b"{\"Event\": {}}");

    let event = common::next_event(&mut events, 2).await;
    assert_eq!(event.topic, "/opendxl-misp/event/zeromq-notifications/abc/misp_json_sighting");
    assert!(event.payload.is_empty());

    let shutdowns: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.shutdown().await })
        })
        .collect();
    for handle in shutdowns {
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    assert!(service.is_stopped());
    assert_eq!(service.bridge().unwrap().state(), BridgeState::Destroyed);
    assert!(matches!(
        fabric.request("/opendxl-misp/service/misp-api/abc/get_event", "").await,
        Err(FabricError::NoHandler(_))
    ));

    // The upstream source is closed once the bridge is gone.
    assert!(!publisher.publish("misp_json_event {}"));
}
