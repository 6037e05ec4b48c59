//! HTTP gateway onto the local fabric.
//!
//! # Endpoints
//! - `GET /gateway/status`: service and bridge status
//! - `POST /gateway/request/{*topic}`: send the body as a request to `/{topic}`
//!
//! Every endpoint requires `Authorization: Bearer <gateway.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::fabric::LocalFabric;
use crate::lifecycle::MispService;

use self::auth::gateway_auth_middleware;
use self::handlers::{get_status, post_request};

/// Shared state of the gateway handlers.
#[derive(Clone)]
pub struct AppState {
    pub fabric: Arc<LocalFabric>,
    pub service: Arc<MispService>,
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(fabric: Arc<LocalFabric>, service: Arc<MispService>, api_key: &str) -> Self {
        Self {
            fabric,
            service,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_gateway_router(state: AppState) -> Router {
    Router::new()
        .route("/gateway/status", get(get_status))
        .route("/gateway/request/{*topic}", post(post_request))
        .layer(middleware::from_fn_with_state(state.clone(), gateway_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
