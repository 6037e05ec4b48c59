//! Binding configured API names to request topics.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{ApiCatalog, ApiMethod};
use crate::dispatch::RequestDispatcher;
use crate::fabric::topics::{request_topic, SERVICE_TYPE};
use crate::fabric::ServiceRegistration;

/// A request topic and the method serving it.
#[derive(Clone)]
pub struct RequestBinding {
    pub topic: String,
    pub method: Arc<dyn ApiMethod>,
}

impl std::fmt::Debug for RequestBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBinding")
            .field("topic", &self.topic)
            .field("method", &self.method.name())
            .finish()
    }
}

/// Resolve each configured name against `catalog`, in configuration order.
///
/// Names the catalog does not know are logged and skipped.
pub fn resolve_bindings(
    catalog: &ApiCatalog,
    api_names: &[String],
    unique_id: Option<&str>,
) -> Vec<RequestBinding> {
    api_names
        .iter()
        .filter_map(|name| match catalog.resolve(name) {
            Some(method) => Some(RequestBinding {
                topic: request_topic(unique_id, name),
                method,
            }),
            None => {
                warn!(api = %name, "MISP API name is invalid");
                None
            }
        })
        .collect()
}

/// Name under which a request handler is logged, e.g. `misp_east_search_requesthandler`.
pub fn handler_name(unique_id: Option<&str>, api_name: &str) -> String {
    match unique_id {
        Some(id) if !id.is_empty() => format!("misp_{}_{}_requesthandler", id, api_name),
        _ => format!("misp_{}_requesthandler", api_name),
    }
}

/// Build the service registration for `bindings`. `None` when there is nothing to serve.
pub fn build_registration(
    bindings: Vec<RequestBinding>,
    unique_id: Option<&str>,
) -> Option<ServiceRegistration> {
    if bindings.is_empty() {
        return None;
    }

    info!(service_type = SERVICE_TYPE, "Registering service: misp_service");
    let mut registration = ServiceRegistration::new(SERVICE_TYPE);
    for binding in bindings {
        info!(
            handler = %handler_name(unique_id, binding.method.name()),
            topic = %binding.topic,
            "Registering request callback"
        );
        let dispatcher = RequestDispatcher::new(binding.topic.clone(), binding.method);
        registration.add_request_handler(binding.topic, Arc::new(dispatcher));
    }
    Some(registration)
}
