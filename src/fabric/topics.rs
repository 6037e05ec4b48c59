//! Fabric topic naming.
//!
//! Request topic: `/opendxl-misp/service/misp-api[/<unique id>]/<api method>`
//! Event topic:   `/opendxl-misp/event/zeromq-notifications[/<unique id>]/<notification topic>`

/// Base name shared by every service and event topic.
pub const SERVICE_BASE_NAME: &str = "/opendxl-misp";

/// Service type under which the MISP API requests are registered.
pub const SERVICE_TYPE: &str = "/opendxl-misp/service/misp-api";

/// Prefix of events forwarded from ZeroMQ notifications.
pub const NOTIFICATION_EVENT_TOPIC: &str = "/opendxl-misp/event/zeromq-notifications";

/// Join `base`, the optional unique id and `leaf` with `/`.
///
/// An unset or empty unique id adds no segment at all.
pub fn scoped_topic(base: &str, unique_id: Option<&str>, leaf: &str) -> String {
    match unique_id {
        Some(id) if !id.is_empty() => format!("{}/{}/{}", base, id, leaf),
        _ => format!("{}/{}", base, leaf),
    }
}

/// Topic on which requests for `api_name` are served.
pub fn request_topic(unique_id: Option<&str>, api_name: &str) -> String {
    scoped_topic(SERVICE_TYPE, unique_id, api_name)
}

/// Topic on which a notification with `notification_topic` is republished.
pub fn event_topic(unique_id: Option<&str>, notification_topic: &str) -> String {
    scoped_topic(NOTIFICATION_EVENT_TOPIC, unique_id, notification_topic)
}
