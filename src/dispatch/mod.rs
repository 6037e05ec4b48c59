//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     api_names → registration.rs (resolve against the API catalog)
//!               → ServiceRegistration (one RequestDispatcher per topic)
//!
//! Per request:
//!     Request payload (JSON object | empty)
//!         → dispatcher.rs (decode, coerce `event`, invoke method)
//!         → Fabric::send_response | Fabric::send_error_response
//! ```
//!
//! # Design Decisions
//! - Dispatchers hold no mutable state; concurrent requests never interfere
//! - A failing or panicking method yields an error response, never a lost request

pub mod dispatcher;
pub mod registration;

pub use dispatcher::{DispatchError, RequestDispatcher};
pub use registration::{build_registration, resolve_bindings, RequestBinding};
