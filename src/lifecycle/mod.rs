//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     ServiceConfig → API client → notification bridge → service registration
//!
//! Shutdown (startup.rs, shutdown.rs):
//!     Signal received → unregister service → wake bridge worker (sentinel)
//!                     → join worker → close upstream socket
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: a failing step releases what earlier steps acquired
//! - Shutdown runs once under a lock; later calls return immediately

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{MispService, ServiceStatus, StartupError};
