//! Notification bridge subsystem.
//!
//! # Data Flow
//! ```text
//! MISP ZeroMQ publisher
//!     → zmq.rs (SUB socket, topic subscriptions)
//!     → poller.rs (worker: wait on source + shutdown sentinel)
//!     → message.rs (split "<topic> <payload>" at the first space)
//!     → Fabric::publish_event(<event base>[/<unique id>]/<topic>)
//! ```
//!
//! # Design Decisions
//! - One worker per bridge; frames are forwarded strictly in receipt order
//! - Shutdown wakes the worker through a sentinel channel, then joins it
//! - Malformed frames and transport errors never stop the worker
//! - The ZeroMQ socket is opened by the worker and reopened after the
//!   publisher goes away

pub mod message;
pub mod poller;
pub mod source;
pub mod zmq;

pub use message::BridgeMessage;
pub use poller::{BridgeState, NotificationBridge};
pub use source::{memory_channel, MemoryPublisher, MemorySource, NotificationSource, SourceError, TopicFilter};
pub use zmq::ZmqNotificationSource;
