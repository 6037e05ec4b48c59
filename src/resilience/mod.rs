//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Transient notification poll error:
//!     → backoff.rs (exponential delay with jitter)
//!     → wait, interruptible by the shutdown sentinel
//!     → poll again
//! ```

pub mod backoff;
