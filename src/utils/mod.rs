//! # Utility Modules
//!
//! Supporting pieces around the bridge loop.
//!
//! ## Components
//! - **Clock**: host time source for `TIME:` replies, local or UTC
//! - **Logging**: `tracing-subscriber` setup from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: per-session outcome counters

pub mod clock;
pub mod logging;
pub mod metrics;

pub use clock::{Clock, ClockMode, HostClock};
