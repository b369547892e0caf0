//! Host clock used to answer device `TIME:` requests.
//!
//! The device has no RTC and takes whatever epoch the host sends as "now".
//! Two readings are supported and must be chosen explicitly:
//!
//! - [`ClockMode::Utc`]: POSIX seconds since 1970-01-01T00:00:00Z.
//! - [`ClockMode::Local`]: seconds since the epoch as read off the host's local
//!   wall clock, i.e. UTC shifted by the current timezone offset.
//!
//! A mismatch between the mode the host uses and the one the device firmware
//! assumes shifts every device timestamp by the host's UTC offset.

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which wall clock the host reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    Local,
    #[default]
    Utc,
}

impl fmt::Display for ClockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockMode::Local => f.write_str("local"),
            ClockMode::Utc => f.write_str("utc"),
        }
    }
}

impl FromStr for ClockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(ClockMode::Local),
            "utc" => Ok(ClockMode::Utc),
            other => Err(format!("Invalid clock mode: {other} (expected 'local' or 'utc')")),
        }
    }
}

/// Source of "now" in epoch seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Clock backed by the host's system time
#[derive(Debug, Clone, Copy, Default)]
pub struct HostClock {
    mode: ClockMode,
}

impl HostClock {
    pub fn new(mode: ClockMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }
}

impl Clock for HostClock {
    fn now(&self) -> i64 {
        match self.mode {
            ClockMode::Utc => Utc::now().timestamp(),
            ClockMode::Local => Local::now().naive_local().and_utc().timestamp(),
        }
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> i64 {
        (**self).now()
    }
}
