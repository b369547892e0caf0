//! Bridge Metrics
//!
//! Per-outcome counters for one bridge session, logged as a summary when the
//! session ends.
//!
//! Uses atomic counters so a snapshot can be taken from another task while the
//! loop runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Counters for one bridge session
#[derive(Debug)]
pub struct Metrics {
    /// Lines read from the transport, including overlong ones
    pub lines_received: AtomicU64,
    /// Lines dropped for exceeding the length limit
    pub lines_overlong: AtomicU64,
    /// Bytes read, terminators excluded
    pub bytes_received: AtomicU64,
    /// `TIME:` requests answered
    pub time_requests: AtomicU64,
    /// Frames decoded into a value
    pub frames_decoded: AtomicU64,
    /// Frame lines rejected by hex, codec or schema checks
    pub frames_malformed: AtomicU64,
    /// Key registrations that verified
    pub registrations_valid: AtomicU64,
    /// Key registrations that did not verify
    pub registrations_invalid: AtomicU64,
    /// Non-registration frames, reported without verification
    pub messages_unverified: AtomicU64,
    /// Plain text lines passed through
    pub diagnostics: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            lines_received: AtomicU64::new(0),
            lines_overlong: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            time_requests: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            frames_malformed: AtomicU64::new(0),
            registrations_valid: AtomicU64::new(0),
            registrations_invalid: AtomicU64::new(0),
            messages_unverified: AtomicU64::new(0),
            diagnostics: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a line read from the transport
    pub fn line_received(&self, byte_count: u64) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn line_overlong(&self) {
        self.lines_overlong.fetch_add(1, Ordering::Relaxed);
    }

    pub fn time_request(&self) {
        self.time_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_malformed(&self) {
        self.frames_malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the verdict for a key registration
    pub fn registration_checked(&self, valid: bool) {
        if valid {
            self.registrations_valid.fetch_add(1, Ordering::Relaxed);
        } else {
            self.registrations_invalid.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn message_unverified(&self) {
        self.messages_unverified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn diagnostic(&self) {
        self.diagnostics.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines_received: self.lines_received.load(Ordering::Relaxed),
            lines_overlong: self.lines_overlong.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            time_requests: self.time_requests.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            registrations_valid: self.registrations_valid.load(Ordering::Relaxed),
            registrations_invalid: self.registrations_invalid.load(Ordering::Relaxed),
            messages_unverified: self.messages_unverified.load(Ordering::Relaxed),
            diagnostics: self.diagnostics.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            lines_received = snapshot.lines_received,
            lines_overlong = snapshot.lines_overlong,
            bytes_received = snapshot.bytes_received,
            time_requests = snapshot.time_requests,
            frames_decoded = snapshot.frames_decoded,
            frames_malformed = snapshot.frames_malformed,
            registrations_valid = snapshot.registrations_valid,
            registrations_invalid = snapshot.registrations_invalid,
            messages_unverified = snapshot.messages_unverified,
            diagnostics = snapshot.diagnostics,
            uptime_seconds = snapshot.uptime_seconds,
            "Bridge session summary"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub lines_received: u64,
    pub lines_overlong: u64,
    pub bytes_received: u64,
    pub time_requests: u64,
    pub frames_decoded: u64,
    pub frames_malformed: u64,
    pub registrations_valid: u64,
    pub registrations_invalid: u64,
    pub messages_unverified: u64,
    pub diagnostics: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}
