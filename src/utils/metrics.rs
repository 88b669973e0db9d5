//! Observability and Metrics
//!
//! Counters for the server loop and dispatcher. The server owns one [`Metrics`]
//! behind an `Arc` so tests and the shutdown path can read it.
//!
//! Uses atomic counters so a snapshot can be taken from any task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for protocol operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Connections that failed at the transport level
    pub connection_errors: AtomicU64,
    /// Request frames read off the wire
    pub requests_total: AtomicU64,
    /// Requests answered with GENERAL_ERROR
    pub general_errors: AtomicU64,
    /// Requests that deliberately got no response (CRC_WRONG_AGAIN)
    pub silent_requests: AtomicU64,
    /// Successful registrations
    pub registrations: AtomicU64,
    /// Symmetric keys issued through PUBLIC_KEY or RECONNECT
    pub keys_issued: AtomicU64,
    /// Files stored through FILE_SEND
    pub files_received: AtomicU64,
    /// Files marked verified through CRC_GOOD
    pub files_verified: AtomicU64,
    /// Total responses written
    pub responses_sent: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Total bytes sent, block padding included
    pub bytes_sent: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            requests_total: AtomicU64::new(0),
            general_errors: AtomicU64::new(0),
            silent_requests: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            keys_issued: AtomicU64::new(0),
            files_received: AtomicU64::new(0),
            files_verified: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_accepted(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request frame of `byte_count` bytes
    pub fn request_received(&self, byte_count: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a response written as `byte_count` bytes
    pub fn response_sent(&self, byte_count: u64) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn general_error(&self) {
        self.general_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn silent_request(&self) {
        self.silent_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn key_issued(&self) {
        self.keys_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_received(&self) {
        self.files_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_verified(&self) {
        self.files_verified.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            general_errors: self.general_errors.load(Ordering::Relaxed),
            silent_requests: self.silent_requests.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            keys_issued: self.keys_issued.load(Ordering::Relaxed),
            files_received: self.files_received.load(Ordering::Relaxed),
            files_verified: self.files_verified.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connection_errors = snapshot.connection_errors,
            requests_total = snapshot.requests_total,
            general_errors = snapshot.general_errors,
            silent_requests = snapshot.silent_requests,
            registrations = snapshot.registrations,
            keys_issued = snapshot.keys_issued,
            files_received = snapshot.files_received,
            files_verified = snapshot.files_verified,
            responses_sent = snapshot.responses_sent,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            uptime_seconds = snapshot.uptime_seconds,
            "Server metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connection_errors: u64,
    pub requests_total: u64,
    pub general_errors: u64,
    pub silent_requests: u64,
    pub registrations: u64,
    pub keys_issued: u64,
    pub files_received: u64,
    pub files_verified: u64,
    pub responses_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
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
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
