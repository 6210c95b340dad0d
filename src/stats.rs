//! Statistics tracking for the relay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic statistics for tracking relay performance.
pub struct Stats {
    started: Instant,
    pub requests: AtomicU64,
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_forwarded(&self, response_time_ms: f64) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.record_request(response_time_ms);
    }

    pub fn record_failed(&self, response_time_ms: f64) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record_request(response_time_ms);
    }

    fn record_request(&self, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add((response_time_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let forwarded = self.forwarded.swap(0, Ordering::Relaxed);
        let failed = self.failed.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let avg_response_ms = if requests > 0 {
            (total_us as f64 / requests as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests,
            forwarded,
            failed,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub forwarded: u64,
    pub failed: u64,
    pub avg_response_ms: f64,
}
