use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

const NO_SUCCESS: i64 = i64::MIN;

/// Process-lifetime service counters.
///
/// Every field is an independent atomic, so a snapshot taken during traffic is
/// a point-in-time approximation rather than a consistent ledger.
#[derive(Debug)]
pub struct StatsAggregator {
    total_requests: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    fallbacks: AtomicU64,
    total_response_time_us: AtomicU64,
    last_success_ms: AtomicI64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
    pub retries: u64,
    pub fallbacks: u64,
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub last_success: Option<DateTime<Utc>>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            last_success_ms: AtomicI64::new(NO_SUCCESS),
        }
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed translation attempt sequence
    pub fn record_attempt(&self, success: bool, retries: u32, elapsed: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
            self.last_success_ms
                .fetch_max(Utc::now().timestamp_millis(), Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.retries.fetch_add(u64::from(retries), Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_response_time_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        match self.last_success_ms.load(Ordering::Relaxed) {
            NO_SUCCESS => None,
            ms => DateTime::<Utc>::from_timestamp_millis(ms),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful.load(Ordering::Relaxed);
        let total_us = self.total_response_time_us.load(Ordering::Relaxed);

        let (success_rate, avg_response_time_ms) = if total_requests > 0 {
            (
                successful as f64 / total_requests as f64,
                total_us as f64 / 1000.0 / total_requests as f64,
            )
        } else {
            (0.0, 0.0)
        };

        StatsSnapshot {
            total_requests,
            successful,
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            success_rate,
            avg_response_time_ms,
            last_success: self.last_success(),
        }
    }
}
