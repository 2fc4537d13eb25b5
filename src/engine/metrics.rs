// src/engine/metrics.rs
// =============================================================================
// Counters and timings collected while the engine runs.
//
// Workers update the counters under a write lock; the summary is read once,
// at the end of the run, under a read lock.
// =============================================================================

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Default)]
struct Counters {
    total: usize,
    valid: usize,
    failed: usize,
    errors: usize,
    cache_hits: usize,
    cache_valid_hits: usize,
    new_checks: usize,
    status_codes: BTreeMap<u16, usize>,
    // domain -> response time samples
    response_times: HashMap<String, Vec<Duration>>,
}

/// Run-wide metrics, shared by all workers.
#[derive(Debug)]
pub struct Metrics {
    started: Instant,
    counters: RwLock<Counters>,
}

/// A snapshot of the metrics, ready to be logged or printed as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_urls: usize,
    pub valid_urls: usize,
    pub failed_urls: usize,
    pub probe_errors: usize,
    pub cache_hits: usize,
    pub cache_valid_hits: usize,
    pub new_checks: usize,
    pub success_rate: f64,
    pub elapsed_ms: u128,
    pub urls_per_second: f64,
    pub avg_response_ms: u128,
    pub status_codes: BTreeMap<u16, usize>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: RwLock::new(Counters::default()),
        }
    }

    pub fn set_total(&self, total: usize) {
        self.write().total = total;
    }

    pub fn increment_valid(&self) {
        self.write().valid += 1;
    }

    pub fn increment_failed(&self) {
        self.write().failed += 1;
    }

    /// Counts a probe that ended in an error rather than a verdict.
    pub fn increment_errors(&self) {
        self.write().errors += 1;
    }

    pub fn record_cache_hit(&self, valid: bool) {
        let mut counters = self.write();
        counters.cache_hits += 1;
        if valid {
            counters.cache_valid_hits += 1;
        }
    }

    pub fn record_new_check(&self) {
        self.write().new_checks += 1;
    }

    pub fn add_status_code(&self, status: u16) {
        *self.write().status_codes.entry(status).or_insert(0) += 1;
    }

    /// Records how long a request to `url` took, grouped by domain.
    pub fn add_response_time(&self, url: &str, elapsed: Duration) {
        self.write()
            .response_times
            .entry(extract_domain(url))
            .or_default()
            .push(elapsed);
    }

    pub fn summary(&self) -> MetricsSummary {
        let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        let elapsed = self.started.elapsed();

        let samples: Vec<&Duration> = counters.response_times.values().flatten().collect();
        let avg_response = if samples.is_empty() {
            Duration::ZERO
        } else {
            samples.iter().copied().sum::<Duration>() / samples.len() as u32
        };

        let success_rate = if counters.total > 0 {
            counters.valid as f64 / counters.total as f64
        } else {
            0.0
        };

        let secs = elapsed.as_secs_f64();
        let urls_per_second = if secs > 0.0 {
            counters.total as f64 / secs
        } else {
            0.0
        };

        MetricsSummary {
            total_urls: counters.total,
            valid_urls: counters.valid,
            failed_urls: counters.failed,
            probe_errors: counters.errors,
            cache_hits: counters.cache_hits,
            cache_valid_hits: counters.cache_valid_hits,
            new_checks: counters.new_checks,
            success_rate,
            elapsed_ms: elapsed.as_millis(),
            urls_per_second,
            avg_response_ms: avg_response.as_millis(),
            status_codes: counters.status_codes.clone(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Counters> {
        self.counters.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Host part of a URL, or the input itself when it does not parse.
pub fn extract_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
