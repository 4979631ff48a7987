use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,
    rate_limited_requests: AtomicUsize,

    // Book lookups
    store_hits: AtomicUsize,
    catalog_fetches: AtomicUsize,
    catalog_misses: AtomicUsize,
    analyses_run: AtomicUsize,
    summaries_computed: AtomicUsize,

    // Timing (in microseconds)
    total_fetch_time_us: AtomicU64,
    total_analysis_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            successful_requests: AtomicUsize::new(0),
            failed_requests: AtomicUsize::new(0),
            rate_limited_requests: AtomicUsize::new(0),
            store_hits: AtomicUsize::new(0),
            catalog_fetches: AtomicUsize::new(0),
            catalog_misses: AtomicUsize::new(0),
            analyses_run: AtomicUsize::new(0),
            summaries_computed: AtomicUsize::new(0),
            total_fetch_time_us: AtomicU64::new(0),
            total_analysis_time_us: AtomicU64::new(0),
        })
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_hit(&self) {
        self.store_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A catalog download; `found` is false when the ebook had no text edition.
    pub fn record_catalog_fetch(&self, duration: Duration, found: bool) {
        self.total_fetch_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.catalog_fetches.fetch_add(1, Ordering::Relaxed);
        if !found {
            self.catalog_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_summary(&self) {
        self.summaries_computed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis(&self, duration: Duration) {
        self.total_analysis_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.analyses_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            rate_limited_requests: self.rate_limited_requests.load(Ordering::Relaxed),
            store_hits: self.store_hits.load(Ordering::Relaxed),
            catalog_fetches: self.catalog_fetches.load(Ordering::Relaxed),
            catalog_misses: self.catalog_misses.load(Ordering::Relaxed),
            analyses_run: self.analyses_run.load(Ordering::Relaxed),
            summaries_computed: self.summaries_computed.load(Ordering::Relaxed),
            avg_fetch_time_ms: self.avg_time_ms(&self.total_fetch_time_us, &self.catalog_fetches),
            avg_analysis_time_ms: self.avg_time_ms(&self.total_analysis_time_us, &self.analyses_run),
        }
    }

    fn avg_time_ms(&self, total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
        let total = total_us.load(Ordering::Relaxed) as f64;
        let cnt = count.load(Ordering::Relaxed) as f64;
        if cnt > 0.0 {
            total / cnt / 1000.0 // Convert to ms
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub rate_limited_requests: usize,
    pub store_hits: usize,
    pub catalog_fetches: usize,
    pub catalog_misses: usize,
    pub analyses_run: usize,
    pub summaries_computed: usize,
    pub avg_fetch_time_ms: f64,
    pub avg_analysis_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
