use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::types::{ImageOutcome, RunResult};

/// Remote service an API call went to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiService {
    ImageFetch,
    Vision,
    Translate,
    Catalog,
}

impl ApiService {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiService::ImageFetch => "image_fetch",
            ApiService::Vision => "vision",
            ApiService::Translate => "translate",
            ApiService::Catalog => "catalog",
        }
    }
}

/// Global metrics collector for the application.
///
/// Tracks remote API usage, per-image outcomes and batch runs.
/// Thread-safe and can be shared across the application.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

/// Latency samples kept per series
const MAX_SAMPLES: usize = 1000;

/// The most recent `MAX_SAMPLES` values, oldest dropped first
#[derive(Default)]
struct SampleWindow(VecDeque<u64>);

impl SampleWindow {
    fn push(&mut self, value: u64) {
        if self.0.len() == MAX_SAMPLES {
            self.0.pop_front();
        }
        self.0.push_back(value);
    }

    fn to_vec(&self) -> Vec<u64> {
        self.0.iter().copied().collect()
    }
}

#[derive(Default)]
struct ServiceCounters {
    calls: AtomicUsize,
    failures: AtomicUsize,
    latency_ms: RwLock<SampleWindow>,
}

struct MetricsInner {
    // API Metrics, keyed by service
    services: DashMap<ApiService, ServiceCounters>,

    // Image Metrics
    images_replaced: AtomicUsize,
    images_skipped: AtomicUsize,
    images_failed: AtomicUsize,
    regions_detected: AtomicUsize,
    regions_translated: AtomicUsize,

    // Run Metrics
    runs_total: AtomicUsize,
    runs_failed: AtomicUsize,
    run_duration_ms: RwLock<SampleWindow>,

    // Per-endpoint request counters
    endpoint_counters: DashMap<String, AtomicUsize>,

    // Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                services: DashMap::new(),
                images_replaced: AtomicUsize::new(0),
                images_skipped: AtomicUsize::new(0),
                images_failed: AtomicUsize::new(0),
                regions_detected: AtomicUsize::new(0),
                regions_translated: AtomicUsize::new(0),
                runs_total: AtomicUsize::new(0),
                runs_failed: AtomicUsize::new(0),
                run_duration_ms: RwLock::new(SampleWindow::default()),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    // API Metrics
    pub fn record_api_call(&self, service: ApiService, success: bool, duration: Duration) {
        let counters = self.inner.services.entry(service).or_default();
        counters.calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
        counters.latency_ms.write().push(duration.as_millis() as u64);
    }

    // Image Metrics
    pub fn record_image_outcome(&self, outcome: &ImageOutcome) {
        let counter = match outcome {
            ImageOutcome::Replaced => &self.inner.images_replaced,
            ImageOutcome::Skipped(_) => &self.inner.images_skipped,
            ImageOutcome::Failed(_) => &self.inner.images_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_regions(&self, detected: usize, translated: usize) {
        self.inner.regions_detected.fetch_add(detected, Ordering::Relaxed);
        self.inner.regions_translated.fetch_add(translated, Ordering::Relaxed);
    }

    // Run Metrics
    pub fn record_run(&self, duration: Duration, result: Option<&RunResult>) {
        self.inner.runs_total.fetch_add(1, Ordering::Relaxed);
        if result.is_none() {
            self.inner.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.run_duration_ms.write().push(duration.as_millis() as u64);
    }

    // Endpoint Metrics
    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut services: Vec<ServiceSnapshot> = self
            .inner
            .services
            .iter()
            .map(|entry| {
                let latency = entry.latency_ms.read().to_vec();
                ServiceSnapshot {
                    service: entry.key().as_str().to_string(),
                    calls: entry.calls.load(Ordering::Relaxed),
                    failures: entry.failures.load(Ordering::Relaxed),
                    latency_avg_ms: avg(&latency),
                    latency_p50_ms: percentile(&latency, 0.5),
                    latency_p95_ms: percentile(&latency, 0.95),
                }
            })
            .collect();
        services.sort_by(|a, b| a.service.cmp(&b.service));

        let mut endpoints: Vec<(String, usize)> = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        endpoints.sort();

        let run_avg = avg(&self.inner.run_duration_ms.read().to_vec());

        MetricsSnapshot {
            services,
            images_replaced: self.inner.images_replaced.load(Ordering::Relaxed),
            images_skipped: self.inner.images_skipped.load(Ordering::Relaxed),
            images_failed: self.inner.images_failed.load(Ordering::Relaxed),
            regions_detected: self.inner.regions_detected.load(Ordering::Relaxed),
            regions_translated: self.inner.regions_translated.load(Ordering::Relaxed),
            runs_total: self.inner.runs_total.load(Ordering::Relaxed),
            runs_failed: self.inner.runs_failed.load(Ordering::Relaxed),
            run_avg_duration_ms: run_avg,
            endpoints,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        out.push_str("# HELP api_calls_total Total number of remote API calls made\n");
        out.push_str("# TYPE api_calls_total counter\n");
        for s in &snapshot.services {
            out.push_str(&format!("api_calls_total {{service=\"{}\"}} {}\n", s.service, s.calls));
        }

        out.push_str("\n# HELP api_calls_failed Number of failed remote API calls\n");
        out.push_str("# TYPE api_calls_failed counter\n");
        for s in &snapshot.services {
            out.push_str(&format!("api_calls_failed {{service=\"{}\"}} {}\n", s.service, s.failures));
        }

        out.push_str("\n# HELP api_latency_avg_ms Average API latency in milliseconds\n");
        out.push_str("# TYPE api_latency_avg_ms gauge\n");
        for s in &snapshot.services {
            out.push_str(&format!(
                "api_latency_avg_ms {{service=\"{}\"}} {}\n",
                s.service, s.latency_avg_ms
            ));
        }

        out.push_str(&format!(
            r#"
# HELP images_total Product images processed, by outcome
# TYPE images_total counter
images_total {{outcome="replaced"}} {}
images_total {{outcome="skipped"}} {}
images_total {{outcome="failed"}} {}

# HELP regions_detected_total Text regions returned by OCR
# TYPE regions_detected_total counter
regions_detected_total {{}} {}

# HELP regions_translated_total Text regions painted with a translation
# TYPE regions_translated_total counter
regions_translated_total {{}} {}

# HELP runs_total Batch runs started
# TYPE runs_total counter
runs_total {{}} {}

# HELP runs_failed_total Batch runs aborted by a catalog error
# TYPE runs_failed_total counter
runs_failed_total {{}} {}

# HELP run_avg_duration_ms Average batch run duration in milliseconds
# TYPE run_avg_duration_ms gauge
run_avg_duration_ms {{}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.images_replaced,
            snapshot.images_skipped,
            snapshot.images_failed,
            snapshot.regions_detected,
            snapshot.regions_translated,
            snapshot.runs_total,
            snapshot.runs_failed,
            snapshot.run_avg_duration_ms,
            snapshot.uptime_seconds,
        ));

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub service: String,
    pub calls: usize,
    pub failures: usize,
    pub latency_avg_ms: u64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub services: Vec<ServiceSnapshot>,
    pub images_replaced: usize,
    pub images_skipped: usize,
    pub images_failed: usize,
    pub regions_detected: usize,
    pub regions_translated: usize,
    pub runs_total: usize,
    pub runs_failed: usize,
    pub run_avg_duration_ms: u64,
    pub endpoints: Vec<(String, usize)>,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
