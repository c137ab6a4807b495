//! Per-service metrics
//!
//! Counters, gauges and bounded histograms for one logical service. All three
//! maps sit behind a single mutex, so writes to one service are linearized and
//! a stats snapshot never observes a half-applied update.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::metric::{series_name, Metric, MetricKind};
use crate::config::ObservabilityConfig;

/// Summary of the retained samples of one histogram series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    /// Falls back to `max` below 20 samples
    pub p95: f64,
    /// Falls back to `max` below 100 samples
    pub p99: f64,
}

impl HistogramSummary {
    /// Summarize by sorting the samples. `None` for an empty series.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let min = sorted[0];
        let max = sorted[count - 1];
        let avg = sorted.iter().sum::<f64>() / count as f64;
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        Some(Self {
            count,
            min,
            max,
            avg,
            p50: sorted[count / 2],
            p95: if count >= 20 { at(0.95) } else { max },
            p99: if count >= 100 { at(0.99) } else { max },
        })
    }
}

/// Point-in-time snapshot of one service's metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub service: String,
    /// Seconds since creation or the last reset
    pub uptime: f64,
    pub counters: BTreeMap<String, f64>,
    pub gauges: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, HistogramSummary>,
}

#[derive(Debug)]
struct Series {
    counters: HashMap<String, f64>,
    gauges: HashMap<String, f64>,
    histograms: HashMap<String, Vec<f64>>,
    started: Instant,
}

impl Series {
    fn new() -> Self {
        Self {
            counters: HashMap::new(),
            gauges: HashMap::new(),
            histograms: HashMap::new(),
            started: Instant::now(),
        }
    }
}

/// Metrics scoped to one service name
///
/// Every stored key is prefixed with `"<service>."`.
#[derive(Debug)]
pub struct ServiceMetrics {
    service: String,
    config: ObservabilityConfig,
    series: Mutex<Series>,
}

impl ServiceMetrics {
    /// Create with default retention
    pub fn new(service: impl Into<String>) -> Self {
        Self::with_config(service, ObservabilityConfig::default())
    }

    /// Create with explicit retention settings
    ///
    /// A retain size larger than the trim threshold is clamped to it.
    pub fn with_config(service: impl Into<String>, mut config: ObservabilityConfig) -> Self {
        config.histogram_retain_samples = config
            .histogram_retain_samples
            .min(config.histogram_max_samples);
        Self {
            service: service.into(),
            config,
            series: Mutex::new(Series::new()),
        }
    }

    /// Service name
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Time since creation or the last reset
    pub fn uptime(&self) -> Duration {
        self.series.lock().started.elapsed()
    }

    fn key(&self, name: &str, labels: &[(&str, &str)]) -> String {
        format!("{}.{}", self.service, series_name(name, labels))
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Increment an unlabeled counter by 1
    pub fn increment(&self, name: &str) {
        self.increment_by(name, 1.0, &[]);
    }

    /// Add `value` to a counter. Negative values are not rejected.
    pub fn increment_by(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let key = self.key(name, labels);
        *self.series.lock().counters.entry(key).or_insert(0.0) += value;
    }

    /// Current counter value, 0 if never incremented
    pub fn count(&self, name: &str) -> f64 {
        self.count_with(name, &[])
    }

    pub fn count_with(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        let key = self.key(name, labels);
        self.series.lock().counters.get(&key).copied().unwrap_or(0.0)
    }

    // =========================================================================
    // Gauges
    // =========================================================================

    /// Overwrite an unlabeled gauge
    pub fn gauge(&self, name: &str, value: f64) {
        self.gauge_with(name, value, &[]);
    }

    pub fn gauge_with(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let key = self.key(name, labels);
        self.series.lock().gauges.insert(key, value);
    }

    /// Gauge value, `None` if never set
    pub fn get_gauge(&self, name: &str) -> Option<f64> {
        self.get_gauge_with(name, &[])
    }

    pub fn get_gauge_with(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let key = self.key(name, labels);
        self.series.lock().gauges.get(&key).copied()
    }

    // =========================================================================
    // Histograms
    // =========================================================================

    /// Append a sample to an unlabeled histogram
    pub fn histogram(&self, name: &str, value: f64) {
        self.histogram_with(name, value, &[]);
    }

    pub fn histogram_with(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let key = self.key(name, labels);
        self.record_sample(key, value);
    }

    /// Number of retained samples in a histogram series
    pub fn histogram_len(&self, name: &str) -> usize {
        let key = self.key(name, &[]);
        self.series
            .lock()
            .histograms
            .get(&key)
            .map_or(0, Vec::len)
    }

    fn record_sample(&self, key: String, value: f64) {
        let mut series = self.series.lock();
        let samples = series.histograms.entry(key).or_default();
        samples.push(value);

        if samples.len() > self.config.histogram_max_samples {
            let excess = samples
                .len()
                .saturating_sub(self.config.histogram_retain_samples);
            samples.drain(..excess);
            debug!(
                service = %self.service,
                evicted = excess,
                retained = samples.len(),
                "Trimmed histogram series"
            );
        }
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Start a timer recorded under `<name>_ms` when the guard drops
    pub fn timer(&self, name: &str) -> Timer<'_> {
        self.timer_with(name, &[])
    }

    pub fn timer_with(&self, name: &str, labels: &[(&str, &str)]) -> Timer<'_> {
        Timer {
            metrics: self,
            key: self.key(&format!("{}_ms", name), labels),
            start: Instant::now(),
        }
    }

    /// Run `f` under a timer
    pub fn time<T>(&self, name: &str, labels: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _timer = self.timer_with(name, labels);
        f()
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Snapshot every series, histograms summarized
    pub fn get_stats(&self) -> ServiceStats {
        let (uptime, counters, gauges, histograms) = {
            let series = self.series.lock();
            (
                series.started.elapsed(),
                series.counters.clone(),
                series.gauges.clone(),
                series.histograms.clone(),
            )
        };

        ServiceStats {
            service: self.service.clone(),
            uptime: uptime.as_secs_f64(),
            counters: counters.into_iter().collect(),
            gauges: gauges.into_iter().collect(),
            histograms: histograms
                .iter()
                .filter_map(|(k, v)| HistogramSummary::from_samples(v).map(|s| (k.clone(), s)))
                .collect(),
        }
    }

    /// Counters and gauges as `Metric` values, sorted by series name
    pub fn export(&self) -> Vec<Metric> {
        let series = self.series.lock();
        let mut metrics: Vec<Metric> = series
            .counters
            .iter()
            .map(|(k, v)| Metric::from_series(k, MetricKind::Counter, *v))
            .chain(
                series
                    .gauges
                    .iter()
                    .map(|(k, v)| Metric::from_series(k, MetricKind::Gauge, *v)),
            )
            .collect();
        metrics.sort_by_key(Metric::full_name);
        metrics
    }

    /// Clear all series and restart the uptime clock
    pub fn reset(&self) {
        *self.series.lock() = Series::new();
    }
}

/// Scoped timer from [`ServiceMetrics::timer`]
///
/// Records elapsed milliseconds when dropped, on every exit path.
#[must_use = "the timer records when dropped"]
pub struct Timer<'a> {
    metrics: &'a ServiceMetrics,
    key: String,
    start: Instant,
}

impl Timer<'_> {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.metrics
            .record_sample(std::mem::take(&mut self.key), elapsed_ms);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counter_starts_at_zero() {
        let metrics = ServiceMetrics::new("recipes");
        assert_eq!(metrics.count("never"), 0.0);
    }

    #[test]
    fn test_counter_accumulates() {
        let metrics = ServiceMetrics::new("recipes");
        for _ in 0..4 {
            metrics.increment("recettes_creees");
        }
        assert_eq!(metrics.count("recettes_creees"), 4.0);

        let stats = metrics.get_stats();
        assert_eq!(stats.counters.get("recipes.recettes_creees"), Some(&4.0));
    }

    #[test]
    fn test_fractional_increment() {
        let metrics = ServiceMetrics::new("svc");
        metrics.increment_by("bytes", 0.5, &[]);
        metrics.increment_by("bytes", 1.25, &[]);
        assert_eq!(metrics.count("bytes"), 1.75);
    }

    #[test]
    fn test_label_order_collides() {
        let metrics = ServiceMetrics::new("api");
        metrics.increment_by("hits", 1.0, &[("route", "/a"), ("method", "GET")]);
        metrics.increment_by("hits", 1.0, &[("method", "GET"), ("route", "/a")]);

        assert_eq!(metrics.count_with("hits", &[("route", "/a"), ("method", "GET")]), 2.0);
        let stats = metrics.get_stats();
        assert_eq!(stats.counters.len(), 1);
        assert_eq!(stats.counters.get("api.hits{method=GET,route=/a}"), Some(&2.0));
    }

    #[test]
    fn test_labeled_and_unlabeled_are_distinct() {
        let metrics = ServiceMetrics::new("api");
        metrics.increment("hits");
        metrics.increment_by("hits", 5.0, &[("route", "/a")]);
        assert_eq!(metrics.count("hits"), 1.0);
        assert_eq!(metrics.count_with("hits", &[("route", "/a")]), 5.0);
    }

    #[test]
    fn test_gauge_last_write_wins() {
        let metrics = ServiceMetrics::new("svc");
        metrics.gauge("queue_depth", 10.0);
        metrics.gauge("queue_depth", 3.0);
        assert_eq!(metrics.get_gauge("queue_depth"), Some(3.0));
    }

    #[test]
    fn test_gauge_absent_vs_zero() {
        let metrics = ServiceMetrics::new("svc");
        assert_eq!(metrics.get_gauge("never-set"), None);
        metrics.gauge("zero", 0.0);
        assert_eq!(metrics.get_gauge("zero"), Some(0.0));
    }

    #[test]
    fn test_keys_prefixed_with_service() {
        let metrics = ServiceMetrics::new("billing");
        metrics.increment("a");
        metrics.gauge("b", 1.0);
        metrics.histogram("c", 1.0);

        let stats = metrics.get_stats();
        let keys = stats
            .counters
            .keys()
            .chain(stats.gauges.keys())
            .chain(stats.histograms.keys());
        for key in keys {
            assert!(key.starts_with("billing."), "unprefixed key {}", key);
        }
    }

    #[test]
    fn test_histogram_truncation_keeps_most_recent() {
        let metrics = ServiceMetrics::new("svc");
        for i in 0..10_001 {
            metrics.histogram("latency", i as f64);
        }
        assert_eq!(metrics.histogram_len("latency"), 5_000);

        let summary = metrics.get_stats().histograms["svc.latency"].clone();
        assert_eq!(summary.count, 5_000);
        assert_eq!(summary.min, 5_001.0);
        assert_eq!(summary.max, 10_000.0);
    }

    #[test]
    fn test_histogram_at_cap_not_truncated() {
        let metrics = ServiceMetrics::new("svc");
        for i in 0..10_000 {
            metrics.histogram("latency", i as f64);
        }
        assert_eq!(metrics.histogram_len("latency"), 10_000);
    }

    #[test]
    fn test_histogram_custom_retention() {
        let config = ObservabilityConfig {
            histogram_max_samples: 10,
            histogram_retain_samples: 4,
            ..ObservabilityConfig::default()
        };
        let metrics = ServiceMetrics::with_config("svc", config);
        for i in 0..11 {
            metrics.histogram("h", i as f64);
        }
        assert_eq!(metrics.histogram_len("h"), 4);
        assert_eq!(metrics.get_stats().histograms["svc.h"].min, 7.0);
    }

    #[test]
    fn test_histogram_retain_above_max_is_clamped() {
        let config = ObservabilityConfig {
            histogram_max_samples: 10,
            histogram_retain_samples: 20,
            ..ObservabilityConfig::default()
        };
        let metrics = ServiceMetrics::with_config("svc", config);
        for i in 0..11 {
            metrics.histogram("h", i as f64);
        }
        assert_eq!(metrics.histogram_len("h"), 10);
        assert_eq!(metrics.get_stats().histograms["svc.h"].min, 1.0);
    }

    #[test]
    fn test_summary_small_sample_falls_back_to_max() {
        let summary = HistogramSummary::from_samples(&[3.0, 1.0, 2.0]).unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 3.0);
        assert_eq!(summary.avg, 2.0);
        assert_eq!(summary.p50, 2.0);
        assert_eq!(summary.p95, 3.0);
        assert_eq!(summary.p99, 3.0);
    }

    #[test]
    fn test_summary_percentiles() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        let summary = HistogramSummary::from_samples(&samples).unwrap();
        assert_eq!(summary.p50, 51.0);
        assert_eq!(summary.p95, 96.0);
        assert_eq!(summary.p99, 100.0);
    }

    #[test]
    fn test_summary_p95_without_p99() {
        let samples: Vec<f64> = (0..20).map(f64::from).collect();
        let summary = HistogramSummary::from_samples(&samples).unwrap();
        assert_eq!(summary.p95, 19.0);
        assert_eq!(summary.p99, summary.max);
    }

    #[test]
    fn test_summary_empty() {
        assert!(HistogramSummary::from_samples(&[]).is_none());
    }

    #[test]
    fn test_timer_records_ms_series() {
        let metrics = ServiceMetrics::new("svc");
        {
            let _timer = metrics.timer("import");
            std::thread::sleep(Duration::from_millis(5));
        }
        let stats = metrics.get_stats();
        let summary = &stats.histograms["svc.import_ms"];
        assert_eq!(summary.count, 1);
        assert!(summary.min >= 5.0);
    }

    #[test]
    fn test_timer_records_on_early_return() {
        fn fallible(metrics: &ServiceMetrics) -> Result<(), String> {
            let _timer = metrics.timer_with("parse", &[("format", "csv")]);
            "not-a-number".parse::<i32>().map_err(|e| e.to_string())?;
            Ok(())
        }

        let metrics = ServiceMetrics::new("svc");
        assert!(fallible(&metrics).is_err());
        let stats = metrics.get_stats();
        assert_eq!(stats.histograms["svc.parse_ms{format=csv}"].count, 1);
    }

    #[test]
    fn test_timer_records_on_panic() {
        let metrics = ServiceMetrics::new("svc");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _timer = metrics.timer("boom");
            panic!("operation failed");
        }));
        assert!(result.is_err());
        assert_eq!(metrics.get_stats().histograms["svc.boom_ms"].count, 1);
    }

    #[test]
    fn test_time_closure() {
        let metrics = ServiceMetrics::new("svc");
        let value = metrics.time("work", &[], || 42);
        assert_eq!(value, 42);
        assert_eq!(metrics.get_stats().histograms["svc.work_ms"].count, 1);
    }

    #[test]
    fn test_reset_clears_and_restarts_uptime() {
        let metrics = ServiceMetrics::new("svc");
        metrics.increment("a");
        metrics.gauge("b", 2.0);
        metrics.histogram("c", 3.0);
        std::thread::sleep(Duration::from_millis(20));

        metrics.reset();
        let stats = metrics.get_stats();
        assert!(stats.counters.is_empty());
        assert!(stats.gauges.is_empty());
        assert!(stats.histograms.is_empty());
        assert!(metrics.uptime() < Duration::from_millis(20));
    }

    #[test]
    fn test_export() {
        let metrics = ServiceMetrics::new("svc");
        metrics.increment_by("hits", 2.0, &[("route", "/a")]);
        metrics.gauge("load", 0.7);

        let exported = metrics.export();
        assert_eq!(exported.len(), 2);
        assert_eq!(exported[0].name(), "svc.hits");
        assert_eq!(exported[0].kind(), MetricKind::Counter);
        assert_eq!(exported[0].label("route"), Some("/a"));
        assert_eq!(exported[1].name(), "svc.load");
        assert_eq!(exported[1].kind(), MetricKind::Gauge);
        assert_eq!(exported[1].value(), 0.7);
    }

    #[test]
    fn test_concurrent_increments_exact() {
        let metrics = Arc::new(ServiceMetrics::new("svc"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        metrics.increment("requests");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.count("requests"), 8_000.0);
    }

    #[test]
    fn test_stats_serialization() {
        let metrics = ServiceMetrics::new("svc");
        metrics.histogram("h", 1.0);
        let json = serde_json::to_value(metrics.get_stats()).unwrap();
        assert_eq!(json["service"], "svc");
        assert!(json["uptime"].is_number());
        assert_eq!(json["histograms"]["svc.h"]["count"], 1);
    }
}
