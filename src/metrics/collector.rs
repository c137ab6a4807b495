//! Metrics Collector
//!
//! Process-wide registry mapping service name to its [`ServiceMetrics`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::service::{ServiceMetrics, ServiceStats};

static GLOBAL: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// The process-wide collector
pub fn global() -> &'static MetricsCollector {
    &GLOBAL
}

/// Shorthand for `global().get_service(name)`
pub fn get_service(name: &str) -> Arc<ServiceMetrics> {
    GLOBAL.get_service(name)
}

/// Snapshot across all services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorStats {
    pub services: BTreeMap<String, ServiceStats>,
    pub total_services: usize,
}

/// Metrics collector
#[derive(Debug, Default)]
pub struct MetricsCollector {
    services: Mutex<HashMap<String, Arc<ServiceMetrics>>>,
}

impl MetricsCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the metrics for `name`.
    ///
    /// Check-then-create runs under one lock, so racing first callers all
    /// receive the same instance.
    pub fn get_service(&self, name: &str) -> Arc<ServiceMetrics> {
        let mut services = self.services.lock();
        if let Some(existing) = services.get(name) {
            return Arc::clone(existing);
        }

        info!(service = name, "Registered metrics service");
        let created = Arc::new(ServiceMetrics::new(name));
        services.insert(name.to_string(), Arc::clone(&created));
        created
    }

    /// Insert or replace the metrics for `metrics.service()`
    pub fn register(&self, metrics: Arc<ServiceMetrics>) {
        let name = metrics.service().to_string();
        if self.services.lock().insert(name.clone(), metrics).is_some() {
            info!(service = %name, "Replaced metrics service");
        }
    }

    /// Registered service names, sorted
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot every service.
    ///
    /// The collector lock is released before any per-service snapshot is
    /// taken, so services keep accepting writes while others are read.
    pub fn get_all_stats(&self) -> CollectorStats {
        let handles: Vec<Arc<ServiceMetrics>> = self.services.lock().values().cloned().collect();

        let services: BTreeMap<String, ServiceStats> = handles
            .iter()
            .map(|metrics| (metrics.service().to_string(), metrics.get_stats()))
            .collect();

        CollectorStats {
            total_services: services.len(),
            services,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
