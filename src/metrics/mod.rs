//! Metrics
//!
//! Counters, gauges and histograms grouped per logical service.
//!
//! ```text
//! MetricsCollector (process-wide)
//!   └── "recipes" → ServiceMetrics
//!         ├── counters    recipes.created            = 4
//!         ├── gauges      recipes.queue_depth        = 2
//!         └── histograms  recipes.import_ms{fmt=csv} = [12.1, 9.8, ...]
//! ```
//!
//! Series keys are `<service>.<name>` with labels rendered as
//! `{k1=v1,k2=v2}` in sorted key order.

mod collector;
mod metric;
mod proptest;
mod service;

pub use collector::{get_service, global, CollectorStats, MetricsCollector};
pub use metric::{series_name, Metric, MetricKind};
pub use service::{HistogramSummary, ServiceMetrics, ServiceStats, Timer};
