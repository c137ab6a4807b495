//! obscore - In-Process Observability Core
//!
//! Metrics, span tracing and health checks for code running in one process.
//! Business code writes through the handles below; reporting code reads the
//! process-wide singletons back.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Observability Core                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────┐  │
//! │  │ Metrics        │  │ Tracing        │  │ Health Checks      │  │
//! │  │ per service    │  │ ambient spans  │  │ worst status wins  │  │
//! │  └────────────────┘  └────────────────┘  └────────────────────┘  │
//! │          │                   │                     │             │
//! │  MetricsCollector        SpanStore          HealthRegistry       │
//! │  (process-wide)          (bounded)          (process-wide)       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use obscore::{health, metrics, trace};
//!
//! let recipes = metrics::get_service("recipes");
//! {
//!     let mut span = trace::Span::start("recipes", "Recipe.create");
//!     let _timer = recipes.timer("create");
//!     recipes.increment("created");
//!     span.set_attribute("title", "Tarte Tatin");
//! }
//! assert_eq!(recipes.count("created"), 1.0);
//!
//! health::registry().add("db", || Ok(health::HealthCheck::healthy("db")));
//! assert!(health::registry().check("db").status.is_healthy());
//! ```
//!
//! Instrumentation never fails the instrumented code: unknown reads return
//! neutral defaults, failing probes become `unhealthy` results, and spans
//! record errors without swallowing them.
//!
//! # Modules
//!
//! - [`config`] - Retention settings
//! - [`error`] - Error types
//! - [`health`] - Health probes and aggregation
//! - [`metrics`] - Counters, gauges, histograms
//! - [`trace`] - Spans, ambient context, span store

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod trace;

// Re-export commonly used types
pub use config::ObservabilityConfig;
pub use error::{Error, Result};
pub use health::{HealthCheck, HealthRegistry, HealthStatus, ServiceHealth};
pub use metrics::{Metric, MetricKind, MetricsCollector, ServiceMetrics};
pub use trace::{current_span, Span, SpanContext, SpanGuard, SpanStatus, SpanStore};
