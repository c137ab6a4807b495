//! Health Checks
//!
//! Pluggable probes keyed by name, aggregated worst-status-wins:
//! any `unhealthy` → `unhealthy`, else any `degraded` → `degraded`, else all
//! `healthy` → `healthy`. An empty registry reports `unknown`.
//!
//! Probes have no timeout and are never retried; a hanging probe stalls the
//! sweep that called it.

mod check;
mod registry;

pub use check::{HealthCheck, HealthStatus};
pub use registry::{registry, HealthRegistry, HealthReport, HealthSummary, Probe, ServiceHealth};
