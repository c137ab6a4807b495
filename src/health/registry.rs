//! Health Registry
//!
//! Named probe functions run on demand and folded into one [`ServiceHealth`].
//! A probe that errors or panics is reported as `unhealthy`; nothing a probe
//! does escapes to the caller of the registry.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::check::{HealthCheck, HealthStatus};
use crate::error::{Error, Result};

/// A zero-argument health probe
pub type Probe = Arc<dyn Fn() -> anyhow::Result<HealthCheck> + Send + Sync>;

static GLOBAL: Lazy<HealthRegistry> = Lazy::new(HealthRegistry::new);

/// The process-wide registry
pub fn registry() -> &'static HealthRegistry {
    &GLOBAL
}

/// Counts reported alongside an aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

/// Serialized form of [`ServiceHealth`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    pub is_healthy: bool,
    pub total_latency_ms: f64,
    pub checked_at: DateTime<Utc>,
    pub summary: HealthSummary,
    pub checks: Vec<HealthCheck>,
}

/// Aggregate of one sweep over the registry, computed fresh every time
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub checks: Vec<HealthCheck>,
    pub overall_status: HealthStatus,
    pub total_latency_ms: f64,
    pub checked_at: DateTime<Utc>,
}

impl ServiceHealth {
    pub fn from_checks(checks: Vec<HealthCheck>) -> Self {
        Self {
            overall_status: HealthStatus::aggregate(checks.iter().map(|c| c.status)),
            total_latency_ms: checks.iter().fold(0.0, |total, c| total + c.latency_ms),
            checked_at: Utc::now(),
            checks,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.overall_status.is_healthy()
    }

    pub fn summary(&self) -> HealthSummary {
        let count = |status: HealthStatus| self.checks.iter().filter(|c| c.status == status).count();
        HealthSummary {
            total: self.checks.len(),
            healthy: count(HealthStatus::Healthy),
            unhealthy: count(HealthStatus::Unhealthy),
        }
    }

    pub fn get(&self, name: &str) -> Option<&HealthCheck> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn to_report(&self) -> HealthReport {
        HealthReport {
            overall_status: self.overall_status,
            is_healthy: self.is_healthy(),
            total_latency_ms: self.total_latency_ms,
            checked_at: self.checked_at,
            summary: self.summary(),
            checks: self.checks.clone(),
        }
    }
}

/// Registry of named health probes
#[derive(Default)]
pub struct HealthRegistry {
    checks: Mutex<HashMap<String, Probe>>,
}

impl std::fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthRegistry")
            .field("checks", &self.list_checks())
            .finish()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `probe` under `name`, replacing any previous probe
    pub fn add<F>(&self, name: impl Into<String>, probe: F)
    where
        F: Fn() -> anyhow::Result<HealthCheck> + Send + Sync + 'static,
    {
        self.checks.lock().insert(name.into(), Arc::new(probe));
    }

    /// Chainable form of [`add`](Self::add)
    pub fn register<F>(&self, name: impl Into<String>, probe: F) -> &Self
    where
        F: Fn() -> anyhow::Result<HealthCheck> + Send + Sync + 'static,
    {
        self.add(name, probe);
        self
    }

    /// Returns true if a probe was registered under `name`
    pub fn remove(&self, name: &str) -> bool {
        self.checks.lock().remove(name).is_some()
    }

    /// Registered names, sorted
    pub fn list_checks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.checks.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.checks.lock().clear();
    }

    /// Run one probe. Unknown names yield an `unknown` result.
    pub fn check(&self, name: &str) -> HealthCheck {
        let probe = self.checks.lock().get(name).cloned();
        match probe {
            Some(probe) => run_probe(name, &probe),
            None => HealthCheck::unknown(name, format!("No health check registered as '{}'", name)),
        }
    }

    /// Run every probe registered when the sweep starts
    pub fn check_all(&self) -> ServiceHealth {
        let mut probes: Vec<(String, Probe)> = self
            .checks
            .lock()
            .iter()
            .map(|(name, probe)| (name.clone(), Arc::clone(probe)))
            .collect();
        probes.sort_by(|a, b| a.0.cmp(&b.0));

        let checks = probes
            .iter()
            .map(|(name, probe)| run_probe(name, probe))
            .collect();
        ServiceHealth::from_checks(checks)
    }
}

fn run_probe(name: &str, probe: &Probe) -> HealthCheck {
    let start = Instant::now();
    let outcome = invoke(name, probe);
    let latency = start.elapsed();

    let mut check = match outcome {
        Ok(check) => check,
        Err(err) => {
            warn!(check = name, error = %err, "Health check failed");
            let reason = match &err {
                Error::ProbeFailed { reason, .. } | Error::ProbePanicked { reason, .. } => {
                    reason.clone()
                }
                other => other.to_string(),
            };
            HealthCheck::unhealthy(name, reason).with_detail("error", err.to_string())
        }
    };
    check.name = name.to_string();
    check.with_latency(latency)
}

fn invoke(name: &str, probe: &Probe) -> Result<HealthCheck> {
    match catch_unwind(AssertUnwindSafe(|| probe())) {
        Ok(Ok(check)) => Ok(check),
        Ok(Err(err)) => Err(Error::ProbeFailed {
            name: name.to_string(),
            reason: format!("{:#}", err),
        }),
        Err(payload) => Err(Error::ProbePanicked {
            name: name.to_string(),
            reason: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "probe panicked".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
