//! Health Check Results

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Dependency is healthy
    Healthy,
    /// Dependency is degraded but operational
    Degraded,
    /// Dependency is unhealthy
    Unhealthy,
    /// Status could not be determined
    Unknown,
}

impl HealthStatus {
    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    /// Check if status is healthy
    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }

    /// Rank used when comparing statuses; higher is worse.
    pub fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Unknown => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Unhealthy => 3,
        }
    }

    /// Combine statuses, worst first: any unhealthy, then any degraded, then
    /// all healthy. Anything else, including no statuses, is unknown.
    pub fn aggregate(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
        let mut seen = 0usize;
        let mut healthy = 0usize;
        let mut degraded = false;

        for status in statuses {
            seen += 1;
            match status {
                HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
                HealthStatus::Degraded => degraded = true,
                HealthStatus::Healthy => healthy += 1,
                HealthStatus::Unknown => {}
            }
        }

        if degraded {
            HealthStatus::Degraded
        } else if seen > 0 && healthy == seen {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unknown
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of probing one dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Check name
    pub name: String,
    /// Status
    pub status: HealthStatus,
    /// Message
    pub message: String,
    /// Probe latency
    pub latency_ms: f64,
    /// Free-form probe details
    pub details: BTreeMap<String, Value>,
    /// When the probe ran
    pub checked_at: DateTime<Utc>,
}

impl HealthCheck {
    pub fn new(name: impl Into<String>, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            latency_ms: 0.0,
            details: BTreeMap::new(),
            checked_at: Utc::now(),
        }
    }

    /// Create a healthy result
    pub fn healthy(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Healthy, "")
    }

    /// Create a degraded result
    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Degraded, message)
    }

    /// Create an unhealthy result
    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Unhealthy, message)
    }

    /// Create an unknown result
    pub fn unknown(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Unknown, message)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Set latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = latency.as_nanos() as f64 / 1_000_000.0;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use HealthStatus::*;

    #[test]
    fn test_health_status() {
        assert!(Healthy.is_healthy());
        assert!(Healthy.is_operational());
        assert!(!Degraded.is_healthy());
        assert!(Degraded.is_operational());
        assert!(!Unhealthy.is_operational());
        assert!(!Unknown.is_operational());
    }

    #[test]
    fn test_health_status_display() {
        assert_eq!(format!("{}", Healthy), "healthy");
        assert_eq!(format!("{}", Degraded), "degraded");
        assert_eq!(format!("{}", Unhealthy), "unhealthy");
        assert_eq!(format!("{}", Unknown), "unknown");
    }

    #[test]
    fn test_aggregate_worst_wins() {
        assert_eq!(HealthStatus::aggregate([Healthy, Healthy]), Healthy);
        assert_eq!(HealthStatus::aggregate([Healthy, Degraded]), Degraded);
        assert_eq!(HealthStatus::aggregate([Healthy, Unhealthy]), Unhealthy);
        assert_eq!(HealthStatus::aggregate([Degraded, Unhealthy, Healthy]), Unhealthy);
        assert_eq!(HealthStatus::aggregate(std::iter::empty()), Unknown);
    }

    #[test]
    fn test_aggregate_unknown_member() {
        assert_eq!(HealthStatus::aggregate([Healthy, Unknown]), Unknown);
        assert_eq!(HealthStatus::aggregate([Unknown, Degraded]), Degraded);
    }

    #[test]
    fn test_severity_order_matches_aggregate() {
        assert!(Healthy.severity() < Unknown.severity());
        assert!(Unknown.severity() < Degraded.severity());
        assert!(Degraded.severity() < Unhealthy.severity());
        for (a, b) in [(Healthy, Degraded), (Unknown, Degraded), (Degraded, Unhealthy)] {
            let worst = if a.severity() > b.severity() { a } else { b };
            assert_eq!(HealthStatus::aggregate([a, b]), worst);
        }
    }

    #[test]
    fn test_health_check_constructors() {
        let healthy = HealthCheck::healthy("db");
        assert_eq!(healthy.status, Healthy);
        assert!(healthy.message.is_empty());

        let degraded = HealthCheck::degraded("cache", "high latency");
        assert_eq!(degraded.status, Degraded);
        assert_eq!(degraded.message, "high latency");

        let check = HealthCheck::unhealthy("queue", "down")
            .with_detail("depth", 42)
            .with_latency(Duration::from_millis(15));
        assert_eq!(check.details["depth"], Value::from(42));
        assert_eq!(check.latency_ms, 15.0);
    }

    #[test]
    fn test_serialization() {
        let check = HealthCheck::healthy("db");
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["name"], "db");
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["latency_ms"], 0.0);
        assert!(json["checked_at"].is_string());

        let back: HealthCheck = serde_json::from_value(json).unwrap();
        assert_eq!(back.status, Healthy);
    }
}
