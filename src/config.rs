//! Observability configuration
//!
//! Retention sizes default to compiled-in values. The process-wide span store
//! can be sized once through [`crate::trace::init_store`] before first use;
//! services created by the collector use the defaults, and services built
//! with [`crate::ServiceMetrics::with_config`] can be registered in their place.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Histogram series length that triggers a trim
pub const DEFAULT_HISTOGRAM_MAX_SAMPLES: usize = 10_000;

/// Samples kept after a histogram trim
pub const DEFAULT_HISTOGRAM_RETAIN_SAMPLES: usize = 5_000;

/// Closed spans held by a span store
pub const DEFAULT_SPAN_STORE_CAPACITY: usize = 1_000;

/// Default `limit` for recent-span queries
pub const DEFAULT_RECENT_SPANS_LIMIT: usize = 50;

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// A histogram longer than this is trimmed
    pub histogram_max_samples: usize,
    /// Most recent samples kept by a trim
    pub histogram_retain_samples: usize,
    /// Span store capacity
    pub span_store_capacity: usize,
    /// Default number of spans returned by recent-span queries
    pub recent_spans_limit: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            histogram_max_samples: DEFAULT_HISTOGRAM_MAX_SAMPLES,
            histogram_retain_samples: DEFAULT_HISTOGRAM_RETAIN_SAMPLES,
            span_store_capacity: DEFAULT_SPAN_STORE_CAPACITY,
            recent_spans_limit: DEFAULT_RECENT_SPANS_LIMIT,
        }
    }
}

impl ObservabilityConfig {
    /// Parse a YAML document; absent keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Reject retention settings that would break the bounded-memory rules.
    pub fn validate(&self) -> Result<()> {
        if self.histogram_max_samples == 0 {
            return Err(Error::Config(
                "histogram_max_samples must be greater than zero".to_string(),
            ));
        }
        if self.histogram_retain_samples > self.histogram_max_samples {
            return Err(Error::Config(format!(
                "histogram_retain_samples ({}) exceeds histogram_max_samples ({})",
                self.histogram_retain_samples, self.histogram_max_samples
            )));
        }
        if self.span_store_capacity == 0 {
            return Err(Error::Config(
                "span_store_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
