//! Metric value object and series naming

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Running total, only increased
    Counter,
    /// Current value, last write wins
    Gauge,
    /// Distribution of observations
    Histogram,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Histogram => write!(f, "histogram"),
        }
    }
}

/// Render `name{k1=v1,k2=v2}` with keys sorted, or `name` when unlabeled.
///
/// Every labeled write and read goes through here, so the same labels given
/// in any order land in the same series.
pub fn series_name(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let sorted: BTreeMap<&str, &str> = labels.iter().copied().collect();
    render(name, sorted.iter().map(|(k, v)| (*k, *v)))
}

fn render<'a>(name: &str, labels: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let joined = labels
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    if joined.is_empty() {
        name.to_string()
    } else {
        format!("{}{{{}}}", name, joined)
    }
}

/// A single observed metric value. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    name: String,
    #[serde(rename = "type")]
    kind: MetricKind,
    value: f64,
    labels: BTreeMap<String, String>,
    timestamp: DateTime<Utc>,
    description: Option<String>,
}

impl Metric {
    pub fn new(name: impl Into<String>, kind: MetricKind, value: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
            labels: BTreeMap::new(),
            timestamp: Utc::now(),
            description: None,
        }
    }

    pub fn with_labels(mut self, labels: &[(&str, &str)]) -> Self {
        for (k, v) in labels {
            self.labels.insert((*k).to_string(), (*v).to_string());
        }
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Series name including sorted labels.
    pub fn full_name(&self) -> String {
        render(
            &self.name,
            self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }

    /// Rebuild a metric from a stored series key such as `svc.hits{route=/a}`.
    pub fn from_series(series: &str, kind: MetricKind, value: f64) -> Self {
        let (name, labels) = match series.split_once('{') {
            Some((name, rest)) => {
                let body = rest.strip_suffix('}').unwrap_or(rest);
                let labels = body
                    .split(',')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                (name, labels)
            }
            None => (series, BTreeMap::new()),
        };

        Self {
            labels,
            ..Self::new(name, kind, value)
        }
    }
}
