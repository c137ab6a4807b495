//! Span Store
//!
//! Bounded in-memory history of closed spans for debugging. Overflow drops
//! the oldest half in one batch rather than trimming one record per insert.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::span::{Span, SpanRecord};
use crate::config::ObservabilityConfig;

static GLOBAL: OnceCell<SpanStore> = OnceCell::new();

/// The process-wide store every closed span is recorded into.
///
/// Built with default settings on first use unless [`init_store`] ran first.
pub fn store() -> &'static SpanStore {
    GLOBAL.get_or_init(SpanStore::new)
}

/// Size the process-wide store from `config`.
///
/// Only takes effect before the store is first used; returns false when the
/// store already exists and keeps its current settings.
pub fn init_store(config: &ObservabilityConfig) -> bool {
    let installed = GLOBAL.set(SpanStore::with_config(config)).is_ok();
    if installed {
        info!(capacity = store().capacity(), "Configured span store");
    } else {
        debug!(capacity = store().capacity(), "Span store already in use, settings unchanged");
    }
    installed
}

/// Capped list of closed span records, oldest first
#[derive(Debug)]
pub struct SpanStore {
    capacity: usize,
    recent_limit: usize,
    records: Mutex<Vec<SpanRecord>>,
}

impl SpanStore {
    /// Create with default capacity
    pub fn new() -> Self {
        Self::with_config(&ObservabilityConfig::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(&ObservabilityConfig {
            span_store_capacity: capacity,
            ..ObservabilityConfig::default()
        })
    }

    pub fn with_config(config: &ObservabilityConfig) -> Self {
        let capacity = config.span_store_capacity.max(1);
        Self {
            capacity,
            recent_limit: config.recent_spans_limit,
            records: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Serialize and append a span
    pub fn record(&self, span: &Span) {
        self.insert(span.to_record());
    }

    pub(crate) fn insert(&self, record: SpanRecord) {
        let mut records = self.records.lock();
        records.push(record);

        if records.len() > self.capacity {
            let keep = (self.capacity / 2).max(1);
            let evicted = records.len() - keep;
            records.drain(..evicted);
            debug!(evicted, retained = records.len(), "Evicted oldest spans");
        }
    }

    /// Records of one trace in insertion order
    pub fn get_by_trace(&self, trace_id: &str) -> Vec<SpanRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.trace_id == trace_id)
            .cloned()
            .collect()
    }

    /// The last `limit` records, oldest first
    pub fn get_recent(&self, limit: usize) -> Vec<SpanRecord> {
        let records = self.records.lock();
        let start = records.len().saturating_sub(limit);
        records[start..].to_vec()
    }

    /// [`get_recent`](Self::get_recent) with the configured default limit
    pub fn recent(&self) -> Vec<SpanRecord> {
        self.get_recent(self.recent_limit)
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Default for SpanStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
