//! Spans
//!
//! A [`Span`] is one traced operation. It is opened through [`Span::start`]
//! or [`SpanBuilder::start`], which return a [`SpanGuard`]; the guard makes
//! the span ambient for its lifetime and closes it on drop.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::context::{current_span, replace_current, restore_current, scope, SpanContext};
use super::store::store;
use crate::error::Result;

/// Span status
///
/// Moves from `Unset` to exactly one of `Ok` or `Error` when the span closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanStatus::Unset => write!(f, "unset"),
            SpanStatus::Ok => write!(f, "ok"),
            SpanStatus::Error => write!(f, "error"),
        }
    }
}

/// Timestamped event inside a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: BTreeMap<String, Value>,
}

/// Serialized form of a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub service: String,
    pub operation: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
    pub status: SpanStatus,
    pub status_message: String,
    pub attributes: BTreeMap<String, Value>,
    pub events: Vec<SpanEvent>,
}

impl SpanRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One traced operation
#[derive(Debug, Clone)]
pub struct Span {
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    service_name: String,
    operation_name: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: SpanStatus,
    status_message: String,
    attributes: BTreeMap<String, Value>,
    events: Vec<SpanEvent>,
    started: Instant,
    elapsed: Option<Duration>,
}

fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn new_span_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

impl Span {
    /// Open a span under the ambient span, if any
    pub fn start(service: &str, operation: &str) -> SpanGuard {
        Self::builder(service, operation).start()
    }

    pub fn builder(service: &str, operation: &str) -> SpanBuilder {
        SpanBuilder {
            service: service.to_string(),
            operation: operation.to_string(),
            parent: Parent::Ambient,
            attributes: BTreeMap::new(),
        }
    }

    fn open(service: String, operation: String, parent: Option<SpanContext>) -> Self {
        let (trace_id, parent_span_id) = match parent {
            Some(ctx) => (ctx.trace_id, Some(ctx.span_id)),
            None => (new_trace_id(), None),
        };

        Self {
            trace_id,
            span_id: new_span_id(),
            parent_span_id,
            service_name: service,
            operation_name: operation,
            start_time: Utc::now(),
            end_time: None,
            status: SpanStatus::Unset,
            status_message: String::new(),
            attributes: BTreeMap::new(),
            events: Vec::new(),
            started: Instant::now(),
            elapsed: None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn status(&self) -> SpanStatus {
        self.status
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn events(&self) -> &[SpanEvent] {
        &self.events
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Identity handed to child spans
    pub fn context(&self) -> SpanContext {
        SpanContext {
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
        }
    }

    /// Elapsed time, known only once closed
    pub fn duration(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn duration_ms(&self) -> Option<f64> {
        self.elapsed.map(|d| d.as_secs_f64() * 1000.0)
    }

    // =========================================================================
    // Mutators
    // =========================================================================

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn set_attributes<K, V>(&mut self, attributes: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in attributes {
            self.set_attribute(key, value);
        }
    }

    pub fn add_event(&mut self, name: impl Into<String>, attributes: BTreeMap<String, Value>) {
        self.events.push(SpanEvent {
            name: name.into(),
            timestamp: Utc::now(),
            attributes,
        });
    }

    /// Set the status explicitly. Ignored once the span is closed.
    pub fn set_status(&mut self, status: SpanStatus, message: impl Into<String>) {
        if self.is_closed() {
            debug!(span_id = %self.span_id, "Ignoring status change on closed span");
            return;
        }
        self.status = status;
        self.status_message = message.into();
    }

    /// Mark the span failed and append an `exception` event.
    pub fn record_exception<E: fmt::Display + ?Sized>(&mut self, error: &E) {
        self.record_failure(std::any::type_name::<E>(), error.to_string());
    }

    fn record_failure(&mut self, kind: &str, message: String) {
        if self.is_closed() {
            return;
        }
        let mut attributes = BTreeMap::new();
        attributes.insert("type".to_string(), Value::from(kind));
        attributes.insert("message".to_string(), Value::from(message.clone()));
        self.add_event("exception", attributes);
        self.set_status(SpanStatus::Error, message);
    }

    fn close(&mut self) {
        let elapsed = self.started.elapsed();
        self.elapsed = Some(elapsed);
        self.end_time = Some(
            self.start_time
                + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero()),
        );
        if self.status == SpanStatus::Unset {
            self.status = SpanStatus::Ok;
        }
    }

    pub fn to_record(&self) -> SpanRecord {
        SpanRecord {
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            parent_span_id: self.parent_span_id.clone(),
            service: self.service_name.clone(),
            operation: self.operation_name.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration_ms: self.duration_ms(),
            status: self.status,
            status_message: self.status_message.clone(),
            attributes: self.attributes.clone(),
            events: self.events.clone(),
        }
    }
}

#[derive(Debug, Clone)]
enum Parent {
    Ambient,
    Explicit(SpanContext),
    Root,
}

/// Configures a span before opening it
#[derive(Debug, Clone)]
pub struct SpanBuilder {
    service: String,
    operation: String,
    parent: Parent,
    attributes: BTreeMap<String, Value>,
}

impl SpanBuilder {
    /// Use `parent` instead of the ambient span
    pub fn parent(mut self, parent: SpanContext) -> Self {
        self.parent = Parent::Explicit(parent);
        self
    }

    /// Start a new trace even if a span is ambient
    pub fn root(mut self) -> Self {
        self.parent = Parent::Root;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Open the span and make it ambient
    pub fn start(self) -> SpanGuard {
        let parent = match self.parent {
            Parent::Ambient => current_span(),
            Parent::Explicit(ctx) => Some(ctx),
            Parent::Root => None,
        };

        let mut span = Span::open(self.service, self.operation, parent);
        span.attributes = self.attributes;
        let previous = replace_current(Some(span.context()));

        SpanGuard {
            span,
            previous,
            opened_unwinding: std::thread::panicking(),
            closed: false,
        }
    }
}

/// Scope of an open span
///
/// Dropping the guard (or calling [`SpanGuard::finish`]) records the end
/// time, restores the previously ambient span and stores the closed span.
/// A guard dropped by a panic that began while its span was open closes
/// the span with status `error`.
#[must_use = "the span closes when the guard is dropped"]
#[derive(Debug)]
pub struct SpanGuard {
    span: Span,
    previous: Option<SpanContext>,
    /// Set when opened inside a `Drop` that runs during an unwind
    opened_unwinding: bool,
    closed: bool,
}

impl SpanGuard {
    /// Close the span and return it
    pub fn finish(mut self) -> Span {
        self.close();
        self.span.clone()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if std::thread::panicking() && !self.opened_unwinding {
            self.span
                .record_failure("panic", "span closed while unwinding from a panic".to_string());
        }
        self.span.close();
        if !restore_current(&self.span.context(), self.previous.take()) {
            debug!(
                span_id = %self.span.span_id,
                "Ambient span changed before close, leaving it in place"
            );
        }

        debug!(
            trace_id = %self.span.trace_id,
            span_id = %self.span.span_id,
            service = %self.span.service_name,
            operation = %self.span.operation_name,
            status = %self.span.status,
            duration_ms = self.span.duration_ms().unwrap_or_default(),
            "Span closed"
        );
        store().record(&self.span);
    }
}

impl Deref for SpanGuard {
    type Target = Span;

    fn deref(&self) -> &Span {
        &self.span
    }
}

impl DerefMut for SpanGuard {
    fn deref_mut(&mut self) -> &mut Span {
        &mut self.span
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run `f` inside a span.
///
/// An `Err` is recorded on the span and returned unchanged.
pub fn in_span<T, E, F>(service: &str, operation: &str, f: F) -> std::result::Result<T, E>
where
    F: FnOnce(&mut Span) -> std::result::Result<T, E>,
    E: fmt::Display,
{
    let mut guard = Span::start(service, operation);
    let result = f(&mut *guard);
    if let Err(err) = &result {
        guard.record_exception(err);
    }
    result
}

/// Shared handle to a span opened by [`in_span_async`]
///
/// Clones refer to the same span. It closes when the last clone drops,
/// normally as soon as `in_span_async` returns.
#[derive(Debug, Clone)]
pub struct SpanHandle {
    guard: Arc<Mutex<SpanGuard>>,
}

impl SpanHandle {
    fn new(guard: SpanGuard) -> Self {
        Self {
            guard: Arc::new(Mutex::new(guard)),
        }
    }

    pub fn context(&self) -> SpanContext {
        self.guard.lock().context()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.guard.lock().set_attribute(key, value);
    }

    pub fn add_event(&self, name: impl Into<String>, attributes: BTreeMap<String, Value>) {
        self.guard.lock().add_event(name, attributes);
    }

    pub fn set_status(&self, status: SpanStatus, message: impl Into<String>) {
        self.guard.lock().set_status(status, message);
    }

    pub fn record_exception<E: fmt::Display + ?Sized>(&self, error: &E) {
        self.guard.lock().record_exception(error);
    }

    /// Run `f` against the span. Do not hold the span across an `.await`.
    pub fn with<R>(&self, f: impl FnOnce(&mut Span) -> R) -> R {
        let mut guard = self.guard.lock();
        f(&mut **guard)
    }
}

/// Async form of [`in_span`]; the future runs in its own ambient [`scope`].
pub async fn in_span_async<T, E, F, Fut>(
    service: &str,
    operation: &str,
    f: F,
) -> std::result::Result<T, E>
where
    F: FnOnce(SpanHandle) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: fmt::Display,
{
    scope(async move {
        let handle = SpanHandle::new(Span::start(service, operation));
        let result = f(handle.clone()).await;
        if let Err(err) = &result {
            handle.record_exception(err);
        }
        result
    })
    .await
}

// =============================================================================
// Tests
// =============================================================================
