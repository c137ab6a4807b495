//! Span Tracing
//!
//! Hierarchical execution traces kept in process.
//!
//! ```text
//! Span::start("import", "Import.process")      ← trace root, becomes ambient
//!   └── Span::start("import", "parse_rows")    ← child of the ambient span
//!         └── closed → SpanStore (bounded)
//! ```
//!
//! The ambient span is per thread, or per task inside [`scope`]. Opening a
//! span never requires passing a context by hand; an explicit parent can
//! still be given through [`SpanBuilder::parent`].

mod context;
mod span;
mod store;

pub use context::{current_span, scope, SpanContext};
pub use span::{
    in_span, in_span_async, Span, SpanBuilder, SpanEvent, SpanGuard, SpanHandle, SpanRecord,
    SpanStatus,
};
pub use store::{init_store, store, SpanStore};
