//! Ambient span slot
//!
//! Each thread owns one "current span" slot. An async task wrapped in
//! [`scope`] gets its own slot instead, carried with the task across worker
//! threads, so spans in concurrent tasks never see each other as parents.
//!
//! Tokio tasks that are not wrapped in [`scope`] still fall back to the
//! thread slot, but an entry there is tagged with the task that wrote it and
//! is invisible to every other task and to plain thread code. Such a task
//! loses its ambient span when another task on the same worker opens one, so
//! async callers that nest spans across `.await` should use [`scope`].

use std::cell::RefCell;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::task::{self, Id};

/// Identity of a span, as seen by its children
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: String,
    pub span_id: String,
}

#[derive(Debug)]
struct ThreadSlot {
    /// Task that wrote `current`; `None` for code outside any task
    owner: Option<Id>,
    current: Option<SpanContext>,
}

thread_local! {
    static THREAD_CURRENT: RefCell<ThreadSlot> = const {
        RefCell::new(ThreadSlot { owner: None, current: None })
    };
}

tokio::task_local! {
    static TASK_CURRENT: RefCell<Option<SpanContext>>;
}

fn in_scope() -> bool {
    TASK_CURRENT.try_with(|_| ()).is_ok()
}

/// The ambient span for the calling task or thread
pub fn current_span() -> Option<SpanContext> {
    if in_scope() {
        return TASK_CURRENT.with(|slot| slot.borrow().clone());
    }
    let owner = task::try_id();
    THREAD_CURRENT.with(|slot| {
        let slot = slot.borrow();
        if slot.owner == owner {
            slot.current.clone()
        } else {
            None
        }
    })
}

/// Make `ctx` ambient, returning whatever was ambient before.
pub(crate) fn replace_current(ctx: Option<SpanContext>) -> Option<SpanContext> {
    if in_scope() {
        return TASK_CURRENT.with(|slot| slot.replace(ctx));
    }
    let owner = task::try_id();
    THREAD_CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        let previous = if slot.owner == owner {
            slot.current.take()
        } else {
            None
        };
        *slot = ThreadSlot {
            owner,
            current: ctx,
        };
        previous
    })
}

/// Put `previous` back, but only while `ctx` is still the ambient span.
///
/// Returns false when the slot no longer holds `ctx`: the closing span was
/// opened on another thread, or another task has taken the slot since.
pub(crate) fn restore_current(ctx: &SpanContext, previous: Option<SpanContext>) -> bool {
    if current_span().as_ref() != Some(ctx) {
        return false;
    }
    replace_current(previous);
    true
}

/// Run `future` with its own ambient slot, seeded with the caller's span.
///
/// Wrap spawned tasks in this so spans they open link to the spawning span
/// and stay invisible to other tasks on the same worker thread.
/// The seed is captured when `scope` is called, not when the future is
/// first polled.
pub fn scope<F: Future>(future: F) -> impl Future<Output = F::Output> {
    TASK_CURRENT.scope(RefCell::new(current_span()), future)
}
