//! Per-thread-of-execution context markers (spec.md §4.3 "Implicit context
//! discovery", §9 "Goroutines and contexts").
//!
//! Render, event and effect dispatch all run synchronously to completion
//! under the render lock (spec.md §5), so a plain thread-local is a faithful
//! stand-in for the "current goroutine" marker the original engine keeps:
//! nothing here ever awaits while a context is armed. An *unarmed* thread
//! (no context set) is already, by construction, the "async" case spec.md
//! §4.2 calls out — but application code that spawns its own background
//! task to mutate atoms can arm `ContextKind::Async` explicitly via
//! [`with_async_context`], so `inContextType()` reports it rather than
//! `None` for code that knows it's running off-band.

use std::cell::Cell;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    Render,
    Event,
    Effect,
    Async,
}

thread_local! {
    static CURRENT: Cell<Option<ContextKind>> = Cell::new(None);
}

/// Returns the context the calling code is presently running under, or
/// `None` if no context has been armed — which carries the same "treat as
/// async" meaning as an explicit `Some(ContextKind::Async)` for the purposes
/// of notify-batcher routing, but distinguishes "nobody bothered to tag this
/// task" from "this task is deliberately marked as the goroutine-equivalent
/// case".
pub fn in_context_type() -> Option<ContextKind> {
    CURRENT.with(|c| c.get())
}

/// True when no render/event/effect context is armed — the write must have
/// originated off a goroutine-equivalent (a spawned task) and should notify
/// the async batcher (spec.md §4.2 "Write -> render scheduling").
pub fn is_async_context() -> bool {
    !matches!(in_context_type(), Some(ContextKind::Render) | Some(ContextKind::Event) | Some(ContextKind::Effect))
}

/// Runs `f` with `ContextKind::Async` armed. Application code that spawns a
/// background task to write atoms off the render/event/effect path (spec.md
/// §9 "Goroutines and contexts") should wrap that task's body in this, the
/// same way the engine wraps render/event/effect entry points in
/// [`with_context`] — it's the one context whose *absence* would otherwise
/// be indistinguishable from simply never having entered a context at all.
pub fn with_async_context<R>(f: impl FnOnce() -> R) -> R {
    with_context(ContextKind::Async, f)
}

/// RAII guard that arms a context marker for its lifetime and restores the
/// previous value on drop (contexts can legitimately nest, e.g. an effect
/// that triggers a synchronous re-render).
pub struct ContextGuard {
    previous: Option<ContextKind>,
}

impl ContextGuard {
    pub fn enter(kind: ContextKind) -> ContextGuard {
        let previous = CURRENT.with(|c| c.replace(Some(kind)));
        ContextGuard { previous }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| c.set(self.previous));
    }
}

pub fn with_context<R>(kind: ContextKind, f: impl FnOnce() -> R) -> R {
    let _guard = ContextGuard::enter(kind);
    f()
}
