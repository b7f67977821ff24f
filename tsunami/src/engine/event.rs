//! The event dispatcher (spec.md §4.5).
//!
//! Grounded on `dioxus-core`'s `Scope::call_listener` (`scope.rs`): look up
//! the target by id, find the matching listener/prop, and invoke it -
//! generalized here to local (per-node) and global events, and wrapped in
//! the same panic-isolation `effect.rs` uses for effect bodies, since
//! spec.md requires both paths to be "panic-guarded with a diagnostic".

use crate::engine::context::{with_context, ContextKind};
use crate::engine::effect::describe_panic;
use crate::engine::runtime::Engine;
use crate::engine::value::Value;
use std::panic::AssertUnwindSafe;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct LocalEvent {
    pub wave_id: Uuid,
    pub event_type: String,
    pub payload: Value,
}

#[derive(Clone, Debug)]
pub struct GlobalEvent {
    pub global_event_type: String,
    pub payload: Value,
}

#[derive(Clone, Debug)]
pub enum InboundEvent {
    Local(LocalEvent),
    Global(GlobalEvent),
}

/// Dispatches one inbound event. Always runs under an `Event` context so
/// atom writes triggered from inside a handler are recorded as
/// render-path, not async-path, writes (spec.md §4.2, §5).
pub fn dispatch(engine: &Engine, event: InboundEvent) {
    with_context(ContextKind::Event, || match event {
        InboundEvent::Local(ev) => dispatch_local(engine, ev),
        InboundEvent::Global(ev) => dispatch_global(engine, ev),
    });
}

fn dispatch_local(engine: &Engine, ev: LocalEvent) {
    let Some(node) = engine.comp_map.lock().get(ev.wave_id) else {
        warn!(wave_id = %ev.wave_id, "event targets a waveId with no live shadow node; ignoring");
        return;
    };

    let (handler, tag, containing) = {
        let guard = node.lock();
        let handler = guard
            .elem
            .props
            .get(&ev.event_type)
            .and_then(|p| p.as_handler())
            .cloned();
        (handler, guard.tag.clone(), guard.containing_comp.clone())
    };

    let Some(handler) = handler else {
        warn!(
            wave_id = %ev.wave_id,
            tag = %tag,
            event_type = %ev.event_type,
            "no handler prop matches this event; ignoring"
        );
        return;
    };

    let payload = ev.payload;
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(payload)));
    if let Err(panic) = outcome {
        error!(
            component = %containing,
            tag = %tag,
            prop = %ev.event_type,
            panic = %describe_panic(panic),
            "panic inside event handler; swallowed"
        );
    }
}

fn dispatch_global(engine: &Engine, ev: GlobalEvent) {
    let handler = engine
        .global_handlers
        .lock()
        .get(&ev.global_event_type)
        .cloned();

    let Some(handler) = handler else {
        warn!(global_event_type = %ev.global_event_type, "no global handler registered; ignoring");
        return;
    };

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(ev.payload)));
    if let Err(panic) = outcome {
        error!(
            global_event_type = %ev.global_event_type,
            panic = %describe_panic(panic),
            "panic inside global event handler; swallowed"
        );
    }
}
