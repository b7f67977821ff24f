//! The effect scheduler (spec.md §4.4).
//!
//! Mirrors the two-phase "pending_effects" drain `dioxus-core`'s
//! `Scope::run_effects` performs (`scope.rs`), generalized to the
//! cleanup-then-run ordering and dependency-gated re-entry spec.md
//! requires: every queued entry's previous unmount runs before any new
//! `fn` runs, and a render that leaves the render-needs set non-empty
//! triggers one more pass.

use crate::engine::hooks::HookSlot;
use crate::engine::shadow::NodeHandle;
use std::panic::AssertUnwindSafe;
use tracing::error;

type EffectFn = Box<dyn FnOnce() -> Option<Box<dyn FnOnce() + Send>> + Send>;

struct EffectEntry {
    node: NodeHandle,
    hook_idx: usize,
    effect: EffectFn,
}

#[derive(Default)]
pub struct EffectQueue {
    pending: parking_lot::Mutex<Vec<EffectEntry>>,
}

impl EffectQueue {
    pub fn enqueue(&self, node: NodeHandle, hook_idx: usize, effect: EffectFn) {
        self.pending.lock().push(EffectEntry { node, hook_idx, effect });
    }

    fn drain(&self) -> Vec<EffectEntry> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Runs every queued effect's cleanup phase, then every queued effect's
    /// body, in that order (spec.md §4.4 steps 1-3). Panics in either phase
    /// are caught and logged with the owning component's tag; they never
    /// abort the batch.
    pub fn run_pending(&self) {
        let entries = self.drain();

        for entry in &entries {
            let unmount = {
                let mut node = entry.node.lock();
                let tag = node.tag.clone();
                match node.hooks.get_mut(entry.hook_idx) {
                    Some(HookSlot::Effect(slot)) => slot.unmount.take(),
                    _ => {
                        error!(component = %tag, "effect hook slot missing at cleanup time");
                        None
                    }
                }
            };
            if let Some(unmount) = unmount {
                let tag = entry.node.lock().tag.clone();
                crate::engine::context::with_context(crate::engine::context::ContextKind::Effect, || {
                    run_guarded(&tag, move || unmount());
                });
            }
        }

        for entry in entries {
            let tag = entry.node.lock().tag.clone();
            let result = crate::engine::context::with_context(crate::engine::context::ContextKind::Effect, || {
                run_guarded_returning(&tag, entry.effect)
            });
            if let Some(Some(new_unmount)) = result {
                let mut node = entry.node.lock();
                if let Some(HookSlot::Effect(slot)) = node.hooks.get_mut(entry.hook_idx) {
                    slot.unmount = Some(new_unmount);
                }
            }
        }
    }

    /// Runs and clears a single node's outstanding effect unmounts
    /// immediately; used when the component itself is being unmounted
    /// (spec.md §3 "Shadow component" lifecycle: "its hook unmount
    /// callbacks run on removal").
    pub fn run_unmounts_for_node(&self, node: &NodeHandle) {
        let tag = node.lock().tag.clone();
        let unmounts: Vec<Box<dyn FnOnce() + Send>> = {
            let mut guard = node.lock();
            guard
                .hooks
                .iter_mut()
                .filter_map(|slot| match slot {
                    HookSlot::Effect(effect) => effect.unmount.take(),
                    _ => None,
                })
                .collect()
        };
        crate::engine::context::with_context(crate::engine::context::ContextKind::Effect, || {
            for unmount in unmounts {
                run_guarded(&tag, move || unmount());
            }
        });
    }
}

fn run_guarded(tag: &str, f: impl FnOnce() + Send) {
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        error!(component = %tag, panic = %describe_panic(payload), "panic inside effect; swallowed");
    }
}

fn run_guarded_returning<T>(tag: &str, f: impl FnOnce() -> T + Send) -> Option<T> {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Some(v),
        Err(payload) => {
            error!(component = %tag, panic = %describe_panic(payload), "panic inside effect; swallowed");
            None
        }
    }
}

pub fn describe_panic(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::element::Element;
    use crate::engine::hooks::RenderCtx;
    use crate::engine::runtime::Engine;
    use crate::engine::shadow::ShadowNode;
    use crate::engine::value::Value;
    use std::sync::Arc;

    fn test_node() -> NodeHandle {
        Arc::new(parking_lot::Mutex::new(ShadowNode::new(
            "App".to_string(),
            String::new(),
            Element::tag("div"),
            "App".to_string(),
        )))
    }

    fn render_ctx(engine: &Arc<Engine>, node: &NodeHandle) -> RenderCtx {
        RenderCtx::new(node.clone(), engine.clone(), 0, false)
    }

    /// spec.md §8 scenario 3: `useEffect(fn, [x])` across renders with
    /// `x = 1, 1, 2` runs `fn` at renders 1 and 3 only, and the unmount
    /// returned by render 1's `fn` runs exactly once, immediately before
    /// render 3's `fn` executes.
    #[test]
    fn effect_reruns_only_when_deps_change_and_cleans_up_first() {
        let engine = Engine::new("App");
        let node = test_node();

        let runs = Arc::new(parking_lot::Mutex::new(Vec::<i64>::new()));
        let unmounts = Arc::new(parking_lot::Mutex::new(Vec::<i64>::new()));

        let mut run_effect = |x: i64| {
            let ctx = render_ctx(&engine, &node);
            let runs = runs.clone();
            let unmounts = unmounts.clone();
            ctx.use_effect(
                move || {
                    runs.lock().push(x);
                    let unmounts = unmounts.clone();
                    Some(Box::new(move || unmounts.lock().push(x)) as Box<dyn FnOnce() + Send>)
                },
                Some(vec![Value::Number(x as f64)]),
            );
            engine.effects.run_pending();
        };

        run_effect(1);
        assert_eq!(*runs.lock(), vec![1]);
        assert_eq!(*unmounts.lock(), Vec::<i64>::new());

        run_effect(1);
        assert_eq!(*runs.lock(), vec![1], "unchanged deps must not re-run the effect");
        assert_eq!(*unmounts.lock(), Vec::<i64>::new());

        run_effect(2);
        assert_eq!(*runs.lock(), vec![1, 2]);
        assert_eq!(
            *unmounts.lock(),
            vec![1],
            "render 1's unmount must run exactly once, before render 3's fn"
        );
    }

    /// An effect with no deps (`None`) re-runs, with its cleanup, on every
    /// render (spec.md §4.4 "always-run").
    #[test]
    fn effect_with_no_deps_reruns_every_render() {
        let engine = Engine::new("App");
        let node = test_node();
        let runs = Arc::new(parking_lot::Mutex::new(0));
        let unmounts = Arc::new(parking_lot::Mutex::new(0));

        let mut run_effect = || {
            let ctx = render_ctx(&engine, &node);
            let runs = runs.clone();
            let unmounts = unmounts.clone();
            ctx.use_effect(
                move || {
                    *runs.lock() += 1;
                    let unmounts = unmounts.clone();
                    Some(Box::new(move || *unmounts.lock() += 1) as Box<dyn FnOnce() + Send>)
                },
                None,
            );
            engine.effects.run_pending();
        };

        run_effect();
        run_effect();
        run_effect();

        assert_eq!(*runs.lock(), 3);
        assert_eq!(*unmounts.lock(), 2, "each render but the first must clean up the previous run");
    }

    /// `run_unmounts_for_node` runs every outstanding unmount on a node once
    /// and takes them, so a second call is a no-op (spec.md §3 "its hook
    /// unmount callbacks run on removal").
    #[test]
    fn run_unmounts_for_node_runs_once_and_clears() {
        let engine = Engine::new("App");
        let node = test_node();
        let count = Arc::new(parking_lot::Mutex::new(0));

        {
            let ctx = render_ctx(&engine, &node);
            let count = count.clone();
            ctx.use_effect(
                move || {
                    let count = count.clone();
                    Some(Box::new(move || *count.lock() += 1) as Box<dyn FnOnce() + Send>)
                },
                None,
            );
            engine.effects.run_pending();
        }

        engine.effects.run_unmounts_for_node(&node);
        assert_eq!(*count.lock(), 1);

        engine.effects.run_unmounts_for_node(&node);
        assert_eq!(*count.lock(), 1, "second call must not re-run an already-taken unmount");
    }

    /// A panic inside an effect body is caught and does not prevent later
    /// queued effects from running (spec.md §4.4 "panics are swallowed").
    #[test]
    fn panic_inside_effect_is_swallowed_and_does_not_block_the_batch() {
        let engine = Engine::new("App");
        let node_a = test_node();
        let node_b = test_node();
        let ran_b = Arc::new(parking_lot::Mutex::new(false));

        {
            let ctx_a = render_ctx(&engine, &node_a);
            ctx_a.use_effect(|| panic!("boom"), None);
        }
        {
            let ctx_b = render_ctx(&engine, &node_b);
            let ran_b = ran_b.clone();
            ctx_b.use_effect(
                move || {
                    *ran_b.lock() = true;
                    None
                },
                None,
            );
        }

        engine.effects.run_pending();
        assert!(*ran_b.lock(), "a panicking effect must not stop the rest of the batch from running");
    }
}
