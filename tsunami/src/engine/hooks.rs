//! The hook runtime (spec.md §4.3).
//!
//! Hooks are identified purely by call order: each call against a
//! [`RenderCtx`] claims the next slot in the owning node's `hooks` vector,
//! extending it on first render. This is the same contract `dioxus-core`
//! implements in `Scope::use_hook` (`scope.rs`): "if self.hooks.at_end(),
//! push; otherwise return the next slot" — we keep that shape but store
//! slots as a typed enum instead of `Box<dyn Any>` plus a generic `State`
//! type parameter, since every hook the spec defines has a closed, known
//! shape.

use crate::engine::atom::LOCAL_PREFIX;
use crate::engine::runtime::Engine;
use crate::engine::shadow::NodeHandle;
use crate::engine::value::Value;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Persistent per-slot hook state. `useId`/`useRenderTs`/`useResync` read
/// directly off the render context and so need no slot of their own;
/// `useSetAppTitle` is likewise a direct, non-stateful action (see
/// `DESIGN.md` for why it does not consume a hook index).
pub enum HookSlot {
    Ref(Box<dyn Any + Send>),
    VDomRef(Arc<parking_lot::Mutex<VDomRefState>>),
    Local(String),
    Effect(EffectSlot),
}

/// The `{refId, hasCurrent, position}` handle `useVDomRef()` returns (spec.md
/// §4.3). Shared (not copied) between the component and `apply_ref_update`
/// (runtime.rs) so a ref update actually becomes visible to the next render
/// that reads it, not just to the scheduler that decided to re-render.
#[derive(Default)]
pub struct VDomRefState {
    pub ref_id: String,
    pub has_current: bool,
    pub position: Option<Value>,
}

pub struct EffectSlot {
    pub deps: Option<Vec<Value>>,
    pub unmount: Option<Box<dyn FnOnce() + Send>>,
    pub ran_once: bool,
}

impl Default for EffectSlot {
    fn default() -> Self {
        EffectSlot {
            deps: None,
            unmount: None,
            ran_once: false,
        }
    }
}

/// Carries the current component pointer and a hook-index counter reset to
/// 0 at the start of every render (spec.md §4.3).
pub struct RenderCtx {
    pub node: NodeHandle,
    pub engine: Arc<Engine>,
    pub render_ts: i64,
    pub resync: bool,
    hook_idx: Cell<usize>,
    used_atoms: RefCell<HashSet<String>>,
}

impl RenderCtx {
    pub fn new(node: NodeHandle, engine: Arc<Engine>, render_ts: i64, resync: bool) -> RenderCtx {
        RenderCtx {
            node,
            engine,
            render_ts,
            resync,
            hook_idx: Cell::new(0),
            used_atoms: RefCell::new(HashSet::new()),
        }
    }

    fn next_index(&self) -> usize {
        let idx = self.hook_idx.get();
        self.hook_idx.set(idx + 1);
        idx
    }

    /// Reads an atom's value, recording it as read-during-this-render so
    /// the reconciler can reconcile `usedAtoms` against the atom's
    /// `usedBy` set once the render call returns (spec.md §4.2).
    pub fn get_atom(&self, name: &str) -> Value {
        self.used_atoms.borrow_mut().insert(name.to_string());
        self.engine.atoms.get(name)
    }

    pub fn set_atom(&self, name: &str, value: Value) -> crate::engine::error::EngineResult<()> {
        self.engine.atoms.set(name, value)
    }

    /// Called by the reconciler after the render function returns; takes
    /// the atoms read during this single render call.
    pub fn take_used_atoms(&self) -> HashSet<String> {
        self.used_atoms.borrow().clone()
    }

    /// `useId()`.
    pub fn use_id(&self) -> Uuid {
        self.node.lock().wave_id
    }

    /// `useRenderTs()`.
    pub fn use_render_ts(&self) -> i64 {
        self.render_ts
    }

    /// `useResync()`.
    pub fn use_resync(&self) -> bool {
        self.resync
    }

    /// `useSetAppTitle(s)`. Legal only from the component whose tag matches
    /// the configured root component name; otherwise logs and no-ops
    /// (spec.md §4.3).
    pub fn use_set_app_title(&self, title: impl Into<String>) {
        let tag = self.node.lock().tag.clone();
        if tag == self.engine.root_tag {
            *self.engine.app_title.lock() = title.into();
        } else {
            warn!(component = %tag, "useSetAppTitle called from a non-root component; ignoring");
        }
    }

    /// `useRef(initial)`: mutable slot of arbitrary type, identity
    /// preserved across renders.
    pub fn use_ref<T, F>(&self, initial: F) -> Arc<parking_lot::Mutex<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T,
    {
        let idx = self.next_index();
        let mut node = self.node.lock();
        if idx == node.hooks.len() {
            node.hooks
                .push(HookSlot::Ref(Box::new(Arc::new(parking_lot::Mutex::new(initial())))));
        }
        match &node.hooks[idx] {
            HookSlot::Ref(boxed) => boxed
                .downcast_ref::<Arc<parking_lot::Mutex<T>>>()
                .expect(HOOK_ORDER_ERR)
                .clone(),
            _ => panic!("{HOOK_ORDER_ERR}"),
        }
    }

    /// `useVDomRef()`: a DOM-ref handle the peer reports presence/geometry
    /// back into via ref updates. Returns the shared handle itself (not just
    /// its id) so the component can read `has_current`/`position` after
    /// `apply_ref_update` (runtime.rs) writes them in.
    pub fn use_vdom_ref(&self) -> Arc<parking_lot::Mutex<VDomRefState>> {
        let idx = self.next_index();
        let mut node = self.node.lock();
        if idx == node.hooks.len() {
            let ref_id = format!("{}:{}", node.wave_id, idx);
            node.hooks.push(HookSlot::VDomRef(Arc::new(parking_lot::Mutex::new(VDomRefState {
                ref_id,
                ..Default::default()
            }))));
        }
        match &node.hooks[idx] {
            HookSlot::VDomRef(state) => state.clone(),
            _ => panic!("{HOOK_ORDER_ERR}"),
        }
    }

    /// `useLocal(initial)`: creates (once) a private atom named
    /// `$local.<waveId>#<hookIdx>` and returns its name. The atom is
    /// destroyed when the owning component unmounts (spec.md §3, §4.3).
    pub fn use_local(&self, initial: Value) -> String {
        let idx = self.next_index();
        let (created_name, wave_id) = {
            let mut node = self.node.lock();
            let wave_id = node.wave_id;
            if idx == node.hooks.len() {
                let name = format!("{LOCAL_PREFIX}{wave_id}#{idx}");
                node.hooks.push(HookSlot::Local(name.clone()));
                (Some(name), wave_id)
            } else {
                (None, wave_id)
            }
        };
        if let Some(name) = created_name {
            self.engine
                .atoms
                .register(&name, initial, Default::default())
                .expect("local atom names are unique by construction");
            let _ = wave_id;
        }
        let node = self.node.lock();
        match &node.hooks[idx] {
            HookSlot::Local(name) => name.clone(),
            _ => panic!("{HOOK_ORDER_ERR}"),
        }
    }

    /// `useEffect(fn, deps)`: enqueues `fn` to run after the current render
    /// pass when this is the first render, `deps` is `None` (always-run),
    /// or `deps` differs element-wise from the prior invocation.
    pub fn use_effect<F>(&self, effect: F, deps: Option<Vec<Value>>)
    where
        F: FnOnce() -> Option<Box<dyn FnOnce() + Send>> + Send + 'static,
    {
        let idx = self.next_index();
        let should_run = {
            let mut node = self.node.lock();
            if idx == node.hooks.len() {
                node.hooks.push(HookSlot::Effect(EffectSlot::default()));
            }
            match &mut node.hooks[idx] {
                HookSlot::Effect(slot) => {
                    let should_run = !slot.ran_once || deps.is_none() || slot.deps != deps;
                    slot.ran_once = true;
                    slot.deps = deps;
                    should_run
                }
                _ => panic!("{HOOK_ORDER_ERR}"),
            }
        };

        if should_run {
            self.engine.effects.enqueue(self.node.clone(), idx, Box::new(effect));
        }
    }
}

const HOOK_ORDER_ERR: &str = "hook call order changed between renders: hooks must be called unconditionally and in the same order every render";
