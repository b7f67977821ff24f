//! The shadow tree (spec.md §3 "Shadow component", §4.1 "Shadow tree &
//! reconciler").
//!
//! Each node is owned by its parent (a `Vec` of children, or a single
//! `renderedComp` slot) and indexed, by `waveId`, in a flat `CompMap` that
//! holds only weak references — removal from the tree is removal from the
//! map for free, matching spec.md §9's "Cycle avoidance" note.
//!
//! Nodes are `Arc<Mutex<..>>` rather than dioxus-core's arena-allocated,
//! `Rc`-based `Scope` (see `scope.rs` in the teacher crate) because spec.md
//! §5 requires the engine to be genuinely multi-threaded — atom writes,
//! SSE fan-out and async-notify all run concurrently with render, so shadow
//! nodes must be `Send`/`Sync` to be shared across the executor's worker
//! threads.

use crate::engine::element::Element;
use crate::engine::hooks::HookSlot;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use uuid::Uuid;

pub type NodeHandle = Arc<Mutex<ShadowNode>>;
pub type WeakNodeHandle = Weak<Mutex<ShadowNode>>;

/// Exactly one of these three is populated at a time (spec.md §3
/// invariants, §8 "exactly one of text/children/renderedComp").
pub enum Content {
    Text(String),
    Children(Vec<NodeHandle>),
    Custom(Option<NodeHandle>),
}

impl Content {
    pub fn empty_children() -> Content {
        Content::Children(Vec::new())
    }
}

pub struct ShadowNode {
    pub wave_id: Uuid,
    pub tag: String,
    pub key: String,
    pub elem: Element,
    pub hooks: Vec<HookSlot>,
    pub containing_comp: String,
    pub used_atoms: HashSet<String>,
    pub content: Content,
}

impl ShadowNode {
    pub fn new(tag: String, key: String, elem: Element, containing_comp: String) -> ShadowNode {
        ShadowNode {
            wave_id: Uuid::new_v4(),
            tag,
            key,
            elem,
            hooks: Vec::new(),
            containing_comp,
            used_atoms: HashSet::new(),
            content: Content::empty_children(),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.content, Content::Custom(_))
    }
}

/// Flat index by `waveId` (spec.md §3 invariants: "Every shadow node
/// appears in a global compMap keyed by waveId; removal from the tree
/// removes from the map."). Stores only `Weak` handles: liveness is owned
/// entirely by the tree, the map never keeps a node alive past unmount.
#[derive(Default)]
pub struct CompMap {
    inner: HashMap<Uuid, WeakNodeHandle>,
}

impl CompMap {
    pub fn new() -> CompMap {
        CompMap::default()
    }

    pub fn insert(&mut self, handle: &NodeHandle) {
        let wave_id = handle.lock().wave_id;
        self.inner.insert(wave_id, Arc::downgrade(handle));
    }

    pub fn get(&self, wave_id: Uuid) -> Option<NodeHandle> {
        self.inner.get(&wave_id).and_then(Weak::upgrade)
    }

    pub fn remove(&mut self, wave_id: Uuid) {
        self.inner.remove(&wave_id);
    }

    /// Drops entries whose node has actually been freed. Safe to call
    /// lazily; `get` already self-heals on a dead weak ref, this just
    /// reclaims map memory.
    pub fn gc(&mut self) {
        self.inner.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
