//! The atom store (spec.md §3 "Atom", §4.2 "Atom store & dependency
//! tracking").
//!
//! Grounded on `dioxus-hooks`'s `use_shared_state` (`ProvidedStateInner`,
//! `consumers: HashSet<ScopeId>`, `notify_consumers`): an atom is a value
//! cell plus a consumer set, and writing it walks the consumer set to
//! schedule re-renders. We generalize that single-process-wide-state
//! pattern into named, independently-locked cells with typed
//! adapt-on-write semantics and render-vs-async write routing, since
//! spec.md needs many atoms (not one `provide_context` per type) with a
//! reserved-prefix naming scheme.

use crate::engine::context::is_async_context;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::notify::NotifyBatcher;
use crate::engine::value::Value;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

pub const DATA_PREFIX: &str = "$data.";
pub const CONFIG_PREFIX: &str = "$config.";
pub const LOCAL_PREFIX: &str = "$local.";

/// Declared-type metadata for schema export (spec.md §4.9).
#[derive(Clone, Debug, Default)]
pub struct AtomMeta {
    pub description: Option<String>,
    pub units: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub r#enum: Option<Vec<Value>>,
    pub pattern: Option<String>,
}

/// Adapts a candidate write into the atom's declared type and back,
/// returning the re-serialized [`Value`] on success (spec.md §4.2
/// "adaptation path ... (ii) otherwise round-trip through a structured
/// serialization (JSON) to convert"). `$data.*`/`$config.*` atoms carry one,
/// captured at registration from the Rust type they were declared against;
/// `$local.*` atoms (opaque, no declared type) carry none.
pub type Validator = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

struct AtomCell {
    value: Value,
    zero_value: Value,
    used_by: HashSet<Uuid>,
    meta: AtomMeta,
    validator: Option<Validator>,
}

/// One registered atom's lock is independent of every other atom's
/// (spec.md §5 "Each atom owns an independent lock"); we model that with a
/// per-name `RwLock` rather than one lock guarding the whole map, so two
/// unrelated atoms never serialize against each other.
struct AtomSlot {
    cell: RwLock<AtomCell>,
}

#[derive(Default)]
pub struct AtomStore {
    // The map of names to slots is itself guarded by a lock, but that lock
    // is only ever held for the short map lookup/insert, never across a
    // value read/write.
    slots: RwLock<BTreeMap<String, Arc<AtomSlot>>>,
    render_needs: Arc<RenderNeeds>,
    notify: Arc<NotifyBatcher>,
}

/// The render-needs set (spec.md §5 "The render-needs set has its own lock
/// and is append-only between drains").
#[derive(Default)]
pub struct RenderNeeds {
    pending: RwLock<HashSet<Uuid>>,
}

impl RenderNeeds {
    pub fn add(&self, wave_id: Uuid) {
        self.pending.write().insert(wave_id);
    }

    pub fn add_all(&self, wave_ids: impl IntoIterator<Item = Uuid>) {
        let mut set = self.pending.write();
        set.extend(wave_ids);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.read().is_empty()
    }

    /// Drains the set, returning everything accumulated since the last
    /// drain.
    pub fn drain(&self) -> HashSet<Uuid> {
        std::mem::take(&mut *self.pending.write())
    }
}

impl AtomStore {
    pub fn new(render_needs: Arc<RenderNeeds>, notify: Arc<NotifyBatcher>) -> AtomStore {
        AtomStore {
            slots: RwLock::new(BTreeMap::new()),
            render_needs,
            notify,
        }
    }

    /// `RegisterAtom(name, atom)` (spec.md §4.2). Duplicate registration is
    /// fatal at registration time, matching the spec. No validator: writes
    /// are accepted as-is. Used for `$local.*` atoms, which have no
    /// declared type.
    pub fn register(&self, name: &str, initial: Value, meta: AtomMeta) -> EngineResult<()> {
        self.register_validated(name, initial, meta, None)
    }

    /// As [`register`](Self::register), but attaches a validator derived
    /// from the atom's declared Rust type (spec.md §4.2 adaptation path).
    /// Used for `$data.*`/`$config.*` atoms.
    pub fn register_validated(
        &self,
        name: &str,
        initial: Value,
        meta: AtomMeta,
        validator: Option<Validator>,
    ) -> EngineResult<()> {
        let mut slots = self.slots.write();
        if slots.contains_key(name) {
            return Err(EngineError::DuplicateAtom(name.to_string()));
        }
        slots.insert(
            name.to_string(),
            Arc::new(AtomSlot {
                cell: RwLock::new(AtomCell {
                    value: initial.clone(),
                    zero_value: zero_value_like(&initial),
                    used_by: HashSet::new(),
                    meta,
                    validator,
                }),
            }),
        );
        Ok(())
    }

    pub fn unregister(&self, name: &str) {
        self.slots.write().remove(name);
    }

    fn slot(&self, name: &str) -> Option<Arc<AtomSlot>> {
        self.slots.read().get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.slots.read().contains_key(name)
    }

    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.slots
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// `GetAtomVal(name)`. Unknown atoms are ignored (spec.md §7),
    /// returning `Value::Null`.
    pub fn get(&self, name: &str) -> Value {
        match self.slot(name) {
            Some(slot) => slot.cell.read().value.clone(),
            None => Value::Null,
        }
    }

    pub fn meta(&self, name: &str) -> Option<AtomMeta> {
        self.slot(name).map(|slot| slot.cell.read().meta.clone())
    }

    /// `SetAtomVal(name, value)`. A `Null` input resets to the zero value.
    /// Otherwise the value is adapted through the atom's validator, if any
    /// (spec.md §4.2); a type mismatch that survives the round-trip is
    /// returned to the caller rather than committed. On a successful
    /// write, every recorded reader is pushed onto the render-needs set;
    /// if the write is happening off a render/event/effect context, the
    /// async-notify batcher is also poked (spec.md §4.2 "Write -> render
    /// scheduling").
    pub fn set(&self, name: &str, value: Value) -> EngineResult<()> {
        let slot = self
            .slot(name)
            .ok_or_else(|| EngineError::UnknownAtom(name.to_string()))?;

        let readers: Vec<Uuid> = {
            let mut cell = slot.cell.write();
            let adapted = if value.is_null() {
                cell.zero_value.clone()
            } else if let Some(validator) = cell.validator.clone() {
                validator(&value).map_err(|reason| EngineError::AtomAdaptation {
                    name: name.to_string(),
                    reason,
                })?
            } else {
                value
            };
            cell.value = adapted;
            cell.used_by.iter().copied().collect()
        };

        self.render_needs.add_all(readers);
        if is_async_context() {
            self.notify.notify();
        }
        Ok(())
    }

    pub fn set_used_by(&self, name: &str, wave_id: Uuid, used: bool) {
        if let Some(slot) = self.slot(name) {
            let mut cell = slot.cell.write();
            if used {
                cell.used_by.insert(wave_id);
            } else {
                cell.used_by.remove(&wave_id);
            }
        }
    }

    pub fn used_by(&self, name: &str) -> HashSet<Uuid> {
        self.slot(name)
            .map(|slot| slot.cell.read().used_by.clone())
            .unwrap_or_default()
    }

    /// Reconciles a component's freshly-computed `usedAtoms` set against
    /// every atom's `usedBy` set (spec.md §4.2 "Usage tracking invariant").
    pub fn reconcile_usage(&self, wave_id: Uuid, previously_used: &HashSet<String>, now_used: &HashSet<String>) {
        for name in now_used.difference(previously_used) {
            self.set_used_by(name, wave_id, true);
        }
        for name in previously_used.difference(now_used) {
            self.set_used_by(name, wave_id, false);
        }
    }

    /// Removes every `usedBy` entry for a component that has unmounted, and
    /// drops its private (`$local.*`) atoms entirely.
    pub fn purge_component(&self, wave_id: Uuid, used_atoms: &HashSet<String>) {
        for name in used_atoms {
            self.set_used_by(name, wave_id, false);
        }
        let local_prefix = format!("{LOCAL_PREFIX}{wave_id}#");
        let to_remove: Vec<String> = self.names_with_prefix(&local_prefix);
        for name in to_remove {
            self.unregister(&name);
        }
    }
}

fn zero_value_like(v: &Value) -> Value {
    match v {
        Value::Null => Value::Null,
        Value::Bool(_) => Value::Bool(false),
        Value::Number(_) => Value::Number(0.0),
        Value::String(_) => Value::String(String::new()),
        Value::List(_) => Value::List(Vec::new()),
        Value::Map(_) => Value::Map(Default::default()),
    }
}
