//! The engine's shared, process-wide state (spec.md §5).
//!
//! `Engine` plays the role `dioxus-core`'s `VirtualDom` plays in the
//! teacher crate - the single handle every hook, reconciler call and
//! transport handler closes over - but is built from `Arc`/lock-guarded
//! fields instead of a `Rc`-based arena, because spec.md requires genuine
//! multi-threading rather than the single-task-local-set model
//! `dioxus-liveview` uses to host a `!Send` `VirtualDom`.

use crate::engine::atom::{AtomStore, RenderNeeds, Validator};
use crate::engine::effect::EffectQueue;
use crate::engine::element::Element;
use crate::engine::hooks::RenderCtx;
use crate::engine::modal::ModalRegistry;
use crate::engine::notify::NotifyBatcher;
use crate::engine::schema::SchemaRegistry;
use crate::engine::shadow::{CompMap, NodeHandle};
use crate::engine::transport::sse::SseHub;
use crate::engine::value::{Handler, Props, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Builds a [`Validator`] that round-trips a write through `T`'s
/// `Deserialize`/`Serialize` impls (spec.md §4.2 adaptation path (ii)).
fn type_validator<T>() -> Validator
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    Arc::new(|value: &Value| {
        let parsed: T = value.adapt()?;
        Value::from_serialize(&parsed)
    })
}

/// What a component render function returns, before the reconciler
/// normalizes it to "zero, one, or a fragment" (spec.md §9).
pub enum RenderReturn {
    None,
    Single(Element),
    Fragment(Vec<Element>),
}

pub type ComponentFn = Arc<dyn Fn(&RenderCtx, &Props) -> RenderReturn + Send + Sync>;

pub struct EngineConfig {
    pub listen_addr: String,
    pub cors_allow: Vec<String>,
    pub debug: bool,
    pub root_tag: String,
    pub favicon_path: Option<String>,
    pub global_keyboard_events: bool,
    pub short_desc: Option<String>,
}

impl EngineConfig {
    /// Reads `TSUNAMI_LISTENADDR`, `TSUNAMI_CORS`, `TSUNAMI_DEBUG`
    /// (spec.md §6).
    pub fn from_env(root_tag: impl Into<String>) -> EngineConfig {
        EngineConfig {
            listen_addr: std::env::var("TSUNAMI_LISTENADDR").unwrap_or_else(|_| "localhost:0".to_string()),
            cors_allow: std::env::var("TSUNAMI_CORS")
                .ok()
                .map(|s| s.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect())
                .unwrap_or_default(),
            debug: std::env::var("TSUNAMI_DEBUG").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false),
            root_tag: root_tag.into(),
            favicon_path: None,
            global_keyboard_events: false,
            short_desc: None,
        }
    }
}

pub struct Engine {
    pub config: EngineConfig,
    pub root_tag: String,
    /// Process-wide identity sent back as `serverId` on every backend
    /// update, so a peer can tell it reconnected to a fresh process.
    pub server_id: Uuid,
    pub app_title: Mutex<String>,
    pub comp_map: Mutex<CompMap>,
    pub atoms: AtomStore,
    pub render_needs: Arc<RenderNeeds>,
    pub notify: Arc<NotifyBatcher>,
    pub effects: EffectQueue,
    pub modals: ModalRegistry,
    pub schemas: SchemaRegistry,
    pub sse: Arc<SseHub>,
    pub components: Mutex<HashMap<String, ComponentFn>>,
    pub global_handlers: Mutex<HashMap<String, Handler>>,
    /// Serializes the render-path critical section end to end: events ->
    /// ref updates -> render -> effect cleanup -> effect run -> optional
    /// re-render (spec.md §4.1, §5). Held only across synchronous work -
    /// nothing under it ever awaits.
    pub render_lock: Mutex<()>,
    pub tree: Mutex<Option<NodeHandle>>,
    pub client_id: Mutex<Option<String>>,
    pub manifest: Mutex<Option<serde_json::Value>>,
    /// Fires once when the engine should begin a graceful shutdown (spec.md
    /// §5 "The process-level context cancels on shutdown").
    pub shutdown: tokio::sync::Notify,
}

impl Engine {
    pub fn new(root_tag: impl Into<String>) -> Arc<Engine> {
        let root_tag = root_tag.into();
        let render_needs = Arc::new(RenderNeeds::default());
        let notify = Arc::new(NotifyBatcher::default());
        Arc::new(Engine {
            config: EngineConfig::from_env(root_tag.clone()),
            server_id: Uuid::new_v4(),
            app_title: Mutex::new(String::new()),
            root_tag,
            comp_map: Mutex::new(CompMap::new()),
            atoms: AtomStore::new(render_needs.clone(), notify.clone()),
            render_needs,
            notify,
            effects: EffectQueue::default(),
            modals: ModalRegistry::default(),
            schemas: SchemaRegistry::default(),
            sse: Arc::new(SseHub::default()),
            components: Mutex::new(HashMap::new()),
            global_handlers: Mutex::new(HashMap::new()),
            render_lock: Mutex::new(()),
            tree: Mutex::new(None),
            client_id: Mutex::new(None),
            manifest: Mutex::new(None),
            shutdown: tokio::sync::Notify::new(),
        })
    }

    /// Initiates shutdown (spec.md §4.7 `dispose`, §5). Idempotent: a
    /// second call is a harmless re-notify.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub fn register_component(&self, tag: impl Into<String>, f: ComponentFn) {
        self.components.lock().insert(tag.into(), f);
    }

    pub fn register_global_handler(&self, global_event_type: impl Into<String>, handler: Handler) {
        self.global_handlers.lock().insert(global_event_type.into(), handler);
    }

    pub fn lookup_component(&self, tag: &str) -> Option<ComponentFn> {
        self.components.lock().get(tag).cloned()
    }

    pub fn register_data_atom<T>(&self, short_name: &str, initial: T, meta: crate::engine::atom::AtomMeta)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + schemars::JsonSchema + Send + Sync + 'static,
    {
        let full_name = format!("{}{}", crate::engine::atom::DATA_PREFIX, short_name);
        let value = Value::from_serialize(&initial).expect("atom initial value must serialize");
        self.atoms
            .register_validated(&full_name, value, meta, Some(type_validator::<T>()))
            .expect("duplicate atom registration");
        self.schemas.capture::<T>(&full_name);
    }

    pub fn register_config_atom<T>(&self, short_name: &str, initial: T, meta: crate::engine::atom::AtomMeta)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + schemars::JsonSchema + Send + Sync + 'static,
    {
        let full_name = format!("{}{}", crate::engine::atom::CONFIG_PREFIX, short_name);
        let value = Value::from_serialize(&initial).expect("atom initial value must serialize");
        self.atoms
            .register_validated(&full_name, value, meta, Some(type_validator::<T>()))
            .expect("duplicate atom registration");
        self.schemas.capture::<T>(&full_name);
    }

    /// `ShowModal(config)` (spec.md §4.8): files the modal and pushes the
    /// peer-facing `showmodal` SSE event in the same step, so callers never
    /// have to remember to notify the transport layer themselves. If the
    /// push can't reach a live peer (no connection, or its channel is full),
    /// the modal can never be answered, so it is immediately resolved to a
    /// cancelled result instead of leaking a receiver nobody will ever
    /// satisfy (spec.md §7 "Resource errors").
    pub fn show_modal(&self, config: serde_json::Value) -> tokio::sync::oneshot::Receiver<bool> {
        let modal_id = config
            .get("modalId")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let rx = self.modals.show(modal_id.clone(), config.clone());
        if !self.sse.broadcast_show_modal(&config) {
            warn!(modal_id = %modal_id, "showmodal could not be delivered to any peer; cancelling");
            self.modals.resolve(&modal_id, false);
        }
        rx
    }

    /// Applies one inbound ref update (spec.md §4.7 step 5, §8 "A ref
    /// update to a refId whose component has been unmounted is ignored
    /// without error"). `refId` is `"<waveId>:<hookIdx>"` (spec.md §4.3).
    pub fn apply_ref_update(&self, ref_id: &str, has_current: bool, position: Option<Value>) {
        let Some((wave_id_str, hook_idx_str)) = ref_id.split_once(':') else {
            return;
        };
        let (Ok(wave_id), Ok(hook_idx)) = (wave_id_str.parse::<uuid::Uuid>(), hook_idx_str.parse::<usize>()) else {
            return;
        };
        let Some(node) = self.comp_map.lock().get(wave_id) else {
            return;
        };
        let guard = node.lock();
        if let Some(crate::engine::hooks::HookSlot::VDomRef(state)) = guard.hooks.get(hook_idx) {
            let mut state = state.lock();
            state.has_current = has_current;
            state.position = position;
            drop(state);
            self.render_needs.add(wave_id);
        }
    }

    /// Wires the async-notify batcher's fire channel to the SSE hub and
    /// starts its scheduler loop (spec.md §4.6). Call once, after the
    /// engine is placed behind an `Arc` and before serving traffic.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        self.notify.set_fire_sink(tx);
        self.notify.clone().spawn();
        let sse = self.sse.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                sse.broadcast_async_initiation();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// spec.md §7 "Resource errors": a `showmodal` push with no live peer
    /// channel can never be answered, so the modal must resolve to a
    /// cancelled result right away instead of hanging forever.
    #[tokio::test]
    async fn show_modal_with_no_live_peer_resolves_to_cancelled() {
        let engine = Engine::new("App");
        let rx = engine.show_modal(serde_json::json!({ "modalId": "confirm-delete" }));
        assert_eq!(rx.await.unwrap(), false);
    }

    /// With a live peer connected, the same modal stays open until the peer
    /// answers it.
    #[tokio::test]
    async fn show_modal_with_live_peer_stays_open_until_answered() {
        let engine = Engine::new("App");
        let _connection = engine.sse.connect();
        let rx = engine.show_modal(serde_json::json!({ "modalId": "confirm-delete" }));
        engine.modals.resolve("confirm-delete", true);
        assert_eq!(rx.await.unwrap(), true);
    }
}
