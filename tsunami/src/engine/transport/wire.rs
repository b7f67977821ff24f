//! Wire types for the HTTP surface (spec.md §6 "Wire types").
//!
//! These are the JSON shapes exchanged with the browser peer, kept
//! deliberately separate from the engine's internal [`crate::engine::event`]
//! and [`crate::engine::element`] types: the wire format is a stable
//! external contract, the internal types are free to evolve with the
//! reconciler.

use crate::engine::element::RenderedElem;
use crate::engine::event::{GlobalEvent, InboundEvent, LocalEvent};
use crate::engine::value::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One inbound event, as posted by the peer. Local events carry `waveId`
/// + `eventType`; global events carry `globalEventType`. Both shapes are
/// accepted on one wire struct because the peer tells them apart the same
/// way (spec.md §4.5, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventWire {
    #[serde(default)]
    pub wave_id: Option<Uuid>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub global_event_type: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl EventWire {
    /// Converts to the engine's internal event representation. A wire
    /// event with neither `eventType`+`waveId` nor `globalEventType` is
    /// malformed and dropped (caller logs it; it is not fatal to the
    /// request).
    pub fn into_inbound(self) -> Option<InboundEvent> {
        if let Some(global_event_type) = self.global_event_type {
            return Some(InboundEvent::Global(GlobalEvent {
                global_event_type,
                payload: self.payload,
            }));
        }
        match (self.wave_id, self.event_type) {
            (Some(wave_id), Some(event_type)) => Some(InboundEvent::Local(LocalEvent {
                wave_id,
                event_type,
                payload: self.payload,
            })),
            _ => None,
        }
    }
}

/// `{refId, hasCurrent, position}` (spec.md §6 "Ref update").
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefUpdateWire {
    pub ref_id: String,
    #[serde(default)]
    pub has_current: bool,
    #[serde(default)]
    pub position: Option<Value>,
}

/// `POST /api/render` request body (spec.md §6 "Frontend update").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrontendUpdate {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub dispose: bool,
    #[serde(default)]
    pub resync: bool,
    #[serde(default)]
    pub force_takeover: bool,
    #[serde(default)]
    pub events: Vec<EventWire>,
    #[serde(default)]
    pub ref_updates: Vec<RefUpdateWire>,
}

/// `{type: "root", vdom}` (spec.md §6 "renderUpdates").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderUpdate {
    pub update_type: &'static str,
    pub vdom: RenderedElem,
}

impl RenderUpdate {
    pub fn root(vdom: RenderedElem) -> RenderUpdate {
        RenderUpdate {
            update_type: "root",
            vdom,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendOpts {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_desc: Option<String>,
    pub global_keyboard_events: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon_path: Option<String>,
}

/// `POST /api/render` response body (spec.md §6 "Backend update").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ts: i64,
    pub server_id: Uuid,
    pub has_work: bool,
    pub full_update: bool,
    pub opts: BackendOpts,
    pub render_updates: Vec<RenderUpdate>,
    /// Peer-directed ref operations (spec.md §6). No current code path
    /// produces these; the field exists so the wire shape matches the
    /// documented contract and a future producer has somewhere to write.
    pub ref_operations: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalResultWire {
    pub modal_id: String,
    pub confirm: bool,
}
