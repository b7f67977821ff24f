//! `POST /api/render` (spec.md §4.7).
//!
//! Runs the entire events -> ref updates -> render -> effects ordering
//! (spec.md §5) under `engine.render_lock`, synchronously - nothing in the
//! critical section ever awaits, so holding a `parking_lot::Mutex` guard
//! across it inside an async handler is sound.

use super::wire::{BackendOpts, BackendUpdate, FrontendUpdate, RenderUpdate};
use crate::engine::error::EngineError;
use crate::engine::event::dispatch;
use crate::engine::reconcile::run_full_cycle;
use crate::engine::runtime::Engine;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tracing::{debug, warn};

pub async fn render(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<FrontendUpdate>,
) -> Result<Response, EngineError> {
    accept_client(&engine, &body)?;

    if body.dispose {
        engine.request_shutdown();
        return Ok(StatusCode::OK.into_response());
    }

    let rendered = {
        let _guard = engine.render_lock.lock();

        if body.resync {
            engine.modals.cancel_all();
        }

        for event in body.events.clone() {
            match event.into_inbound() {
                Some(inbound) => dispatch(&engine, inbound),
                None => warn!("dropped malformed inbound event (neither local nor global shape)"),
            }
        }

        for update in &body.ref_updates {
            engine.apply_ref_update(&update.ref_id, update.has_current, update.position.clone());
        }

        if engine.config.debug {
            debug!(resync = body.resync, ts = body.ts, "running render pass");
        }

        // `useRenderTs()` (spec.md §4.3) reports the server's own ms-epoch
        // clock for the batch, not the peer-supplied `ts` on the request
        // (that field is merely echoed back below) - the two are allowed to
        // drift (clock skew, queued requests), so they're tracked separately.
        let render_ts = chrono::Utc::now().timestamp_millis();

        // spec.md §9 "Open question - partial render": the engine always
        // performs a full render pass even when `resync` is false; we keep
        // that behavior (see DESIGN.md) and always report `fullUpdate`.
        run_full_cycle(&engine, body.resync, render_ts)
    };

    Ok(Json(BackendUpdate {
        kind: "backendupdate",
        ts: body.ts,
        server_id: engine.server_id,
        has_work: true,
        full_update: true,
        opts: BackendOpts {
            title: engine.app_title.lock().clone(),
            short_desc: engine.config.short_desc.clone(),
            global_keyboard_events: engine.config.global_keyboard_events,
            favicon_path: engine.config.favicon_path.clone(),
        },
        render_updates: vec![RenderUpdate::root(rendered)],
        ref_operations: Vec::new(),
    })
    .into_response())
}

/// spec.md §4.7 steps 1-2: `forceTakeover` replaces the stored client id
/// unconditionally; otherwise the posted id must match the stored one or
/// be empty (first handshake).
fn accept_client(engine: &Engine, body: &FrontendUpdate) -> Result<(), EngineError> {
    if body.force_takeover {
        *engine.client_id.lock() = Some(body.client_id.clone());
        return Ok(());
    }

    let mut stored = engine.client_id.lock();
    match stored.as_ref() {
        None => {
            *stored = Some(body.client_id.clone());
            Ok(())
        }
        Some(id) if !body.client_id.is_empty() && id != &body.client_id => Err(EngineError::ClientIdMismatch),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::transport::wire::FrontendUpdate;

    #[test]
    fn first_use_with_empty_stored_id_accepts_any_client() {
        let engine = Engine::new("App");
        let body = FrontendUpdate {
            client_id: "abc".into(),
            ..Default::default()
        };
        assert!(accept_client(&engine, &body).is_ok());
        assert_eq!(engine.client_id.lock().as_deref(), Some("abc"));
    }

    #[test]
    fn mismatched_client_id_is_rejected() {
        let engine = Engine::new("App");
        *engine.client_id.lock() = Some("abc".to_string());
        let body = FrontendUpdate {
            client_id: "xyz".into(),
            ..Default::default()
        };
        assert!(matches!(accept_client(&engine, &body), Err(EngineError::ClientIdMismatch)));
    }

    #[test]
    fn force_takeover_replaces_stored_id() {
        let engine = Engine::new("App");
        *engine.client_id.lock() = Some("abc".to_string());
        let body = FrontendUpdate {
            client_id: "new-owner".into(),
            force_takeover: true,
            ..Default::default()
        };
        assert!(accept_client(&engine, &body).is_ok());
        assert_eq!(engine.client_id.lock().as_deref(), Some("new-owner"));
    }
}
