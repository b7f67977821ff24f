//! `GET /api/manifest` (spec.md §4.7): returns a pre-assembled manifest
//! blob if one has been set, otherwise 404 (there is nothing to serve).

use crate::engine::runtime::Engine;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

pub async fn get_manifest(State(engine): State<Arc<Engine>>) -> Response {
    match engine.manifest.lock().clone() {
        Some(blob) => Json(blob).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
