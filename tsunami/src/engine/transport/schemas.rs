//! `GET /api/schemas` (spec.md §4.7, §4.9).

use crate::engine::runtime::Engine;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

pub async fn get_schemas(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(engine.schemas.export(&engine.atoms))
}
