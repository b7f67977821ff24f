//! `POST /api/modalresult` (spec.md §4.7, §4.8).

use super::wire::ModalResultWire;
use crate::engine::runtime::Engine;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

pub async fn post_modal_result(State(engine): State<Arc<Engine>>, Json(body): Json<ModalResultWire>) -> impl IntoResponse {
    engine.modals.resolve(&body.modal_id, body.confirm);
    StatusCode::OK
}
