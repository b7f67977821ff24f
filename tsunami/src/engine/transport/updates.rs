//! `GET /api/updates` handler (spec.md §4.7): hands the caller a fresh
//! [`Connection`](super::sse::Connection) registered with the engine's
//! [`SseHub`](super::sse::SseHub).

use crate::engine::runtime::Engine;
use axum::extract::State;
use axum::response::sse::Event;
use axum::response::Sse;
use std::convert::Infallible;
use std::sync::Arc;

pub async fn get_updates(
    State(engine): State<Arc<Engine>>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let connection = engine.sse.connect();
    super::sse::response(connection)
}
