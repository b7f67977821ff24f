//! `GET /api/data`, `GET/POST /api/config` (spec.md §4.7).

use crate::engine::atom::{CONFIG_PREFIX, DATA_PREFIX};
use crate::engine::runtime::Engine;
use crate::engine::value::Value;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{Map, Value as Json_};
use std::sync::Arc;

fn export_prefix(engine: &Engine, prefix: &str) -> Json_ {
    let mut map = Map::new();
    for full_name in engine.atoms.names_with_prefix(prefix) {
        let short_name = full_name.trim_start_matches(prefix).to_string();
        let value = engine.atoms.get(&full_name);
        map.insert(short_name, serde_json::to_value(&value).unwrap_or(Json_::Null));
    }
    Json_::Object(map)
}

pub async fn get_data(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(export_prefix(&engine, DATA_PREFIX))
}

pub async fn get_config(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(export_prefix(&engine, CONFIG_PREFIX))
}

/// POST reports per-key failures rather than rejecting the whole batch
/// (spec.md §4.7): each key is adapted and written independently.
pub async fn post_config(State(engine): State<Arc<Engine>>, Json(body): Json<Json_>) -> impl IntoResponse {
    let mut errors = Map::new();

    let Json_::Object(entries) = body else {
        return Json(serde_json::json!({ "errors": { "_body": "expected a JSON object" } }));
    };

    for (key, raw) in entries {
        let full_name = format!("{CONFIG_PREFIX}{key}");
        let value: Value = match serde_json::from_value(raw) {
            Ok(v) => v,
            Err(err) => {
                errors.insert(key, Json_::String(err.to_string()));
                continue;
            }
        };
        if let Err(err) = engine.atoms.set(&full_name, value) {
            errors.insert(key, Json_::String(err.to_string()));
        }
    }

    Json(serde_json::json!({ "errors": errors }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::atom::AtomMeta;

    #[test]
    fn export_prefix_strips_reserved_prefix() {
        let engine = Engine::new("App");
        engine
            .atoms
            .register("$data.count", Value::Number(3.0), AtomMeta::default())
            .unwrap();
        let exported = export_prefix(&engine, DATA_PREFIX);
        assert_eq!(exported["count"], 3.0);
    }
}
