//! The schema generator (spec.md §4.9).
//!
//! Each `$data.*`/`$config.*` atom is registered together with the Rust
//! type it was declared against (see `atom::AtomStore::register` callers in
//! `runtime.rs`), so schema derivation can lean entirely on `schemars`
//! (the crate the current `dioxus` workspace manifest already depends on)
//! instead of re-deriving a schema from a runtime `Value`. We only
//! post-process `schemars`' output to: rename its `definitions` map to the
//! `$defs` name spec.md calls for, and overlay each atom's hand-written
//! [`crate::engine::atom::AtomMeta`] onto that atom's top-level property,
//! exactly as spec.md's bullet list describes.

use crate::engine::atom::{AtomMeta, AtomStore, CONFIG_PREFIX, DATA_PREFIX};
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

#[derive(Default)]
pub struct SchemaRegistry {
    // Atom name -> `schemars`-derived root schema, captured at registration.
    schemas: parking_lot::RwLock<BTreeMap<String, Json>>,
}

impl SchemaRegistry {
    /// Captures `T`'s schema under `name`, using the `$defs`-style settings
    /// draft (spec.md §4.9: "Structured records -> `$ref: #/$defs/<name>`").
    pub fn capture<T: JsonSchema>(&self, name: &str) {
        let settings = SchemaSettings::draft2019_09();
        let generator = settings.into_generator();
        let root = generator.into_root_schema_for::<T>();
        let json = serde_json::to_value(root).unwrap_or(Json::Null);
        self.schemas.write().insert(name.to_string(), json);
    }

    fn schema_for(&self, name: &str) -> Option<Json> {
        self.schemas.read().get(name).cloned()
    }

    /// Builds `{config, data}` for `GET /api/schemas`: one JSON-Schema
    /// object per prefix, with per-atom property schemas and a merged
    /// `$defs` map collected once per referenced type.
    pub fn export(&self, store: &AtomStore) -> Json {
        Json::Object(Map::from_iter([
            ("config".to_string(), self.export_prefix(store, CONFIG_PREFIX)),
            ("data".to_string(), self.export_prefix(store, DATA_PREFIX)),
        ]))
    }

    fn export_prefix(&self, store: &AtomStore, prefix: &str) -> Json {
        let mut properties = Map::new();
        let mut defs = Map::new();
        let mut required = Vec::new();

        for full_name in store.names_with_prefix(prefix) {
            let short_name = full_name.trim_start_matches(prefix).to_string();
            let Some(root) = self.schema_for(&full_name) else {
                continue;
            };
            // `RootSchema` serializes with `#[serde(flatten)]` on its
            // `schema` field (schemars 0.8), so the per-atom property
            // schema IS the root object, minus the two sibling keys that
            // belong to the root document rather than the property.
            let mut property = root.clone();
            if let Some(inner_defs) = root.get("definitions").and_then(Json::as_object) {
                for (k, v) in inner_defs {
                    defs.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            if let Json::Object(map) = &mut property {
                map.remove("$schema");
                map.remove("definitions");
            }

            rewrite_refs(&mut property);
            if let Some(meta) = store.meta(&full_name) {
                overlay_meta(&mut property, &meta);
            }

            let is_optional = property
                .get("type")
                .and_then(Json::as_str)
                .map(|t| t == "null")
                .unwrap_or(false)
                || matches!(&property, Json::Object(m) if m.contains_key("anyOf") || m.contains_key("oneOf"));
            if !is_optional {
                required.push(short_name.clone());
            }

            properties.insert(short_name, property);
        }

        let mut out = Map::new();
        out.insert("type".to_string(), Json::String("object".to_string()));
        out.insert("properties".to_string(), Json::Object(properties));
        if !required.is_empty() {
            out.insert(
                "required".to_string(),
                Json::Array(required.into_iter().map(Json::String).collect()),
            );
        }
        if !defs.is_empty() {
            out.insert("$defs".to_string(), Json::Object(defs));
        }
        Json::Object(out)
    }
}

/// `schemars` 0.8 emits `#/definitions/Foo`; spec.md's wire format wants
/// `#/$defs/Foo`.
fn rewrite_refs(value: &mut Json) {
    match value {
        Json::Object(map) => {
            if let Some(Json::String(r)) = map.get_mut("$ref") {
                *r = r.replacen("#/definitions/", "#/$defs/", 1);
            }
            for v in map.values_mut() {
                rewrite_refs(v);
            }
        }
        Json::Array(items) => {
            for v in items {
                rewrite_refs(v);
            }
        }
        _ => {}
    }
}

/// Overlays atom-level metadata onto the property schema (spec.md §4.9:
/// "Atom-level metadata ... is overlaid on the top-level per-atom
/// property.").
fn overlay_meta(property: &mut Json, meta: &AtomMeta) {
    let Json::Object(map) = property else { return };
    if let Some(desc) = &meta.description {
        map.insert("description".to_string(), Json::String(desc.clone()));
    }
    if let Some(units) = &meta.units {
        map.insert("units".to_string(), Json::String(units.clone()));
    }
    if let Some(min) = meta.min {
        map.insert("minimum".to_string(), serde_json::json!(min));
    }
    if let Some(max) = meta.max {
        map.insert("maximum".to_string(), serde_json::json!(max));
    }
    if let Some(values) = &meta.r#enum {
        let json_values: Vec<Json> = values
            .iter()
            .map(|v| serde_json::to_value(v).unwrap_or(Json::Null))
            .collect();
        map.insert("enum".to_string(), Json::Array(json_values));
    }
    if let Some(pattern) = &meta.pattern {
        map.insert("pattern".to_string(), Json::String(pattern.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::notify::NotifyBatcher;
    use crate::engine::atom::RenderNeeds;
    use crate::engine::value::Value;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Serialize, Deserialize, JsonSchema, Clone)]
    struct Settings {
        #[schemars(description = "how many widgets")]
        count: u32,
        label: Option<String>,
    }

    #[test]
    fn export_overlays_meta_and_renames_defs() {
        let store = AtomStore::new(Arc::new(RenderNeeds::default()), Arc::new(NotifyBatcher::default()));
        let registry = SchemaRegistry::default();
        let initial = Settings { count: 1, label: None };
        store
            .register(
                "$config.settings",
                Value::from_serialize(&initial).unwrap(),
                AtomMeta {
                    description: Some("app settings".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        registry.capture::<Settings>("$config.settings");

        let exported = registry.export(&store);
        let prop = &exported["config"]["properties"]["settings"];
        assert_eq!(prop["description"], "app settings");
        let required = exported["config"]["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "settings"));
    }
}
