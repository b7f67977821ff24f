//! Dynamic value representation shared by props, atoms and the wire format.
//!
//! Component props are a heterogeneous mapping (spec.md §9 "Dynamic prop
//! typing"); we reify it as a tagged-variant map rather than reflecting into
//! a declared parameter record, since the engine has no compile-time view of
//! a host-language component's parameter types. Plain data round-trips
//! through [`Value`] / `serde_json::Value`; function-valued props are kept
//! out of band as [`Handler`] so they never accidentally serialize.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A plain (non-function) dynamic value. Mirrors `serde_json::Value` in
/// shape so adaptation can round-trip through JSON as spec.md §4.2 requires,
/// but keeps its own enum so `Props` can carry it without forcing every
/// caller through `serde_json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Round-trip through `serde_json` into any `Deserialize` type. This is
    /// the adaptation path spec.md §4.2 describes for `SetAtomVal`: direct
    /// assignment is attempted by the caller first; this is the fallback.
    pub fn adapt<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        let json = serde_json::to_value(self).map_err(|e| e.to_string())?;
        serde_json::from_value(json).map_err(|e| e.to_string())
    }

    pub fn from_serialize<T: Serialize>(v: &T) -> Result<Value, String> {
        let json = serde_json::to_value(v).map_err(|e| e.to_string())?;
        serde_json::from_value(json).map_err(|e| e.to_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A handler attached to a prop. Peers never see the closure; on the wire it
/// becomes `{"type": "func"}` (spec.md §3, §9 "Serialization of handlers").
/// Both the arity-0 and arity-1 (payload-carrying) forms named in spec.md
/// §4.5 are represented so the event dispatcher can call whichever shape the
/// component author wrote.
#[derive(Clone)]
pub enum Handler {
    Arity0(Arc<dyn Fn() + Send + Sync>),
    Arity1(Arc<dyn Fn(Value) + Send + Sync>),
}

impl Handler {
    pub fn arity0(f: impl Fn() + Send + Sync + 'static) -> Handler {
        Handler::Arity0(Arc::new(f))
    }

    pub fn arity1(f: impl Fn(Value) + Send + Sync + 'static) -> Handler {
        Handler::Arity1(Arc::new(f))
    }

    pub fn call(&self, payload: Value) {
        match self {
            Handler::Arity0(f) => f(),
            Handler::Arity1(f) => f(payload),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// One prop value: either plain data, a handler, or (only injected by the
/// reconciler, only for the duration of a custom component's render call)
/// the `children` sequence.
#[derive(Clone, Debug)]
pub enum PropValue {
    Data(Value),
    Handler(Handler),
    Children(Vec<crate::engine::element::Element>),
}

impl PropValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            PropValue::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            PropValue::Handler(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_children(&self) -> Option<&[crate::engine::element::Element]> {
        match self {
            PropValue::Children(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Value> for PropValue {
    fn from(v: Value) -> Self {
        PropValue::Data(v)
    }
}

impl From<Handler> for PropValue {
    fn from(h: Handler) -> Self {
        PropValue::Handler(h)
    }
}

/// Props are an ordered-by-name mapping; `BTreeMap` keeps serialization
/// deterministic, which is convenient for tests that assert on rendered
/// JSON.
pub type Props = BTreeMap<String, PropValue>;

/// Serializes a props map to the wire representation: handlers become
/// `{"type": "func"}` markers (spec.md §3, §9), plain values pass through.
pub fn serialize_props(props: &Props) -> BTreeMap<String, serde_json::Value> {
    props
        .iter()
        .map(|(k, v)| {
            let json = match v {
                PropValue::Data(val) => serde_json::to_value(val).unwrap_or(serde_json::Value::Null),
                PropValue::Handler(_) => serde_json::json!({ "type": "func" }),
                // `children` is consumed by the reconciler before a node's
                // props are ever stored or serialized; seeing it here would
                // be an engine bug, not a user-facing condition.
                PropValue::Children(_) => serde_json::Value::Null,
            };
            (k.clone(), json)
        })
        .collect()
}
