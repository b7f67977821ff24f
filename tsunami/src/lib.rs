//! Tsunami: a server-resident, React-like component runtime that
//! maintains a persistent shadow tree and streams reconciled updates to a
//! browser peer over HTTP + Server-Sent Events.
//!
//! The engine lives under [`engine`]; [`engine::client::Client`] is the
//! entry point most applications build against.

pub mod engine;

pub use engine::client::Client;
pub use engine::element::Element;
pub use engine::error::{EngineError, EngineResult};
pub use engine::runtime::{Engine, EngineConfig, RenderReturn};
pub use engine::value::{Handler, PropValue, Props, Value};
