//! The HTTP + SSE transport (spec.md §4.7): one endpoint per concern,
//! built on `axum`, the way `dioxus-liveview`'s optional `axum` adapter
//! wires a `VirtualDom` into a router - generalized here into a fixed set
//! of routes the engine always exposes, since spec.md scopes transport as
//! part of the engine rather than an optional add-on (see
//! `SPEC_FULL.md` §A).

pub mod assets;
pub mod data;
pub mod manifest;
pub mod modal_result;
pub mod render;
pub mod schemas;
pub mod sse;
pub mod updates;
pub mod wire;

pub use assets::AssetSource;
