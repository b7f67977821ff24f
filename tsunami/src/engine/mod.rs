//! The rendering engine (spec.md §1): shadow tree, reconciler, hook
//! runtime, atom store, effect scheduler, event dispatcher, async-notify
//! batcher and the HTTP+SSE transport that ties them together.

pub mod atom;
pub mod client;
pub mod context;
pub mod effect;
pub mod element;
pub mod error;
pub mod event;
pub mod hooks;
pub mod modal;
pub mod notify;
pub mod reconcile;
pub mod runtime;
pub mod schema;
pub mod shadow;
pub mod transport;
pub mod value;
