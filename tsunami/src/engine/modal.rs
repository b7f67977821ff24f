//! Modal registry (spec.md §4.8).
//!
//! `ShowModal` hands back a result channel and files the config away under
//! `config.modalId`; the peer eventually posts the answer to
//! `/api/modalresult`, or a resync cancels every outstanding modal. A
//! `tokio::oneshot` is the natural fit for "a single result... the channel
//! receives the result and is closed" - no buffering, no further sends
//! possible once resolved.

use parking_lot::Mutex;
use serde_json::Value as Json;
use std::collections::HashMap;
use tokio::sync::oneshot;

struct OpenModal {
    #[allow(dead_code)] // retained for diagnostics/introspection, not read internally
    config: Json,
    result_tx: oneshot::Sender<bool>,
}

#[derive(Default)]
pub struct ModalRegistry {
    open: Mutex<HashMap<String, OpenModal>>,
}

impl ModalRegistry {
    /// `ShowModal(config)`. `config` must carry a `modalId` string field;
    /// returns the result receiver to await.
    pub fn show(&self, modal_id: String, config: Json) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.open.lock().insert(modal_id, OpenModal { config, result_tx: tx });
        rx
    }

    /// `/api/modalresult`. A modal that is no longer open (already resolved,
    /// or never existed) is a no-op success (spec.md §8 scenario 6).
    pub fn resolve(&self, modal_id: &str, confirm: bool) {
        if let Some(modal) = self.open.lock().remove(modal_id) {
            let _ = modal.result_tx.send(confirm);
        }
    }

    /// On resync, every open modal resolves to `false` (spec.md §4.1,
    /// §8 scenario 6).
    pub fn cancel_all(&self) {
        let modals: Vec<OpenModal> = self.open.lock().drain().map(|(_, v)| v).collect();
        for modal in modals {
            let _ = modal.result_tx.send(false);
        }
    }

    pub fn is_open(&self, modal_id: &str) -> bool {
        self.open.lock().contains_key(modal_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resync_cancels_open_modals_with_false() {
        let registry = ModalRegistry::default();
        let rx1 = registry.show("m1".into(), serde_json::json!({"modalId": "m1"}));
        let rx2 = registry.show("m2".into(), serde_json::json!({"modalId": "m2"}));
        registry.cancel_all();
        assert_eq!(rx1.await.unwrap(), false);
        assert_eq!(rx2.await.unwrap(), false);
    }

    #[tokio::test]
    async fn resolve_after_cancel_is_a_noop() {
        let registry = ModalRegistry::default();
        registry.cancel_all();
        registry.resolve("missing", true);
    }
}
