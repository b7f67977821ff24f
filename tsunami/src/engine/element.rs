//! The input element tree and its serialized, reconciled counterpart.
//!
//! `Element` is what a component's render function returns (spec.md §3,
//! "Element (input)"). `RenderedElem` is what `MakeRendered` (spec.md §4.1)
//! emits after the reconciler has collapsed all custom-component chains down
//! to base/text nodes and assigned stable `waveId`s.

use crate::engine::value::{serialize_props, Props};
use serde::Serialize;
use uuid::Uuid;

pub const TEXT_TAG: &str = "#text";
pub const FRAGMENT_TAG: &str = "#fragment";

/// A developer-authored node. `key` and `children` are reserved prop names
/// elsewhere (spec.md §3) but are promoted to first-class fields here
/// because the reconciler needs to inspect them without digging through
/// `props`.
#[derive(Clone, Debug, Default)]
pub struct Element {
    pub tag: String,
    pub key: Option<String>,
    pub props: Props,
    pub children: Vec<Element>,
    pub text: Option<String>,
}

impl Element {
    pub fn text(s: impl Into<String>) -> Element {
        Element {
            tag: TEXT_TAG.to_string(),
            text: Some(s.into()),
            ..Default::default()
        }
    }

    pub fn tag(tag: impl Into<String>) -> Element {
        Element {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Element {
        self.key = Some(key.into());
        self
    }

    pub fn with_props(mut self, props: Props) -> Element {
        self.props = props;
        self
    }

    pub fn with_children(mut self, children: Vec<Element>) -> Element {
        self.children = children;
        self
    }

    /// An element with an empty tag is the unmount sentinel (spec.md §4.1:
    /// "Elements with empty tag or nil cause the slot to unmount").
    pub fn is_unmount_sentinel(&self) -> bool {
        self.tag.is_empty()
    }

    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    pub fn is_fragment(&self) -> bool {
        self.tag == FRAGMENT_TAG
    }

    /// Base ("DOM") tags: fragments, the reserved `wave:*` namespace, or any
    /// tag starting lowercase / `#` (spec.md §4.1).
    pub fn is_base_tag(tag: &str) -> bool {
        tag == FRAGMENT_TAG
            || tag.starts_with("wave:")
            || tag
                .chars()
                .next()
                .map(|c| c == '#' || c.is_lowercase())
                .unwrap_or(false)
    }

    /// Custom ("component") tags start uppercase (spec.md §4.1).
    pub fn is_custom_tag(tag: &str) -> bool {
        tag.chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false)
    }

    /// Reconciliation key: either the explicit key or the empty string
    /// (spec.md §4.1: "its `tag` and `key` (empty string if absent)").
    pub fn key_or_empty(&self) -> &str {
        self.key.as_deref().unwrap_or("")
    }
}

/// The output of the reconciler: every custom-component chain has been
/// collapsed to its rendered base/text form (spec.md §3, §8 invariant: "no
/// custom-component tags appear in output").
#[derive(Clone, Debug, Serialize)]
pub struct RenderedElem {
    #[serde(rename = "waveId")]
    pub wave_id: Uuid,
    pub tag: String,
    pub props: std::collections::BTreeMap<String, serde_json::Value>,
    pub children: Vec<RenderedElem>,
    pub text: Option<String>,
}

impl RenderedElem {
    pub fn from_text(wave_id: Uuid, text: String) -> RenderedElem {
        RenderedElem {
            wave_id,
            tag: TEXT_TAG.to_string(),
            props: Default::default(),
            children: Vec::new(),
            text: Some(text),
        }
    }

    pub fn from_base(
        wave_id: Uuid,
        tag: String,
        props: &Props,
        children: Vec<RenderedElem>,
    ) -> RenderedElem {
        RenderedElem {
            wave_id,
            tag,
            props: serialize_props(props),
            children,
            text: None,
        }
    }
}
