//! The reconciler (spec.md §4.1).
//!
//! `reconcile` walks one input [`Element`] against one shadow-tree slot,
//! matching on `(tag, key)` the way `dioxus-core`'s `diff.rs` matches
//! `ElementId`s by key within a fragment (`create_children`/
//! `diff_non_keyed_children` there) - generalized here to a single
//! recursive function that also owns mount/unmount of custom-component
//! subtrees, since this engine's "VDOM" persists across requests instead
//! of being rebuilt and diffed against a host DOM each frame.

use crate::engine::context::{with_context, ContextKind};
use crate::engine::effect::describe_panic;
use crate::engine::element::{Element, RenderedElem, FRAGMENT_TAG};
use crate::engine::hooks::RenderCtx;
use crate::engine::runtime::{Engine, RenderReturn};
use crate::engine::shadow::{Content, NodeHandle, ShadowNode};
use crate::engine::value::PropValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

/// Bounds the "effects may trigger another render" loop (spec.md §4.4 step
/// 5: "may iterate until the set is empty or a bounded fixpoint is
/// reached"). Ten passes is generous for any effect chain that isn't
/// itself buggy (an effect that unconditionally marks itself dirty).
pub const MAX_FIXPOINT_ITERS: usize = 10;

/// Runs one full request's worth of rendering: reconcile, then drain
/// effects, re-rendering while the render-needs set stays non-empty
/// (spec.md §4.4). Callers must already hold `engine.render_lock` - this
/// function does not acquire it, since the render lock's scope spans
/// events and ref updates too (spec.md §5).
pub fn run_full_cycle(engine: &Arc<Engine>, first_pass_resync: bool, render_ts: i64) -> RenderedElem {
    let mut slot = engine.tree.lock().take();
    let root_elem = Element::tag(engine.root_tag.clone());
    let mut resync = first_pass_resync;

    for _ in 0..MAX_FIXPOINT_ITERS {
        reconcile(engine, &mut slot, root_elem.clone(), "", render_ts, resync);
        engine.effects.run_pending();
        resync = false;
        if engine.render_needs.is_empty() {
            break;
        }
        engine.render_needs.drain();
    }

    let rendered = slot.as_ref().map(make_rendered);
    *engine.tree.lock() = slot;

    rendered.unwrap_or_else(|| RenderedElem {
        wave_id: uuid::Uuid::nil(),
        tag: FRAGMENT_TAG.to_string(),
        props: Default::default(),
        children: Vec::new(),
        text: None,
    })
}

/// Reconciles one slot against one incoming element (spec.md §4.1
/// "Algorithm").
pub fn reconcile(
    engine: &Arc<Engine>,
    slot: &mut Option<NodeHandle>,
    elem: Element,
    containing_comp: &str,
    render_ts: i64,
    resync: bool,
) {
    if elem.is_unmount_sentinel() {
        if let Some(old) = slot.take() {
            unmount_node(engine, &old);
        }
        return;
    }

    let tag = elem.tag.clone();
    let key = elem.key_or_empty().to_string();

    let reuse = if let Some(node) = slot.as_ref() {
        let guard = node.lock();
        guard.tag == tag && guard.key == key
    } else {
        false
    };

    if !reuse {
        if let Some(old) = slot.take() {
            unmount_node(engine, &old);
        }
        let node: NodeHandle = Arc::new(Mutex::new(ShadowNode::new(
            tag.clone(),
            key.clone(),
            elem.clone(),
            containing_comp.to_string(),
        )));
        engine.comp_map.lock().insert(&node);
        *slot = Some(node);
    } else if let Some(node) = slot.as_ref() {
        node.lock().elem = elem.clone();
    }

    let node = slot.clone().expect("populated above");

    if elem.is_text() {
        node.lock().content = Content::Text(elem.text.clone().unwrap_or_default());
        return;
    }

    if Element::is_base_tag(&tag) {
        reconcile_base(engine, &node, &elem, containing_comp, render_ts, resync);
        return;
    }

    if Element::is_custom_tag(&tag) {
        if let Some(component_fn) = engine.lookup_component(&tag) {
            reconcile_custom(engine, &node, &elem, component_fn, render_ts, resync);
            return;
        }
    }

    // Unknown tag shape, or a custom tag with no registered component:
    // degrade to literal text, non-fatal (spec.md §4.1 last line, §7).
    node.lock().content = Content::Text(format!("<{tag}>"));
}

fn reconcile_base(
    engine: &Arc<Engine>,
    node: &NodeHandle,
    elem: &Element,
    containing_comp: &str,
    render_ts: i64,
    resync: bool,
) {
    let mut prev_children: Vec<NodeHandle> = {
        let mut guard = node.lock();
        match std::mem::replace(&mut guard.content, Content::empty_children()) {
            Content::Children(v) => v,
            other => {
                // A tag change into a base slot always goes through the
                // unmount+remount path above, so this only happens on a
                // brand-new node, which already starts as empty children.
                guard.content = other;
                Vec::new()
            }
        }
    };

    let new_children = reconcile_children(
        engine,
        &mut prev_children,
        elem.children.clone(),
        containing_comp,
        render_ts,
        resync,
    );

    node.lock().content = Content::Children(new_children);
}

/// Children reconciliation (spec.md §4.1a). Slot key is `(tag, 0, key)` for
/// an explicitly keyed child, else `(tag, index, "")` - keyed and
/// non-keyed siblings never collide because the index component differs.
fn reconcile_children(
    engine: &Arc<Engine>,
    prev_children: &mut Vec<NodeHandle>,
    new_elems: Vec<Element>,
    containing_comp: &str,
    render_ts: i64,
    resync: bool,
) -> Vec<NodeHandle> {
    let mut prev_map: HashMap<(String, usize, String), NodeHandle> = HashMap::new();
    for (idx, node) in prev_children.drain(..).enumerate() {
        let (tag, key) = {
            let guard = node.lock();
            (guard.tag.clone(), guard.key.clone())
        };
        let slot_key = slot_key_for(&tag, idx, &key);
        prev_map.insert(slot_key, node);
    }

    let mut result = Vec::with_capacity(new_elems.len());
    for (idx, elem) in new_elems.into_iter().enumerate() {
        let key = elem.key_or_empty().to_string();
        let slot_key = slot_key_for(&elem.tag, idx, &key);
        let mut slot = prev_map.remove(&slot_key);
        reconcile(engine, &mut slot, elem, containing_comp, render_ts, resync);
        if let Some(node) = slot {
            result.push(node);
        }
    }

    for (_, node) in prev_map {
        unmount_node(engine, &node);
    }

    result
}

fn slot_key_for(tag: &str, index: usize, key: &str) -> (String, usize, String) {
    if !key.is_empty() {
        (tag.to_string(), 0, key.to_string())
    } else {
        (tag.to_string(), index, String::new())
    }
}

fn reconcile_custom(
    engine: &Arc<Engine>,
    node: &NodeHandle,
    elem: &Element,
    component_fn: crate::engine::runtime::ComponentFn,
    render_ts: i64,
    resync: bool,
) {
    let tag = elem.tag.clone();

    let mut call_props = elem.props.clone();
    call_props.insert("children".to_string(), PropValue::Children(elem.children.clone()));

    let used_before = node.lock().used_atoms.clone();

    let ctx = RenderCtx::new(node.clone(), engine.clone(), render_ts, resync);
    let outcome = with_context(ContextKind::Render, || {
        std::panic::catch_unwind(AssertUnwindSafe(|| component_fn(&ctx, &call_props)))
    });

    let render_return = match outcome {
        Ok(r) => r,
        Err(panic) => {
            let message = describe_panic(panic);
            error!(component = %tag, error = %message, "panic inside render; replaced with error card");
            RenderReturn::Single(error_card_element(&tag, &message))
        }
    };

    let now_used = ctx.take_used_atoms();
    let wave_id = node.lock().wave_id;
    engine.atoms.reconcile_usage(wave_id, &used_before, &now_used);
    node.lock().used_atoms = now_used;

    let normalized = normalize_return(render_return);

    let mut rendered_slot = {
        let mut guard = node.lock();
        match &mut guard.content {
            Content::Custom(slot) => slot.take(),
            _ => None,
        }
    };

    match normalized {
        Some(child_elem) => {
            reconcile(engine, &mut rendered_slot, child_elem, &tag, render_ts, resync);
        }
        None => {
            if let Some(old) = rendered_slot.take() {
                unmount_node(engine, &old);
            }
        }
    }

    node.lock().content = Content::Custom(rendered_slot);
}

/// Normalizes a render return to "zero, one, or a fragment" (spec.md §9).
fn normalize_return(ret: RenderReturn) -> Option<Element> {
    match ret {
        RenderReturn::None => None,
        RenderReturn::Single(e) => Some(e),
        RenderReturn::Fragment(mut elems) => match elems.len() {
            0 => None,
            1 => Some(elems.remove(0)),
            _ => Some(Element {
                tag: FRAGMENT_TAG.to_string(),
                children: elems,
                ..Default::default()
            }),
        },
    }
}

fn error_card_element(component_name: &str, message: &str) -> Element {
    Element::tag("div").with_children(vec![Element::text(format!("{component_name}: {message}"))])
}

/// Recursively tears a subtree down: runs outstanding effect unmounts,
/// purges private atoms and usage records, and removes every descendant
/// from `compMap` (spec.md §3 invariants, §8 "a later unmount removes it
/// and purges its usage from every atom").
pub fn unmount_node(engine: &Arc<Engine>, node: &NodeHandle) {
    let content = {
        let mut guard = node.lock();
        std::mem::replace(&mut guard.content, Content::Text(String::new()))
    };

    match content {
        Content::Text(_) => {}
        Content::Children(children) => {
            for child in &children {
                unmount_node(engine, child);
            }
        }
        Content::Custom(Some(child)) => unmount_node(engine, &child),
        Content::Custom(None) => {}
    }

    engine.effects.run_unmounts_for_node(node);

    let (wave_id, used_atoms) = {
        let guard = node.lock();
        (guard.wave_id, guard.used_atoms.clone())
    };
    engine.atoms.purge_component(wave_id, &used_atoms);
    engine.comp_map.lock().remove(wave_id);
}

/// `MakeRendered()` (spec.md §4.1): walks the tree, collapsing custom-
/// component chains until a base/text node is reached.
pub fn make_rendered(node: &NodeHandle) -> RenderedElem {
    let guard = node.lock();
    match &guard.content {
        Content::Text(text) => RenderedElem::from_text(guard.wave_id, text.clone()),
        Content::Children(children) => {
            let children = children.clone();
            let wave_id = guard.wave_id;
            let tag = guard.tag.clone();
            let props = guard.elem.props.clone();
            drop(guard);
            let rendered_children = children.iter().map(make_rendered).collect();
            RenderedElem::from_base(wave_id, tag, &props, rendered_children)
        }
        Content::Custom(Some(child)) => {
            let child = child.clone();
            drop(guard);
            make_rendered(&child)
        }
        Content::Custom(None) => RenderedElem {
            wave_id: guard.wave_id,
            tag: FRAGMENT_TAG.to_string(),
            props: Default::default(),
            children: Vec::new(),
            text: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counter_app() -> Arc<Engine> {
        let engine = Engine::new("App");
        engine.register_data_atom("count", 0.0_f64, Default::default());
        engine.register_component(
            "App",
            Arc::new(|ctx, _props| {
                let n = ctx.get_atom("$data.count").as_f64().unwrap_or(0.0);
                RenderReturn::Single(
                    Element::tag("div").with_children(vec![
                        Element::tag("span").with_children(vec![Element::text(format!("{}", n as i64))]),
                    ]),
                )
            }),
        );
        engine
    }

    #[test]
    fn counter_rerenders_on_atom_write() {
        let engine = counter_app();
        let first = run_full_cycle(&engine, false, 0);
        assert_eq!(first.children[0].children[0].text.as_deref(), Some("0"));

        engine.atoms.set("$data.count", Value::Number(1.0)).unwrap();
        let second = run_full_cycle(&engine, false, 1);
        assert_eq!(second.children[0].children[0].text.as_deref(), Some("1"));
        assert_eq!(first.wave_id, second.wave_id, "root identity must be stable");
    }

    #[test]
    fn keyed_children_swap_without_unmounting() {
        let engine = Engine::new("App");
        let unmounts = Arc::new(AtomicU32::new(0));
        {
            let unmounts = unmounts.clone();
            engine.register_component(
                "App",
                Arc::new(move |_ctx, _props| {
                    RenderReturn::Single(
                        Element::tag("ul").with_children(vec![
                            Element::tag("li").with_key("a"),
                            Element::tag("li").with_key("b"),
                        ]),
                    )
                }),
            );
        }
        let _first = run_full_cycle(&engine, false, 0);
        let first_ids: Vec<_> = {
            let tree = engine.tree.lock();
            let ul = tree.as_ref().unwrap();
            let ul = ul.lock();
            match &ul.content {
                Content::Custom(Some(child)) => match &child.lock().content {
                    Content::Children(kids) => kids.iter().map(|k| k.lock().wave_id).collect(),
                    _ => vec![],
                },
                _ => vec![],
            }
        };

        engine.components.lock().clear();
        {
            let unmounts = unmounts.clone();
            engine.register_component(
                "App",
                Arc::new(move |_ctx, _props| {
                    RenderReturn::Single(
                        Element::tag("ul").with_children(vec![
                            Element::tag("li").with_key("b"),
                            Element::tag("li").with_key("a"),
                        ]),
                    )
                }),
            );
            let _ = unmounts;
        }
        let _second = run_full_cycle(&engine, false, 1);
        let second_ids: Vec<_> = {
            let tree = engine.tree.lock();
            let ul = tree.as_ref().unwrap();
            let ul = ul.lock();
            match &ul.content {
                Content::Custom(Some(child)) => match &child.lock().content {
                    Content::Children(kids) => kids.iter().map(|k| k.lock().wave_id).collect(),
                    _ => vec![],
                },
                _ => vec![],
            }
        };

        assert_eq!(first_ids[0], second_ids[1]);
        assert_eq!(first_ids[1], second_ids[0]);
    }

    #[test]
    fn nil_return_keeps_component_mounted() {
        let engine = Engine::new("App");
        let render_count = Arc::new(AtomicU32::new(0));
        {
            let render_count = render_count.clone();
            engine.register_component(
                "App",
                Arc::new(move |ctx, _props| {
                    render_count.fetch_add(1, Ordering::SeqCst);
                    let _local = ctx.use_local(Value::Number(0.0));
                    RenderReturn::None
                }),
            );
        }
        let out = run_full_cycle(&engine, false, 0);
        assert!(matches!(out.tag.as_str(), FRAGMENT_TAG));
        let out2 = run_full_cycle(&engine, false, 1);
        assert!(matches!(out2.tag.as_str(), FRAGMENT_TAG));
        assert_eq!(render_count.load(Ordering::SeqCst), 2);
        assert_eq!(engine.atoms.names_with_prefix("$local.").len(), 1, "local atom should persist across nil renders");
    }

    /// A ref update applied through `Engine::apply_ref_update` must be
    /// visible through the very handle `useVDomRef()` returned, since the
    /// component holds the same shared slot the update writes into.
    #[test]
    fn ref_update_is_visible_through_the_handle_it_returned() {
        use crate::engine::hooks::VDomRefState;

        let engine = Engine::new("App");
        let captured: Arc<Mutex<Option<Arc<parking_lot::Mutex<VDomRefState>>>>> = Arc::new(Mutex::new(None));
        {
            let captured = captured.clone();
            engine.register_component(
                "App",
                Arc::new(move |ctx, _props| {
                    let handle = ctx.use_vdom_ref();
                    *captured.lock() = Some(handle);
                    RenderReturn::Single(Element::tag("div"))
                }),
            );
        }

        let _ = run_full_cycle(&engine, false, 0);
        let handle = captured.lock().clone().expect("handle captured on first render");
        assert!(!handle.lock().has_current);

        let ref_id = handle.lock().ref_id.clone();
        engine.apply_ref_update(&ref_id, true, Some(Value::Number(42.0)));

        assert!(handle.lock().has_current, "ref update must be visible through the handle, not just schedule a render");
        assert_eq!(handle.lock().position, Some(Value::Number(42.0)));
    }

    /// An unmounted component's refId is a silent no-op (spec.md §8).
    #[test]
    fn ref_update_for_unmounted_component_is_ignored() {
        let engine = Engine::new("App");
        engine.apply_ref_update("00000000-0000-0000-0000-000000000000:0", true, None);
    }
}
