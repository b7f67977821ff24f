//! End-to-end coverage of the HTTP transport (spec.md §4.7, §8), built the
//! way `dioxus-liveview`'s own integration tests exercise a router: drive
//! the real `axum::Router` with `tower::ServiceExt::oneshot` rather than a
//! bound TCP listener.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value as Json};
use tower::ServiceExt;

use tsunami::{Client, Element, Handler, PropValue, RenderReturn, Value};

fn counter_client() -> Client {
    Client::new("App")
        .register_data_atom("count", 0.0_f64, Default::default())
        .register_component("App", |ctx, _props| {
            let n = ctx.get_atom("$data.count").as_f64().unwrap_or(0.0);
            let engine = ctx.engine.clone();
            let increment = Handler::arity0(move || {
                let current = engine.atoms.get("$data.count").as_f64().unwrap_or(0.0);
                engine.atoms.set("$data.count", Value::Number(current + 1.0)).unwrap();
            });
            let mut props = tsunami::Props::new();
            props.insert("onIncrement".to_string(), PropValue::Handler(increment));
            RenderReturn::Single(
                Element::tag("div").with_props(props).with_children(vec![Element::tag("span")
                    .with_children(vec![Element::text(format!("{}", n as i64))])]),
            )
        })
}

async fn post_render(router: &axum::Router, body: Json) -> Json {
    let request = Request::builder()
        .method("POST")
        .uri("/api/render")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn rendered_text(update: &Json) -> &str {
    update["renderUpdates"][0]["vdom"]["children"][0]["children"][0]["text"]
        .as_str()
        .unwrap()
}

/// spec.md §8 scenario 1: two renders of a counter, span text goes "0" ->
/// "1", and the root identity (waveId) is stable across the write.
#[tokio::test]
async fn counter_increments_across_two_renders() {
    let client = counter_client();
    let router = client.router();

    let first = post_render(&router, json!({ "clientId": "peer-1", "ts": 0 })).await;
    assert_eq!(rendered_text(&first), "0");
    let wave_id = first["renderUpdates"][0]["vdom"]["waveId"].as_str().unwrap().to_string();

    let second = post_render(
        &router,
        json!({
            "clientId": "peer-1",
            "ts": 1,
            "events": [{ "waveId": wave_id, "eventType": "onIncrement" }],
        }),
    )
    .await;
    assert_eq!(rendered_text(&second), "1");
    assert_eq!(second["renderUpdates"][0]["vdom"]["waveId"].as_str().unwrap(), wave_id);
    assert_eq!(second["fullUpdate"], json!(true));
}

/// spec.md §4.7 "Client-id ownership": a second peer without
/// `forceTakeover` is rejected; with it, it replaces the owner.
#[tokio::test]
async fn mismatched_client_is_rejected_until_takeover() {
    let client = counter_client();
    let router = client.router();

    let _ = post_render(&router, json!({ "clientId": "peer-1", "ts": 0 })).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/render")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&json!({ "clientId": "peer-2", "ts": 1 })).unwrap()))
        .unwrap();
    let rejected = router.clone().oneshot(request).await.unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let takeover = post_render(&router, json!({ "clientId": "peer-2", "ts": 2, "forceTakeover": true })).await;
    assert_eq!(rendered_text(&takeover), "0");
}

/// spec.md §8 scenario 6: a resync cancels every outstanding modal to
/// `false`, and `/api/modalresult` on an already-resolved modal is a no-op.
#[tokio::test]
async fn resync_cancels_outstanding_modal() {
    let client = counter_client();
    let engine = Arc::clone(client.engine());
    let router = client.router();

    let _ = post_render(&router, json!({ "clientId": "peer-1", "ts": 0 })).await;

    // A live SSE connection so `showmodal` actually delivers and the modal
    // stays open for the resync (below) to cancel - without one, `show_modal`
    // would fall back to cancelling it immediately (spec.md §7).
    let _sse_connection = engine.sse.connect();

    let rx = engine.show_modal(json!({ "modalId": "confirm-delete", "title": "Really?" }));

    let _ = post_render(&router, json!({ "clientId": "peer-1", "ts": 1, "resync": true })).await;
    assert_eq!(rx.await.unwrap(), false);

    let request = Request::builder()
        .method("POST")
        .uri("/api/modalresult")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({ "modalId": "confirm-delete", "confirm": true })).unwrap(),
        ))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// spec.md §4.7: `GET /api/data` reflects the current atom values with the
/// `$data.` prefix stripped.
#[tokio::test]
async fn get_data_reports_current_atom_values() {
    let client = counter_client();
    let engine = Arc::clone(client.engine());
    let router = client.router();

    engine.atoms.set("$data.count", Value::Number(7.0)).unwrap();

    let request = Request::builder().uri("/api/data").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Json = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["count"], 7.0);
}
