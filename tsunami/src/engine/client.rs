//! The client façade (spec.md §2 "Client façade"): owns the root element
//! registration, SSE fan-out wiring, process lifecycle, and assembles the
//! `axum::Router` transport surface (spec.md §4.7). This is the type an
//! application builds against, playing the role `dioxus-liveview`'s
//! `LiveViewPool`/`LiveView` pair plays for the teacher crate - collapsed
//! into one type here because spec.md's single-client-per-process policy
//! (§4.7 "Client-id ownership") means there is only ever one session to
//! own, not a pool of them.

use crate::engine::atom::AtomMeta;
use crate::engine::hooks::RenderCtx;
use crate::engine::runtime::{ComponentFn, Engine, RenderReturn};
use crate::engine::transport::{assets, data, manifest, modal_result, render, schemas, updates, AssetSource};
use crate::engine::value::{Handler, Props};
use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

/// Owns one [`Engine`] plus the optional pieces an application wires in at
/// startup: a dynamic-content sub-router, and the two embedded file trees
/// spec.md §4.7 names (`/static/*`, and the `/*` app-bundle fallback).
pub struct Client {
    engine: Arc<Engine>,
    dyn_router: Option<Router>,
    static_assets: Option<Arc<dyn AssetSource>>,
    app_bundle: Option<Arc<dyn AssetSource>>,
}

impl Client {
    /// `root_tag` is the tag of the top-level custom component; it is the
    /// only component `useSetAppTitle` may be called from (spec.md §4.3).
    pub fn new(root_tag: impl Into<String>) -> Client {
        Client {
            engine: Engine::new(root_tag),
            dyn_router: None,
            static_assets: None,
            app_bundle: None,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn register_component<F>(self, tag: impl Into<String>, f: F) -> Client
    where
        F: Fn(&RenderCtx, &Props) -> RenderReturn + Send + Sync + 'static,
    {
        self.engine.register_component(tag, Arc::new(f) as ComponentFn);
        self
    }

    pub fn register_global_handler(self, global_event_type: impl Into<String>, handler: Handler) -> Client {
        self.engine.register_global_handler(global_event_type, handler);
        self
    }

    pub fn register_data_atom<T>(self, short_name: &str, initial: T, meta: AtomMeta) -> Client
    where
        T: serde::Serialize + serde::de::DeserializeOwned + schemars::JsonSchema + Send + Sync + 'static,
    {
        self.engine.register_data_atom(short_name, initial, meta);
        self
    }

    pub fn register_config_atom<T>(self, short_name: &str, initial: T, meta: AtomMeta) -> Client
    where
        T: serde::Serialize + serde::de::DeserializeOwned + schemars::JsonSchema + Send + Sync + 'static,
    {
        self.engine.register_config_atom(short_name, initial, meta);
        self
    }

    pub fn with_manifest(self, manifest: serde_json::Value) -> Client {
        *self.engine.manifest.lock() = Some(manifest);
        self
    }

    /// Mounts an app-provided router under `/dyn/*` (spec.md §4.7 "delegates
    /// to an app-provided handler mux for dynamic content").
    pub fn with_dyn_router(mut self, router: Router) -> Client {
        self.dyn_router = Some(router);
        self
    }

    pub fn with_static_assets(mut self, source: Arc<dyn AssetSource>) -> Client {
        self.static_assets = Some(source);
        self
    }

    pub fn with_app_bundle(mut self, source: Arc<dyn AssetSource>) -> Client {
        self.app_bundle = Some(source);
        self
    }

    /// `ShowModal(config)` (spec.md §4.8), wired through to emit the
    /// `showmodal` SSE push.
    pub fn show_modal(&self, config: serde_json::Value) -> tokio::sync::oneshot::Receiver<bool> {
        self.engine.show_modal(config)
    }

    /// Assembles the full route table (spec.md §4.7): one axum `Router`
    /// covering every `/api/*` endpoint plus the optional `/dyn`, `/static`
    /// and fallback trees, with CORS and `no-cache` applied uniformly.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/api/render", post(render::render))
            .route("/api/updates", get(updates::get_updates))
            .route("/api/data", get(data::get_data))
            .route("/api/config", get(data::get_config).post(data::post_config))
            .route("/api/schemas", get(schemas::get_schemas))
            .route("/api/manifest", get(manifest::get_manifest))
            .route("/api/modalresult", post(modal_result::post_modal_result))
            .with_state(self.engine.clone());

        if let Some(dyn_router) = self.dyn_router.clone() {
            router = router.nest("/dyn", dyn_router);
        }

        if let Some(source) = self.static_assets.clone() {
            router = router.route(
                "/static/*path",
                get(move |axum::extract::Path(path): axum::extract::Path<String>| {
                    let source = source.clone();
                    async move { assets::serve(source.as_ref(), &path) }
                }),
            );
        }

        if let Some(bundle) = self.app_bundle.clone() {
            router = router.fallback(move |uri: axum::http::Uri| {
                let bundle = bundle.clone();
                async move { assets::serve(bundle.as_ref(), uri.path()) }
            });
        }

        router
            .layer(cors_layer(&self.engine.config.cors_allow))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache"),
            ))
    }

    /// Binds `TSUNAMI_LISTENADDR`, starts the async-notify bridge, and
    /// serves until `dispose` or process shutdown (spec.md §5 "The
    /// process-level context cancels on shutdown and triggers graceful
    /// HTTP server shutdown").
    pub async fn serve(&self) -> std::io::Result<()> {
        self.engine.spawn_background_tasks();
        let listener = tokio::net::TcpListener::bind(&self.engine.config.listen_addr).await?;
        info!(addr = %listener.local_addr()?, "tsunami listening");
        let engine = self.engine.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { engine.shutdown.notified().await })
            .await
    }
}

fn cors_layer(allow: &[String]) -> CorsLayer {
    if allow.is_empty() {
        return CorsLayer::new();
    }
    let origins: Vec<HeaderValue> = allow.iter().filter_map(|s| HeaderValue::from_str(s).ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
