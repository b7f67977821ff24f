//! `GET /static/*`, `GET /*` (spec.md §4.7): serve two optional embedded
//! file trees with `index.html` fallback for directory paths.
//!
//! The engine never depends on a concrete embedding crate - the hosting
//! application supplies an [`AssetSource`] (typically backed by
//! `rust-embed`, `include_dir!`, or a plain `ServeDir`-style lookup at
//! startup) so tsunami's own dependency stack stays what spec.md's ambient
//! stack calls for, nothing more.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// One embedded file tree. `get` receives a path with no leading slash.
pub trait AssetSource: Send + Sync {
    /// Returns the file's bytes and a MIME type, if present at `path`.
    fn get(&self, path: &str) -> Option<(Vec<u8>, String)>;
}

/// Looks up `raw_path` in `source`, falling back to `<dir>/index.html`
/// when `raw_path` names a directory (spec.md §4.7 "index.html fallback
/// for directory paths").
pub fn serve(source: &dyn AssetSource, raw_path: &str) -> Response {
    let path = raw_path.trim_start_matches('/');

    let direct = if path.is_empty() { None } else { source.get(path) };
    if let Some((bytes, mime)) = direct {
        return ([(header::CONTENT_TYPE, mime)], bytes).into_response();
    }

    let index_path = if path.is_empty() || path.ends_with('/') {
        format!("{path}index.html")
    } else {
        format!("{path}/index.html")
    };
    if let Some((bytes, mime)) = source.get(&index_path) {
        return ([(header::CONTENT_TYPE, mime)], bytes).into_response();
    }

    StatusCode::NOT_FOUND.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MemAssets(HashMap<&'static str, (&'static str, &'static str)>);

    impl AssetSource for MemAssets {
        fn get(&self, path: &str) -> Option<(Vec<u8>, String)> {
            self.0.get(path).map(|(bytes, mime)| (bytes.as_bytes().to_vec(), mime.to_string()))
        }
    }

    #[test]
    fn directory_path_falls_back_to_index_html() {
        let mut files = HashMap::new();
        files.insert("docs/index.html", ("<h1>docs</h1>", "text/html"));
        let source = MemAssets(files);
        let resp = serve(&source, "/docs/");
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn missing_path_is_404() {
        let source = MemAssets(HashMap::new());
        let resp = serve(&source, "/missing.js");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
