//! Static files served from the configured asset root.

use std::fs;
use std::path::PathBuf;

use modelkeep_core::config::AssetsConfig;
use modelkeep_core::utils::path::{assert_within_root_abs, resolve_rel_within_root};

/// Bytes and content type of a served file.
pub struct Asset {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Resolve `url_path` (already percent-decoded) to a file under the asset
/// root. Directories resolve to their index file. Anything outside the root,
/// missing or unreadable is `None`.
pub fn load(cfg: &AssetsConfig, url_path: &str) -> Option<Asset> {
    let path = locate(cfg, url_path)?;
    let resolved = match assert_within_root_abs(&cfg.root, &path) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!("refusing {url_path:?}: {e:#}");
            return None;
        }
    };
    match fs::read(&resolved) {
        Ok(body) => Some(Asset {
            content_type: content_type_for(&resolved),
            body,
        }),
        Err(e) => {
            tracing::warn!("Error serving {}: {e}", resolved.display());
            None
        }
    }
}

fn locate(cfg: &AssetsConfig, url_path: &str) -> Option<PathBuf> {
    let mut path = resolve_rel_within_root(&cfg.root, url_path).ok()?;
    if path.is_dir() {
        path.push(&cfg.index);
    }
    path.is_file().then_some(path)
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
