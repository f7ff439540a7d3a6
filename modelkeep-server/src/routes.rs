//! Request routing. Pure: takes method, URL and body, returns a [`Reply`]. The
//! transport in `server.rs` owns sockets, headers and CORS.

use serde::Serialize;
use tiny_http::Method;

use modelkeep_core::commands::{Commands, SaveRequest, SaveResponse};
use modelkeep_core::config::AssetsConfig;
use modelkeep_core::services::{RecordStore, StoreError};

use crate::assets;

pub const JSON: &str = "application/json";
pub const TEXT: &str = "text/plain; charset=utf-8";

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: JSON,
                body,
            },
            Err(e) => {
                tracing::error!("response serialization failed: {e}");
                Self::text(500, "Internal Server Error")
            }
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: TEXT,
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: TEXT,
            body: Vec::new(),
        }
    }
}

pub fn route<S: RecordStore>(
    cmds: &Commands<S>,
    assets_cfg: &AssetsConfig,
    method: &Method,
    url: &str,
    body: &[u8],
) -> Reply {
    if *method == Method::Options {
        return Reply::empty(200);
    }

    let parsed = match url::Url::parse(&format!("http://localhost{url}")) {
        Ok(u) => u,
        Err(_) => return Reply::text(400, "Bad Request"),
    };

    match (method, parsed.path()) {
        (Method::Get, "/api/models") => list_models(cmds),
        (Method::Get, "/api/current-model") => {
            let name = parsed
                .query_pairs()
                .find(|(k, _)| k == "name")
                .map(|(_, v)| v.into_owned());
            Reply::json(200, &cmds.current_model(name.as_deref()))
        }
        (Method::Post, "/api/save-model") => save_model(cmds, body),
        (_, "/api/models" | "/api/current-model" | "/api/save-model") => {
            Reply::text(405, "Method Not Allowed")
        }
        (_, p) if p.starts_with("/api/") => Reply::text(404, "Not Found"),
        (Method::Get | Method::Head, p) => serve_asset(assets_cfg, p),
        _ => Reply::text(404, "File not found"),
    }
}

fn list_models<S: RecordStore>(cmds: &Commands<S>) -> Reply {
    match cmds.models() {
        Ok(models) => Reply::json(200, &models),
        Err(e) => {
            tracing::error!("Error listing models: {e}");
            Reply::json(500, &SaveResponse::new(false, "Error listing models"))
        }
    }
}

fn save_model<S: RecordStore>(cmds: &Commands<S>, body: &[u8]) -> Reply {
    let req: SaveRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!("rejecting save body: {e}");
            return Reply::json(400, &SaveResponse::new(false, "Invalid request body"));
        }
    };
    match cmds.save_model(req) {
        Ok(submission) => Reply::json(200, &SaveResponse::from_submission(&submission)),
        Err(StoreError::InvalidName { name, reason }) => {
            tracing::debug!("rejecting model name {name:?}: {reason}");
            Reply::json(400, &SaveResponse::new(false, "Invalid model name"))
        }
        Err(e) => {
            tracing::error!("Error saving model: {e}");
            Reply::json(500, &SaveResponse::failed())
        }
    }
}

fn serve_asset(cfg: &AssetsConfig, url_path: &str) -> Reply {
    let decoded = match urlencoding::decode(url_path) {
        Ok(p) => p,
        Err(_) => return Reply::text(400, "Bad Request"),
    };
    match assets::load(cfg, &decoded) {
        Some(asset) => Reply {
            status: 200,
            content_type: asset.content_type,
            body: asset.body,
        },
        None => Reply::text(404, "File not found"),
    }
}
