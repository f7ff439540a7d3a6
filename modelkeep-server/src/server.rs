//! HTTP transport: a `tiny_http` listener drained by a fixed pool of worker
//! threads. Every worker shares the same `Commands` (and so the same
//! registry); the registry does its own per-model locking.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use tiny_http::{Header, Request, Response, Server};

use modelkeep_core::commands::Commands;
use modelkeep_core::config::{AssetsConfig, ServerConfig};
use modelkeep_core::services::RecordStore;

use crate::routes::{self, Reply};

/// Largest request body read, in bytes.
pub const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB

const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// A running server. Dropping it does not stop the workers; call
/// [`ServerHandle::shutdown`] or [`ServerHandle::wait`].
pub struct ServerHandle {
    server: Arc<Server>,
    addr: SocketAddr,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until every worker has exited.
    pub fn wait(self) {
        for w in self.workers {
            let _ = w.join();
        }
    }

    /// Wake every worker out of `recv` and join them.
    pub fn shutdown(self) {
        for _ in &self.workers {
            self.server.unblock();
        }
        self.wait();
    }
}

pub fn start<S>(
    cmds: Arc<Commands<S>>,
    server_cfg: &ServerConfig,
    assets_cfg: &AssetsConfig,
) -> Result<ServerHandle>
where
    S: RecordStore + 'static,
{
    let bind = format!("{}:{}", server_cfg.host, server_cfg.port);
    let server = Server::http(&bind).map_err(|e| anyhow!("bind {bind}: {e}"))?;
    let addr = server
        .server_addr()
        .to_ip()
        .context("listener has no IP address")?;
    let server = Arc::new(server);

    let workers = (0..server_cfg.workers.max(1))
        .map(|i| {
            let server = Arc::clone(&server);
            let cmds = Arc::clone(&cmds);
            let assets_cfg = assets_cfg.clone();
            thread::Builder::new()
                .name(format!("http-worker-{i}"))
                .spawn(move || {
                    while let Ok(request) = server.recv() {
                        handle(&cmds, &assets_cfg, request);
                    }
                })
                .context("spawn http worker")
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!("Server running at http://{addr} ({} workers)", workers.len());
    Ok(ServerHandle {
        server,
        addr,
        workers,
    })
}

fn handle<S: RecordStore>(cmds: &Commands<S>, assets_cfg: &AssetsConfig, mut req: Request) {
    let method = req.method().clone();
    let url = req.url().to_string();

    let mut body = Vec::new();
    let reply = match req
        .as_reader()
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut body)
    {
        Ok(_) if body.len() as u64 > MAX_BODY_BYTES => Reply::text(413, "Payload Too Large"),
        Ok(_) => routes::route(cmds, assets_cfg, &method, &url, &body),
        Err(e) => {
            tracing::warn!("reading request body for {url}: {e}");
            Reply::text(400, "Bad Request")
        }
    };
    tracing::debug!("{method} {url} -> {}", reply.status);

    if let Err(e) = req.respond(into_response(reply)) {
        tracing::debug!("client went away before response to {url}: {e}");
    }
}

fn into_response(reply: Reply) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_data(reply.body).with_status_code(reply.status);
    let content_type = ("Content-Type", reply.content_type);
    for (name, value) in CORS_HEADERS.iter().chain(std::iter::once(&content_type)) {
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            response.add_header(header);
        }
    }
    response
}
