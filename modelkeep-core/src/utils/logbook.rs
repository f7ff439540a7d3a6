// src/utils/logbook.rs
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};
use uuid::Uuid;

use crate::config::LogbookConfig;

#[derive(Serialize)]
struct LogLine<'a> {
    id: String,
    ts: String,
    event: &'a str,
    data: Value,
}

/// Append-only JSONL audit trail of registry decisions.
#[derive(Debug)]
pub struct Logbook {
    path: Option<PathBuf>,
    gate: Mutex<()>,
}

impl Logbook {
    pub fn new(cfg: &LogbookConfig) -> Self {
        Self {
            path: cfg.enabled.then(|| cfg.path.clone()),
            gate: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one event line. Returns the event id, or `None` when disabled.
    pub fn emit(&self, event: &str, data: Value) -> Result<Option<String>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let id = Uuid::new_v4().to_string();
        let line = LogLine {
            id: id.clone(),
            ts: Utc::now().to_rfc3339(),
            event,
            data,
        };
        let json = serde_json::to_string(&line)?;

        let _guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open logbook {}", path.display()))?;
        writeln!(f, "{}", json)?;
        Ok(Some(id))
    }

    /// Like [`Logbook::emit`], but failures only reach the diagnostics log.
    pub fn record(&self, event: &str, data: Value) {
        if let Err(e) = self.emit(event, data) {
            tracing::warn!("logbook append failed for {event}: {e:#}");
        }
    }
}
