// src/commands/api.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::CoreConfig;
use crate::services::record::{Record, Submission};
use crate::services::registry::Registry;
use crate::services::store::{DirStore, RecordStore, StoreError};
use crate::utils::logbook::Logbook;

pub const MSG_SAVED: &str = "Model saved successfully";
pub const MSG_NOT_HIGHER: &str = "New score not higher than current best";
pub const MSG_SAVE_FAILED: &str = "Error saving model";

/// Request-facing facade over the registry: what the HTTP routes and the CLI
/// call. Owns the registry and the audit logbook.
pub struct Commands<S: RecordStore = DirStore> {
    registry: Registry<S>,
    logbook: Logbook,
}

/// Body of a save request. `name` falls back to the active model.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub score: f64,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    pub message: String,
}

impl SaveResponse {
    pub fn from_submission(s: &Submission) -> Self {
        match s {
            Submission::Accepted(_) => Self::new(true, MSG_SAVED),
            Submission::Rejected(_) => Self::new(false, MSG_NOT_HIGHER),
        }
    }

    pub fn failed() -> Self {
        Self::new(false, MSG_SAVE_FAILED)
    }

    pub fn new(success: bool, message: &str) -> Self {
        Self {
            success,
            message: message.to_string(),
        }
    }
}

impl Commands<DirStore> {
    /// Open the record directory from `config`, load it and seed the registry.
    pub fn open(config: &CoreConfig) -> Result<Self> {
        let store = DirStore::open(&config.store.data_dir, &config.store.extension)
            .context("open record store")?;
        let registry = Registry::seeded(store, &config.store.default_name)
            .context("load records")?;
        let current = registry.current_active();
        tracing::info!(
            "Loaded model: {} with score: {}",
            current.name,
            current.score
        );
        Ok(Self::from_parts(registry, Logbook::new(&config.logbook)))
    }
}

impl<S: RecordStore> Commands<S> {
    pub fn from_parts(registry: Registry<S>, logbook: Logbook) -> Self {
        let current = registry.current_active();
        logbook.record(
            "registry_seeded",
            json!({
                "active": current.name,
                "score": current.score,
                "names": registry.names(),
            }),
        );
        Self { registry, logbook }
    }

    pub fn registry(&self) -> &Registry<S> {
        &self.registry
    }

    pub fn logbook(&self) -> &Logbook {
        &self.logbook
    }

    /// Everything in storage right now, each tagged with its file-derived name.
    pub fn models(&self) -> Result<Vec<Record>, StoreError> {
        self.registry.store().list_all()
    }

    /// Held record for `name`, or for the active model.
    pub fn current_model(&self, name: Option<&str>) -> Record {
        match name {
            Some(n) => self.registry.current(n),
            None => self.registry.current_active(),
        }
    }

    /// Offer a model. Rejections are `Ok`; only storage problems are `Err`.
    pub fn save_model(&self, req: SaveRequest) -> Result<Submission, StoreError> {
        let name = req
            .name
            .unwrap_or_else(|| self.registry.active_name().to_string());
        let score = req.score;

        match self.registry.submit(&name, score, req.data) {
            Ok(Submission::Accepted(record)) => {
                self.logbook.record("model_committed", commit_entry(&record));
                Ok(Submission::Accepted(record))
            }
            Ok(Submission::Rejected(held)) => {
                self.logbook.record(
                    "model_rejected",
                    json!({"name": name, "score": score, "held_score": held.score}),
                );
                Ok(Submission::Rejected(held))
            }
            Err(e) => {
                self.logbook.record(
                    "model_write_failed",
                    json!({"name": name, "score": score, "error": e.to_string()}),
                );
                Err(e)
            }
        }
    }
}

/// Logbook payload for a commit: identity plus a digest of the bytes that
/// were persisted, so the trail can be checked against the record file.
fn commit_entry(record: &Record) -> Value {
    let bytes = serde_json::to_vec_pretty(record).unwrap_or_default();
    json!({
        "name": record.name,
        "score": record.score,
        "bytes": bytes.len(),
        "blake3": blake3::hash(&bytes).to_hex().to_string(),
    })
}
