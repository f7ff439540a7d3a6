//! services/store.rs
//!
//! Directory-backed record storage.
//! - One file per model: `<dir>/<name>.<ext>`, pretty-printed JSON.
//! - The file stem is the record's name; whatever `name` the file carries is
//!   ignored on load so names always round-trip through the filesystem.
//! - Writes go through a temp file + rename. A half-written temp file never
//!   carries the record extension, so listing never sees it.
//! - Subdirectories are listed too, but a name appears at most once: the
//!   top-level file wins since it is the one `write` replaces, otherwise the
//!   first in walk order.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use walkdir::WalkDir;

use crate::services::record::Record;
use crate::utils::path::{check_name, write_atomic};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage i/o failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed record {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not serialize record {name:?}: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid record name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

impl StoreError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Persistence seam used by the registry.
pub trait RecordStore: Send + Sync {
    /// Every parseable record currently in storage, in a stable order.
    fn list_all(&self) -> Result<Vec<Record>, StoreError>;

    /// Durably replace the stored record for `record.name`.
    fn write(&self, record: &Record) -> Result<(), StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn list_all(&self) -> Result<Vec<Record>, StoreError> {
        (**self).list_all()
    }

    fn write(&self, record: &Record) -> Result<(), StoreError> {
        (**self).write(record)
    }
}

/// Filesystem store rooted at a single directory (e.g. `./data`).
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
    extension: String,
}

impl DirStore {
    /// Open or create the store directory (idempotent).
    pub fn open(dir: impl Into<PathBuf>, extension: &str) -> Result<Self, StoreError> {
        let store = Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
        };
        store.ensure_dir()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the record named `name` lives.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        check_name(name).map_err(|reason| StoreError::InvalidName {
            name: name.to_string(),
            reason,
        })?;
        Ok(self.dir.join(format!("{name}.{}", self.extension)))
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))
    }

    /// Name derived from a storage entry, if the entry is a record file.
    fn record_name(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?;
        if ext != self.extension {
            return None;
        }
        path.file_stem()?.to_str().map(str::to_string)
    }

    fn load(&self, path: &Path, name: String) -> Result<Record, StoreError> {
        let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        let mut record: Record = serde_json::from_str(&text).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        record.name = name;
        Ok(record)
    }
}

impl RecordStore for DirStore {
    fn list_all(&self) -> Result<Vec<Record>, StoreError> {
        self.ensure_dir()?;

        let mut out: Vec<Record> = Vec::new();
        // name -> (index in `out`, walk depth it came from)
        let mut seen: HashMap<String, (usize, usize)> = HashMap::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    // A broken subdirectory is skipped like a bad record; the
                    // root itself being unreadable is a real failure.
                    if e.depth() == 0 {
                        let source = e
                            .into_io_error()
                            .unwrap_or_else(|| io::Error::other("walk failed"));
                        return Err(StoreError::io(&self.dir, source));
                    }
                    tracing::warn!("skipping unreadable storage entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(name) = self.record_name(path) else {
                continue;
            };
            if let Err(reason) = check_name(&name) {
                tracing::warn!("skipping {}: {reason}", path.display());
                continue;
            }
            let depth = entry.depth();
            let replaces = match seen.get(&name) {
                Some(&(idx, held)) if depth == 1 && held > 1 => Some(idx),
                Some(_) => {
                    tracing::warn!("skipping {}: duplicate record name {name:?}", path.display());
                    continue;
                }
                None => None,
            };
            let record = match self.load(path, name) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("skipping record: {e}");
                    continue;
                }
            };
            match replaces {
                Some(idx) => {
                    tracing::warn!("{} shadows a nested record", path.display());
                    seen.insert(record.name.clone(), (idx, depth));
                    out[idx] = record;
                }
                None => {
                    seen.insert(record.name.clone(), (out.len(), depth));
                    out.push(record);
                }
            }
        }
        Ok(out)
    }

    fn write(&self, record: &Record) -> Result<(), StoreError> {
        let path = self.path_for(&record.name)?;
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Serialize {
            name: record.name.clone(),
            source: e,
        })?;
        self.ensure_dir()?;
        write_atomic(&path, &bytes).map_err(|e| StoreError::io(&path, e))?;
        tracing::debug!("wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}
