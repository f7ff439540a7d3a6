// modelkeep-core/src/commands/init.rs

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CoreConfig;
use crate::utils::path::write_atomic;

#[derive(Debug, Clone)]
pub struct InitReport {
    pub root: PathBuf,
    pub config: CoreConfig,
    pub created: Vec<String>,
    pub existed: Vec<String>,
}

/// Resolve the service root: explicit value, then MODELKEEP_ROOT, then `.`.
pub fn modelkeep_root(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("MODELKEEP_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Ensure the root layout exists and load its config (idempotent).
///
/// Creates the root, a default `config.toml` and the record directory named
/// by that config. Existing files are never touched.
pub fn initialize(root: &Path) -> Result<InitReport> {
    let mut created = Vec::new();
    let mut existed = Vec::new();

    ensure_dir(root, ".", &mut created, &mut existed)?;
    ensure_file(
        root,
        "config.toml",
        DEFAULT_CONFIG_TOML,
        &mut created,
        &mut existed,
    )?;

    let config = CoreConfig::load(root)?;
    let data_dir = &config.store.data_dir;
    let label = data_dir
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| data_dir.display().to_string());
    ensure_dir(data_dir, &label, &mut created, &mut existed)?;

    tracing::debug!(
        "initialized {}: created={:?} existed={:?}",
        root.display(),
        created,
        existed
    );
    Ok(InitReport {
        root: root.to_path_buf(),
        config,
        created,
        existed,
    })
}

fn ensure_dir(
    path: &Path,
    label: &str,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    if path.exists() {
        existed.push(label.to_string());
        return Ok(());
    }
    fs::create_dir_all(path).with_context(|| format!("create_dir_all({:?})", path))?;
    created.push(label.to_string());
    Ok(())
}

fn ensure_file(
    base: &Path,
    rel_file: &str,
    content_if_absent: &str,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let p = base.join(rel_file);
    if p.exists() {
        existed.push(rel_file.to_string());
        return Ok(());
    }
    write_atomic(&p, content_if_absent.as_bytes())
        .with_context(|| format!("write {:?}", p))?;
    created.push(rel_file.to_string());
    Ok(())
}

// ---------- defaults ----------

const DEFAULT_CONFIG_TOML: &str = r#"[server]
host = "0.0.0.0"
port = 3000
workers = 4

[store]
data_dir = "data"
extension = "json"
default_name = "default"

[assets]
root = "."
index = "index.html"

[logbook]
enabled = true
path = "logbook.jsonl"
"#;
