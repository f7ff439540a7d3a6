use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// Longest model name accepted, in bytes.
pub const MAX_NAME_LEN: usize = 128;

/// Ensure that a candidate absolute path resolves to a location contained
/// within the canonicalized `root_abs`. Returns the canonicalized path.
///
/// The candidate must exist; this is used for serving files, never creating
/// them. Symlinks are resolved before the containment check.
pub fn assert_within_root_abs(root_abs: &Path, candidate_abs: &Path) -> Result<PathBuf> {
    let root = root_abs
        .canonicalize()
        .with_context(|| format!("canonicalize root {:?}", root_abs))?;
    let resolved = candidate_abs
        .canonicalize()
        .with_context(|| format!("canonicalize {:?}", candidate_abs))?;

    if !resolved.starts_with(&root) {
        anyhow::bail!(
            "path escapes root: path={:?} root={:?}",
            candidate_abs, root
        );
    }
    Ok(resolved)
}

/// Join a URL-style relative path onto `root`.
/// Rejects `..`, absolute components and drive prefixes.
pub fn resolve_rel_within_root(root: &Path, rel: &str) -> Result<PathBuf> {
    let rel = rel.trim_start_matches('/');
    let mut out = root.to_path_buf();
    for c in Path::new(rel).components() {
        match c {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => anyhow::bail!("parent paths not allowed"),
            Component::RootDir | Component::Prefix(_) => {
                anyhow::bail!("absolute paths are not allowed")
            }
        }
    }
    Ok(out)
}

/// Check that `name` can be used as a record file stem and read back
/// unchanged. Returns the reason on failure.
pub fn check_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty name");
    }
    if name.len() > MAX_NAME_LEN {
        return Err("name too long");
    }
    if name.starts_with('.') {
        return Err("leading dot");
    }
    if name.contains(['/', '\\', '\0']) {
        return Err("path separator or NUL");
    }
    if name.contains("..") {
        return Err("contains `..`");
    }
    if name.trim() != name {
        return Err("surrounding whitespace");
    }
    Ok(())
}

/// Atomically replace `path` with `bytes`.
/// Writes a sibling `.tmp` file, syncs it, renames over the target, then syncs
/// the parent directory so the rename itself survives a power loss. A reader
/// sees either the old content or the new, never a torn file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let written = (|| {
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(bytes)?;
        f.flush()?;
        f.sync_all()
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    // The new content is already in place; failing here would leave the
    // caller believing the old record is still on disk.
    if let Err(e) = sync_parent(path) {
        tracing::warn!("directory sync after replacing {} failed: {e}", path.display());
    }
    Ok(())
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::File::open(parent)?.sync_all(),
        _ => fs::File::open(".")?.sync_all(),
    }
}

// Directory handles cannot be opened for syncing here; the rename is as
// durable as the platform makes it.
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}
