//! Local scratch paths
//!
//! Every download lands at a path derived from the full artifact identifier
//! and version. Registry pulls are staged in a private directory of their own
//! and only the finished file is moved into place, so passes for different
//! declarations never see each other's files. Nothing is cleaned up after a
//! pass beyond the staging directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::error::{FetchError, FetchResult};

/// Name prefix of the per-pass staging directories
pub const STAGING_PREFIX: &str = ".staging-";

/// Last `/`-separated component of `path`, ignoring trailing slashes
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Everything before the last `/`-separated component, or `""` when there is none
pub fn dir_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// Reject components that would escape or alias the scratch directory
pub fn plain_component(name: &str) -> FetchResult<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
        return Err(FetchError::InvalidArtifact(format!(
            "`{}` is not a usable file name",
            name
        )));
    }
    Ok(name)
}

/// Directory a registry artifact is kept in: `<scratch>/<uri components>/<version>`
pub fn artifact_dir(scratch: &Path, uri: &str, version: &str) -> FetchResult<PathBuf> {
    let mut dir = scratch.to_path_buf();
    let mut components = 0;
    for component in uri.split('/').filter(|c| !c.is_empty()) {
        dir.push(plain_component(component)?);
        components += 1;
    }
    if components == 0 {
        return Err(FetchError::InvalidArtifact(format!("`{}` has no path", uri)));
    }
    dir.push(plain_component(version)?);
    Ok(dir)
}

/// Create a private staging directory inside `dir`, removed when dropped
pub async fn staging_dir(dir: &Path) -> FetchResult<TempDir> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| FetchError::io("creating download directory", e))?;

    tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(dir)
        .map_err(|e| FetchError::io("creating staging directory", e))
}

/// Move `staged` into `dir` under its own name, then drop every other file a
/// previous pass left in `dir`.
///
/// The rename replaces an existing copy atomically, so a concurrent reader of
/// the previous file keeps a consistent view.
pub async fn promote(staged: &Path, dir: &Path) -> FetchResult<PathBuf> {
    let name = staged
        .file_name()
        .ok_or_else(|| FetchError::InvalidArtifact(staged.display().to_string()))?;
    let target = dir.join(name);
    tokio::fs::rename(staged, &target)
        .await
        .map_err(|e| FetchError::io("moving downloaded file into place", e))?;

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| FetchError::io("reading download directory", e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FetchError::io("reading download directory", e))?
    {
        let entry_name = entry.file_name();
        if entry_name.as_os_str() == name || entry_name.to_string_lossy().starts_with(STAGING_PREFIX) {
            continue;
        }
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| FetchError::io("reading download directory", e))?
            .is_file();
        if is_file {
            debug!(file = %entry.path().display(), "removing previous download");
            remove_file_if_exists(&entry.path()).await?;
        }
    }

    Ok(target)
}

/// Remove a previously downloaded file, if any
pub async fn remove_file_if_exists(path: &Path) -> FetchResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FetchError::io("removing previous download", e)),
    }
}
