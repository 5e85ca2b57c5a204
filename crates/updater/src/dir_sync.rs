//! Hash-mode directory synchronization.
//!
//! Reimplements `SyncDirectoryByHash`: download the directory's archive,
//! extract it into a unique staging directory, hash-verify each staged
//! entry against the manifest (warning, not aborting, on a mismatch) and
//! copy it onto the live tree unconditionally, and (when enabled) delete
//! local files the manifest no longer lists. Staging always happens off to
//! the side so a failed sync never leaves the live directory
//! half-extracted.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;
use crate::fetcher::HttpFetcher;
use crate::manifest::DirEntry;
use crate::progress::Progress;
use crate::{archive, hasher};

/// Outcome of syncing one manifest directory entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirOutcome {
    pub copied: Vec<String>,
    pub removed_orphans: Vec<String>,
}

/// Sync a manifest directory entry (an archive plus its expected contents)
/// into `game_dir`.
pub async fn sync_directory(
    fetcher: &HttpFetcher,
    entry: &DirEntry,
    game_dir: &Path,
    hash_algorithm: &str,
    enable_file_deletion: bool,
) -> Result<DirOutcome> {
    let target_dir = game_dir.join(entry.path.replace('\\', "/"));
    std::fs::create_dir_all(&target_dir)?;

    let staging = tempfile::Builder::new()
        .prefix(".update-staging-")
        .tempdir_in(game_dir)?;

    let progress = Progress::new(entry.path.clone());
    let mut on_progress = |downloaded: u64, total: u64| {
        if let Some(tick) = progress.update(downloaded, total) {
            tracing::debug!(
                dir = %progress.label(),
                progress = %tick.format_bytes(),
                percent = ?tick.percent,
                "downloading archive"
            );
        }
    };
    let bytes = fetcher
        .download_to_memory(&entry.url, 0, Some(&mut on_progress))
        .await?;

    archive::extract(&bytes, staging.path())?;

    let mut outcome = DirOutcome::default();
    for file in &entry.contents {
        let staged_path = staging.path().join(file.path.replace('\\', "/"));
        let live_path = target_dir.join(file.path.replace('\\', "/"));

        if !staged_path.is_file() {
            continue;
        }

        copy_staged_entry(&staged_path, &live_path, &file.path, &file.hash, hash_algorithm)?;
        outcome.copied.push(file.path.clone());
    }

    if enable_file_deletion {
        outcome.removed_orphans = cleanup_orphans(&target_dir, entry)?;
    }

    Ok(outcome)
}

/// Hash-verify a staged archive entry against its manifest hash (warning,
/// never aborting, on a mismatch) and copy it onto the live tree
/// unconditionally, matching `SyncDirectoryByHash`'s treatment of a staged
/// file: the download already trusted the server, so a mismatch here is
/// diagnostic, not a reason to keep a stale live file around.
fn copy_staged_entry(
    staged_path: &Path,
    live_path: &Path,
    label: &str,
    expected_hash: &str,
    hash_algorithm: &str,
) -> Result<()> {
    if !expected_hash.is_empty() {
        match hasher::hash_file(staged_path, hash_algorithm) {
            Ok(actual) if actual.eq_ignore_ascii_case(expected_hash) => {}
            _ => {
                tracing::warn!(
                    file = %label,
                    "staged archive entry hash does not match manifest, copying anyway"
                );
            }
        }
    }

    if let Some(parent) = live_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(staged_path, live_path)?;
    Ok(())
}

/// Remove local files under `dir` that the manifest no longer lists, the
/// same cleanup `CleanupOrphanedFiles` performed after a directory sync.
fn cleanup_orphans(dir: &Path, entry: &DirEntry) -> Result<Vec<String>> {
    let expected: std::collections::HashSet<String> = entry
        .contents
        .iter()
        .map(|file| normalize(&file.path))
        .collect();

    let mut removed = Vec::new();
    for item in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !item.file_type().is_file() {
            continue;
        }
        let rel = item
            .path()
            .strip_prefix(dir)
            .unwrap_or(item.path())
            .to_string_lossy()
            .into_owned();
        let rel = normalize(&rel);
        if !expected.contains(&rel) {
            if std::fs::remove_file(item.path()).is_ok() {
                removed.push(rel);
            }
        }
    }
    Ok(removed)
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Remove every path in `delete_list` (file or directory) from `game_dir`,
/// reimplementing `ProcessDeleteList`. A failure to remove one entry is
/// logged and skipped; the original never aborted the run over this.
pub fn process_delete_list(delete_list: &[String], game_dir: &Path) -> Vec<String> {
    let mut removed = Vec::new();
    for rel in delete_list {
        let full = game_dir.join(normalize(rel));
        if !full.exists() {
            continue;
        }
        let result = if full.is_dir() {
            std::fs::remove_dir_all(&full)
        } else {
            std::fs::remove_file(&full)
        };
        match result {
            Ok(()) => removed.push(rel.clone()),
            Err(err) => {
                tracing::warn!(path = %rel, %err, "failed to delete path from delete_list")
            }
        }
    }
    removed
}

/// Best-effort backup of `path` to `<path>.backup`, reimplementing
/// `BackupFile`. Failure is logged and never aborts the caller's update.
pub fn backup(path: &Path) {
    if !path.exists() {
        return;
    }
    let backup_path = append_backup_suffix(path);
    let result = if path.is_dir() {
        copy_dir_recursive(path, &backup_path)
    } else {
        std::fs::copy(path, &backup_path).map(|_| ())
    };
    if let Err(err) = result {
        tracing::warn!(path = %path.display(), %err, "failed to back up path before replacing it");
    }
}

fn append_backup_suffix(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    if dst.exists() {
        std::fs::remove_dir_all(dst)?;
    }
    std::fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|err| {
            err.into_io_error()
                .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk failed"))
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Download an archive from `url` and extract it onto `dest`, backing up
/// any existing content first. This is the full version-mode path
/// (`DownloadAndExtract` in the original) — unlike [`sync_directory`], it
/// never stages or hash-verifies first; the manifest's URL is trusted
/// directly onto the live tree.
pub async fn download_and_extract(fetcher: &HttpFetcher, url: &str, dest: &Path) -> Result<usize> {
    let bytes = fetcher.download_to_memory(url, 0, None).await?;

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    if dest.exists() {
        backup(dest);
    }

    archive::extract(&bytes, dest)
}
