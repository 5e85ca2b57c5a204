//! Version comparison and incremental-update planning/application.
//!
//! Grounded on `GetUpdatePackagePath`/`ApplyIncrementalUpdate` from the
//! original client, with one intentional deviation: version comparison
//! normalizes to a numeric triple with a string-compare fallback, rather
//! than the original's raw string compare (which mis-orders e.g. `1.10.0`
//! and `1.9.0`). The `from == "0.0.1"` graph exclusion, by contrast, is kept
//! exactly as observed — it looks like a special case for the original's
//! baseline packages, but nothing confirms the intent, so it's preserved
//! rather than "fixed".

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use crate::archive;
use crate::error::{Result, UpdaterError};
use crate::fetcher::HttpFetcher;
use crate::hasher;
use crate::manifest::Package;

const BASELINE_VERSION: &str = "0.0.0";
/// Packages with this `from_version` are excluded from the general BFS
/// graph, per the undocumented behavior observed in the original source.
const EXCLUDED_GRAPH_SOURCE: &str = "0.0.1";

const CHAIN_MANIFEST_NAMES: [&str; 4] = [
    "update_manifest.txt",
    "changelog.txt",
    "file_list.txt",
    "manifest.txt",
];

/// Parses a version string into a numeric triple when possible.
fn parse_triple(version: &str) -> Option<(u64, u64, u64)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// Compare two version strings. Both parse as `MAJOR.MINOR.PATCH` compare
/// numerically; otherwise falls back to lexicographic string compare, which
/// is what the original always did.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_triple(a), parse_triple(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

pub fn is_newer(remote: &str, local: &str) -> bool {
    compare_versions(remote, local) == Ordering::Greater
}

/// True when `remote` and `local` differ by a full major version, or by a
/// minor-version gap of 3 or more within the same major version. Informs a
/// log message only; it never changes which update path is taken.
pub fn should_force_hash_update(remote: &str, local: &str) -> bool {
    match (parse_triple(remote), parse_triple(local)) {
        (Some((rmaj, rmin, _)), Some((lmaj, lmin, _))) => {
            rmaj != lmaj || (rmaj == lmaj && rmin.abs_diff(lmin) >= 3)
        }
        _ => false,
    }
}

/// Find an ordered list of archive URLs to go from `from` to `to`.
pub fn plan(packages: &[Package], from: &str, to: &str) -> Vec<String> {
    if let Some(direct) = packages
        .iter()
        .find(|pkg| pkg.from_version == from && pkg.to_version == to)
    {
        return vec![direct.archive.clone()];
    }

    if let Some(baseline) = packages
        .iter()
        .find(|pkg| pkg.from_version == BASELINE_VERSION && pkg.to_version == to)
    {
        return vec![baseline.archive.clone()];
    }

    bfs(packages, from, to)
}

fn bfs(packages: &[Package], from: &str, to: &str) -> Vec<String> {
    let mut graph: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for pkg in packages {
        if pkg.from_version == EXCLUDED_GRAPH_SOURCE {
            continue;
        }
        graph
            .entry(pkg.from_version.as_str())
            .or_default()
            .push((pkg.to_version.as_str(), pkg.archive.as_str()));
    }

    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(from);
    let mut queue: VecDeque<(&str, Vec<String>)> = VecDeque::new();
    queue.push_back((from, Vec::new()));

    while let Some((current, path)) = queue.pop_front() {
        if current == to && !path.is_empty() {
            return path;
        }
        if let Some(edges) = graph.get(current) {
            for (next, archive) in edges {
                if visited.insert(next) {
                    let mut next_path = path.clone();
                    next_path.push(archive.to_string());
                    if *next == to {
                        return next_path;
                    }
                    queue.push_back((next, next_path));
                }
            }
        }
    }

    Vec::new()
}

/// Download, verify and apply each archive in `archive_urls` in order,
/// against `target_dir`. Stops and returns an error at the first failing
/// step; the caller falls back to a full version-mode update in that case.
pub async fn apply_chain(
    fetcher: &HttpFetcher,
    archive_urls: &[String],
    target_dir: &Path,
    hash_algorithm: &str,
    expected_hashes: &HashMap<String, String>,
    expected_sizes: &HashMap<String, u64>,
) -> Result<()> {
    for url in archive_urls {
        apply_one(fetcher, url, target_dir, hash_algorithm, expected_hashes, expected_sizes).await?;
    }
    Ok(())
}

async fn apply_one(
    fetcher: &HttpFetcher,
    url: &str,
    target_dir: &Path,
    hash_algorithm: &str,
    expected_hashes: &HashMap<String, String>,
    expected_sizes: &HashMap<String, u64>,
) -> Result<()> {
    let expected_size = expected_sizes.get(url).copied().unwrap_or(0);
    let bytes = fetcher.download_to_memory(url, expected_size, None).await?;

    if expected_size > 0 && bytes.len() as u64 != expected_size {
        tracing::warn!(
            %url,
            expected = expected_size,
            actual = bytes.len(),
            "incremental package size does not match manifest"
        );
    }

    if let Some(expected) = expected_hashes.get(url) {
        let algorithm = hasher::Algorithm::parse(hash_algorithm).unwrap_or(hasher::Algorithm::Md5);
        let actual = hasher::hash_bytes(&bytes, algorithm);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(UpdaterError::Integrity(format!(
                "incremental package {url} hash mismatch"
            )));
        }
    }

    let staging = tempfile::Builder::new()
        .prefix(".incremental-staging-")
        .tempdir()?;
    archive::extract(&bytes, staging.path())?;

    match find_chain_manifest(staging.path()) {
        Some(manifest_path) => apply_from_manifest(&manifest_path, staging.path(), target_dir)?,
        None => copy_tree(staging.path(), target_dir)?,
    }

    Ok(())
}

fn find_chain_manifest(staging: &Path) -> Option<std::path::PathBuf> {
    CHAIN_MANIFEST_NAMES
        .iter()
        .map(|name| staging.join(name))
        .find(|path| path.is_file())
}

/// Apply the `A:`/`M:`/`D:`/`#` line format from a chain manifest.
fn apply_from_manifest(manifest_path: &Path, staging: &Path, target_dir: &Path) -> Result<()> {
    let text = std::fs::read_to_string(manifest_path)?;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rel) = line.strip_prefix("A:").or_else(|| line.strip_prefix("M:")) {
            copy_one(&staging.join(rel.trim()), &target_dir.join(rel.trim()))?;
        } else if let Some(rel) = line.strip_prefix("D:") {
            let path = target_dir.join(rel.trim());
            if path.is_file() {
                std::fs::remove_file(path)?;
            } else if path.is_dir() {
                std::fs::remove_dir_all(path)?;
            }
        }
    }
    Ok(())
}

fn copy_one(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dst)?;
    Ok(())
}

/// Copy every regular file under `src` onto `dst`, backing up any file
/// already there before overwriting it, the way `ApplyAllFilesFromUpdate`
/// calls `BackupFile` ahead of every overwrite in the whole-tree fallback.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);
        if target.is_file() {
            crate::dir_sync::backup(&target);
        }
        copy_one(entry.path(), &target)?;
    }
    Ok(())
}
