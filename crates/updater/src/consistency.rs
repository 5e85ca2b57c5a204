//! Local tree vs. manifest consistency checking.
//!
//! Reimplements `CheckFileConsistency`: walk every file the manifest
//! expects, without downloading anything, and report what's missing or
//! hash-mismatched. Used ahead of a sync to decide whether one is even
//! needed, and surfaced to the user as a dry-run report.

use std::path::Path;

use crate::hasher;
use crate::manifest::Manifest;

/// Outcome of comparing the local game directory against a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub total: usize,
    pub missing: Vec<String>,
    pub mismatched: Vec<String>,
    pub ok: usize,
}

impl Report {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

/// Check every file entry (top-level and nested in directories) against
/// `game_dir`, logging progress every 50 entries the way the original did.
/// A directory entry whose own path is absent contributes one `missing`
/// independent of its `contents`, which are still checked individually.
pub fn check(manifest: &Manifest, game_dir: &Path, hash_algorithm: &str) -> Report {
    let mut report = Report::default();
    let mut checked = 0usize;

    for entry in &manifest.files {
        check_one(&entry.path, &entry.hash, game_dir, hash_algorithm, &mut report);
        checked += 1;
        log_progress(checked);
    }

    for dir in &manifest.directories {
        if !game_dir.join(dir.path.replace('\\', "/")).is_dir() {
            report.total += 1;
            report.missing.push(dir.path.clone());
        }

        for entry in &dir.contents {
            let rel = format!("{}/{}", dir.path.trim_end_matches('/'), entry.path);
            check_one(&rel, &entry.hash, game_dir, hash_algorithm, &mut report);
            checked += 1;
            log_progress(checked);
        }
    }

    report
}

fn log_progress(checked: usize) {
    if checked % 50 == 0 {
        tracing::debug!(checked, "consistency check progress");
    }
}

fn check_one(
    rel_path: &str,
    expected_hash: &str,
    game_dir: &Path,
    hash_algorithm: &str,
    report: &mut Report,
) {
    report.total += 1;
    let local_path = game_dir.join(rel_path.replace('\\', "/"));

    if !local_path.is_file() {
        report.missing.push(rel_path.to_string());
        return;
    }

    if expected_hash.is_empty() {
        report.ok += 1;
        return;
    }

    match hasher::hash_file(&local_path, hash_algorithm) {
        Ok(actual) if actual.eq_ignore_ascii_case(expected_hash) => report.ok += 1,
        _ => report.mismatched.push(rel_path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{DirEntry, FileEntry, FileKind, Manifest};
    use tempfile::tempdir;

    fn file_entry(path: &str, hash: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            url: String::new(),
            hash: hash.to_string(),
            size: None,
            kind: FileKind::File,
        }
    }

    #[test]
    fn reports_missing_file() {
        let dir = tempdir().unwrap();
        let manifest = Manifest {
            version: "1.0.0".into(),
            update_mode: None,
            files: vec![file_entry("absent.txt", "")],
            directories: vec![],
            delete_list: vec![],
            launcher: None,
            incremental_packages: vec![],
            changelog: vec![],
        };
        let report = check(&manifest, dir.path(), "md5");
        assert_eq!(report.missing, vec!["absent.txt".to_string()]);
        assert!(!report.is_consistent());
    }

    #[test]
    fn reports_hash_mismatch_and_ok() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("present.txt"), b"hello world").unwrap();
        let good_hash = crate::hasher::hash_bytes(b"hello world", crate::hasher::Algorithm::Md5);

        let manifest = Manifest {
            version: "1.0.0".into(),
            update_mode: None,
            files: vec![
                file_entry("present.txt", &good_hash),
                file_entry("present.txt", "deadbeef"),
            ],
            directories: vec![],
            delete_list: vec![],
            launcher: None,
            incremental_packages: vec![],
            changelog: vec![],
        };
        let report = check(&manifest, dir.path(), "md5");
        assert_eq!(report.ok, 1);
        assert_eq!(report.mismatched.len(), 1);
    }

    #[test]
    fn checks_nested_directory_contents() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("mods")).unwrap();
        std::fs::write(dir.path().join("mods/a.jar"), b"jar").unwrap();

        let manifest = Manifest {
            version: "1.0.0".into(),
            update_mode: None,
            files: vec![],
            directories: vec![DirEntry {
                path: "mods".into(),
                url: String::new(),
                contents: vec![file_entry("a.jar", "")],
            }],
            delete_list: vec![],
            launcher: None,
            incremental_packages: vec![],
            changelog: vec![],
        };
        let report = check(&manifest, dir.path(), "md5");
        assert_eq!(report.total, 1);
        assert_eq!(report.ok, 1);
    }

    #[test]
    fn missing_directory_path_is_reported_independent_of_contents() {
        let dir = tempdir().unwrap();

        let manifest = Manifest {
            version: "1.0.0".into(),
            update_mode: None,
            files: vec![],
            directories: vec![DirEntry {
                path: "mods".into(),
                url: String::new(),
                contents: vec![file_entry("a.jar", "")],
            }],
            delete_list: vec![],
            launcher: None,
            incremental_packages: vec![],
            changelog: vec![],
        };
        let report = check(&manifest, dir.path(), "md5");
        // One `missing` for the absent `mods` directory itself, one more
        // for its absent `a.jar` content entry.
        assert_eq!(report.total, 2);
        assert_eq!(report.missing, vec!["mods".to_string(), "mods/a.jar".to_string()]);
        assert!(!report.is_consistent());
    }
}
