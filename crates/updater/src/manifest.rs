//! Typed records for the remote update manifest.
//!
//! Unrecognized fields are ignored by `serde`'s default behavior; every
//! optional field the original treated as "is this member present?" is an
//! `Option` or carries a `#[serde(default)]` here.

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdaterError};
use crate::fetcher::HttpFetcher;

/// A document larger than this is rejected outright, mirroring the
/// original's `maxDocumentSize` guard against a misbehaving server.
pub const MAX_MANIFEST_BYTES: usize = 10 * 1024 * 1024;

/// How a [`FileEntry`] in the plain `files` list should be applied. The
/// original's full (version-mode) sync inspects a `type` field on file
/// entries to decide whether an entry is really a nested directory archive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    File,
    Directory,
}

/// One file the client must keep in sync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(rename = "type", default)]
    pub kind: FileKind,
}

/// A directory synchronized as a downloaded archive plus a manifest of its
/// expected contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirEntry {
    pub path: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub contents: Vec<FileEntry>,
}

/// An incremental delta package between two versions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Package {
    pub from_version: String,
    pub to_version: String,
    pub archive: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Replacement information for the updater binary itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LauncherInfo {
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub hash: String,
}

/// The full remote manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub update_mode: Option<String>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub directories: Vec<DirEntry>,
    #[serde(default)]
    pub delete_list: Vec<String>,
    #[serde(default)]
    pub launcher: Option<LauncherInfo>,
    #[serde(default)]
    pub incremental_packages: Vec<Package>,
    #[serde(default)]
    pub changelog: Vec<String>,
}

impl Manifest {
    /// Parse a manifest document, rejecting empty and oversized bodies and
    /// documents lacking a `version` field (`serde` enforces the latter
    /// since `version` has no default).
    pub fn parse(bytes: &[u8]) -> Result<Manifest> {
        if bytes.is_empty() {
            return Err(UpdaterError::manifest("manifest response was empty"));
        }
        if bytes.len() > MAX_MANIFEST_BYTES {
            return Err(UpdaterError::manifest(format!(
                "manifest document exceeds {MAX_MANIFEST_BYTES} bytes"
            )));
        }
        serde_json::from_slice(bytes).map_err(|err| UpdaterError::manifest(err.to_string()))
    }

    /// Effective update mode: the server's `update_mode` overrides the
    /// client's configured preference when present and non-empty.
    pub fn effective_mode<'a>(&'a self, configured: &'a str) -> &'a str {
        match &self.update_mode {
            Some(mode) if !mode.trim().is_empty() => mode.as_str(),
            _ => configured,
        }
    }
}

/// Fetch and parse a manifest from `url`.
pub async fn fetch(fetcher: &HttpFetcher, url: &str) -> Result<Manifest> {
    let bytes = fetcher.get_text(url).await?;
    Manifest::parse(bytes.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let json = br#"{"version":"1.2.3"}"#;
        let manifest = Manifest::parse(json).unwrap();
        assert_eq!(manifest.version, "1.2.3");
        assert!(manifest.files.is_empty());
        assert!(manifest.update_mode.is_none());
    }

    #[test]
    fn rejects_missing_version() {
        let json = br#"{"files":[]}"#;
        assert!(Manifest::parse(json).is_err());
    }

    #[test]
    fn rejects_empty_body() {
        assert!(Manifest::parse(b"").is_err());
    }

    #[test]
    fn server_mode_overrides_client_preference_when_present() {
        let json = br#"{"version":"1.0.0","update_mode":"hash"}"#;
        let manifest = Manifest::parse(json).unwrap();
        assert_eq!(manifest.effective_mode("version"), "hash");

        let json = br#"{"version":"1.0.0","update_mode":""}"#;
        let manifest = Manifest::parse(json).unwrap();
        assert_eq!(manifest.effective_mode("version"), "version");
    }

    #[test]
    fn parses_full_manifest_shape() {
        let json = br#"{
            "version": "2.0.0",
            "update_mode": "hash",
            "files": [{"path": "a.txt", "url": "https://x/a.txt", "hash": "abc", "size": 10}],
            "directories": [{"path": "mods", "url": "https://x/mods.zip", "contents": [
                {"path": "x.jar", "url": "", "hash": "def"}
            ]}],
            "delete_list": ["old.txt"],
            "launcher": {"version": "0.0.2", "url": "https://x/launcher", "hash": "md5:aaa"},
            "incremental_packages": [{"from_version": "1.0.0", "to_version": "2.0.0", "archive": "https://x/delta.zip"}],
            "changelog": ["fixed bugs"]
        }"#;
        let manifest = Manifest::parse(json).unwrap();
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.directories[0].contents.len(), 1);
        assert_eq!(manifest.delete_list, vec!["old.txt".to_string()]);
        assert_eq!(manifest.launcher.unwrap().version, "0.0.2");
        assert_eq!(manifest.incremental_packages.len(), 1);
    }
}
