//! Top-level orchestration: mode selection, the file/directory/incremental
//! sync pipelines, version commit, and the launcher self-update handoff.
//!
//! Reimplements `MinecraftUpdater::CheckForUpdates` / `CheckForUpdatesByHash`
//! / `ForceUpdate` from the original client. Where the original re-read its
//! `ConfigManager` inside every method, this threads a single immutable
//! [`Settings`] snapshot through the run instead (see the redesign notes in
//! the project's design document).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::{ConfigManager, Settings};
use crate::error::Result;
use crate::fetcher::HttpFetcher;
use crate::manifest::{FileKind, LauncherInfo, Manifest};
use crate::{consistency, dir_sync, file_sync, incremental, manifest, self_update};

/// Prompts the operator with a yes/no question and returns their answer.
/// Swapped out in tests for a canned response.
pub type ConfirmFn = dyn Fn(&str) -> bool + Send + Sync;

fn default_confirm(question: &str) -> bool {
    use std::io::Write;
    print!("{question} (y/n): ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes" | "Yes")
}

/// Outcome of [`Updater::check_for_updates`]'s launcher sub-protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LauncherOutcome {
    NotNeeded,
    Applied,
    Failed,
}

/// Drives one synchronization run against a single manifest snapshot.
///
/// Mirrors the original's `MinecraftUpdater` class, generalized from a
/// mutable `ConfigManager` re-read on every call to an immutable
/// [`Settings`] value plus a [`ConfigManager`] handle used only for the
/// handful of writes a run performs (version commits).
pub struct Updater {
    settings: Settings,
    config: ConfigManager,
    fetcher: HttpFetcher,
    manifest_cache: Mutex<Option<Manifest>>,
    confirm: Box<ConfirmFn>,
}

impl Updater {
    pub fn new(settings: Settings, config: ConfigManager, fetcher: HttpFetcher) -> Self {
        Updater {
            settings,
            config,
            fetcher,
            manifest_cache: Mutex::new(None),
            confirm: Box::new(default_confirm),
        }
    }

    /// Override the yes/no prompt, e.g. for non-interactive or test runs.
    pub fn with_confirm(mut self, confirm: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn fetch_manifest(&self) -> Result<Manifest> {
        if self.settings.enable_api_cache {
            if let Some(cached) = self.manifest_cache.lock().expect("cache mutex poisoned").clone() {
                return Ok(cached);
            }
        }

        let fetched = manifest::fetch(&self.fetcher, &self.settings.update_url).await?;
        *self.manifest_cache.lock().expect("cache mutex poisoned") = Some(fetched.clone());
        Ok(fetched)
    }

    /// Invalidated on every successful version commit, per the manifest
    /// cache lifetime rule: a cache outlives exactly one orchestration run
    /// unless a commit or a disabled `enable_api_cache` clears it sooner.
    fn invalidate_cache(&self) {
        *self.manifest_cache.lock().expect("cache mutex poisoned") = None;
    }

    /// `CheckForUpdates`: decide whether a [`Self::force_update`] run is
    /// warranted, running the launcher self-update sub-protocol first.
    pub async fn check_for_updates(&self) -> Result<bool> {
        let manifest = self.fetch_manifest().await?;

        if let Some(launcher) = manifest.launcher.clone() {
            match self.maybe_self_update(&launcher).await {
                LauncherOutcome::Applied => {
                    tracing::info!("launcher self-update staged, exiting");
                    std::process::exit(0);
                }
                LauncherOutcome::Failed | LauncherOutcome::NotNeeded => {}
            }
        }

        let mode = manifest.effective_mode(&self.settings.update_mode).to_string();
        if mode == "hash" {
            self.check_for_updates_by_hash(&manifest)
        } else {
            Ok(incremental::is_newer(&manifest.version, &self.settings.version))
        }
    }

    fn check_for_updates_by_hash(&self, manifest: &Manifest) -> Result<bool> {
        let game_dir = Path::new(&self.settings.game_directory);
        let report = consistency::check(manifest, game_dir, &self.settings.hash_algorithm);
        let consistent = report.is_consistent();

        let local = &self.settings.version;
        let remote = &manifest.version;

        if incremental::should_force_hash_update(remote, local) && !self.settings.skip_major_version_check {
            tracing::info!(local, remote, "update crosses many versions");
        }

        Ok(match incremental::compare_versions(remote, local) {
            Ordering::Greater => !consistent,
            Ordering::Equal => !consistent,
            Ordering::Less => {
                !consistent
                    && (*self.confirm)("local version is newer but files are inconsistent; repair?")
            }
        })
    }

    /// Run the launcher self-update sub-protocol if the manifest's
    /// `launcher.version` is newer than the locally committed one.
    /// Reimplements `ProcessLauncherUpdate` + `CheckAndApplyLauncherUpdate`.
    async fn maybe_self_update(&self, launcher: &LauncherInfo) -> LauncherOutcome {
        if !incremental::is_newer(&launcher.version, &self.settings.launcher_version) {
            return LauncherOutcome::NotNeeded;
        }

        tracing::info!(
            local = %self.settings.launcher_version,
            remote = %launcher.version,
            "launcher update available"
        );

        let previous = self.settings.launcher_version.clone();

        let staged = match self_update::download_new(
            &self.fetcher,
            &launcher.url,
            &launcher.hash,
            &launcher.version,
        )
        .await
        {
            Ok(staged) => staged,
            Err(err) => {
                tracing::error!(%err, "failed to download or verify launcher update");
                return LauncherOutcome::Failed;
            }
        };

        if let Err(err) = self.config.write_launcher_version(&launcher.version) {
            tracing::error!(%err, "failed to commit launcher version, aborting self-update");
            return LauncherOutcome::Failed;
        }

        let current_exe = match std::env::current_exe() {
            Ok(path) => path,
            Err(err) => {
                tracing::error!(%err, "failed to resolve current executable path");
                let _ = self.config.write_launcher_version(&previous);
                return LauncherOutcome::Failed;
            }
        };

        match self_update::apply_update(&staged, &current_exe) {
            Ok(()) => LauncherOutcome::Applied,
            Err(err) => {
                tracing::error!(%err, "failed to apply launcher self-update, rolling back");
                let _ = self.config.write_launcher_version(&previous);
                LauncherOutcome::Failed
            }
        }
    }

    /// `ForceUpdate`: bring the game directory to the manifest's state and,
    /// on success, commit the new local version.
    pub async fn force_update(&self, force_sync: bool) -> Result<bool> {
        let manifest = self.fetch_manifest().await?;
        let mode = manifest.effective_mode(&self.settings.update_mode).to_string();
        let game_dir = PathBuf::from(&self.settings.game_directory);
        std::fs::create_dir_all(&game_dir)?;

        let all_ok = if mode == "hash" {
            self.force_update_hash(&manifest, &game_dir, force_sync).await?
        } else {
            self.force_update_version(&manifest, &game_dir, force_sync).await?
        };

        if all_ok {
            self.config.write_version(&manifest.version)?;
            self.invalidate_cache();
        }

        Ok(all_ok)
    }

    async fn force_update_hash(
        &self,
        manifest: &Manifest,
        game_dir: &Path,
        force_sync: bool,
    ) -> Result<bool> {
        if self.settings.enable_file_deletion {
            dir_sync::process_delete_list(&manifest.delete_list, game_dir);
        }

        let mut all_ok = true;

        for entry in &manifest.files {
            if let Err(err) =
                file_sync::sync_entry(&self.fetcher, entry, game_dir, &self.settings.hash_algorithm).await
            {
                tracing::error!(file = %entry.path, %err, "file sync failed");
                if force_sync {
                    return Err(err);
                }
                all_ok = false;
            }
        }

        for entry in &manifest.directories {
            if let Err(err) = dir_sync::sync_directory(
                &self.fetcher,
                entry,
                game_dir,
                &self.settings.hash_algorithm,
                self.settings.enable_file_deletion,
            )
            .await
            {
                tracing::error!(dir = %entry.path, %err, "directory sync failed");
                if force_sync {
                    return Err(err);
                }
                all_ok = false;
            }
        }

        Ok(all_ok)
    }

    async fn force_update_version(
        &self,
        manifest: &Manifest,
        game_dir: &Path,
        force_sync: bool,
    ) -> Result<bool> {
        let local = &self.settings.version;
        let remote = &manifest.version;

        if !manifest.incremental_packages.is_empty() && incremental::is_newer(remote, local) {
            let chain = incremental::plan(&manifest.incremental_packages, local, remote);
            if !chain.is_empty() {
                let hashes: HashMap<String, String> = manifest
                    .incremental_packages
                    .iter()
                    .filter_map(|pkg| pkg.hash.clone().map(|hash| (pkg.archive.clone(), hash)))
                    .collect();
                let sizes: HashMap<String, u64> = manifest
                    .incremental_packages
                    .iter()
                    .filter_map(|pkg| pkg.size.map(|size| (pkg.archive.clone(), size)))
                    .collect();

                match incremental::apply_chain(
                    &self.fetcher,
                    &chain,
                    game_dir,
                    &self.settings.hash_algorithm,
                    &hashes,
                    &sizes,
                )
                .await
                {
                    Ok(()) => return Ok(true),
                    Err(err) => {
                        tracing::warn!(%err, "incremental update failed, falling back to full update");
                    }
                }
            }
        }

        self.full_version_update(manifest, game_dir, force_sync).await
    }

    /// Full (non-incremental) version-mode update: every `FileEntry` is
    /// backed up then re-downloaded unconditionally, and every `DirEntry`'s
    /// archive is extracted directly onto the live tree.
    async fn full_version_update(
        &self,
        manifest: &Manifest,
        game_dir: &Path,
        force_sync: bool,
    ) -> Result<bool> {
        let mut all_ok = true;

        for entry in &manifest.files {
            let local_path = game_dir.join(entry.path.replace('\\', "/"));
            let result = match entry.kind {
                FileKind::Directory => {
                    dir_sync::download_and_extract(&self.fetcher, &entry.url, &local_path)
                        .await
                        .map(|_| ())
                }
                FileKind::File => file_sync::download_with_backup(&self.fetcher, entry, game_dir).await,
            };

            if let Err(err) = result {
                tracing::error!(file = %entry.path, %err, "full update failed for entry");
                if force_sync {
                    return Err(err);
                }
                all_ok = false;
            }
        }

        for dir in &manifest.directories {
            let target = game_dir.join(dir.path.replace('\\', "/"));
            if let Err(err) = dir_sync::download_and_extract(&self.fetcher, &dir.url, &target).await {
                tracing::error!(dir = %dir.path, %err, "directory update failed");
                if force_sync {
                    return Err(err);
                }
                all_ok = false;
            }
        }

        Ok(all_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{DirEntry, FileEntry};
    use tempfile::tempdir;

    fn base_settings(update_url: &str, game_directory: &str) -> Settings {
        let mut settings = Settings::default();
        settings.update_url = update_url.to_string();
        settings.game_directory = game_directory.to_string();
        settings
    }

    fn file_entry(path: &str, hash: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            url: String::new(),
            hash: hash.to_string(),
            size: None,
            kind: FileKind::File,
        }
    }

    #[tokio::test]
    async fn check_for_updates_is_false_when_versions_match_in_version_mode() {
        let dir = tempdir().unwrap();
        let mut settings = base_settings("https://example.invalid/manifest.json", dir.path().to_str().unwrap());
        settings.version = "1.0.0".into();
        settings.update_mode = "version".into();
        let config = ConfigManager::new(dir.path().join("config.json"));
        config.write(&settings).unwrap();

        let updater = Updater::new(settings, config, HttpFetcher::new().unwrap());
        *updater.manifest_cache.lock().unwrap() = Some(Manifest {
            version: "1.0.0".into(),
            update_mode: None,
            files: vec![],
            directories: vec![],
            delete_list: vec![],
            launcher: None,
            incremental_packages: vec![],
            changelog: vec![],
        });

        assert!(!updater.check_for_updates().await.unwrap());
    }

    #[tokio::test]
    async fn check_for_updates_by_hash_flags_missing_files_as_needing_update() {
        let dir = tempdir().unwrap();
        let mut settings = base_settings("https://example.invalid/manifest.json", dir.path().to_str().unwrap());
        settings.version = "1.0.0".into();
        settings.update_mode = "hash".into();
        let config = ConfigManager::new(dir.path().join("config.json"));
        config.write(&settings).unwrap();

        let updater = Updater::new(settings, config, HttpFetcher::new().unwrap());
        *updater.manifest_cache.lock().unwrap() = Some(Manifest {
            version: "1.0.0".into(),
            update_mode: Some("hash".into()),
            files: vec![file_entry("a.txt", "deadbeef")],
            directories: vec![],
            delete_list: vec![],
            launcher: None,
            incremental_packages: vec![],
            changelog: vec![],
        });

        assert!(updater.check_for_updates().await.unwrap());
    }

    #[tokio::test]
    async fn force_update_hash_mode_downloads_missing_directory_entries_noop_when_empty() {
        let dir = tempdir().unwrap();
        let settings = base_settings("https://example.invalid/manifest.json", dir.path().to_str().unwrap());
        let config = ConfigManager::new(dir.path().join("config.json"));
        config.write(&settings).unwrap();

        let updater = Updater::new(settings, config, HttpFetcher::new().unwrap());
        let manifest = Manifest {
            version: "1.0.1".into(),
            update_mode: Some("hash".into()),
            files: vec![],
            directories: vec![],
            delete_list: vec![],
            launcher: None,
            incremental_packages: vec![],
            changelog: vec![],
        };
        *updater.manifest_cache.lock().unwrap() = Some(manifest);

        let ok = updater.force_update(false).await.unwrap();
        assert!(ok);
        assert_eq!(updater.config.read().unwrap().version, "1.0.1");
    }

    #[tokio::test]
    async fn force_update_hash_mode_records_failure_without_force_sync() {
        let dir = tempdir().unwrap();
        let settings = base_settings("https://example.invalid/manifest.json", dir.path().to_str().unwrap());
        let config = ConfigManager::new(dir.path().join("config.json"));
        config.write(&settings).unwrap();

        let updater = Updater::new(settings, config, HttpFetcher::new().unwrap());
        let manifest = Manifest {
            version: "1.0.1".into(),
            update_mode: Some("hash".into()),
            files: vec![FileEntry {
                path: "a.txt".into(),
                url: "http://127.0.0.1:1/unreachable".into(),
                hash: "deadbeef".into(),
                size: None,
                kind: FileKind::File,
            }],
            directories: vec![DirEntry {
                path: "mods".into(),
                url: String::new(),
                contents: vec![],
            }],
            delete_list: vec![],
            launcher: None,
            incremental_packages: vec![],
            changelog: vec![],
        };
        *updater.manifest_cache.lock().unwrap() = Some(manifest);

        let ok = updater.force_update(false).await.unwrap();
        assert!(!ok);
        assert_eq!(updater.config.read().unwrap().version, "1.0.0");
    }
}
