//! Manifest-driven synchronization and self-update engine for a local game
//! asset tree.
//!
//! This crate brings a game directory into the state described by a
//! remote JSON manifest: comparing local and remote state (by version or by
//! per-file hash), downloading and verifying files and directory archives,
//! applying chained incremental update packages, cleaning up orphaned
//! files, and — when the manifest names a newer build of the updater
//! itself — staging a detached replacement of the running executable.
//!
//! ```ignore
//! use updater::{ConfigManager, HttpFetcher, Updater};
//!
//! # async fn demo() -> updater::Result<()> {
//! let config = ConfigManager::new("config/updater.json");
//! let settings = if config.exists() {
//!     config.read()?
//! } else {
//!     config.initialize_default()?
//! };
//! settings.validate()?;
//!
//! let updater = Updater::new(settings, config, HttpFetcher::new()?);
//! if updater.check_for_updates().await? {
//!     updater.force_update(false).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod archive;
mod config;
mod consistency;
mod dir_sync;
mod error;
mod fetcher;
mod file_sync;
mod hasher;
mod incremental;
mod manifest;
mod progress;
mod self_update;
mod updater;

pub use archive::{extract as extract_archive, is_valid as is_valid_archive};
pub use config::{ConfigManager, Settings};
pub use consistency::{check as check_consistency, Report as ConsistencyReport};
pub use dir_sync::DirOutcome;
pub use error::{ConfigError, Result, UpdaterError};
pub use fetcher::HttpFetcher;
pub use file_sync::FileOutcome;
pub use hasher::{hash_file, Algorithm as HashAlgorithm};
pub use incremental::{compare_versions, is_newer, plan as plan_incremental, should_force_hash_update};
pub use manifest::{DirEntry, FileEntry, FileKind, LauncherInfo, Manifest, Package};
pub use progress::{Progress, Tick};
pub use self_update::StagedUpdate;
pub use updater::Updater;
