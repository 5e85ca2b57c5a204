use std::path::PathBuf;

/// Convenient result alias for updater operations.
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// Errors that can occur while performing an update.
#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    /// Configuration is missing or invalid; fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),
    /// Transport failure (connect, read, timeout, low-speed abort).
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The manifest could not be decoded, or lacked a required field.
    #[error("manifest error: {0}")]
    Manifest(String),
    /// A hash or archive check failed after an operation that promises
    /// integrity (self-update binary, incremental package).
    #[error("integrity check failed: {0}")]
    Integrity(String),
    /// Local filesystem operation failed (permission, missing path, copy).
    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
    /// No incremental update path could be found between two versions.
    #[error("no incremental update path found: {0}")]
    Plan(String),
    /// Self-update download, verification, or staging failed.
    #[error("self-update error: {0}")]
    SelfUpdate(String),
    /// Generic error, used for a handful of precondition checks.
    #[error("{0}")]
    Other(String),
}

impl UpdaterError {
    /// Helper for wrapping a JSON decode error as a `Manifest` error.
    pub fn manifest(msg: impl Into<String>) -> Self {
        UpdaterError::Manifest(msg.into())
    }

    /// Helper for wrapping validation failures.
    pub fn validation(msg: impl Into<String>) -> Self {
        UpdaterError::Other(msg.into())
    }

    /// Attempted to apply an update to a path with no parent directory.
    pub fn no_parent(path: &std::path::Path) -> Self {
        UpdaterError::Filesystem(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("path has no parent directory: {}", path.display()),
        ))
    }
}

impl From<serde_json::Error> for UpdaterError {
    fn from(err: serde_json::Error) -> Self {
        UpdaterError::Manifest(err.to_string())
    }
}

/// Errors surfaced while reading/writing `config/updater.json`.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("update_url is not set in configuration")]
    MissingUpdateUrl,
    #[error("game_directory is not set in configuration")]
    MissingGameDirectory,
}

impl From<ConfigError> for UpdaterError {
    fn from(err: ConfigError) -> Self {
        UpdaterError::Config(err.to_string())
    }
}
