//! CLI entry point: load configuration, initialize logging, drive the
//! updater, and prompt the operator when `auto_update` is off.
//!
//! Mirrors the original client's `main.cpp`: generate a default config on
//! first run and ask the operator to fill it in, otherwise check for
//! updates and apply them (automatically, or after a y/n prompt).

use std::io::Write as _;
use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

use updater::{ConfigManager, HttpFetcher, Updater};

const DEFAULT_CONFIG_PATH: &str = "config/updater.json";
const UPDATER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = Path::new(DEFAULT_CONFIG_PATH);
    let config = ConfigManager::new(config_path);

    if !config.exists() {
        println!("[INFO] No configuration file found, generating a default one...");
        config.initialize_default()?;
        println!(
            "[INFO] Default configuration written to {}. Edit it to set the update server and game directory.",
            config_path.display()
        );
        println!("[INFO] Press enter to exit...");
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok();
        return Ok(());
    }

    let settings = config.read()?;
    let _log_guard = init_logging(&settings.log_file);

    if let Err(err) = settings.validate() {
        tracing::error!(%err, "configuration error");
        eprintln!("[ERROR] {err}");
        std::process::exit(1);
    }

    tracing::info!(version = UPDATER_VERSION, "updater starting");
    tracing::info!(
        game_directory = %settings.game_directory,
        update_url = %settings.update_url,
        auto_update = settings.auto_update,
        update_mode = %settings.update_mode,
        hash_algorithm = %settings.hash_algorithm,
        enable_file_deletion = settings.enable_file_deletion,
        skip_major_version_check = settings.skip_major_version_check,
        enable_api_cache = settings.enable_api_cache,
        api_timeout = settings.api_timeout,
        "configuration loaded"
    );

    let auto_update = settings.auto_update;
    let fetcher = HttpFetcher::with_timeout(std::time::Duration::from_secs(settings.api_timeout))?;
    let updater = Updater::new(settings, config, fetcher);

    let needs_update = match updater.check_for_updates().await {
        Ok(needs_update) => needs_update,
        Err(err) => {
            tracing::error!(%err, "failed to check for updates");
            eprintln!("[ERROR] {err}");
            std::process::exit(1);
        }
    };

    if !needs_update {
        tracing::info!("already up to date");
        return Ok(());
    }

    let should_update = if auto_update {
        tracing::info!("auto_update is enabled, applying update");
        true
    } else {
        prompt_yes_no("[INFO] An update is available. Apply it now?")
    };

    if !should_update {
        tracing::info!("update skipped by operator");
        return Ok(());
    }

    let force_sync = if auto_update {
        false
    } else {
        prompt_yes_no("[INFO] Force sync? (aborts the whole run on the first failure)")
    };

    match updater.force_update(force_sync).await {
        Ok(true) => {
            tracing::info!("update applied successfully");
            Ok(())
        }
        Ok(false) => {
            tracing::error!("update finished with unresolved failures");
            std::process::exit(1);
        }
        Err(err) => {
            tracing::error!(%err, "update failed");
            eprintln!("[ERROR] {err}");
            std::process::exit(1);
        }
    }
}

fn prompt_yes_no(question: &str) -> bool {
    print!("{question} (y/n): ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes" | "Yes")
}

/// Install a stdout layer plus a non-blocking file layer writing to
/// `log_file`, both filtered by `RUST_LOG` (defaulting to `info`).
fn init_logging(log_file: &str) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_path = Path::new(log_file);
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let env_filter = || tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(env_filter());

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    {
        Ok(file) => file,
        Err(err) => {
            eprintln!("[ERROR] could not open log file {}: {err}", log_path.display());
            tracing::subscriber::set_global_default(tracing_subscriber::registry().with(stdout_layer))
                .expect("failed to install stdout-only tracing subscriber");
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(non_blocking)
        .with_filter(env_filter());

    let subscriber = tracing_subscriber::registry().with(stdout_layer).with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to install tracing subscriber");

    Some(guard)
}
