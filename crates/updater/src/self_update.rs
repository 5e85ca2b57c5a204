//! Self-replacement of the running updater executable.
//!
//! Grounded on `SelfUpdater.cpp`: the running process holds its own image
//! open, so it cannot overwrite itself directly. A detached helper (a
//! shell script on Unix, a batch script on Windows) is written to the temp
//! directory, waits for this process to exit, retries deleting the old
//! image with backoff, copies the new one into place, relaunches it, and
//! removes itself.

use std::path::{Path, PathBuf};

use crate::error::{Result, UpdaterError};
use crate::fetcher::HttpFetcher;
use crate::hasher;

/// A payload smaller than this is treated as an error page, not a binary.
const MIN_PAYLOAD_BYTES: usize = 1024;

/// A downloaded, hash-verified replacement image staged on disk, ready to
/// hand off to the detached helper.
pub struct StagedUpdate {
    pub path: PathBuf,
    pub version: String,
}

/// Download the new executable to a temp path and verify it.
///
/// `expected_hash` may carry an `algo:hex` prefix (e.g. `sha256:abcd...`);
/// when no algorithm prefix is present, `md5` is assumed, matching the
/// original's default.
pub async fn download_new(
    fetcher: &HttpFetcher,
    url: &str,
    expected_hash: &str,
    expected_version: &str,
) -> Result<StagedUpdate> {
    let bytes = fetcher.download_to_memory(url, 0, None).await?;
    reject_undersized_payload(bytes.len())?;

    if !expected_hash.is_empty() {
        let (algorithm, expected_digest) = parse_hash_spec(expected_hash);
        let actual = hasher::hash_bytes(&bytes, algorithm);
        if !actual.eq_ignore_ascii_case(expected_digest) {
            return Err(UpdaterError::Integrity(
                "self-update image hash does not match manifest".into(),
            ));
        }
    }

    let staged_path = std::env::temp_dir().join(new_image_name());
    tokio::fs::write(&staged_path, &bytes).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(&staged_path).await?.permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&staged_path, perms).await?;
    }

    Ok(StagedUpdate {
        path: staged_path,
        version: expected_version.to_string(),
    })
}

/// Reject payloads too small to plausibly be a real executable, matching
/// the original's heuristic for detecting an error page served in place of
/// a binary.
fn reject_undersized_payload(len: usize) -> Result<()> {
    if len < MIN_PAYLOAD_BYTES {
        return Err(UpdaterError::SelfUpdate(format!(
            "downloaded payload is only {len} bytes, likely an error page"
        )));
    }
    Ok(())
}

fn new_image_name() -> String {
    let exe_name = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "updater".to_string());
    format!("{exe_name}_new")
}

fn parse_hash_spec(spec: &str) -> (hasher::Algorithm, &str) {
    match spec.split_once(':') {
        Some((algo, digest)) if hasher::Algorithm::parse(algo).is_some() => {
            (hasher::Algorithm::parse(algo).unwrap(), digest)
        }
        _ => (hasher::Algorithm::Md5, spec),
    }
}

/// Write and launch the detached helper that performs the actual binary
/// swap after this process exits. Returns once the helper has been
/// started; the caller should exit shortly after.
pub fn apply_update(staged: &StagedUpdate, current_exe: &Path) -> Result<()> {
    let pid = std::process::id();

    #[cfg(unix)]
    {
        apply_update_unix(staged, current_exe, pid)
    }
    #[cfg(windows)]
    {
        apply_update_windows(staged, current_exe, pid)
    }
}

#[cfg(unix)]
fn apply_update_unix(staged: &StagedUpdate, current_exe: &Path, pid: u32) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let script_path = std::env::temp_dir().join(format!("self_update_helper_{pid}.sh"));
    let current_dir = std::env::current_dir()?;

    let script = format!(
        r#"#!/bin/sh
set -e
while kill -0 {pid} 2>/dev/null; do
    sleep 0.2
done

attempt=0
while [ $attempt -lt 10 ]; do
    if rm -f "{target}" 2>/dev/null; then
        break
    fi
    attempt=$((attempt + 1))
    sleep 0.3
done
if [ -f "{target}" ]; then
    pkill -f "{target}" 2>/dev/null || true
    sleep 0.5
    rm -f "{target}"
fi

cp "{staged}" "{target}"
chmod 755 "{target}"
cd "{cwd}"
"{target}" &

rm -- "$0"
"#,
        pid = pid,
        target = current_exe.display(),
        staged = staged.path.display(),
        cwd = current_dir.display(),
    );

    let mut file = std::fs::File::create(&script_path)?;
    file.write_all(script.as_bytes())?;
    drop(file);
    let mut perms = std::fs::metadata(&script_path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script_path, perms)?;

    let mut command = std::process::Command::new("sh");
    command.arg(&script_path);
    if try_run_elevated(&mut command).is_err() {
        std::process::Command::new("sh").arg(&script_path).spawn()?;
    }

    Ok(())
}

#[cfg(unix)]
fn try_run_elevated(command: &mut std::process::Command) -> std::io::Result<std::process::Child> {
    // No elevation helper is reliably available across Unix targets without
    // an interactive prompt; fall back to the invoking user's privileges,
    // matching the original's documented fallback behavior.
    command.spawn()
}

#[cfg(windows)]
fn apply_update_windows(staged: &StagedUpdate, current_exe: &Path, pid: u32) -> Result<()> {
    use std::io::Write;

    let script_path = std::env::temp_dir().join(format!("self_update_helper_{pid}.bat"));
    let current_dir = std::env::current_dir()?;

    let script = format!(
        "@echo off\r\n\
         :waitloop\r\n\
         tasklist /FI \"PID eq {pid}\" | find \"{pid}\" >nul\r\n\
         if not errorlevel 1 (\r\n\
         timeout /t 1 /nobreak >nul\r\n\
         goto waitloop\r\n\
         )\r\n\
         set retries=0\r\n\
         :deleteloop\r\n\
         del /f /q \"{target}\" >nul 2>&1\r\n\
         if exist \"{target}\" (\r\n\
         set /a retries+=1\r\n\
         if %retries% geq 10 (\r\n\
         taskkill /f /im \"{exe_name}\" >nul 2>&1\r\n\
         timeout /t 1 /nobreak >nul\r\n\
         del /f /q \"{target}\" >nul 2>&1\r\n\
         ) else (\r\n\
         timeout /t 1 /nobreak >nul\r\n\
         goto deleteloop\r\n\
         )\r\n\
         )\r\n\
         copy /y \"{staged}\" \"{target}\" >nul\r\n\
         cd /d \"{cwd}\"\r\n\
         start \"\" \"{target}\"\r\n\
         del \"%~f0\"\r\n",
        pid = pid,
        target = current_exe.display(),
        staged = staged.path.display(),
        cwd = current_dir.display(),
        exe_name = current_exe
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );

    let mut file = std::fs::File::create(&script_path)?;
    file.write_all(script.as_bytes())?;
    drop(file);

    let mut command = std::process::Command::new("cmd");
    command.args(["/C", "start", "", "/B"]).arg(&script_path);
    command.spawn()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_under_one_kib_is_rejected() {
        assert!(reject_undersized_payload(1023).is_err());
        assert!(reject_undersized_payload(1024).is_ok());
    }

    #[test]
    fn hash_spec_defaults_to_md5_without_prefix() {
        let (algo, digest) = parse_hash_spec("abc123");
        assert_eq!(algo, hasher::Algorithm::Md5);
        assert_eq!(digest, "abc123");
    }

    #[test]
    fn hash_spec_honors_explicit_algorithm_prefix() {
        let (algo, digest) = parse_hash_spec("sha256:deadbeef");
        assert_eq!(algo, hasher::Algorithm::Sha256);
        assert_eq!(digest, "deadbeef");
    }

    #[test]
    fn unrecognized_prefix_is_treated_as_part_of_the_digest() {
        let (algo, digest) = parse_hash_spec("crc32:cafebabe");
        assert_eq!(algo, hasher::Algorithm::Md5);
        assert_eq!(digest, "crc32:cafebabe");
    }
}
