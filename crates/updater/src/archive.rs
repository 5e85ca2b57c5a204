//! ZIP archive validation and extraction.
//!
//! Reimplements `ExtractZip` from the original client: directories are
//! created in a first pass so that files in a later pass never race a
//! missing parent, and a handful of entries failing to extract is tolerated
//! (mirroring a tool that warns and keeps going rather than aborting a whole
//! directory sync over one bad entry).

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::ZipArchive;

use crate::error::{Result, UpdaterError};

const COPY_BUFFER_SIZE: usize = 64 * 1024;
/// Below this success ratio, extraction is treated as a failure overall.
const MIN_SUCCESS_RATIO: f64 = 0.8;

/// Magic bytes for a normal (non-empty) ZIP: local file header signature.
const ZIP_LOCAL_HEADER: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
/// Magic bytes for an empty ZIP: end-of-central-directory record only.
const ZIP_EMPTY_EOCD: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

/// Check whether `bytes` looks like a well-formed ZIP archive by magic
/// number, without fully parsing it. A 0-byte payload is accepted too,
/// matching a server that returns an empty body for an empty directory.
pub fn is_valid(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return true;
    }
    if bytes.len() >= 4 && bytes[0..4] == ZIP_LOCAL_HEADER {
        return true;
    }
    if bytes.len() == 22 && bytes[0..4] == ZIP_EMPTY_EOCD {
        return true;
    }
    false
}

/// Extract a ZIP archive (from an in-memory buffer) into `dest_dir`.
///
/// Directories are created in a first pass, then every file entry is
/// written in a second pass. Returns the number of entries successfully
/// extracted. Fails outright if fewer than 80% of entries extracted
/// successfully.
pub fn extract(bytes: &[u8], dest_dir: &Path) -> Result<usize> {
    if !is_valid(bytes) {
        return Err(UpdaterError::Integrity("not a valid zip archive".into()));
    }

    std::fs::create_dir_all(dest_dir)?;
    if bytes.is_empty() {
        return Ok(0);
    }

    let cursor = std::io::Cursor::new(bytes);
    let mut archive = ZipArchive::new(cursor)
        .map_err(|err| UpdaterError::Integrity(format!("failed to open archive: {err}")))?;

    let total = archive.len();
    if total == 0 {
        return Ok(0);
    }

    // First pass: directories.
    for index in 0..total {
        let entry = archive
            .by_index(index)
            .map_err(|err| UpdaterError::Integrity(format!("bad entry {index}: {err}")))?;
        if entry.is_dir() {
            let name = entry_name(&entry, index);
            let out_path = dest_dir.join(&name);
            std::fs::create_dir_all(&out_path)?;
        }
    }

    // Second pass: files.
    let mut succeeded = 0usize;
    for index in 0..total {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if entry.is_dir() {
            succeeded += 1;
            continue;
        }
        let name = entry_name(&entry, index);
        let out_path = dest_dir.join(&name);
        match extract_one(&mut entry, &out_path) {
            Ok(()) => succeeded += 1,
            Err(err) => {
                tracing::warn!(entry = %name, error = %err, "failed to extract archive entry");
            }
        }
    }

    let ratio = succeeded as f64 / total as f64;
    if ratio < MIN_SUCCESS_RATIO {
        return Err(UpdaterError::Integrity(format!(
            "only {succeeded}/{total} entries extracted successfully"
        )));
    }

    Ok(succeeded)
}

fn entry_name<R: Read>(entry: &zip::read::ZipFile<R>, index: usize) -> String {
    match entry.enclosed_name() {
        Some(path) => path.to_string_lossy().into_owned(),
        None => format!("file_{index}.dat"),
    }
}

fn extract_one<R: Read>(entry: &mut zip::read::ZipFile<R>, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out_file = File::create(out_path)?;
    let mut buf = [0u8; COPY_BUFFER_SIZE];
    loop {
        let read = entry.read(&mut buf)?;
        if read == 0 {
            break;
        }
        out_file.write_all(&buf[..read])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;
    use zip::write::FileOptions;

    fn build_test_zip() -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = FileOptions::default();
            writer.add_directory("mods/", options).unwrap();
            writer.start_file("mods/example.jar", options).unwrap();
            writer.write_all(b"fake jar contents").unwrap();
            writer.start_file("readme.txt", options).unwrap();
            writer.write_all(b"hello").unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn recognizes_valid_zip_magic() {
        let zip = build_test_zip();
        assert!(is_valid(&zip));
        assert!(!is_valid(b"not a zip"));
    }

    #[test]
    fn recognizes_empty_zip_magic() {
        let empty = [0x50u8, 0x4B, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(is_valid(&empty));
    }

    #[test]
    fn extracts_directories_and_files() {
        let zip = build_test_zip();
        let dest = tempdir().unwrap();
        let extracted = extract(&zip, dest.path()).unwrap();
        assert_eq!(extracted, 3);
        assert!(dest.path().join("mods/example.jar").exists());
        assert!(dest.path().join("readme.txt").exists());
        let contents = std::fs::read_to_string(dest.path().join("readme.txt")).unwrap();
        assert_eq!(contents, "hello");
    }

    #[test]
    fn rejects_non_zip_input() {
        let dest = tempdir().unwrap();
        assert!(extract(b"definitely not a zip", dest.path()).is_err());
    }

    #[test]
    fn empty_payload_creates_empty_directory_without_error() {
        assert!(is_valid(b""));
        let dest = tempdir().unwrap();
        let target = dest.path().join("mods");
        let extracted = extract(b"", &target).unwrap();
        assert_eq!(extracted, 0);
        assert!(target.is_dir());
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 0);
    }
}
