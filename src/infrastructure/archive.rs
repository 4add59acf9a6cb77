use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::{percent_of, DomainError};

/// Progress callback for extraction, in percent of entries processed.
pub type ExtractProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// Extract a zip archive into `target`, entry by entry.
///
/// Directory-only entries are skipped (their paths are created on demand).
/// Progress is reported by entry count. Entries whose path would escape
/// `target` fail the extraction. Cancellation is checked before each entry.
/// Returns the number of files written.
pub fn extract_zip(
    archive_path: &Path,
    target: &Path,
    progress: Option<&(dyn Fn(u8) + Send + Sync)>,
    cancel: &CancellationToken,
) -> Result<usize, DomainError> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
    let total = archive.len() as u64;

    fs::create_dir_all(target)?;

    let mut written = 0usize;
    for index in 0..archive.len() {
        if cancel.is_cancelled() {
            debug!(archive = ?archive_path, "Extraction cancelled");
            return Err(DomainError::Cancelled);
        }

        let mut entry = archive.by_index(index)?;
        if let Some(report) = progress {
            report(percent_of(index as u64 + 1, total));
        }
        if entry.is_dir() {
            continue;
        }

        let relative = entry.enclosed_name().ok_or_else(|| {
            DomainError::Archive(format!("entry escapes target directory: {}", entry.name()))
        })?;
        let out_path = target.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&out_path)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o777))?;
        }

        written += 1;
    }

    info!(archive = ?archive_path, target = ?target, files = written, "Archive extracted");
    Ok(written)
}

/// [`extract_zip`] on the blocking thread pool.
pub async fn extract_zip_async(
    archive_path: PathBuf,
    target: PathBuf,
    progress: Option<ExtractProgressFn>,
    cancel: CancellationToken,
) -> Result<usize, DomainError> {
    tokio::task::spawn_blocking(move || {
        extract_zip(&archive_path, &target, progress.as_deref(), &cancel)
    })
    .await
    .map_err(|e| DomainError::Archive(format!("extraction task failed: {}", e)))?
}

/// Lowercase hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String, DomainError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Fail with `ChecksumMismatch` unless `path` hashes to `expected`.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(), DomainError> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(DomainError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
