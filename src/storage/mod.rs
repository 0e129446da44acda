//! # Storage Module - File-Backed Relay State
//!
//! Everything the relay persists is a small local file that other processes
//! (the web dashboard, shell scripts) read directly:
//!
//! ```text
//! data/
//! ├── telemetry.csv            ← rolling telemetry log (header + newest N rows)
//! ├── location.csv             ← optional rolling lat/long log
//! ├── processed_ids.txt        ← one handled message id per line
//! ├── connection_status.txt    ← `connected` / `disconnected`
//! ├── last_manual_command.txt  ← last MAN_ text successfully sent
//! └── waypoints.csv            ← operator-supplied route (read only)
//! ```
//!
//! ## File Locking
//!
//! Writers take an exclusive `fs2` lock on a sidecar `.<name>.lock` file rather
//! than on the data file itself, because rewrites replace the data file by rename
//! and a lock on the old inode would no longer exclude anyone. Rewrites go to a
//! temp file in the same directory first, so readers never see a half-written file.

pub mod csvlog;
pub mod dedup;
pub mod markers;

pub use csvlog::RollingCsvLog;
pub use dedup::ProcessedIds;
pub use markers::{LastManualMarker, StatusMarker};

use anyhow::{anyhow, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Create the parent directory of `path` if it has one.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .map_err(|e| anyhow!("Failed to create directory {}: {}", dir.display(), e))?;
        }
    }
    Ok(())
}

fn lock_path(path: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("data");
    dir.join(format!(".{}.lock", base))
}

/// Exclusive lock held for as long as the guard lives.
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        ensure_parent_dir(path)?;
        let lock = lock_path(path);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock)
            .map_err(|e| anyhow!("Failed to open lock file {}: {}", lock.display(), e))?;
        file.lock_exclusive()
            .map_err(|e| anyhow!("Failed to lock {}: {}", lock.display(), e))?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Replace `path` with `content` via temp file + rename. Caller holds the lock.
pub fn replace_file(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("data");
    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut tmp) => {
                tmp.write_all(content)?;
                tmp.flush()?;
                let _ = tmp.sync_all();
                break candidate;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
                continue;
            }
            Err(e) => return Err(anyhow!("Failed to create temp file for atomic write: {}", e)),
        }
    };

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(anyhow!("Failed to replace {}: {}", path.display(), e));
    }
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    Ok(())
}

/// Overwrite a small file atomically under its lock.
pub fn write_file_locked(path: &Path, content: &str) -> Result<()> {
    let _lock = FileLock::acquire(path)?;
    replace_file(path, content.as_bytes())
}

/// Append raw text under the lock, opening the file only for this call.
pub fn append_file_locked(path: &Path, content: &str) -> Result<()> {
    let _lock = FileLock::acquire(path)?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| anyhow!("Failed to open {} for append: {}", path.display(), e))?;
    f.write_all(content.as_bytes())?;
    f.flush()?;
    Ok(())
}
