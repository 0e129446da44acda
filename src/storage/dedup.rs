//! Processed message id store.
//!
//! Newline-delimited ids, loaded once at startup and appended one line per newly
//! handled message. An unreadable file is treated as empty: losing dedup state can
//! only cause a harmless re-log, so it must never stop the relay from starting.

use anyhow::Result;
use log::{debug, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::append_file_locked;

#[derive(Debug)]
pub struct ProcessedIds {
    path: PathBuf,
    seen: Mutex<HashSet<String>>,
}

impl ProcessedIds {
    /// Read the persisted list. Missing or unreadable files start an empty set.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let seen = match std::fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                warn!(
                    "[dedup] cannot read {} ({}); starting with no processed ids",
                    path.display(),
                    e
                );
                HashSet::new()
            }
        };
        debug!("[dedup] loaded {} processed ids from {}", seen.len(), path.display());
        Self {
            path,
            seen: Mutex::new(seen),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_duplicate(&self, message_id: &str) -> bool {
        match self.seen.lock() {
            Ok(seen) => seen.contains(message_id),
            Err(poisoned) => poisoned.into_inner().contains(message_id),
        }
    }

    /// Record `message_id` in memory, then persist it. The in-memory entry stays
    /// even when the append fails, so this process still won't handle it twice.
    pub fn mark_processed(&self, message_id: &str) -> Result<()> {
        let inserted = match self.seen.lock() {
            Ok(mut seen) => seen.insert(message_id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(message_id.to_string()),
        };
        if !inserted {
            return Ok(());
        }
        append_file_locked(&self.path, &format!("{}\n", message_id))
    }

    pub fn len(&self) -> usize {
        match self.seen.lock() {
            Ok(seen) => seen.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
