//! Single-value marker files read by processes outside the relay.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::write_file_locked;

pub const CONNECTED: &str = "connected";
pub const DISCONNECTED: &str = "disconnected";

/// `connected` / `disconnected`, overwritten on every connectivity transition.
#[derive(Debug, Clone)]
pub struct StatusMarker {
    path: PathBuf,
}

impl StatusMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, connected: bool) -> Result<()> {
        write_file_locked(
            &self.path,
            if connected { CONNECTED } else { DISCONNECTED },
        )
    }

    pub fn read(&self) -> Option<String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .map(|s| s.trim().to_string())
    }
}

/// Wire text of the last manual command that went out successfully.
#[derive(Debug, Clone)]
pub struct LastManualMarker {
    path: PathBuf,
}

impl LastManualMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self) -> Option<String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn write(&self, text: &str) -> Result<()> {
        write_file_locked(&self.path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_marker_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let m = StatusMarker::new(dir.path().join("status.txt"));
        assert_eq!(m.read(), None);
        m.write(true).unwrap();
        assert_eq!(m.read().as_deref(), Some("connected"));
        m.write(false).unwrap();
        assert_eq!(
            std::fs::read_to_string(m.path()).unwrap(),
            "disconnected"
        );
    }

    #[test]
    fn last_manual_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let m = LastManualMarker::new(dir.path().join("last.txt"));
        assert_eq!(m.read(), None);
        m.write("MAN_FORWARD").unwrap();
        assert_eq!(m.read().as_deref(), Some("MAN_FORWARD"));
    }
}
