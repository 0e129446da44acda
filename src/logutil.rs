//! Helpers for keeping radio payloads readable in single-line logs.
//!
//! Vehicle text arrives straight off the air, so anything may be in it. Every log
//! line that echoes payload text goes through [`escape_log`] or [`truncate_for_log`].
//! [`RotatingFile`] keeps the on-disk log mirror bounded.

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

/// Characters shown before a payload preview is cut with an ellipsis.
const MAX_PREVIEW: usize = 300;

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
/// - other control characters => `\xNN`
///
/// Strings longer than [`MAX_PREVIEW`] characters are cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Escape and cap at `max_bytes` without splitting a UTF-8 sequence.
pub fn truncate_for_log(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return escape_log(input);
    }
    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", escape_log(&input[..end]))
}

/// Lowercase hex of the first `max` bytes, for trace-level frame dumps.
pub fn hex_snippet(data: &[u8], max: usize) -> String {
    let mut s = String::with_capacity(max.min(data.len()) * 2 + 4);
    for b in data.iter().take(max) {
        let _ = write!(&mut s, "{:02x}", b);
    }
    if data.len() > max {
        s.push_str("..");
    }
    s
}

/// Append-only log file that rolls over to `<path>.1` once it would pass `max_bytes`.
/// At most two files exist; the older `.1` is replaced on each rollover.
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
}

impl RotatingFile {
    /// `max_bytes == 0` never rotates.
    pub fn open(path: impl AsRef<Path>, max_bytes: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            file,
            written,
            max_bytes,
        })
    }

    pub fn rolled_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        fs::rename(&self.path, self.rolled_path())?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl io::Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let over = self.written + buf.len() as u64 > self.max_bytes;
        if self.max_bytes > 0 && self.written > 0 && over {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_and_controls() {
        assert_eq!(escape_log("TLM_\nLAT=1\r\t\x07"), "TLM_\\nLAT=1\\r\\t\\x07");
    }

    #[test]
    fn truncate_keeps_char_boundary() {
        let s = "STAT_€alert";
        // "STAT_" is 5 bytes, the euro sign takes 3 more.
        assert_eq!(truncate_for_log(s, 6), "STAT_…");
        assert_eq!(truncate_for_log(s, 64), "STAT_€alert");
    }

    #[test]
    fn log_file_rolls_over_at_cap() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.log");
        let mut f = RotatingFile::open(&path, 64).unwrap();
        for i in 0..20 {
            f.write_all(format!("line {:02} xxxxxxxxxx\n", i).as_bytes())
                .unwrap();
        }
        f.flush().unwrap();

        let current = fs::read_to_string(&path).unwrap();
        let rolled = fs::read_to_string(f.rolled_path()).unwrap();
        assert!(current.len() <= 64, "current file is {} bytes", current.len());
        assert!(rolled.len() <= 64);
        assert!(current.ends_with("line 19 xxxxxxxxxx\n"));
        assert!(!rolled.contains("line 00"));
    }

    #[test]
    fn existing_size_counts_toward_cap() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.log");
        fs::write(&path, "x".repeat(60)).unwrap();
        let mut f = RotatingFile::open(&path, 64).unwrap();
        f.write_all(b"0123456789\n").unwrap();
        assert_eq!(fs::read_to_string(f.rolled_path()).unwrap().len(), 60);
        assert_eq!(fs::read_to_string(&path).unwrap(), "0123456789\n");
    }

    #[test]
    fn zero_cap_never_rotates() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.log");
        let mut f = RotatingFile::open(&path, 0).unwrap();
        for _ in 0..50 {
            f.write_all(b"0123456789\n").unwrap();
        }
        assert!(!f.rolled_path().exists());
        assert_eq!(fs::read_to_string(&path).unwrap().len(), 550);
    }

    #[test]
    fn hex_snippet_marks_cut() {
        assert_eq!(hex_snippet(&[0x94, 0xc3, 0x00], 2), "94c3..");
        assert_eq!(hex_snippet(&[0x01], 4), "01");
    }
}
