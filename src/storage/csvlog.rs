//! Header + rows CSV file capped at a fixed number of data rows.
//!
//! `append` adds one row at the end, `trim` rewrites the file keeping the header
//! and the newest rows. The header row is never evicted.

use anyhow::{anyhow, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::{debug, info};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use super::{replace_file, FileLock};

#[derive(Debug, Clone)]
pub struct RollingCsvLog {
    path: PathBuf,
    header: Vec<String>,
}

impl RollingCsvLog {
    pub fn new(path: impl Into<PathBuf>, header: &[&str]) -> Self {
        Self {
            path: path.into(),
            header: header.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the parent directory and write the header if the file is missing or empty.
    pub fn ensure(&self) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        self.ensure_locked()
    }

    fn ensure_locked(&self) -> Result<()> {
        let empty = match std::fs::metadata(&self.path) {
            Ok(m) => m.len() == 0,
            Err(_) => true,
        };
        if empty {
            let mut w = WriterBuilder::new().from_writer(Vec::new());
            w.write_record(&self.header)?;
            let bytes = w
                .into_inner()
                .map_err(|e| anyhow!("Failed to encode CSV header: {}", e))?;
            replace_file(&self.path, &bytes)?;
            info!("Created {} with header", self.path.display());
        }
        Ok(())
    }

    /// Append one data row. No parsing or validation happens here.
    pub fn append<I, S>(&self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let _lock = FileLock::acquire(&self.path)?;
        self.ensure_locked()?;
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| anyhow!("Failed to open {} for append: {}", self.path.display(), e))?;
        let mut w = WriterBuilder::new().from_writer(file);
        w.write_record(row)?;
        w.flush()?;
        Ok(())
    }

    /// Keep the header plus the newest `max_entries` rows. Returns how many rows were dropped.
    pub fn trim(&self, max_entries: usize) -> Result<usize> {
        let _lock = FileLock::acquire(&self.path)?;
        let (header, rows) = self.read_locked()?;
        if rows.len() <= max_entries {
            return Ok(0);
        }
        let dropped = rows.len() - max_entries;
        let mut w = WriterBuilder::new().flexible(true).from_writer(Vec::new());
        match header {
            Some(h) => w.write_record(&h)?,
            None => w.write_record(&self.header)?,
        }
        for row in &rows[dropped..] {
            w.write_record(row)?;
        }
        let bytes = w
            .into_inner()
            .map_err(|e| anyhow!("Failed to encode trimmed CSV: {}", e))?;
        replace_file(&self.path, &bytes)?;
        debug!(
            "Trimmed {} to last {} rows ({} dropped)",
            self.path.display(),
            max_entries,
            dropped
        );
        Ok(dropped)
    }

    /// Append then trim, the only order the relay ever uses.
    pub fn append_trimmed<I, S>(&self, row: I, max_entries: usize) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.append(row)?;
        self.trim(max_entries)?;
        Ok(())
    }

    /// Data rows in file order (header excluded). A missing file has none.
    pub fn rows(&self) -> Result<Vec<StringRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let _lock = FileLock::acquire(&self.path)?;
        let (_, rows) = self.read_locked()?;
        Ok(rows)
    }

    fn read_locked(&self) -> Result<(Option<StringRecord>, Vec<StringRecord>)> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| anyhow!("Failed to open {}: {}", self.path.display(), e))?;
        let mut records = rdr.records();
        let header = match records.next() {
            Some(h) => Some(h?),
            None => None,
        };
        let mut rows = Vec::new();
        for rec in records {
            rows.push(rec?);
        }
        Ok((header, rows))
    }
}
