//! Waypoint source table.
//!
//! The first row is a header and is ignored. Every following row is one waypoint;
//! its columns are opaque here and go out verbatim, comma-joined, as
//! `WP_<index>:<fields>`.

use anyhow::{anyhow, Result};
use csv::ReaderBuilder;
use std::path::Path;

pub const WAYPOINT_PREFIX: &str = "WP_";
pub const WAYPOINTS_FINISHED: &str = "WP_FINISHED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaypointRow {
    pub index: usize,
    pub fields: Vec<String>,
}

impl WaypointRow {
    pub fn wire_text(&self) -> String {
        format!("{}{}:{}", WAYPOINT_PREFIX, self.index, self.fields.join(","))
    }
}

/// Load all data rows in file order. A missing file or a header-only file is an error.
pub fn load_waypoints(path: &Path) -> Result<Vec<WaypointRow>> {
    if !path.exists() {
        return Err(anyhow!("CSV file not found at {}", path.display()));
    }
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
    let mut rows = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| anyhow!("Bad row {} in {}: {}", index, path.display(), e))?;
        rows.push(WaypointRow {
            index,
            fields: record.iter().map(str::to_string).collect(),
        });
    }
    if rows.is_empty() {
        return Err(anyhow!(
            "CSV is empty or contains only a header, nothing to send"
        ));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_indexed_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wp.csv");
        std::fs::write(&path, "lat,lon,alt\n40.1,-73.9,10\n40.2, -73.8 ,12\n").unwrap();
        let rows = load_waypoints(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].wire_text(), "WP_0:40.1,-73.9,10");
        assert_eq!(rows[1].wire_text(), "WP_1:40.2, -73.8 ,12");
    }

    #[test]
    fn field_whitespace_survives_and_line_endings_do_not() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wp.csv");
        std::fs::write(&path, "lat,lon,note
 40.2, -73.8 ,hold  
").unwrap();
        let rows = load_waypoints(&path).unwrap();
        assert_eq!(rows[0].fields, vec![" 40.2", " -73.8 ", "hold  "]);
        assert_eq!(rows[0].wire_text(), "WP_0: 40.2, -73.8 ,hold  ");
    }

    #[test]
    fn header_only_and_missing_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wp.csv");
        assert!(load_waypoints(&path).is_err());
        std::fs::write(&path, "lat,lon\n").unwrap();
        assert!(load_waypoints(&path).is_err());
    }
}
