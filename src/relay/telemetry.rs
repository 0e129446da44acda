//! Telemetry parsing and the size-bounded telemetry log.

use anyhow::Result;
use chrono::{DateTime, Local};
use log::{debug, warn};
use rand::Rng;
use std::path::PathBuf;

use crate::storage::RollingCsvLog;

/// Keys the vehicle reports, in column order.
pub const EXPECTED_KEYS: [&str; 9] = [
    "BATT", "CUR", "LVL", "GPS_FIX", "GPS_SATS", "LAT", "LON", "ALT", "MODE",
];

pub const TELEMETRY_HEADER: [&str; 11] = [
    "timestamp",
    "BATT",
    "CUR",
    "LVL",
    "GPS_FIX",
    "GPS_SATS",
    "LAT",
    "LON",
    "ALT",
    "MODE",
    "sensor_data",
];

pub const LOCATION_HEADER: [&str; 3] = ["timestamp", "lat", "long"];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Missing LAT/LON")]
    MissingPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub timestamp: DateTime<Local>,
    pub battery: String,
    pub current: String,
    pub level: String,
    pub gps_fix: String,
    pub gps_sat_count: String,
    pub latitude: String,
    pub longitude: String,
    pub altitude: String,
    pub mode: String,
    /// Placeholder reading for the not-yet-fitted auxiliary sensor, 0..=99.
    pub auxiliary_sensor_value: u8,
}

impl TelemetrySample {
    /// Build a sample from a `TLM_` body. Unknown keys and segments without `=` are
    /// ignored; a value may itself contain `=`. Fails when LAT or LON is empty.
    pub fn from_body(
        body: &str,
        timestamp: DateTime<Local>,
        auxiliary_sensor_value: u8,
    ) -> std::result::Result<Self, TelemetryError> {
        let mut values: [String; 9] = Default::default();
        for segment in body.split('|') {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if let Some(idx) = EXPECTED_KEYS.iter().position(|k| *k == key) {
                values[idx] = value.trim().to_string();
            }
        }
        let [battery, current, level, gps_fix, gps_sat_count, latitude, longitude, altitude, mode] =
            values;
        if latitude.is_empty() || longitude.is_empty() {
            return Err(TelemetryError::MissingPosition);
        }
        Ok(Self {
            timestamp,
            battery,
            current,
            level,
            gps_fix,
            gps_sat_count,
            latitude,
            longitude,
            altitude,
            mode,
            auxiliary_sensor_value,
        })
    }

    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Row in [`TELEMETRY_HEADER`] order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp_string(),
            self.battery.clone(),
            self.current.clone(),
            self.level.clone(),
            self.gps_fix.clone(),
            self.gps_sat_count.clone(),
            self.latitude.clone(),
            self.longitude.clone(),
            self.altitude.clone(),
            self.mode.clone(),
            self.auxiliary_sensor_value.to_string(),
        ]
    }

    pub fn location_row(&self) -> [String; 3] {
        [
            self.timestamp_string(),
            self.latitude.clone(),
            self.longitude.clone(),
        ]
    }
}

/// Parse with the current wall clock and a fresh auxiliary value.
pub fn parse_telemetry(body: &str) -> std::result::Result<TelemetrySample, TelemetryError> {
    let aux = rand::thread_rng().gen_range(0..=99u8);
    TelemetrySample::from_body(body, Local::now(), aux)
}

/// Telemetry log plus the optional location log that mirrors it.
#[derive(Debug, Clone)]
pub struct TelemetryLog {
    telemetry: RollingCsvLog,
    location: Option<RollingCsvLog>,
    max_entries: usize,
}

impl TelemetryLog {
    pub fn new(path: impl Into<PathBuf>, location: Option<PathBuf>, max_entries: usize) -> Self {
        Self {
            telemetry: RollingCsvLog::new(path, &TELEMETRY_HEADER),
            location: location.map(|p| RollingCsvLog::new(p, &LOCATION_HEADER)),
            max_entries,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn telemetry(&self) -> &RollingCsvLog {
        &self.telemetry
    }

    pub fn location(&self) -> Option<&RollingCsvLog> {
        self.location.as_ref()
    }

    /// Create directories and headers up front.
    pub fn ensure(&self) -> Result<()> {
        self.telemetry.ensure()?;
        if let Some(loc) = &self.location {
            loc.ensure()?;
        }
        Ok(())
    }

    pub fn append(&self, sample: &TelemetrySample) -> Result<()> {
        self.telemetry.append(sample.to_row())
    }

    pub fn trim(&self, max_entries: usize) -> Result<usize> {
        self.telemetry.trim(max_entries)
    }

    /// Append then trim the telemetry log, and mirror the position into the
    /// location log. A location failure is logged but does not fail the call.
    pub fn record(&self, sample: &TelemetrySample) -> Result<()> {
        self.append(sample)?;
        let dropped = self.trim(self.max_entries)?;
        if dropped > 0 {
            debug!("[tlm] trimmed to last {} rows", self.max_entries);
        }
        if let Some(loc) = &self.location {
            if let Err(e) = loc.append_trimmed(sample.location_row(), self.max_entries) {
                warn!("[tlm] FAILED location append to {}: {}", loc.path().display(), e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap()
    }

    #[test]
    fn missing_keys_default_to_empty() {
        let s = TelemetrySample::from_body("BATT=87|LVL=3|LAT=40.1|LON=-73.9", ts(), 42).unwrap();
        assert_eq!(
            s.to_row(),
            vec![
                "2024-05-01 12:30:05",
                "87",
                "",
                "3",
                "",
                "",
                "40.1",
                "-73.9",
                "",
                "",
                "42"
            ]
        );
    }

    #[test]
    fn position_is_required() {
        assert_eq!(
            TelemetrySample::from_body("BATT=87", ts(), 1),
            Err(TelemetryError::MissingPosition)
        );
        assert_eq!(
            TelemetrySample::from_body("LAT=1|LON=", ts(), 1),
            Err(TelemetryError::MissingPosition)
        );
    }

    #[test]
    fn keys_trimmed_and_junk_ignored() {
        let s = TelemetrySample::from_body(" LAT = 1.5 |garbage| LON=2|MODE=A=B|XYZ=9", ts(), 0)
            .unwrap();
        assert_eq!(s.latitude, "1.5");
        assert_eq!(s.longitude, "2");
        assert_eq!(s.mode, "A=B");
    }

    #[test]
    fn aux_value_in_range() {
        for _ in 0..50 {
            let s = parse_telemetry("LAT=1|LON=2").unwrap();
            assert!(s.auxiliary_sensor_value <= 99);
        }
    }

    #[test]
    fn record_mirrors_location() {
        let dir = tempfile::tempdir().unwrap();
        let log = TelemetryLog::new(
            dir.path().join("t.csv"),
            Some(dir.path().join("loc.csv")),
            2,
        );
        for i in 0..3 {
            let s = TelemetrySample::from_body(&format!("LAT={}|LON=0", i), ts(), 5).unwrap();
            log.record(&s).unwrap();
        }
        let loc = std::fs::read_to_string(dir.path().join("loc.csv")).unwrap();
        assert_eq!(
            loc,
            "timestamp,lat,long\n2024-05-01 12:30:05,1,0\n2024-05-01 12:30:05,2,0\n"
        );
        assert_eq!(log.telemetry().rows().unwrap().len(), 2);
    }
}
