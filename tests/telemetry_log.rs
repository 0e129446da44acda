use chrono::{Local, TimeZone};
use meshrelay::relay::telemetry::{TelemetryLog, TelemetrySample, TELEMETRY_HEADER};

fn sample(i: usize) -> TelemetrySample {
    let ts = Local.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    TelemetrySample::from_body(&format!("BATT={}|LAT=40.{}|LON=-73.9", i, i), ts, 7).unwrap()
}

#[test]
fn log_never_exceeds_cap_and_header_stays_first() {
    let dir = tempfile::tempdir().unwrap();
    let log = TelemetryLog::new(dir.path().join("telemetry_data/live_telem.csv"), None, 1000);
    for i in 0..1005 {
        log.record(&sample(i)).unwrap();
    }

    let text = std::fs::read_to_string(log.telemetry().path()).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(TELEMETRY_HEADER.join(",").as_str()));

    let rows = log.telemetry().rows().unwrap();
    assert_eq!(rows.len(), 1000);
    assert_eq!(&rows[0][1], "5");
    assert_eq!(&rows[999][1], "1004");
}

#[test]
fn append_then_trim_with_small_cap() {
    let dir = tempfile::tempdir().unwrap();
    let log = TelemetryLog::new(dir.path().join("t.csv"), None, 3);
    for i in 0..5 {
        log.append(&sample(i)).unwrap();
    }
    assert_eq!(log.telemetry().rows().unwrap().len(), 5);
    assert_eq!(log.trim(3).unwrap(), 2);
    let batts: Vec<String> = log
        .telemetry()
        .rows()
        .unwrap()
        .iter()
        .map(|r| r[1].to_string())
        .collect();
    assert_eq!(batts, vec!["2", "3", "4"]);
}

#[test]
fn ensure_writes_header_for_both_logs() {
    let dir = tempfile::tempdir().unwrap();
    let log = TelemetryLog::new(
        dir.path().join("a/t.csv"),
        Some(dir.path().join("b/loc.csv")),
        10,
    );
    log.ensure().unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("b/loc.csv")).unwrap(),
        "timestamp,lat,long\n"
    );
    assert!(log.telemetry().rows().unwrap().is_empty());
}
