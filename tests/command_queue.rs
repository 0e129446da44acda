mod common;

use std::path::Path;
use std::time::Duration;

use common::{sent_texts, spawn_fake_radio, wait_for_sends};
use meshrelay::meshtastic::RadioHandle;
use meshrelay::relay::commands::{
    spawn_command_consumer, CommandExecutor, CommandReport, OutboundCommand,
};
use meshrelay::storage::LastManualMarker;

const ACK_DELAY: Duration = Duration::from_millis(50);

fn write_waypoints(dir: &Path, rows: &[&str]) -> std::path::PathBuf {
    let path = dir.join("waypoints.csv");
    let mut text = String::from("lat,lon,alt\n");
    for r in rows {
        text.push_str(r);
        text.push('\n');
    }
    std::fs::write(&path, text).unwrap();
    path
}

fn executor(radio: RadioHandle, waypoints: &Path) -> CommandExecutor {
    CommandExecutor::new(radio, 5, true, ACK_DELAY, waypoints)
}

#[tokio::test]
async fn waypoints_go_out_in_order_then_finish() {
    let dir = tempfile::tempdir().unwrap();
    let wp = write_waypoints(dir.path(), &["40.1,-73.9,10", "40.2,-73.8,12", "40.3,-73.7,15"]);
    let (radio, log) = spawn_fake_radio(|_| false);

    let report = executor(radio, &wp).execute(&OutboundCommand::waypoints()).await;
    assert_eq!(
        report,
        CommandReport {
            sent: 4,
            failed: 0,
            skipped: 0
        }
    );

    let sent = log.lock().unwrap().clone();
    let texts: Vec<&str> = sent.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "WP_0:40.1,-73.9,10",
            "WP_1:40.2,-73.8,12",
            "WP_2:40.3,-73.7,15",
            "WP_FINISHED"
        ]
    );
    for pair in sent.windows(2) {
        let gap = pair[1].at.duration_since(pair[0].at);
        assert!(gap >= Duration::from_millis(45), "gap too short: {:?}", gap);
    }
    assert!(sent.iter().all(|s| s.channel == 5 && s.want_ack));
}

#[tokio::test]
async fn failed_row_is_skipped_and_finish_still_sent() {
    let dir = tempfile::tempdir().unwrap();
    let wp = write_waypoints(dir.path(), &["1,1", "2,2", "3,3"]);
    let (radio, log) = spawn_fake_radio(|t| t.starts_with("WP_1:"));

    let report = executor(radio, &wp).execute(&OutboundCommand::waypoints()).await;
    assert_eq!(report.sent, 3);
    assert_eq!(report.failed, 1);
    assert!(!report.is_success());
    assert_eq!(
        sent_texts(&log),
        vec!["WP_0:1,1", "WP_1:2,2", "WP_2:3,3", "WP_FINISHED"]
    );
}

#[tokio::test]
async fn missing_or_empty_table_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (radio, log) = spawn_fake_radio(|_| false);
    let exec = executor(radio, &dir.path().join("nope.csv"));
    let report = exec.execute(&OutboundCommand::waypoints()).await;
    assert_eq!(report.failed, 1);

    let header_only = write_waypoints(dir.path(), &[]);
    let (radio, log2) = spawn_fake_radio(|_| false);
    let report = executor(radio, &header_only)
        .execute(&OutboundCommand::waypoints())
        .await;
    assert_eq!(report.failed, 1);
    assert!(sent_texts(&log).is_empty());
    assert!(sent_texts(&log2).is_empty());
}

#[tokio::test]
async fn failed_manual_is_reported_once_and_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (radio, log) = spawn_fake_radio(|t| t.starts_with("MAN_"));
    let exec = executor(radio, &dir.path().join("wp.csv"));
    let report = exec
        .execute(&OutboundCommand::manual("left").unwrap())
        .await;
    assert_eq!(report.failed, 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sent_texts(&log), vec!["MAN_LEFT"]);
}

#[tokio::test]
async fn queue_executes_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let wp = write_waypoints(dir.path(), &["9,9"]);
    let (radio, log) = spawn_fake_radio(|_| false);
    let (queue, consumer) = spawn_command_consumer(executor(radio, &wp), 8);

    queue.submit(OutboundCommand::waypoints()).unwrap();
    queue.submit(OutboundCommand::manual("forward").unwrap()).unwrap();
    queue.submit(OutboundCommand::mission("rtl").unwrap()).unwrap();

    let texts = wait_for_sends(&log, 4, Duration::from_secs(2)).await;
    assert_eq!(texts, vec!["WP_0:9,9", "WP_FINISHED", "MAN_FORWARD", "MSSN_RTL"]);
    consumer.abort();
}

#[tokio::test]
async fn repeated_manual_command_is_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    let marker = LastManualMarker::new(dir.path().join("last_manual_command.txt"));
    let (radio, log) = spawn_fake_radio(|_| false);
    let exec = executor(radio, &dir.path().join("wp.csv")).with_last_manual(marker.clone());

    let fwd = OutboundCommand::manual("forward").unwrap();
    assert_eq!(exec.execute(&fwd).await.sent, 1);
    assert_eq!(exec.execute(&fwd).await.skipped, 1);
    assert_eq!(
        exec.execute(&OutboundCommand::manual("back").unwrap())
            .await
            .sent,
        1
    );
    // Mission commands never consult the marker.
    let mission = OutboundCommand::mission("hold").unwrap();
    exec.execute(&mission).await;
    exec.execute(&mission).await;

    assert_eq!(
        sent_texts(&log),
        vec!["MAN_FORWARD", "MAN_BACK", "MSSN_HOLD", "MSSN_HOLD"]
    );
    assert_eq!(marker.read().as_deref(), Some("MAN_BACK"));
}

#[tokio::test]
async fn failed_manual_does_not_update_marker() {
    let dir = tempfile::tempdir().unwrap();
    let marker = LastManualMarker::new(dir.path().join("last.txt"));
    let (radio, _log) = spawn_fake_radio(|_| true);
    let exec = executor(radio, &dir.path().join("wp.csv")).with_last_manual(marker.clone());
    exec.execute(&OutboundCommand::manual("up").unwrap()).await;
    assert_eq!(marker.read(), None);
}

#[tokio::test]
async fn waypoint_fields_go_out_as_written() {
    let dir = tempfile::tempdir().unwrap();
    let wp = write_waypoints(dir.path(), &["40.2, -73.8 ,12", "\"40.3\",-73.7, 15 "]);
    let (radio, log) = spawn_fake_radio(|_| false);
    executor(radio, &wp).execute(&OutboundCommand::waypoints()).await;
    assert_eq!(
        sent_texts(&log),
        vec!["WP_0:40.2, -73.8 ,12", "WP_1:40.3,-73.7, 15 ", "WP_FINISHED"]
    );
}
