use std::time::Duration;

use meshrelay::relay::connectivity::{spawn_monitor, Connectivity};
use meshrelay::storage::StatusMarker;

#[tokio::test]
async fn monitor_demotes_after_silence() {
    let dir = tempfile::tempdir().unwrap();
    let marker = StatusMarker::new(dir.path().join("connection_status.txt"));
    let conn = Connectivity::new(Some(marker.clone()), Duration::from_millis(100));
    conn.initialize();
    let monitor = spawn_monitor(conn.clone(), Duration::from_millis(20));

    assert!(conn.mark_connected());
    assert_eq!(marker.read().as_deref(), Some("connected"));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(conn.is_connected(), "demoted before the timeout elapsed");

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!conn.is_connected());
    assert_eq!(marker.read().as_deref(), Some("disconnected"));
    monitor.abort();
}

#[tokio::test]
async fn steady_traffic_keeps_the_link_up() {
    let conn = Connectivity::new(None, Duration::from_millis(100));
    let monitor = spawn_monitor(conn.clone(), Duration::from_millis(20));
    for _ in 0..10 {
        conn.mark_connected();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(conn.is_connected());
    }
    monitor.abort();
}

#[tokio::test]
async fn never_connected_stays_disconnected() {
    let dir = tempfile::tempdir().unwrap();
    let marker = StatusMarker::new(dir.path().join("status.txt"));
    let conn = Connectivity::new(Some(marker.clone()), Duration::from_millis(10));
    conn.initialize();
    let monitor = spawn_monitor(conn.clone(), Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!conn.is_connected());
    assert_eq!(marker.read().as_deref(), Some("disconnected"));
    monitor.abort();
}
