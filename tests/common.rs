//! Test utilities & fixtures.
//! A scripted radio writer, scratch configs and Meshtastic frame builders.
#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use meshrelay::config::Config;
use meshrelay::meshtastic::{framer::encode_frame, RadioHandle};
use meshrelay::protobuf::meshtastic as proto;
use prost::Message;

pub const VEHICLE: &str = "!eb15a9fe";
pub const VEHICLE_NUM: u32 = 0xeb15a9fe;

/// One text the fake radio was asked to send.
#[derive(Debug, Clone)]
pub struct Sent {
    pub text: String,
    pub channel: u32,
    pub want_ack: bool,
    pub at: Instant,
}

pub type SentLog = Arc<Mutex<Vec<Sent>>>;

/// Play the writer task: record every send and answer it, failing the texts
/// `fail` returns true for.
pub fn spawn_fake_radio<F>(fail: F) -> (RadioHandle, SentLog)
where
    F: Fn(&str) -> bool + Send + 'static,
{
    let (handle, mut rx) = RadioHandle::channel();
    let log: SentLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    tokio::spawn(async move {
        let mut next_id = 1u32;
        while let Some(mut msg) = rx.recv().await {
            sink.lock().unwrap().push(Sent {
                text: msg.content.clone(),
                channel: msg.channel,
                want_ack: msg.want_ack,
                at: Instant::now(),
            });
            let reply = if fail(&msg.content) {
                Err("simulated radio failure".to_string())
            } else {
                next_id += 1;
                Ok(next_id)
            };
            if let Some(done) = msg.done.take() {
                let _ = done.send(reply);
            }
        }
    });
    (handle, log)
}

pub fn sent_texts(log: &SentLog) -> Vec<String> {
    log.lock().unwrap().iter().map(|s| s.text.clone()).collect()
}

/// Wait until the fake radio has seen `n` sends or the timeout passes.
pub async fn wait_for_sends(log: &SentLog, n: usize, within: Duration) -> Vec<String> {
    let deadline = Instant::now() + within;
    loop {
        let texts = sent_texts(log);
        if texts.len() >= n || Instant::now() >= deadline {
            return texts;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Defaults with all storage under `dir`, alerts and HTTP off.
pub fn scratch_config(dir: &Path) -> Config {
    let mut c = Config::default();
    c.storage.data_dir = dir.to_string_lossy().into_owned();
    c.alerts.enabled = false;
    c.http.enabled = false;
    c.logging.file = None;
    c
}

pub fn text_packet_frame(from: u32, id: u32, text: &str) -> Vec<u8> {
    let msg = proto::FromRadio {
        id: id.wrapping_add(1),
        payload_variant: Some(proto::from_radio::PayloadVariant::Packet(proto::MeshPacket {
            from,
            to: 0xffff_ffff,
            channel: 5,
            id,
            payload_variant: Some(proto::mesh_packet::PayloadVariant::Decoded(proto::Data {
                portnum: proto::PortNum::TextMessageApp as i32,
                payload: text.as_bytes().to_vec(),
                ..Default::default()
            })),
            ..Default::default()
        })),
    };
    encode_frame(&msg.encode_to_vec()).unwrap()
}

pub fn routing_frame(from: u32, request_id: u32, error_reason: i32) -> Vec<u8> {
    let routing = proto::Routing {
        error_reason: Some(error_reason),
    };
    let msg = proto::FromRadio {
        id: 7,
        payload_variant: Some(proto::from_radio::PayloadVariant::Packet(proto::MeshPacket {
            from,
            id: request_id.wrapping_add(100),
            payload_variant: Some(proto::mesh_packet::PayloadVariant::Decoded(proto::Data {
                portnum: proto::PortNum::RoutingApp as i32,
                payload: routing.encode_to_vec(),
                request_id,
                ..Default::default()
            })),
            ..Default::default()
        })),
    };
    encode_frame(&msg.encode_to_vec()).unwrap()
}
