//! # Meshtastic Radio Link
//!
//! The relay talks to a Meshtastic node through the device stream API: length-prefixed
//! `ToRadio` / `FromRadio` protobuf frames over TCP (the node's port 4403) or, with the
//! `serial` feature, over a USB/UART port in PROTO mode.
//!
//! The rest of the crate only sees two things:
//!
//! - an ordered stream of [`InboundMessage`] values (one per received text packet), and
//! - a [`RadioHandle`] whose [`RadioHandle::send_text`] is the `sendText(text, channel, wantAck)`
//!   contract of the transport.
//!
//! ## Tasks
//!
//! ```text
//! ┌──────────────┐  frames   ┌──────────────────┐  InboundMessage  ┌─────────────┐
//! │ node socket  │──────────→│ MeshtasticReader │─────────────────→│ dispatcher  │
//! │ / serial     │           └──────────────────┘                  └─────────────┘
//! │              │  frames   ┌──────────────────┐  OutgoingMessage ┌─────────────┐
//! │              │←──────────│ MeshtasticWriter │←─────────────────│ RadioHandle │
//! └──────────────┘           └──────────────────┘                  └─────────────┘
//! ```
//!
//! The writer is the only task touching the write half, so frames never interleave.
//!
//! ## Configuration
//!
//! ```toml
//! [meshtastic]
//! host = "localhost:4403"
//! # serial_port = "/dev/ttyUSB0"   # when set, overrides host
//! baud_rate = 115200
//! heartbeat_secs = 300
//! ```

pub mod framer;

use std::fmt;

use anyhow::{anyhow, Result};
use log::{debug, error, info, trace, warn};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};

use crate::logutil::{escape_log, hex_snippet, truncate_for_log};
use crate::metrics;
use crate::protobuf::meshtastic as proto;
use framer::{encode_frame, StreamFramer};

/// Destination address meaning "everyone on the channel".
pub const BROADCAST_ADDR: u32 = 0xffff_ffff;

/// Largest text payload the firmware accepts in a single packet.
pub const MAX_TEXT_BYTES: usize = 228;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A text packet as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Node id in Meshtastic user form, e.g. `!eb15a9fe`.
    pub sender_id: String,
    /// Packet id in decimal. Repeats when the radio layer retransmits.
    pub message_id: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(
        sender_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            message_id: message_id.into(),
            text: text.into(),
        }
    }
}

/// `!` + eight lowercase hex digits, the form the Meshtastic clients display.
pub fn format_node_id(num: u32) -> String {
    format!("!{:08x}", num)
}

/// Outgoing text handed to the writer task.
#[derive(Debug)]
pub struct OutgoingMessage {
    /// None for broadcast on the channel.
    pub to_node: Option<u32>,
    pub channel: u32,
    pub content: String,
    pub want_ack: bool,
    /// Completed once the frame has been written (Ok carries the packet id).
    pub done: Option<oneshot::Sender<std::result::Result<u32, String>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("radio link closed")]
    Closed,
    #[error("send failed: {0}")]
    Send(String),
    #[error("failed to connect to {target}: {reason}")]
    Connect { target: String, reason: String },
}

/// Cloneable sending side of the radio link.
#[derive(Clone, Debug)]
pub struct RadioHandle {
    tx: mpsc::UnboundedSender<OutgoingMessage>,
}

impl RadioHandle {
    pub fn new(tx: mpsc::UnboundedSender<OutgoingMessage>) -> Self {
        Self { tx }
    }

    /// A handle plus the queue it feeds. Whoever owns the receiver plays the writer.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutgoingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Send `text` on `channel` and wait until the writer has put it on the link.
    pub async fn send_text(
        &self,
        text: &str,
        channel: u32,
        want_ack: bool,
    ) -> std::result::Result<u32, LinkError> {
        let (done_tx, done_rx) = oneshot::channel();
        let msg = OutgoingMessage {
            to_node: None,
            channel,
            content: text.to_string(),
            want_ack,
            done: Some(done_tx),
        };
        self.tx.send(msg).map_err(|_| LinkError::Closed)?;
        match done_rx.await {
            Ok(Ok(id)) => Ok(id),
            Ok(Err(reason)) => Err(LinkError::Send(reason)),
            Err(_) => Err(LinkError::Closed),
        }
    }
}

/// Where the node lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    Tcp { host: String, port: u16 },
    Serial { path: String, baud_rate: u32 },
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkTarget::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            LinkTarget::Serial { path, baud_rate } => write!(f, "serial://{}@{}", path, baud_rate),
        }
    }
}

/// A running link: inbound text stream plus the send handle.
pub struct RadioLink {
    pub inbound_rx: mpsc::UnboundedReceiver<InboundMessage>,
    pub handle: RadioHandle,
}

/// Open the link and spawn the reader and writer tasks.
pub async fn connect(target: &LinkTarget, heartbeat: Duration) -> Result<RadioLink> {
    info!("Connecting to Meshtastic node at {}", target);
    match target {
        LinkTarget::Tcp { host, port } => {
            let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), *port)))
                .await
                .map_err(|_| LinkError::Connect {
                    target: target.to_string(),
                    reason: format!("timed out after {}s", CONNECT_TIMEOUT.as_secs()),
                })?
                .map_err(|e| LinkError::Connect {
                    target: target.to_string(),
                    reason: e.to_string(),
                })?;
            let _ = stream.set_nodelay(true);
            let (read_half, write_half) = stream.into_split();
            Ok(spawn_link(read_half, write_half, heartbeat))
        }
        #[cfg(feature = "serial")]
        LinkTarget::Serial { path, baud_rate } => {
            use tokio_serial::{SerialPort, SerialPortBuilderExt};
            let mut port = tokio_serial::new(path, *baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .stop_bits(tokio_serial::StopBits::One)
                .parity(tokio_serial::Parity::None)
                .open_native_async()
                .map_err(|e| LinkError::Connect {
                    target: target.to_string(),
                    reason: e.to_string(),
                })?;
            // Toggle DTR/RTS so boards that reset on open come up listening.
            let _ = port.write_data_terminal_ready(true);
            let _ = port.write_request_to_send(true);
            tokio::time::sleep(Duration::from_millis(150)).await;
            let (read_half, write_half) = tokio::io::split(port);
            Ok(spawn_link(read_half, write_half, heartbeat))
        }
        #[cfg(not(feature = "serial"))]
        LinkTarget::Serial { .. } => Err(anyhow!(
            "serial link to {} requires the 'serial' feature",
            target
        )),
    }
}

/// Spawn reader/writer tasks over an already-open duplex stream.
pub fn spawn_link<R, W>(reader_io: R, writer_io: W, heartbeat: Duration) -> RadioLink
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (handle, outgoing_rx) = RadioHandle::channel();

    let reader = MeshtasticReader::new(reader_io, inbound_tx);
    let writer = MeshtasticWriter::new(writer_io, outgoing_rx, heartbeat);

    tokio::spawn(async move {
        if let Err(e) = reader.run().await {
            error!("Reader task failed: {}", e);
        }
    });
    tokio::spawn(async move {
        if let Err(e) = writer.run().await {
            error!("Writer task failed: {}", e);
        }
    });

    RadioLink { inbound_rx, handle }
}

/// Reads frames off the link and turns text packets into [`InboundMessage`]s.
pub struct MeshtasticReader<R> {
    io: R,
    framer: StreamFramer,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    our_node_id: Option<u32>,
}

impl<R: AsyncRead + Unpin> MeshtasticReader<R> {
    pub fn new(io: R, inbound_tx: mpsc::UnboundedSender<InboundMessage>) -> Self {
        Self {
            io,
            framer: StreamFramer::new(),
            inbound_tx,
            our_node_id: None,
        }
    }

    /// Read until EOF or an I/O error. EOF is reported as [`LinkError::Closed`].
    pub async fn run(mut self) -> Result<()> {
        info!("Starting Meshtastic reader task");
        let mut buf = [0u8; 1024];
        loop {
            let n = self.io.read(&mut buf).await?;
            if n == 0 {
                return Err(LinkError::Closed.into());
            }
            trace!("RAW {} bytes: {}", n, hex_snippet(&buf[..n], 64));
            self.framer.push(&buf[..n]);
            while let Some(frame) = self.framer.next_frame() {
                self.process_frame(&frame);
            }
            if self.inbound_tx.is_closed() {
                info!("Inbound consumer gone; reader exiting");
                return Ok(());
            }
        }
    }

    fn process_frame(&mut self, data: &[u8]) {
        use proto::from_radio::PayloadVariant as FRPayload;
        use proto::mesh_packet::PayloadVariant as MPPayload;

        let msg = match proto::FromRadio::decode(data) {
            Ok(m) => m,
            Err(e) => {
                debug!("Undecodable FromRadio frame ({} bytes): {}", data.len(), e);
                return;
            }
        };
        match msg.payload_variant {
            Some(FRPayload::MyInfo(info)) => {
                self.our_node_id = Some(info.my_node_num);
                info!("Local node is {}", format_node_id(info.my_node_num));
            }
            Some(FRPayload::ConfigCompleteId(id)) => {
                debug!("Received config_complete_id=0x{:08x}", id);
            }
            Some(FRPayload::Rebooted(_)) => {
                warn!("Meshtastic node reported a reboot");
            }
            Some(FRPayload::Packet(pkt)) => match &pkt.payload_variant {
                Some(MPPayload::Decoded(data_msg)) => self.handle_decoded(&pkt, data_msg),
                Some(MPPayload::Encrypted(_)) => {
                    trace!("Encrypted packet from {} (no key for channel)", format_node_id(pkt.from));
                }
                None => {}
            },
            None => {}
        }
    }

    fn handle_decoded(&mut self, pkt: &proto::MeshPacket, data_msg: &proto::Data) {
        let port = proto::PortNum::try_from(data_msg.portnum).unwrap_or(proto::PortNum::UnknownApp);
        match port {
            proto::PortNum::TextMessageApp if self.our_node_id == Some(pkt.from) => {
                trace!("Ignoring echo of our own text id={}", pkt.id);
            }
            proto::PortNum::TextMessageApp => {
                let text = String::from_utf8_lossy(&data_msg.payload).into_owned();
                debug!(
                    "Text from {} id={} ch={} '{}'",
                    format_node_id(pkt.from),
                    pkt.id,
                    pkt.channel,
                    truncate_for_log(&text, 80)
                );
                let event = InboundMessage {
                    sender_id: format_node_id(pkt.from),
                    message_id: pkt.id.to_string(),
                    text,
                };
                if self.inbound_tx.send(event).is_err() {
                    warn!("Inbound channel closed; dropping text from {}", format_node_id(pkt.from));
                }
            }
            proto::PortNum::RoutingApp if data_msg.request_id != 0 => {
                let reason = proto::Routing::decode(data_msg.payload.as_slice())
                    .ok()
                    .and_then(|r| r.error_reason)
                    .unwrap_or(0);
                if reason == 0 {
                    metrics::inc_radio_acks();
                    debug!("ACK received for id={} from {}", data_msg.request_id, format_node_id(pkt.from));
                } else {
                    metrics::inc_radio_naks();
                    warn!(
                        "NAK for id={} from {} (routing error {})",
                        data_msg.request_id,
                        format_node_id(pkt.from),
                        reason
                    );
                }
            }
            other => {
                trace!("Ignoring {:?} packet from {}", other, format_node_id(pkt.from));
            }
        }
    }
}

/// Sole owner of the write half.
pub struct MeshtasticWriter<W> {
    io: W,
    outgoing_rx: mpsc::UnboundedReceiver<OutgoingMessage>,
    heartbeat: Duration,
}

impl<W: AsyncWrite + Unpin> MeshtasticWriter<W> {
    pub fn new(
        io: W,
        outgoing_rx: mpsc::UnboundedReceiver<OutgoingMessage>,
        heartbeat: Duration,
    ) -> Self {
        Self {
            io,
            outgoing_rx,
            heartbeat,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        info!("Starting Meshtastic writer task");
        let config_id = next_packet_id();
        debug!("Requesting node config with want_config_id=0x{:08x}", config_id);
        self.send_toradio(proto::ToRadio {
            payload_variant: Some(proto::to_radio::PayloadVariant::WantConfigId(config_id)),
        })
        .await?;

        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                msg = self.outgoing_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_outgoing(msg).await,
                        None => {
                            info!("Outgoing channel closed; writer exiting");
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = self.send_heartbeat().await {
                        warn!("Failed to send heartbeat: {}", e);
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_outgoing(&mut self, mut msg: OutgoingMessage) {
        let done = msg.done.take();
        let result = self.send_text_packet(&msg).await;
        match &result {
            Ok(id) => debug!(
                "Sent text id={} ch={} want_ack={} '{}'",
                id,
                msg.channel,
                msg.want_ack,
                truncate_for_log(&msg.content, 80)
            ),
            Err(e) => warn!("Failed to send '{}': {}", escape_log(&msg.content), e),
        }
        if let Some(done) = done {
            let _ = done.send(result.map_err(|e| e.to_string()));
        }
    }

    async fn send_text_packet(&mut self, msg: &OutgoingMessage) -> Result<u32> {
        use proto::mesh_packet::PayloadVariant as MPPayload;
        use proto::to_radio::PayloadVariant as TRPayload;

        if msg.content.len() > MAX_TEXT_BYTES {
            return Err(anyhow!(
                "text is {} bytes, radio limit is {}",
                msg.content.len(),
                MAX_TEXT_BYTES
            ));
        }
        let packet_id = next_packet_id();
        let data = proto::Data {
            portnum: proto::PortNum::TextMessageApp as i32,
            payload: msg.content.as_bytes().to_vec(),
            ..Default::default()
        };
        let pkt = proto::MeshPacket {
            to: msg.to_node.unwrap_or(BROADCAST_ADDR),
            channel: msg.channel,
            id: packet_id,
            hop_limit: 3,
            want_ack: msg.want_ack,
            // RELIABLE priority when the sender waits on an ACK.
            priority: if msg.want_ack { 70 } else { 0 },
            payload_variant: Some(MPPayload::Decoded(data)),
            ..Default::default()
        };
        self.send_toradio(proto::ToRadio {
            payload_variant: Some(TRPayload::Packet(pkt)),
        })
        .await?;
        Ok(packet_id)
    }

    async fn send_heartbeat(&mut self) -> Result<()> {
        let nonce = next_packet_id() & 0xffff;
        self.send_toradio(proto::ToRadio {
            payload_variant: Some(proto::to_radio::PayloadVariant::Heartbeat(proto::Heartbeat {
                nonce,
            })),
        })
        .await
    }

    async fn send_toradio(&mut self, msg: proto::ToRadio) -> Result<()> {
        let payload = msg.encode_to_vec();
        let frame = encode_frame(&payload)?;
        self.io.write_all(&frame).await?;
        self.io.flush().await?;
        trace!("Sent ToRadio frame ({} bytes payload)", payload.len());
        Ok(())
    }
}

fn next_packet_id() -> u32 {
    loop {
        let id: u32 = rand::random();
        if id != 0 {
            return id;
        }
    }
}
