//! Stream framer for the Meshtastic device API.
//!
//! Over TCP (port 4403) and PROTO-mode serial, every protobuf message travels as:
//!
//!   `0x94 0xC3 <len_hi> <len_lo> <protobuf bytes>`
//!
//! The decoder is incremental: feed it arbitrary chunks and pull whole frames out.
//! Debug console text interleaved on serial links is skipped by realigning on the
//! next `0x94 0xC3` header.
use anyhow::{anyhow, Result};
use bytes::{Buf, BytesMut};

pub const START1: u8 = 0x94;
pub const START2: u8 = 0xC3;
const HEADER_LEN: usize = 4;

/// Largest payload we accept from the device; anything bigger is treated as garbage.
pub const MAX_FRAME_SIZE: usize = 8192;

#[derive(Debug)]
pub struct StreamFramer {
    buf: BytesMut,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFramer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pull the next complete payload, if any.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            if !self.realign() {
                return None;
            }
            if self.buf.len() < HEADER_LEN {
                return None;
            }
            let declared = ((self.buf[2] as usize) << 8) | (self.buf[3] as usize);
            if declared == 0 || declared > MAX_FRAME_SIZE {
                // Not a real header; skip the start byte and look again.
                self.buf.advance(1);
                continue;
            }
            if self.buf.len() < HEADER_LEN + declared {
                return None;
            }
            self.buf.advance(HEADER_LEN);
            return Some(self.buf.split_to(declared).to_vec());
        }
    }

    /// Drop bytes until the buffer starts with a header (or a lone trailing START1).
    /// Returns false when nothing useful is left.
    fn realign(&mut self) -> bool {
        loop {
            match self.buf.iter().position(|&b| b == START1) {
                Some(pos) => {
                    if pos > 0 {
                        self.buf.advance(pos);
                    }
                    if self.buf.len() < 2 || self.buf[1] == START2 {
                        return true;
                    }
                    self.buf.advance(1);
                }
                None => {
                    self.buf.clear();
                    return false;
                }
            }
        }
    }
}

/// Wrap an encoded protobuf payload in a stream header.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > u16::MAX as usize {
        return Err(anyhow!("payload too large ({} bytes)", payload.len()));
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(START1);
    out.push(START2);
    out.push(((payload.len() >> 8) & 0xFF) as u8);
    out.push((payload.len() & 0xFF) as u8);
    out.extend_from_slice(payload);
    Ok(out)
}
