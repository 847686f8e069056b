//! Capture file parsing and frame reassembly.
//!
//! A capture is a text file with one record per line:
//!
//! ```text
//! > 0.001234 5a c5 01 00 12 08 00
//! < 0.001981 5a c5 01 00 93 04 00 ...
//! ```
//!
//! `>` is guest-to-daemon, `<` is daemon-to-guest, the second column is a
//! timestamp in seconds, and the rest are hex bytes. Records carry raw
//! stream chunks, so one wire frame may span several lines and one line may
//! hold several frames; the reassembler maintains a buffer per direction.

use anyhow::{bail, Context, Result};
use std::fmt;

/// Transfer direction of one capture record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    GuestToDaemon,
    DaemonToGuest,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::GuestToDaemon => write!(f, "→"),
            Direction::DaemonToGuest => write!(f, "←"),
        }
    }
}

/// One parsed capture line.
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    pub direction: Direction,
    pub timestamp: f64,
    pub data: Vec<u8>,
}

/// Parse a capture file's content.
///
/// Blank lines and `#` comments are skipped.
pub fn parse_capture(content: &str) -> Result<Vec<CaptureRecord>> {
    let mut records = Vec::new();

    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let direction = match fields.next() {
            Some(">") => Direction::GuestToDaemon,
            Some("<") => Direction::DaemonToGuest,
            other => bail!("line {}: bad direction marker {:?}", n + 1, other),
        };
        let timestamp: f64 = fields
            .next()
            .with_context(|| format!("line {}: missing timestamp", n + 1))?
            .parse()
            .with_context(|| format!("line {}: bad timestamp", n + 1))?;
        let data = fields
            .map(|field| {
                u8::from_str_radix(field, 16)
                    .with_context(|| format!("line {}: bad hex byte {:?}", n + 1, field))
            })
            .collect::<Result<Vec<u8>>>()?;

        records.push(CaptureRecord {
            direction,
            timestamp,
            data,
        });
    }

    Ok(records)
}

/// One reassembled wire frame, still undecoded.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub direction: Direction,
    /// Timestamp of the record that completed the frame
    pub timestamp: f64,
    pub data: Vec<u8>,
}

const MAGIC: [u8; 2] = [0x5a, 0xc5];
const HEADER_LEN: usize = 7;

/// Streaming frame reassembler for one direction of a capture.
pub struct FrameAssembler {
    direction: Direction,
    buffer: Vec<u8>,
}

impl FrameAssembler {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            buffer: Vec::new(),
        }
    }

    /// Feed one record's bytes, returning any frames completed by them.
    pub fn feed(&mut self, record: &CaptureRecord) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(&record.data);

        let mut frames = Vec::new();
        loop {
            // Resync to the next magic.
            let Some(start) = self
                .buffer
                .windows(2)
                .position(|window| window == MAGIC)
            else {
                // Keep a trailing first-magic-byte in case it is a split
                // marker.
                let keep = usize::from(self.buffer.last() == Some(&MAGIC[0]));
                self.buffer.drain(..self.buffer.len() - keep);
                return frames;
            };
            self.buffer.drain(..start);

            if self.buffer.len() < HEADER_LEN {
                return frames;
            }
            let length = u16::from_le_bytes([self.buffer[5], self.buffer[6]]) as usize;
            if length > kitsune_hal::wire::MAX_PAYLOAD {
                // False magic inside other data; skip it and resync.
                self.buffer.drain(..2);
                continue;
            }
            let total = HEADER_LEN + length + 1;
            if self.buffer.len() < total {
                return frames;
            }

            frames.push(RawFrame {
                direction: self.direction,
                timestamp: record.timestamp,
                data: self.buffer.drain(..total).collect(),
            });
        }
    }
}
