//! Protocol dissection engine.
//!
//! Decodes reassembled wire frames using the main library's parse surface,
//! so the dissector can never drift from what the codec actually accepts.

use colored::Colorize;
use kitsune_hal::wire::{crc8_is_valid, Frame, Message};
use std::fmt;

use crate::capture::{Direction, RawFrame};

/// Dissected frame with decoded content
#[derive(Debug)]
pub struct DissectedFrame {
    pub timestamp: f64,
    pub direction: Direction,
    pub raw_data: Vec<u8>,
    pub content: FrameContent,
    pub crc_status: CrcStatus,
}

/// Decoded frame content
#[derive(Debug)]
pub enum FrameContent {
    Frame(Frame),
    Invalid(String),
}

/// CRC validation status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcStatus {
    Valid,
    Invalid,
    NotChecked,
}

impl fmt::Display for CrcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrcStatus::Valid => write!(f, "{}", "CRC OK".green()),
            CrcStatus::Invalid => write!(f, "{}", "CRC FAIL".red()),
            CrcStatus::NotChecked => write!(f, ""),
        }
    }
}

/// Dissect one reassembled frame
pub fn dissect_frame(raw: &RawFrame) -> DissectedFrame {
    let (content, crc_status) = match Frame::try_parse(&raw.data) {
        Ok((frame, crc_valid)) => (
            FrameContent::Frame(frame),
            if crc_valid {
                CrcStatus::Valid
            } else {
                CrcStatus::Invalid
            },
        ),
        Err(e) => (
            FrameContent::Invalid(format!("Parse error: {}", e)),
            if crc8_is_valid(&raw.data) {
                CrcStatus::Valid
            } else {
                CrcStatus::NotChecked
            },
        ),
    };

    DissectedFrame {
        timestamp: raw.timestamp,
        direction: raw.direction,
        raw_data: raw.data.clone(),
        content,
        crc_status,
    }
}

impl DissectedFrame {
    /// Frame id, when the frame decoded far enough to have one.
    pub fn id(&self) -> Option<u8> {
        match &self.content {
            FrameContent::Frame(frame) => Some(frame.id),
            FrameContent::Invalid(_) => None,
        }
    }

    /// Whether this is a request frame.
    pub fn is_request(&self) -> bool {
        matches!(
            &self.content,
            FrameContent::Frame(Frame {
                message: Message::Request(_),
                ..
            })
        )
    }

    /// One-line description of the content, with errors colored.
    pub fn describe(&self) -> String {
        match &self.content {
            FrameContent::Frame(Frame {
                message: Message::Response { response, .. },
                ..
            }) if response.status < 0 => {
                let plain = self.describe_plain();
                plain.red().to_string()
            }
            FrameContent::Invalid(reason) => reason.red().to_string(),
            _ => self.describe_plain(),
        }
    }

    /// One-line description without terminal colors, for JSON output.
    pub fn describe_plain(&self) -> String {
        match &self.content {
            FrameContent::Frame(frame) => match &frame.message {
                Message::Request(request) => format!("{:?}", request),
                Message::Response {
                    class,
                    verb,
                    response,
                } => {
                    if response.data.is_empty() {
                        format!("{:?}/{} status={}", class, verb, response.status)
                    } else {
                        format!(
                            "{:?}/{} status={} data={}",
                            class,
                            verb,
                            response.status,
                            hex::encode(&response.data)
                        )
                    }
                }
            },
            FrameContent::Invalid(reason) => reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitsune_hal::dispatch::Request;

    fn raw(data: Vec<u8>) -> RawFrame {
        RawFrame {
            direction: Direction::GuestToDaemon,
            timestamp: 0.0,
            data,
        }
    }

    fn encoded(frame: &Frame) -> Vec<u8> {
        let mut buf = bytes::BytesMut::new();
        frame.encode(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn dissects_a_valid_request() {
        let frame = Frame::request(4, Request::GpioGet { handle: 9 });
        let dissected = dissect_frame(&raw(encoded(&frame)));

        assert_eq!(dissected.crc_status, CrcStatus::Valid);
        assert_eq!(dissected.id(), Some(4));
        assert!(dissected.is_request());
        assert!(dissected.describe().contains("GpioGet"));
    }

    #[test]
    fn flags_a_corrupt_crc() {
        let frame = Frame::request(4, Request::GpioGet { handle: 9 });
        let mut data = encoded(&frame);
        let last = data.len() - 1;
        data[last] ^= 0xff;

        let dissected = dissect_frame(&raw(data));
        assert_eq!(dissected.crc_status, CrcStatus::Invalid);
        // Content still decodes.
        assert_eq!(dissected.id(), Some(4));
    }

    #[test]
    fn reports_undecodable_frames() {
        let dissected = dissect_frame(&raw(vec![0x5a, 0xc5, 0xff, 0x00]));
        assert!(matches!(dissected.content, FrameContent::Invalid(_)));
        assert_eq!(dissected.id(), None);
    }
}
