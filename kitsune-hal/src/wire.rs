//! Versioned wire format for tunneled peripheral requests.
//!
//! Frame layout (version 1):
//!
//! ```text
//! [0..2)  magic 0x5a 0xc5
//! [2]     version (0x01)
//! [3]     id (request/response correlation, wraps)
//! [4]     field: bits 0..4 verb, bits 4..7 class, bit 7 response flag
//! [5..7)  payload length, u16 LE
//! [7..]   payload (fixed-width LE fields, then raw bytes)
//! [last]  CRC-8 (poly 0x07, init 0x00) over bytes [2..last)
//! ```
//!
//! Request payloads are class+verb specific; response payloads are uniform
//! (`status` i32 LE, then output bytes). This module is the single place
//! that knows both layouts: the codec for live streams, and the parse
//! surface the dissect tool decodes captures with.

use bitvec::prelude::*;
use bytes::{Buf, BufMut, BytesMut};
use crc_all::Crc;
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::dispatch::{Class, GpioVerb, I2cVerb, Request, Response, SpiVerb, UartVerb, MAX_TRANSFER};
use crate::tracing::prelude::*;

const MAGIC: &[u8] = &[0x5a, 0xc5];
const VERSION: u8 = 0x01;
const HEADER_LEN: usize = 7;

/// Hard cap on payload length: one maximal transfer plus fixed fields.
pub const MAX_PAYLOAD: usize = MAX_TRANSFER + 32;

fn crc8(bytes: &[u8]) -> u8 {
    const POLYNOMIAL: u8 = 0x07;
    const WIDTH: usize = 8;
    const INITIAL: u8 = 0x00;
    const XOR: u8 = 0;
    const REFLECT: bool = false;
    let mut crc = Crc::<u8>::new(POLYNOMIAL, WIDTH, INITIAL, XOR, REFLECT);

    crc.update(bytes);
    crc.finish()
}

/// Validate the trailing CRC of a complete frame.
pub fn crc8_is_valid(frame: &[u8]) -> bool {
    if frame.len() < HEADER_LEN + 1 {
        return false;
    }
    let (body, trailer) = frame.split_at(frame.len() - 1);
    crc8(&body[2..]) == trailer[0]
}

/// Wire-format parse failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated ({0} bytes)")]
    Truncated(usize),
    #[error("bad magic")]
    BadMagic,
    #[error("unsupported version 0x{0:02x}")]
    BadVersion(u8),
    #[error("unknown class {0}")]
    UnknownClass(u8),
    #[error("unknown verb {verb} for class {class:?}")]
    UnknownVerb { class: Class, verb: u8 },
    #[error("payload length {0} exceeds cap")]
    Oversize(usize),
    #[error("malformed {0} payload")]
    BadPayload(&'static str),
}

/// Frame content: a marshaled request or a response to one.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response {
        class: Class,
        verb: u8,
        response: Response,
    },
}

/// One wire frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: u8,
    pub message: Message,
}

impl Frame {
    pub fn request(id: u8, request: Request) -> Self {
        Self {
            id,
            message: Message::Request(request),
        }
    }

    pub fn response(id: u8, class: Class, verb: u8, response: Response) -> Self {
        Self {
            id,
            message: Message::Response {
                class,
                verb,
                response,
            },
        }
    }

    /// Serialize this frame, appending to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        let start = dst.len();
        dst.put_slice(MAGIC);
        dst.put_u8(VERSION);
        dst.put_u8(self.id);

        let (class, verb, is_response) = match &self.message {
            Message::Request(request) => (request.class(), request.verb(), false),
            Message::Response { class, verb, .. } => (*class, *verb, true),
        };

        let mut field: u8 = 0;
        let view = field.view_bits_mut::<Lsb0>();
        view[0..4].store(verb);
        view[4..7].store(class as u8);
        view[7..8].store(is_response as u8);
        dst.put_u8(field);

        // Placeholder length, patched once the payload is written.
        let len_at = dst.len();
        dst.put_u16_le(0);

        let payload_at = dst.len();
        match &self.message {
            Message::Request(request) => encode_request_payload(request, dst),
            Message::Response { response, .. } => {
                dst.put_i32_le(response.status);
                dst.put_slice(&response.data);
            }
        }
        let payload_len = (dst.len() - payload_at) as u16;
        dst[len_at..len_at + 2].copy_from_slice(&payload_len.to_le_bytes());

        let crc = crc8(&dst[start + 2..]);
        dst.put_u8(crc);
    }

    /// Parse one complete frame.
    ///
    /// Returns the frame and whether its CRC was valid, so capture tooling
    /// can still show the decoded content of a corrupted frame.
    pub fn try_parse(frame: &[u8]) -> Result<(Frame, bool), FrameError> {
        if frame.len() < HEADER_LEN + 1 {
            return Err(FrameError::Truncated(frame.len()));
        }
        if &frame[0..2] != MAGIC {
            return Err(FrameError::BadMagic);
        }
        if frame[2] != VERSION {
            return Err(FrameError::BadVersion(frame[2]));
        }

        let id = frame[3];
        let field = frame[4];
        let view = field.view_bits::<Lsb0>();
        let verb: u8 = view[0..4].load();
        let class_repr: u8 = view[4..7].load();
        let is_response = view[7];

        let length = u16::from_le_bytes([frame[5], frame[6]]) as usize;
        if length > MAX_PAYLOAD {
            return Err(FrameError::Oversize(length));
        }
        if frame.len() != HEADER_LEN + length + 1 {
            return Err(FrameError::Truncated(frame.len()));
        }

        let class = Class::from_repr(class_repr).ok_or(FrameError::UnknownClass(class_repr))?;
        let payload = &frame[HEADER_LEN..HEADER_LEN + length];

        let message = if is_response {
            if payload.len() < 4 {
                return Err(FrameError::BadPayload("response"));
            }
            let status = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
            Message::Response {
                class,
                verb,
                response: Response {
                    status,
                    data: payload[4..].to_vec(),
                },
            }
        } else {
            Message::Request(decode_request_payload(class, verb, payload)?)
        };

        Ok((Frame { id, message }, crc8_is_valid(frame)))
    }
}

fn encode_request_payload(request: &Request, dst: &mut BytesMut) {
    use Request::*;
    match request {
        GpioInit { port, pin, mode } => {
            dst.put_i32_le(*port);
            dst.put_i32_le(*pin);
            dst.put_u32_le(*mode);
        }
        GpioDeinit { handle } | GpioGet { handle } | UartDeinit { handle }
        | SpiDeinit { handle } | SpiExec { handle } | I2cDeinit { handle } => {
            dst.put_i32_le(*handle);
        }
        GpioSet { handle, level } => {
            dst.put_i32_le(*handle);
            dst.put_u32_le(*level);
        }
        UartInit { dev, baud, tx, rx } => {
            dst.put_u32_le(*dev);
            dst.put_u32_le(*baud);
            dst.put_i32_le(*tx);
            dst.put_i32_le(*rx);
        }
        UartWrite { handle, flags, data } => {
            dst.put_i32_le(*handle);
            dst.put_u32_le(*flags);
            dst.put_slice(data);
        }
        UartRead { handle, flags, len } => {
            dst.put_i32_le(*handle);
            dst.put_u32_le(*flags);
            dst.put_u32_le(*len);
        }
        SpiInit { dev, baud, mosi, miso, sck, cs } => {
            dst.put_u32_le(*dev);
            dst.put_u32_le(*baud);
            dst.put_i32_le(*mosi);
            dst.put_i32_le(*miso);
            dst.put_i32_le(*sck);
            dst.put_i32_le(*cs);
        }
        SpiRead { handle, len } => {
            dst.put_i32_le(*handle);
            dst.put_u32_le(*len);
        }
        SpiWrite { handle, data }
        | SpiTransfer { handle, write: data }
        | SpiTransferInplace { handle, data } => {
            dst.put_i32_le(*handle);
            dst.put_slice(data);
        }
        I2cInit { dev, baud, sda, scl } => {
            dst.put_u32_le(*dev);
            dst.put_u32_le(*baud);
            dst.put_i32_le(*sda);
            dst.put_i32_le(*scl);
        }
        I2cWrite { handle, addr, data } => {
            dst.put_i32_le(*handle);
            dst.put_u16_le(*addr);
            dst.put_slice(data);
        }
        I2cRead { handle, addr, len } => {
            dst.put_i32_le(*handle);
            dst.put_u16_le(*addr);
            dst.put_u32_le(*len);
        }
        I2cWriteRead { handle, addr, data, read_len } => {
            dst.put_i32_le(*handle);
            dst.put_u16_le(*addr);
            dst.put_u32_le(*read_len);
            dst.put_slice(data);
        }
    }
}

fn decode_request_payload(
    class: Class,
    verb: u8,
    payload: &[u8],
) -> Result<Request, FrameError> {
    let mut buf = payload;

    // Checked accessors over the raw payload slice.
    fn need(buf: &mut &[u8], n: usize, what: &'static str) -> Result<(), FrameError> {
        if buf.remaining() < n {
            return Err(FrameError::BadPayload(what));
        }
        Ok(())
    }
    macro_rules! take {
        ($get:ident, $n:expr, $what:expr) => {{
            need(&mut buf, $n, $what)?;
            buf.$get()
        }};
    }

    let request = match class {
        Class::Gpio => {
            let verb = GpioVerb::from_repr(verb)
                .ok_or(FrameError::UnknownVerb { class, verb })?;
            match verb {
                GpioVerb::Init => Request::GpioInit {
                    port: take!(get_i32_le, 4, "gpio init"),
                    pin: take!(get_i32_le, 4, "gpio init"),
                    mode: take!(get_u32_le, 4, "gpio init"),
                },
                GpioVerb::Deinit => Request::GpioDeinit {
                    handle: take!(get_i32_le, 4, "gpio deinit"),
                },
                GpioVerb::Set => Request::GpioSet {
                    handle: take!(get_i32_le, 4, "gpio set"),
                    level: take!(get_u32_le, 4, "gpio set"),
                },
                GpioVerb::Get => Request::GpioGet {
                    handle: take!(get_i32_le, 4, "gpio get"),
                },
            }
        }
        Class::Uart => {
            let verb = UartVerb::from_repr(verb)
                .ok_or(FrameError::UnknownVerb { class, verb })?;
            match verb {
                UartVerb::Init => Request::UartInit {
                    dev: take!(get_u32_le, 4, "uart init"),
                    baud: take!(get_u32_le, 4, "uart init"),
                    tx: take!(get_i32_le, 4, "uart init"),
                    rx: take!(get_i32_le, 4, "uart init"),
                },
                UartVerb::Deinit => Request::UartDeinit {
                    handle: take!(get_i32_le, 4, "uart deinit"),
                },
                UartVerb::Write => Request::UartWrite {
                    handle: take!(get_i32_le, 4, "uart write"),
                    flags: take!(get_u32_le, 4, "uart write"),
                    data: buf.to_vec(),
                },
                UartVerb::Read => Request::UartRead {
                    handle: take!(get_i32_le, 4, "uart read"),
                    flags: take!(get_u32_le, 4, "uart read"),
                    len: take!(get_u32_le, 4, "uart read"),
                },
            }
        }
        Class::Spi => {
            let verb = SpiVerb::from_repr(verb)
                .ok_or(FrameError::UnknownVerb { class, verb })?;
            match verb {
                SpiVerb::Init => Request::SpiInit {
                    dev: take!(get_u32_le, 4, "spi init"),
                    baud: take!(get_u32_le, 4, "spi init"),
                    mosi: take!(get_i32_le, 4, "spi init"),
                    miso: take!(get_i32_le, 4, "spi init"),
                    sck: take!(get_i32_le, 4, "spi init"),
                    cs: take!(get_i32_le, 4, "spi init"),
                },
                SpiVerb::Deinit => Request::SpiDeinit {
                    handle: take!(get_i32_le, 4, "spi deinit"),
                },
                SpiVerb::Read => Request::SpiRead {
                    handle: take!(get_i32_le, 4, "spi read"),
                    len: take!(get_u32_le, 4, "spi read"),
                },
                SpiVerb::Write => Request::SpiWrite {
                    handle: take!(get_i32_le, 4, "spi write"),
                    data: buf.to_vec(),
                },
                SpiVerb::Transfer => Request::SpiTransfer {
                    handle: take!(get_i32_le, 4, "spi transfer"),
                    write: buf.to_vec(),
                },
                SpiVerb::TransferInplace => Request::SpiTransferInplace {
                    handle: take!(get_i32_le, 4, "spi transfer_inplace"),
                    data: buf.to_vec(),
                },
                SpiVerb::Exec => Request::SpiExec {
                    handle: take!(get_i32_le, 4, "spi exec"),
                },
            }
        }
        Class::I2c => {
            let verb = I2cVerb::from_repr(verb)
                .ok_or(FrameError::UnknownVerb { class, verb })?;
            match verb {
                I2cVerb::Init => Request::I2cInit {
                    dev: take!(get_u32_le, 4, "i2c init"),
                    baud: take!(get_u32_le, 4, "i2c init"),
                    sda: take!(get_i32_le, 4, "i2c init"),
                    scl: take!(get_i32_le, 4, "i2c init"),
                },
                I2cVerb::Deinit => Request::I2cDeinit {
                    handle: take!(get_i32_le, 4, "i2c deinit"),
                },
                I2cVerb::Write => Request::I2cWrite {
                    handle: take!(get_i32_le, 4, "i2c write"),
                    addr: take!(get_u16_le, 2, "i2c write"),
                    data: buf.to_vec(),
                },
                I2cVerb::Read => Request::I2cRead {
                    handle: take!(get_i32_le, 4, "i2c read"),
                    addr: take!(get_u16_le, 2, "i2c read"),
                    len: take!(get_u32_le, 4, "i2c read"),
                },
                I2cVerb::WriteRead => Request::I2cWriteRead {
                    handle: take!(get_i32_le, 4, "i2c write_read"),
                    addr: take!(get_u16_le, 2, "i2c write_read"),
                    read_len: take!(get_u32_le, 4, "i2c write_read"),
                    data: buf.to_vec(),
                },
            }
        }
    };

    Ok(request)
}

/// Codec for framed wire streams.
///
/// The decoder resynchronizes on bad magic by discarding bytes until the
/// next plausible frame start; a bad CRC or oversize length is a hard error,
/// since a live stream that produced one is no longer trustworthy.
#[derive(Default)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame.encode(dst);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        loop {
            // Resync: drop bytes until the buffer starts with magic.
            while !src.is_empty() && src[0] != MAGIC[0] {
                warn!(byte = format!("{:02x}", src[0]), "Discarding stray byte.");
                src.advance(1);
            }
            if src.len() < 2 {
                return Ok(None);
            }
            if src[1] != MAGIC[1] {
                src.advance(1);
                continue;
            }

            if src.len() < HEADER_LEN {
                return Ok(None);
            }
            let length = u16::from_le_bytes([src[5], src[6]]) as usize;
            if length > MAX_PAYLOAD {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("payload length {length} exceeds cap"),
                ));
            }

            let total = HEADER_LEN + length + 1;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            let bytes = src.split_to(total);
            let (frame, crc_ok) = Frame::try_parse(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            if !crc_ok {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "bad frame CRC"));
            }
            return Ok(Some(frame));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_hex(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<String>>()
            .join(" ")
    }

    fn assert_frame(frame: Frame, expect: &[u8]) {
        let mut codec = FrameCodec;
        let mut encoded = BytesMut::new();
        codec.encode(frame, &mut encoded).unwrap();
        if encoded != expect {
            panic!(
                "mismatch!\nexpected: {}\nactual: {}",
                as_hex(expect),
                as_hex(&encoded[..])
            )
        }
    }

    #[test]
    fn golden_request_frame() {
        assert_frame(
            Frame::request(7, Request::GpioSet { handle: 2, level: 1 }),
            &[
                0x5a, 0xc5, 0x01, 0x07, 0x12, 0x08, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00,
                0x00, 0x00, 0xb0,
            ],
        );
    }

    #[test]
    fn golden_response_frame() {
        assert_frame(
            Frame::response(
                3,
                Class::Gpio,
                GpioVerb::Get as u8,
                Response {
                    status: 0,
                    data: vec![0x01],
                },
            ),
            &[
                0x5a, 0xc5, 0x01, 0x03, 0x93, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xf3,
            ],
        );
    }

    #[test]
    fn every_request_shape_survives_the_wire() {
        let requests = vec![
            Request::GpioInit { port: 1, pin: 2, mode: 3 },
            Request::GpioDeinit { handle: 5 },
            Request::GpioSet { handle: 5, level: 0 },
            Request::GpioGet { handle: 5 },
            Request::UartInit { dev: 0, baud: 115200, tx: -1, rx: -1 },
            Request::UartDeinit { handle: 1 },
            Request::UartWrite { handle: 1, flags: 1, data: b"abc".to_vec() },
            Request::UartRead { handle: 1, flags: 0, len: 64 },
            Request::SpiInit { dev: 1, baud: 1_000_000, mosi: 4, miso: 5, sck: 6, cs: -1 },
            Request::SpiDeinit { handle: 2 },
            Request::SpiRead { handle: 2, len: 16 },
            Request::SpiWrite { handle: 2, data: vec![0xde, 0xad] },
            Request::SpiTransfer { handle: 2, write: vec![1, 2, 3] },
            Request::SpiTransferInplace { handle: 2, data: vec![4, 5] },
            Request::SpiExec { handle: 2 },
            Request::I2cInit { dev: 0, baud: 100_000, sda: -1, scl: -1 },
            Request::I2cDeinit { handle: 3 },
            Request::I2cWrite { handle: 3, addr: 0x24, data: vec![0x10, 0xff] },
            Request::I2cRead { handle: 3, addr: 0x24, len: 4 },
            Request::I2cWriteRead { handle: 3, addr: 0x3ff, data: vec![0x10], read_len: 2 },
        ];

        for (n, request) in requests.into_iter().enumerate() {
            let frame = Frame::request(n as u8, request);
            let mut encoded = BytesMut::new();
            frame.encode(&mut encoded);
            let (parsed, crc_ok) = Frame::try_parse(&encoded).unwrap();
            assert!(crc_ok);
            assert_eq!(parsed, frame);
        }
    }

    #[test]
    fn response_with_error_status_survives_the_wire() {
        let frame = Frame::response(
            9,
            Class::Spi,
            SpiVerb::Exec as u8,
            Response {
                status: -7,
                data: vec![],
            },
        );
        let mut encoded = BytesMut::new();
        frame.encode(&mut encoded);
        let (parsed, crc_ok) = Frame::try_parse(&encoded).unwrap();
        assert!(crc_ok);
        assert_eq!(parsed, frame);
    }

    #[test]
    fn corrupt_crc_is_reported_but_still_parsed() {
        let frame = Frame::request(0, Request::GpioGet { handle: 1 });
        let mut encoded = BytesMut::new();
        frame.encode(&mut encoded);
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;

        let (parsed, crc_ok) = Frame::try_parse(&encoded).unwrap();
        assert!(!crc_ok);
        assert_eq!(parsed, frame);
    }

    #[test]
    fn parse_rejects_malformed_frames() {
        assert_eq!(Frame::try_parse(&[]), Err(FrameError::Truncated(0)));
        assert_eq!(
            Frame::try_parse(&[0xff; 16]).unwrap_err(),
            FrameError::BadMagic
        );

        let mut encoded = BytesMut::new();
        Frame::request(0, Request::GpioGet { handle: 1 }).encode(&mut encoded);
        encoded[2] = 0x02;
        assert_eq!(
            Frame::try_parse(&encoded).unwrap_err(),
            FrameError::BadVersion(0x02)
        );
    }

    #[test]
    fn parse_rejects_unknown_class_and_verb() {
        let mut encoded = BytesMut::new();
        Frame::request(0, Request::GpioGet { handle: 1 }).encode(&mut encoded);

        let mut bad_class = encoded.clone();
        bad_class[4] = 0x73; // class 7
        assert_eq!(
            Frame::try_parse(&bad_class).unwrap_err(),
            FrameError::UnknownClass(7)
        );

        let mut bad_verb = encoded.clone();
        bad_verb[4] = 0x1f; // gpio verb 15
        assert!(matches!(
            Frame::try_parse(&bad_verb).unwrap_err(),
            FrameError::UnknownVerb { class: Class::Gpio, verb: 15 }
        ));
    }

    #[test]
    fn decoder_resynchronizes_after_garbage() {
        let frame = Frame::request(1, Request::GpioGet { handle: 1 });
        let mut stream = BytesMut::new();
        stream.put_slice(&[0x00, 0x13, 0x37]);
        frame.encode(&mut stream);

        let mut codec = FrameCodec;
        let decoded = codec.decode(&mut stream).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(codec.decode(&mut stream).unwrap().is_none());
    }

    #[test]
    fn decoder_waits_for_a_complete_frame() {
        let frame = Frame::request(1, Request::UartWrite {
            handle: 0,
            flags: 0,
            data: vec![0xaa; 32],
        });
        let mut encoded = BytesMut::new();
        frame.encode(&mut encoded);

        let mut codec = FrameCodec;
        let mut partial = BytesMut::from(&encoded[..10]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.put_slice(&encoded[10..]);
        assert_eq!(codec.decode(&mut partial).unwrap().unwrap(), frame);
    }

    #[test]
    fn decoder_errors_on_bad_crc() {
        let frame = Frame::request(1, Request::GpioGet { handle: 1 });
        let mut encoded = BytesMut::new();
        frame.encode(&mut encoded);
        let last = encoded.len() - 1;
        encoded[last] ^= 0x01;

        let mut codec = FrameCodec;
        assert!(codec.decode(&mut encoded).is_err());
    }

    #[test]
    fn decoder_errors_on_oversize_length() {
        let mut bytes = BytesMut::new();
        bytes.put_slice(MAGIC);
        bytes.put_u8(VERSION);
        bytes.put_u8(0);
        bytes.put_u8(0x12);
        bytes.put_u16_le((MAX_PAYLOAD + 1) as u16);

        let mut codec = FrameCodec;
        assert!(codec.decode(&mut bytes).is_err());
    }
}
