//! Burp Monitor Framing
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! +---------+------------------+-----------------------+
//! | 1 byte  | 4 bytes          | <length> bytes        |
//! | command | hex length (ASCII)| payload               |
//! +---------+------------------+-----------------------+
//! ```
//!
//! The command byte is `c` for regular data, `w` for warnings and `e` for
//! errors. Frames we send always carry a trailing NUL that is counted in the
//! length (`c0006hello\0`). A single trailing NUL on received payloads is
//! stripped.

use crate::error::{ExporterError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use tokio_util::codec::{Decoder, Encoder};

/// Command byte plus four hex digits
pub const HEADER_LEN: usize = 5;

/// Largest payload four hex digits can describe
pub const MAX_PAYLOAD: usize = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Command,
    Warning,
    Error,
}

impl FrameKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'c' => Some(FrameKind::Command),
            b'w' => Some(FrameKind::Warning),
            b'e' => Some(FrameKind::Error),
            _ => None,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            FrameKind::Command => b'c',
            FrameKind::Warning => b'w',
            FrameKind::Error => b'e',
        }
    }
}

/// One decoded protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn command(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Command,
            payload: payload.into(),
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// End of a status dump: an empty `c` payload or a lone newline.
    pub fn is_terminator(&self) -> bool {
        self.kind == FrameKind::Command
            && (self.payload.is_empty() || self.payload.as_ref() == b"\n")
    }
}

#[derive(Debug, Clone)]
pub struct BurpCodec {
    max_payload: usize,
}

impl BurpCodec {
    pub fn new() -> Self {
        Self {
            max_payload: MAX_PAYLOAD,
        }
    }

    /// Tightens the accepted payload size (never above [`MAX_PAYLOAD`]).
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.min(MAX_PAYLOAD),
        }
    }
}

impl Default for BurpCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_length(digits: &[u8]) -> Result<usize> {
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return Err(ExporterError::Framing(format!(
            "invalid length prefix {:?}",
            String::from_utf8_lossy(digits)
        )));
    }
    // Four validated hex digits are always valid UTF-8 and fit in a u16
    let text = std::str::from_utf8(digits)
        .map_err(|e| ExporterError::Framing(format!("invalid length prefix: {}", e)))?;
    u16::from_str_radix(text, 16)
        .map(usize::from)
        .map_err(|e| ExporterError::Framing(format!("invalid length prefix {:?}: {}", text, e)))
}

impl Decoder for BurpCodec {
    type Item = Frame;
    type Error = ExporterError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let Some(&first) = src.first() else {
            return Ok(None);
        };
        let kind = FrameKind::from_byte(first).ok_or_else(|| {
            ExporterError::Framing(format!("unexpected command byte {:?}", first as char))
        })?;

        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = parse_length(&src[1..HEADER_LEN])?;
        if len > self.max_payload {
            return Err(ExporterError::Framing(format!(
                "frame of {} bytes exceeds the {} byte limit",
                len, self.max_payload
            )));
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let mut payload = src.split_to(len).freeze();
        if payload.last() == Some(&0) {
            payload.truncate(payload.len() - 1);
        }

        Ok(Some(Frame { kind, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ExporterError::Framing(format!(
                "stream ended inside a frame ({} bytes buffered)",
                src.len()
            ))),
        }
    }
}

impl Encoder<Frame> for BurpCodec {
    type Error = ExporterError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        // Declared length includes the trailing NUL
        let len = frame.payload.len() + 1;
        if len > self.max_payload {
            return Err(ExporterError::Framing(format!(
                "outgoing payload of {} bytes exceeds the {} byte limit",
                len, self.max_payload
            )));
        }

        dst.reserve(HEADER_LEN + len);
        dst.put_u8(frame.kind.as_byte());
        dst.extend_from_slice(format!("{:04X}", len).as_bytes());
        dst.extend_from_slice(&frame.payload);
        dst.put_u8(0);
        Ok(())
    }
}
