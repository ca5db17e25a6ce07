//! AMQP 0-9-1 wire codec.
//!
//! The codec turns a byte stream into [`Frame`]s and back. It is split into
//! layers that mirror the wire format:
//!
//! - [`wire`]: primitive field readers and writers with bit packing.
//! - [`field`]: typed field values and tables.
//! - [`AmqpCodec`]: the `tokio_util` [`Decoder`]/[`Encoder`] that frames a
//!   byte stream, enforcing a hard ceiling on frame size.
//!
//! # Error Handling
//!
//! All failures surface as [`CodecError`]. Every variant is fatal for the
//! stream that produced it: AMQP has no resynchronisation marker, so a
//! connection that has seen a malformed frame cannot be trusted again.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{FRAME_HEADER_SIZE, Frame, PROTOCOL_HEADER_SIZE, ProtocolHeader};

pub mod error;
pub mod field;
pub mod wire;

pub use error::{CodecError, DecodeError, EncodeError, EofError, FramingError};
pub use field::{Decimal, FieldValue, Table, Timestamp};
pub use wire::{FieldReader, FieldSink, FieldWriter, SHORT_STRING_MAX, SizeCounter, WireField};

/// Smallest frame size a peer may negotiate (`frame-min-size`).
///
/// Ceilings passed to [`AmqpCodec::new`] are clamped to at least this value,
/// which both peers must accept before tuning completes.
pub const MIN_FRAME_LENGTH: usize = 4096;

/// Largest frame ceiling the codec will accept (16 MiB).
///
/// A negotiated `frame_max` of 0 means "no limit"; the codec still caps
/// buffering at this value to prevent unbounded allocation.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Ceiling used before the broker has tuned the connection.
pub const DEFAULT_FRAME_LENGTH: usize = 128 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Frame ceiling the codec enforces for a negotiated `frame_max`, where 0
/// means no limit beyond [`MAX_FRAME_LENGTH`].
#[must_use]
pub fn frame_ceiling(frame_max: u32) -> usize {
    match usize::try_from(frame_max) {
        Ok(0) | Err(_) => MAX_FRAME_LENGTH,
        Ok(limit) => clamp_frame_length(limit),
    }
}

/// Frame codec for AMQP 0-9-1 streams.
///
/// Decodes the protocol header a broker sends when it rejects our version,
/// and every enveloped frame type. The ceiling covers the whole frame,
/// envelope included, matching the meaning of the negotiated `frame_max`.
///
/// # Examples
///
/// ```
/// use amqp_wire::{codec::AmqpCodec, frame::Frame};
/// use bytes::BytesMut;
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut codec = AmqpCodec::default();
/// let mut buf = BytesMut::new();
/// codec.encode(Frame::Heartbeat, &mut buf).expect("encode heartbeat");
/// assert_eq!(&buf[..], &[8, 0, 0, 0, 0, 0, 0, 0xCE]);
///
/// let frame = codec.decode(&mut buf).expect("decode").expect("frame");
/// assert_eq!(frame, Frame::Heartbeat);
/// ```
#[derive(Clone, Debug)]
pub struct AmqpCodec {
    max_frame_length: usize,
}

impl AmqpCodec {
    /// Construct a codec accepting frames up to `max_frame_length` bytes.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
        }
    }

    /// Return the maximum frame length accepted by this codec.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    /// Apply a negotiated `frame_max`, where 0 means no limit.
    pub fn set_frame_max(&mut self, frame_max: u32) {
        self.max_frame_length = frame_ceiling(frame_max);
    }
}

impl Default for AmqpCodec {
    fn default() -> Self { Self::new(DEFAULT_FRAME_LENGTH) }
}

impl Decoder for AmqpCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(&first) = src.first() else {
            return Ok(None);
        };

        if first == b'A' {
            if src.len() < PROTOCOL_HEADER_SIZE {
                return Ok(None);
            }
            let raw = src.split_to(PROTOCOL_HEADER_SIZE);
            return Ok(Some(Frame::ProtocolHeader(ProtocolHeader::parse(&raw)?)));
        }

        let Some(total) = envelope_len(src) else {
            return Ok(None);
        };
        if total > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size: total,
                max: self.max_frame_length,
            }
            .into());
        }
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let raw = src.split_to(total).freeze();
        Frame::decode(raw).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(build_eof_error(src).into()),
        }
    }
}

/// Full wire length of the frame at the front of `src`, once its header is
/// buffered.
fn envelope_len(src: &[u8]) -> Option<usize> {
    let size = src.get(3..FRAME_HEADER_SIZE)?;
    let size = u32::from_be_bytes([size[0], size[1], size[2], size[3]]) as usize;
    Some(FRAME_HEADER_SIZE + size + 1)
}

/// Classify a truncated stream as mid-header or mid-frame.
fn build_eof_error(src: &BytesMut) -> EofError {
    let bytes_received = src.len();
    let header_size = if src.first() == Some(&b'A') {
        PROTOCOL_HEADER_SIZE
    } else {
        FRAME_HEADER_SIZE
    };
    match envelope_len(src).filter(|_| header_size == FRAME_HEADER_SIZE) {
        Some(expected) => EofError::MidFrame {
            bytes_received,
            expected,
        },
        None => EofError::MidHeader {
            bytes_received,
            header_size,
        },
    }
}

impl Encoder<Frame> for AmqpCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = item.bytes_count();
        if size > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size,
                max: self.max_frame_length,
            }
            .into());
        }
        dst.reserve(size);
        item.encode(dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
