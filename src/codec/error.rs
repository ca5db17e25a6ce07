//! Error types for the AMQP codec layer.
//!
//! # Error Categories
//!
//! - [`FramingError`]: the frame envelope is malformed (unknown type, missing frame-end octet,
//!   declared size disagreeing with the decoded payload, oversized frames).
//! - [`DecodeError`]: a payload could not be interpreted (truncated fields, unknown class and
//!   method pairs, unknown field value tags, invalid UTF-8).
//! - [`EncodeError`]: a value cannot be represented on the wire.
//! - [`EofError`]: the stream ended part-way through a frame.
//! - [`CodecError`]: top-level enum wrapping all categories plus I/O errors.
//!
//! Every decoding and framing error is fatal to the connection that produced
//! it; the codec never attempts to resynchronise on a corrupt stream.

use std::io;

use thiserror::Error;

/// Envelope-level errors detected while splitting or validating frames.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Frame size exceeds the configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Size declared by the frame envelope, including envelope overhead.
        size: usize,
        /// Maximum accepted frame size.
        max: usize,
    },

    /// Leading type octet is not one of the four AMQP frame types.
    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),

    /// Frame was not terminated by the `0xCE` frame-end octet.
    #[error("missing frame-end octet: found {found:#04x}")]
    MissingFrameEnd {
        /// Octet found where the frame-end marker was expected.
        found: u8,
    },

    /// Declared payload size disagrees with the bytes the payload decoded from.
    #[error("frame size mismatch: declared {declared}, decoded {decoded}")]
    SizeMismatch {
        /// Payload size declared by the envelope.
        declared: usize,
        /// Payload size accounted for by the decoded value.
        decoded: usize,
    },

    /// Content header or body frame addressed to channel 0.
    #[error("content frame on channel 0")]
    ContentOnChannelZero,

    /// Heartbeat frame addressed to a non-zero channel.
    #[error("heartbeat frame on channel {0}")]
    HeartbeatOnChannel(u16),

    /// Heartbeat frame carrying a payload.
    #[error("heartbeat frame carries {0} payload bytes")]
    HeartbeatPayload(usize),

    /// Content header weight field was not zero.
    #[error("content header weight must be zero, got {0}")]
    NonZeroWeight(u16),

    /// Bytes starting with `AMQP` were not a well-formed protocol header.
    #[error("malformed protocol header")]
    MalformedProtocolHeader,
}

/// Payload-level errors raised while reading typed fields.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A field needs more bytes than the payload has left.
    #[error("insufficient data: need {needed} bytes, {remaining} remaining")]
    InsufficientData {
        /// Bytes required by the field being read.
        needed: usize,
        /// Bytes left in the payload.
        remaining: usize,
    },

    /// Method frame names a `(class, method)` pair absent from the registry.
    #[error("unknown class {class_id} and method {method_id}")]
    UnknownClassAndMethod {
        /// Class identifier read from the payload.
        class_id: u16,
        /// Method identifier read from the payload.
        method_id: u16,
    },

    /// Field value type tag is not recognised.
    #[error("unknown field value type {0:#04x}")]
    UnknownFieldType(u8),

    /// Content header for a class that carries no content.
    #[error("unsupported content class {0}")]
    UnknownContentClass(u16),

    /// Property flags announce a property beyond the fourteen defined ones.
    #[error("property flags announce an unknown property")]
    UnknownProperty,

    /// Short string bytes are not valid UTF-8.
    #[error("short string is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors raised while encoding values onto the wire.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// Short string longer than the one-octet length prefix allows.
    #[error("short string is {len} bytes, limit is {max}")]
    ShortStringTooLong {
        /// UTF-8 length of the rejected string.
        len: usize,
        /// Largest accepted length.
        max: usize,
    },

    /// Value too large for a four-octet length prefix.
    #[error("value of {0} bytes exceeds the 32-bit length prefix")]
    LengthOverflow(usize),
}

/// Premature end of stream.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The stream ended before a full frame header arrived.
    #[error("premature EOF during header: {bytes_received} of {header_size} header bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Expected header size.
        header_size: usize,
    },

    /// The stream ended after the header but before the frame was complete.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte frame received")]
    MidFrame {
        /// Bytes received before EOF.
        bytes_received: usize,
        /// Expected total frame size.
        expected: usize,
    },
}

/// Top-level codec error taxonomy.
///
/// # Examples
///
/// ```
/// use amqp_wire::codec::{CodecError, FramingError};
///
/// let err = CodecError::Framing(FramingError::UnknownFrameType(9));
/// assert!(err.to_string().contains("unknown frame type 9"));
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame envelope error.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Payload decoding error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Payload encoding error.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Transport layer I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// End-of-stream handling.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),
}
