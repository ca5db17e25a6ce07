//! AMQP frame model.
//!
//! Every frame except the protocol header shares one envelope:
//!
//! ```text
//! type:u8 channel:u16 size:u32 payload[size] frame-end:u8 (0xCE)
//! ```
//!
//! [`Frame`] is a closed enum over the five frame kinds. Method payloads are
//! resolved through the [`Method`] registry, so an unknown class and method
//! pair is a decode error rather than an opaque payload.

use bytes::{Bytes, BytesMut};

use crate::{
    codec::{
        CodecError,
        DecodeError,
        EncodeError,
        FieldReader,
        FieldSink,
        FieldWriter,
        FramingError,
    },
    method::{Method, basic},
};

mod properties;

pub use properties::{BasicProperties, flags};

/// Method frame type octet.
pub const FRAME_METHOD: u8 = 1;
/// Content header frame type octet.
pub const FRAME_HEADER: u8 = 2;
/// Content body frame type octet.
pub const FRAME_BODY: u8 = 3;
/// Heartbeat frame type octet.
pub const FRAME_HEARTBEAT: u8 = 8;
/// Octet terminating every enveloped frame.
pub const FRAME_END: u8 = 0xCE;

/// Bytes preceding the payload: type, channel and size.
pub const FRAME_HEADER_SIZE: usize = 7;
/// Envelope bytes surrounding a payload, frame-end octet included.
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;
/// Length of the protocol header.
pub const PROTOCOL_HEADER_SIZE: usize = 8;

/// Fixed prefix of a content header payload: class, weight and body size.
const CONTENT_HEADER_PREFIX: usize = 12;

/// The `AMQP` preamble announcing a protocol version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtocolHeader {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Revision.
    pub revision: u8,
}

impl ProtocolHeader {
    /// The only version this crate speaks.
    pub const AMQP_0_9_1: Self = Self {
        major: 0,
        minor: 9,
        revision: 1,
    };

    /// Wire representation: `"AMQP" 0 major minor revision`.
    #[must_use]
    pub fn to_bytes(self) -> [u8; PROTOCOL_HEADER_SIZE] {
        [
            b'A',
            b'M',
            b'Q',
            b'P',
            0,
            self.major,
            self.minor,
            self.revision,
        ]
    }

    /// Parse an eight-byte protocol header.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::MalformedProtocolHeader`] when the bytes do not
    /// start with `AMQP` or are not eight bytes long.
    pub fn parse(raw: &[u8]) -> Result<Self, FramingError> {
        match raw {
            [b'A', b'M', b'Q', b'P', _, major, minor, revision] => Ok(Self {
                major: *major,
                minor: *minor,
                revision: *revision,
            }),
            _ => Err(FramingError::MalformedProtocolHeader),
        }
    }
}

impl Default for ProtocolHeader {
    fn default() -> Self { Self::AMQP_0_9_1 }
}

/// A method addressed to a channel.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodFrame {
    /// Channel the method belongs to; 0 for connection-level methods.
    pub channel: u16,
    /// Decoded method.
    pub method: Method,
}

/// Properties and body size announcing a message's content.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentHeaderFrame {
    /// Channel carrying the content; never 0.
    pub channel: u16,
    /// Class of the method that opened the content, always `basic`.
    pub class_id: u16,
    /// Total size of the body frames that follow.
    pub body_size: u64,
    /// Message properties.
    pub properties: BasicProperties,
}

/// One fragment of a message body.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentBodyFrame {
    /// Channel carrying the content; never 0.
    pub channel: u16,
    /// Raw body bytes.
    pub fragment: Bytes,
}

/// Any AMQP frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Version preamble; not enveloped.
    ProtocolHeader(ProtocolHeader),
    /// Method frame.
    Method(MethodFrame),
    /// Content header frame.
    ContentHeader(ContentHeaderFrame),
    /// Content body frame.
    ContentBody(ContentBodyFrame),
    /// Heartbeat on channel 0.
    Heartbeat,
}

impl Frame {
    /// Build a method frame for `channel`.
    #[must_use]
    pub fn method(channel: u16, method: impl Into<Method>) -> Self {
        Self::Method(MethodFrame {
            channel,
            method: method.into(),
        })
    }

    /// Build a basic-class content header.
    #[must_use]
    pub fn content_header(channel: u16, body_size: u64, properties: BasicProperties) -> Self {
        Self::ContentHeader(ContentHeaderFrame {
            channel,
            class_id: basic::CLASS_ID,
            body_size,
            properties,
        })
    }

    /// Build a content body fragment.
    #[must_use]
    pub fn content_body(channel: u16, fragment: Bytes) -> Self {
        Self::ContentBody(ContentBodyFrame { channel, fragment })
    }

    /// Channel the frame is addressed to; 0 for the protocol header and
    /// heartbeats.
    #[must_use]
    pub fn channel(&self) -> u16 {
        match self {
            Self::ProtocolHeader(_) | Self::Heartbeat => 0,
            Self::Method(frame) => frame.channel,
            Self::ContentHeader(frame) => frame.channel,
            Self::ContentBody(frame) => frame.channel,
        }
    }

    /// Envelope type octet, or `None` for the protocol header.
    #[must_use]
    pub fn frame_type(&self) -> Option<u8> {
        match self {
            Self::ProtocolHeader(_) => None,
            Self::Method(_) => Some(FRAME_METHOD),
            Self::ContentHeader(_) => Some(FRAME_HEADER),
            Self::ContentBody(_) => Some(FRAME_BODY),
            Self::Heartbeat => Some(FRAME_HEARTBEAT),
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProtocolHeader(_) => "protocol-header",
            Self::Method(frame) => frame.method.name(),
            Self::ContentHeader(_) => "content-header",
            Self::ContentBody(_) => "content-body",
            Self::Heartbeat => "heartbeat",
        }
    }

    /// Payload size declared in the envelope.
    #[must_use]
    pub fn payload_bytes_count(&self) -> usize {
        match self {
            Self::ProtocolHeader(_) | Self::Heartbeat => 0,
            Self::Method(frame) => 4 + frame.method.fields_bytes_count(),
            Self::ContentHeader(frame) => {
                CONTENT_HEADER_PREFIX + frame.properties.bytes_count()
            }
            Self::ContentBody(frame) => frame.fragment.len(),
        }
    }

    /// Total bytes this frame occupies on the wire.
    #[must_use]
    pub fn bytes_count(&self) -> usize {
        match self {
            Self::ProtocolHeader(_) => PROTOCOL_HEADER_SIZE,
            _ => FRAME_OVERHEAD + self.payload_bytes_count(),
        }
    }

    /// Append the wire encoding to `dst`.
    ///
    /// On failure `dst` is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when a field cannot be represented, such as an
    /// over-long short string.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let start = dst.len();
        let result = self.encode_unchecked(dst);
        if result.is_err() {
            dst.truncate(start);
        }
        result
    }

    /// Check that the frame encodes and fits within `max_frame_length`
    /// bytes, without queueing it anywhere.
    ///
    /// Body fragments are opaque bytes, so only their size is checked.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::OversizedFrame`] when the frame is too large
    /// and [`CodecError::Encode`] when a field cannot be represented.
    pub fn validate(&self, max_frame_length: usize) -> Result<(), CodecError> {
        let size = self.bytes_count();
        if size > max_frame_length {
            return Err(FramingError::OversizedFrame {
                size,
                max: max_frame_length,
            }
            .into());
        }
        if matches!(self, Self::ContentBody(_)) {
            return Ok(());
        }
        let mut scratch = BytesMut::with_capacity(size);
        self.encode(&mut scratch)?;
        Ok(())
    }

    fn encode_unchecked(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let mut writer = FieldWriter::new(dst);
        let Some(frame_type) = self.frame_type() else {
            if let Self::ProtocolHeader(header) = self {
                writer.raw(&header.to_bytes());
            }
            return Ok(());
        };

        writer.octet(frame_type);
        writer.short(self.channel());
        let size_offset = writer.reserve_long();
        match self {
            Self::ProtocolHeader(_) | Self::Heartbeat => {}
            Self::Method(frame) => {
                writer.short(frame.method.class_id());
                writer.short(frame.method.method_id());
                frame.method.write_fields(&mut writer)?;
            }
            Self::ContentHeader(frame) => {
                writer.short(frame.class_id);
                writer.short(0);
                writer.longlong(frame.body_size);
                frame.properties.encode(&mut writer)?;
            }
            Self::ContentBody(frame) => writer.raw(&frame.fragment),
        }
        writer.patch_long(size_offset)?;
        writer.octet(FRAME_END);
        Ok(())
    }

    /// Decode one complete enveloped frame.
    ///
    /// `raw` must hold exactly one frame, frame-end octet included; the
    /// [`AmqpCodec`](crate::codec::AmqpCodec) guarantees this when splitting
    /// a stream.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Framing`] for envelope violations and
    /// [`CodecError::Decode`] when the payload cannot be interpreted.
    pub fn decode(raw: Bytes) -> Result<Self, CodecError> {
        let mut reader = FieldReader::new(raw);
        let frame_type = reader.octet()?;
        let channel = reader.short()?;
        let size = reader.long()? as usize;
        let payload = reader.bytes(size)?;
        let end = reader.octet()?;
        if end != FRAME_END {
            return Err(FramingError::MissingFrameEnd { found: end }.into());
        }

        let mut payload = FieldReader::new(payload);
        let frame = match frame_type {
            FRAME_METHOD => Self::Method(MethodFrame {
                channel,
                method: decode_method(&mut payload)?,
            }),
            FRAME_HEADER => Self::ContentHeader(decode_content_header(channel, &mut payload)?),
            FRAME_BODY => {
                if channel == 0 {
                    return Err(FramingError::ContentOnChannelZero.into());
                }
                Self::content_body(channel, payload.rest())
            }
            FRAME_HEARTBEAT => {
                if channel != 0 {
                    return Err(FramingError::HeartbeatOnChannel(channel).into());
                }
                if size != 0 {
                    return Err(FramingError::HeartbeatPayload(size).into());
                }
                Self::Heartbeat
            }
            other => return Err(FramingError::UnknownFrameType(other).into()),
        };

        if payload.remaining() != 0 {
            return Err(FramingError::SizeMismatch {
                declared: size,
                decoded: size - payload.remaining(),
            }
            .into());
        }
        Ok(frame)
    }
}

fn decode_method(payload: &mut FieldReader) -> Result<Method, DecodeError> {
    let class_id = payload.short()?;
    let method_id = payload.short()?;
    let decode = Method::lookup(class_id, method_id).ok_or(DecodeError::UnknownClassAndMethod {
        class_id,
        method_id,
    })?;
    decode(payload)
}

fn decode_content_header(
    channel: u16,
    payload: &mut FieldReader,
) -> Result<ContentHeaderFrame, CodecError> {
    if channel == 0 {
        return Err(FramingError::ContentOnChannelZero.into());
    }
    let class_id = payload.short()?;
    if class_id != basic::CLASS_ID {
        return Err(DecodeError::UnknownContentClass(class_id).into());
    }
    let weight = payload.short()?;
    if weight != 0 {
        return Err(FramingError::NonZeroWeight(weight).into());
    }
    let body_size = payload.longlong()?;
    let properties = BasicProperties::decode(payload)?;
    Ok(ContentHeaderFrame {
        channel,
        class_id,
        body_size,
        properties,
    })
}

impl From<MethodFrame> for Frame {
    fn from(frame: MethodFrame) -> Self { Self::Method(frame) }
}
