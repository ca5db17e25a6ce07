//! Per-channel reassembly of content-bearing methods.
//!
//! A `basic.deliver`, `basic.get-ok` or `basic.return` is followed on the
//! same channel by one content header and enough body frames to cover the
//! header's body size. Channels assemble independently, so deliveries on
//! different channels may interleave frame by frame.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use crate::{
    frame::{
        BasicProperties,
        ContentBodyFrame,
        ContentHeaderFrame,
        FRAME_OVERHEAD,
        Frame,
        MethodFrame,
    },
    method::Method,
};

const MAX_PREALLOCATION: usize = 1024 * 1024;

/// Largest message body accepted unless configured otherwise (128 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 128 * 1024 * 1024;

/// A content-bearing method with its properties and complete body.
#[derive(Clone, Debug, PartialEq)]
pub struct AssembledContent {
    /// Channel the content arrived on.
    pub channel: u16,
    /// `basic.deliver`, `basic.get-ok` or `basic.return`.
    pub method: Method,
    /// Properties from the content header.
    pub properties: BasicProperties,
    /// Concatenated body fragments.
    pub body: Bytes,
}

/// Protocol violations detected while assembling content. All are fatal to
/// the connection.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReassemblyError {
    /// Content was addressed to channel 0.
    #[error("content frame on channel 0")]
    ContentOnChannelZero,
    /// A header or body arrived with no content-bearing method before it.
    #[error("unexpected {kind} on channel {channel}")]
    UnexpectedContent {
        /// Channel of the stray frame.
        channel: u16,
        /// Kind of the stray frame.
        kind: &'static str,
    },
    /// A method arrived while content was still being assembled.
    #[error("{method} interleaved with content on channel {channel}")]
    InterleavedMethod {
        /// Channel of the incomplete content.
        channel: u16,
        /// Name of the interrupting method.
        method: &'static str,
    },
    /// Body fragments exceeded the size announced by the header.
    #[error("body of {actual} bytes exceeds declared {expected} on channel {channel}")]
    BodyOverflow {
        /// Channel of the oversized body.
        channel: u16,
        /// Size from the content header.
        expected: u64,
        /// Size received so far.
        actual: u64,
    },
    /// A content header announced a body above the configured maximum.
    #[error("body of {size} bytes exceeds the {max} byte limit on channel {channel}")]
    MessageTooLarge {
        /// Channel of the oversized message.
        channel: u16,
        /// Size from the content header.
        size: u64,
        /// Configured maximum.
        max: u64,
    },
    /// A body frame was larger than the negotiated `frame_max`.
    #[error("frame of {actual} bytes exceeds negotiated frame_max {max}")]
    FrameSizeLimitExceeded {
        /// Negotiated `frame_max`.
        max: u32,
        /// Offending frame size.
        actual: usize,
    },
}

/// Outcome of feeding one frame to the [`Reassembler`].
#[derive(Debug, PartialEq)]
pub enum Routed {
    /// A method that carries no content.
    Method(MethodFrame),
    /// A complete content-bearing method.
    Content(AssembledContent),
    /// The frame was absorbed into an incomplete message.
    Incomplete,
    /// Not a channel frame; the caller decides what to do with it.
    Passthrough(Frame),
}

#[derive(Debug)]
enum Phase {
    AwaitingHeader,
    AwaitingBody {
        properties: BasicProperties,
        expected: u64,
        body: BytesMut,
    },
}

#[derive(Debug)]
struct ContentContext {
    method: Method,
    phase: Phase,
}

/// Assembles content independently for every channel.
#[derive(Debug)]
pub struct Reassembler {
    frame_max: u32,
    max_body_size: u64,
    contexts: HashMap<u16, ContentContext>,
}

impl Reassembler {
    /// Create a reassembler enforcing `frame_max`; 0 disables the check.
    /// Bodies are capped at [`DEFAULT_MAX_MESSAGE_SIZE`].
    #[must_use]
    pub fn new(frame_max: u32) -> Self {
        Self {
            frame_max,
            max_body_size: DEFAULT_MAX_MESSAGE_SIZE,
            contexts: HashMap::new(),
        }
    }

    /// Reject content headers announcing more than `max` body bytes.
    #[must_use]
    pub fn with_max_body_size(mut self, max: u64) -> Self {
        self.max_body_size = max;
        self
    }

    /// Whether `channel` is part way through a message.
    #[must_use]
    pub fn is_assembling(&self, channel: u16) -> bool { self.contexts.contains_key(&channel) }

    /// Drop any partial message on `channel`.
    pub fn discard(&mut self, channel: u16) { self.contexts.remove(&channel); }

    /// Feed one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns a [`ReassemblyError`] when the frame violates content
    /// ordering or size limits.
    pub fn push(&mut self, frame: Frame) -> Result<Routed, ReassemblyError> {
        match frame {
            Frame::Method(method) => self.on_method(method),
            Frame::ContentHeader(header) => self.on_header(header),
            Frame::ContentBody(body) => self.on_body(body),
            other @ (Frame::ProtocolHeader(_) | Frame::Heartbeat) => Ok(Routed::Passthrough(other)),
        }
    }

    fn on_method(&mut self, frame: MethodFrame) -> Result<Routed, ReassemblyError> {
        if self.contexts.contains_key(&frame.channel) {
            return Err(ReassemblyError::InterleavedMethod {
                channel: frame.channel,
                method: frame.method.name(),
            });
        }
        if !frame.method.has_content() {
            return Ok(Routed::Method(frame));
        }
        if frame.channel == 0 {
            return Err(ReassemblyError::ContentOnChannelZero);
        }
        self.contexts.insert(
            frame.channel,
            ContentContext {
                method: frame.method,
                phase: Phase::AwaitingHeader,
            },
        );
        Ok(Routed::Incomplete)
    }

    fn on_header(&mut self, header: ContentHeaderFrame) -> Result<Routed, ReassemblyError> {
        let channel = header.channel;
        if channel == 0 {
            return Err(ReassemblyError::ContentOnChannelZero);
        }
        let Some(context) = self
            .contexts
            .get_mut(&channel)
            .filter(|context| matches!(context.phase, Phase::AwaitingHeader))
        else {
            return Err(ReassemblyError::UnexpectedContent {
                channel,
                kind: "content-header",
            });
        };

        if header.body_size > self.max_body_size {
            return Err(ReassemblyError::MessageTooLarge {
                channel,
                size: header.body_size,
                max: self.max_body_size,
            });
        }
        if header.body_size == 0 {
            return Ok(self.complete(channel, header.properties, Bytes::new()));
        }
        let capacity = usize::try_from(header.body_size)
            .unwrap_or(usize::MAX)
            .min(MAX_PREALLOCATION);
        context.phase = Phase::AwaitingBody {
            properties: header.properties,
            expected: header.body_size,
            body: BytesMut::with_capacity(capacity),
        };
        Ok(Routed::Incomplete)
    }

    fn on_body(&mut self, frame: ContentBodyFrame) -> Result<Routed, ReassemblyError> {
        let channel = frame.channel;
        if channel == 0 {
            return Err(ReassemblyError::ContentOnChannelZero);
        }
        let frame_bytes = frame.fragment.len() + FRAME_OVERHEAD;
        if self.frame_max != 0 && frame_bytes as u64 > u64::from(self.frame_max) {
            return Err(ReassemblyError::FrameSizeLimitExceeded {
                max: self.frame_max,
                actual: frame_bytes,
            });
        }
        let Some(ContentContext {
            phase: Phase::AwaitingBody { expected, body, .. },
            ..
        }) = self.contexts.get_mut(&channel)
        else {
            return Err(ReassemblyError::UnexpectedContent {
                channel,
                kind: "content-body",
            });
        };

        body.extend_from_slice(&frame.fragment);
        let actual = body.len() as u64;
        if actual > *expected {
            return Err(ReassemblyError::BodyOverflow {
                channel,
                expected: *expected,
                actual,
            });
        }
        if actual < *expected {
            return Ok(Routed::Incomplete);
        }
        match self.contexts.remove(&channel) {
            Some(ContentContext {
                method,
                phase: Phase::AwaitingBody {
                    properties, body, ..
                },
            }) => Ok(Routed::Content(AssembledContent {
                channel,
                method,
                properties,
                body: body.freeze(),
            })),
            _ => Ok(Routed::Incomplete),
        }
    }

    fn complete(&mut self, channel: u16, properties: BasicProperties, body: Bytes) -> Routed {
        match self.contexts.remove(&channel) {
            Some(context) => Routed::Content(AssembledContent {
                channel,
                method: context.method,
                properties,
                body,
            }),
            None => Routed::Incomplete,
        }
    }
}

#[cfg(test)]
mod tests;
