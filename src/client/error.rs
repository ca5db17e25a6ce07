//! Error types for broker connections and channels.

use std::io;

use crate::codec::CodecError;

/// Connection-wide failures, cloned to every channel when broadcast.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The transport is gone or the connection was closed.
    #[error("connection is closed")]
    ConnectionIsClosed,
    /// The channel was closed locally or by the broker.
    #[error("channel is closed")]
    ChannelIsClosed,
    /// Every channel id up to the negotiated `channel_max` is in use.
    #[error("maximum number of channels reached")]
    MaxChannelsLimitReached,
    /// A content body fragment exceeded the negotiated frame size.
    #[error("frame of {actual} bytes exceeds negotiated frame_max {max}")]
    FrameSizeLimitExceeded {
        /// Negotiated `frame_max`.
        max: u32,
        /// Offending fragment length.
        actual: usize,
    },
    /// The broker announced a message body above the configured maximum.
    #[error("message of {actual} bytes exceeds the {max} byte limit")]
    MessageSizeLimitExceeded {
        /// Configured maximum body size.
        max: u64,
        /// Body size from the content header.
        actual: u64,
    },
    /// The channel's delivery stream was already handed out.
    #[error("consumer stream already taken for this channel")]
    ConsumerAlreadyTaken,
}

/// Failures while establishing a connection.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    /// The broker speaks a different protocol version.
    #[error("broker protocol version {major}.{minor} is not 0.9")]
    ProtocolVersionMismatch {
        /// Major version offered by the broker.
        major: u8,
        /// Minor version offered by the broker.
        minor: u8,
    },
    /// The broker does not offer the configured SASL mechanism.
    #[error("broker does not support mechanism {mechanism} (offered: {offered})")]
    UnsupportedAuthMechanism {
        /// Mechanism the client asked for.
        mechanism: String,
        /// Space-separated list the broker advertised.
        offered: String,
    },
    /// A frame arrived that the current handshake state does not accept.
    #[error("unexpected {received} while {state}")]
    UnexpectedMethod {
        /// Handshake state at the time.
        state: &'static str,
        /// Name of the offending frame or method.
        received: &'static str,
    },
    /// A frame reached a negotiator that has already completed.
    #[error("negotiation already complete")]
    Unreachable,
    /// The broker refused the connection with `connection.close`.
    #[error("broker closed the connection: {reply_code} {reply_text}")]
    ClosedByBroker {
        /// AMQP reply code.
        reply_code: u16,
        /// Human-readable reason.
        reply_text: String,
    },
    /// The handshake did not finish in time.
    #[error("negotiation timed out")]
    TimedOut,
}

/// Errors returned by [`crate::client::Connection`] and
/// [`crate::client::Channel`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Socket error.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// Frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// Handshake failed.
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),
    /// Connection or channel state prevented the operation.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// An argument is outside the range the protocol allows.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The broker answered a synchronous method with the wrong reply.
    #[error("expected {expected} but broker replied {received}")]
    UnexpectedReply {
        /// Name of the reply the call waited for.
        expected: &'static str,
        /// Name of the reply that arrived.
        received: &'static str,
    },
}

impl ClientError {
    /// Whether the error leaves the connection unusable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(_) | Self::Codec(_) | Self::Negotiation(_) => true,
            Self::Connection(err) => matches!(
                err,
                ConnectionError::ConnectionIsClosed
                    | ConnectionError::FrameSizeLimitExceeded { .. }
                    | ConnectionError::MessageSizeLimitExceeded { .. }
            ),
            Self::InvalidArgument(_) | Self::UnexpectedReply { .. } => false,
        }
    }
}
