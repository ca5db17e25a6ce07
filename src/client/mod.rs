//! AMQP 0-9-1 client: connection handshake, channel multiplexing and
//! message flow.
//!
//! [`Connection`] negotiates with the broker and then hands the socket to
//! background tasks. Applications work through [`Channel`] handles, which
//! borrow the connection and issue methods concurrently; replies are
//! matched to callers per channel in request order.

mod channel;
mod channel_ids;
mod channel_manager;
mod config;
mod connection;
mod error;
mod heartbeat;
mod message;
mod negotiation;
mod reassembly;
mod router;
mod tracing_config;
mod tracing_helpers;
mod transport;

pub use channel::Channel;
pub use channel_ids::ChannelIds;
pub use config::{
    ConnectionConfig,
    Credentials,
    DEFAULT_CHANNEL_MAX,
    DEFAULT_FRAME_MAX,
    DEFAULT_PORT,
    HeartbeatSetting,
};
pub use connection::Connection;
pub use error::{ClientError, ConnectionError, NegotiationError};
pub use heartbeat::{Activity, HeartbeatMonitor, HeartbeatTick};
pub use message::{Consumer, ExchangeType, Message, QueueDeclareResult};
pub use negotiation::{Negotiated, NegotiationAction, NegotiationState, Negotiator, decide};
pub use reassembly::{AssembledContent, DEFAULT_MAX_MESSAGE_SIZE, Reassembler, ReassemblyError, Routed};
pub use tracing_config::TracingConfig;
pub use transport::{FrameSender, InboundFrames, Transport, spawn_transport};
