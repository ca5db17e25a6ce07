#![doc(html_root_url = "https://docs.rs/amqp-wire/latest")]
//! Public API for the `amqp-wire` library.
//!
//! This crate implements the client side of AMQP 0-9-1: a frame codec,
//! typed method definitions and a tokio runtime that negotiates
//! connections, multiplexes channels and reassembles content.

pub mod client;
pub mod codec;
pub mod frame;
pub mod method;
pub mod metrics;

pub use client::{
    Channel,
    ClientError,
    Connection,
    ConnectionConfig,
    ConnectionError,
    Consumer,
    Credentials,
    ExchangeType,
    HeartbeatSetting,
    Message,
    NegotiationError,
};
pub use codec::{AmqpCodec, CodecError, FieldValue, Table};
pub use frame::{BasicProperties, Frame};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
