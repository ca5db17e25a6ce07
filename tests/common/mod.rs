//! Scripted broker shared by the integration tests.
//!
//! The broker speaks AMQP frames over an in-memory duplex stream, so tests
//! drive both ends of a connection deterministically.

#![allow(dead_code, reason = "each test binary uses a subset of the helpers")]

use amqp_wire::{
    AmqpCodec,
    Frame,
    client::{Connection, ConnectionConfig},
    codec::Table,
    frame::ProtocolHeader,
    method::{Method, channel, connection},
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{DuplexStream, duplex};
use tokio_util::codec::Framed;

/// Broker end of an in-memory connection.
pub struct Broker {
    framed: Framed<DuplexStream, AmqpCodec>,
}

/// Tuning the broker proposes in `connection.tune`.
#[derive(Clone, Copy, Debug)]
pub struct Tuning {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            channel_max: 2047,
            frame_max: 131_072,
            heartbeat: 0,
        }
    }
}

/// Client stream and the broker scripted against it.
#[must_use]
pub fn pair() -> (DuplexStream, Broker) {
    let (client, broker) = duplex(256 * 1024);
    (
        client,
        Broker {
            framed: Framed::new(broker, AmqpCodec::default()),
        },
    )
}

/// `connection.start` offering PLAIN for AMQP 0-9.
#[must_use]
pub fn start() -> Method {
    connection::Start {
        version_major: 0,
        version_minor: 9,
        server_properties: Table::new(),
        mechanisms: Bytes::from_static(b"PLAIN AMQPLAIN"),
        locales: Bytes::from_static(b"en_US"),
    }
    .into()
}

impl Broker {
    pub async fn recv(&mut self) -> Frame {
        self.framed
            .next()
            .await
            .expect("client sent a frame")
            .expect("frame decodes")
    }

    /// Next method frame, skipping heartbeats.
    pub async fn recv_method(&mut self) -> (u16, Method) {
        loop {
            match self.recv().await {
                Frame::Method(frame) => return (frame.channel, frame.method),
                Frame::Heartbeat => {}
                other => panic!("expected a method frame, got {}", other.kind()),
            }
        }
    }

    pub async fn send(&mut self, frame: Frame) {
        self.framed.send(frame).await.expect("broker send");
    }

    pub async fn send_method(&mut self, channel: u16, method: impl Into<Method>) {
        self.send(Frame::method(channel, method)).await;
    }

    /// Apply the negotiated `frame_max` to the broker's codec.
    pub fn set_frame_max(&mut self, frame_max: u32) { self.framed.codec_mut().set_frame_max(frame_max); }

    /// Whether the client closed its end.
    pub async fn is_closed(&mut self) -> bool {
        loop {
            match self.framed.next().await {
                None | Some(Err(_)) => return true,
                Some(Ok(Frame::Heartbeat)) => {}
                Some(Ok(_)) => return false,
            }
        }
    }

    /// Serve the handshake up to `connection.open-ok`.
    pub async fn handshake(&mut self, tuning: Tuning) {
        assert_eq!(
            self.recv().await,
            Frame::ProtocolHeader(ProtocolHeader::AMQP_0_9_1)
        );
        self.send_method(0, start()).await;
        let (_, start_ok) = self.recv_method().await;
        assert_eq!(start_ok.name(), "connection.start-ok");
        self.send_method(
            0,
            connection::Tune {
                channel_max: tuning.channel_max,
                frame_max: tuning.frame_max,
                heartbeat: tuning.heartbeat,
            },
        )
        .await;
        let (_, tune_ok) = self.recv_method().await;
        assert_eq!(tune_ok.name(), "connection.tune-ok");
        let (_, open) = self.recv_method().await;
        assert_eq!(open.name(), "connection.open");
        self.send_method(0, connection::OpenOk::default()).await;
    }

    /// Answer the next `channel.open` and return its channel id.
    pub async fn accept_channel(&mut self) -> u16 {
        let (id, open) = self.recv_method().await;
        assert_eq!(open.name(), "channel.open");
        self.send_method(id, channel::OpenOk::default()).await;
        id
    }

    /// Expect `method` on `channel` and reply with `reply`.
    pub async fn expect_and_reply(&mut self, name: &str, reply: impl Into<Method>) -> Method {
        let (id, method) = self.recv_method().await;
        assert_eq!(method.name(), name);
        self.send_method(id, reply).await;
        method
    }
}

/// Open a client connection against a freshly scripted broker.
pub async fn connected(config: ConnectionConfig, tuning: Tuning) -> (Connection, Broker) {
    let (client, mut broker) = pair();
    let (connection, ()) = tokio::join!(
        Connection::open_with(client, &config),
        broker.handshake(tuning)
    );
    (connection.expect("connection opens"), broker)
}
