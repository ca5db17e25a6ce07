//! Connection handshake state machine.
//!
//! [`Negotiator`] is a pure transition function: it consumes channel-0
//! frames and answers with the frames to send next. Driving the socket is
//! left to [`crate::client::Connection`].

use super::{config::ConnectionConfig, error::NegotiationError};
use crate::{
    codec::Table,
    frame::{Frame, MethodFrame, ProtocolHeader},
    method::{Method, connection},
};

/// Pick a tuning value from the broker's and the client's proposals.
///
/// Zero means "no limit", so a zero on one side yields the other side's
/// value. Otherwise the smaller proposal wins.
///
/// # Examples
///
/// ```
/// use amqp_wire::client::decide;
///
/// assert_eq!(decide(0_u16, 100), 100);
/// assert_eq!(decide(50_u16, 100), 50);
/// assert_eq!(decide(0_u32, 0), 0);
/// ```
#[must_use]
pub fn decide<T: Copy + Ord + Default>(server: T, client: T) -> T {
    let unlimited = T::default();
    if server == unlimited || client == unlimited {
        server.max(client)
    } else {
        server.min(client)
    }
}

/// Handshake progress. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationState {
    /// Protocol header sent, waiting for `connection.start`.
    WaitingStart,
    /// Reserved for SASL challenge rounds; never entered.
    WaitingSecure,
    /// `start-ok` sent, waiting for `connection.tune`.
    WaitingTune,
    /// `tune-ok` and `open` sent, waiting for `connection.open-ok`.
    WaitingOpenOk,
    /// Handshake finished.
    Complete,
}

impl NegotiationState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::WaitingStart => "waiting for connection.start",
            Self::WaitingSecure => "waiting for connection.secure",
            Self::WaitingTune => "waiting for connection.tune",
            Self::WaitingOpenOk => "waiting for connection.open-ok",
            Self::Complete => "complete",
        }
    }
}

/// Parameters agreed with the broker.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Negotiated {
    /// Highest usable channel id; 0 means 65535.
    pub channel_max: u16,
    /// Largest frame either side may send; 0 means unlimited.
    pub frame_max: u32,
    /// Heartbeat timeout in seconds; 0 disables heartbeats.
    pub heartbeat: u16,
    /// Properties from `connection.start`.
    pub server_properties: Table,
}

/// What the driver must do after a transition.
#[derive(Debug, PartialEq)]
pub enum NegotiationAction {
    /// Send these frames and keep reading.
    Reply(Vec<Frame>),
    /// Handshake succeeded.
    Complete(Negotiated),
    /// Send `reply` (possibly empty), then abort with `error`.
    Fail {
        /// Frames owed to the broker before giving up.
        reply: Vec<Frame>,
        /// Why the handshake failed.
        error: NegotiationError,
    },
}

impl NegotiationAction {
    fn fail(error: NegotiationError) -> Self {
        Self::Fail {
            reply: Vec::new(),
            error,
        }
    }
}

/// Client side of the AMQP handshake.
#[derive(Debug)]
pub struct Negotiator {
    state: NegotiationState,
    config: ConnectionConfig,
    negotiated: Negotiated,
}

impl Negotiator {
    /// Create a negotiator for `config`.
    #[must_use]
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            state: NegotiationState::WaitingStart,
            config: config.clone(),
            negotiated: Negotiated::default(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> NegotiationState { self.state }

    /// First action, taken as soon as the transport is connected.
    #[must_use]
    pub fn start(&self) -> NegotiationAction {
        NegotiationAction::Reply(vec![Frame::ProtocolHeader(ProtocolHeader::AMQP_0_9_1)])
    }

    /// Advance on one inbound frame.
    pub fn handle(&mut self, frame: Frame) -> NegotiationAction {
        if self.state == NegotiationState::Complete {
            return NegotiationAction::fail(NegotiationError::Unreachable);
        }
        match frame {
            Frame::ProtocolHeader(header) => {
                NegotiationAction::fail(NegotiationError::ProtocolVersionMismatch {
                    major: header.major,
                    minor: header.minor,
                })
            }
            Frame::Method(MethodFrame { channel: 0, method }) => self.handle_method(method),
            other => self.unexpected(other.kind()),
        }
    }

    fn handle_method(&mut self, method: Method) -> NegotiationAction {
        match (self.state, method) {
            (_, Method::ConnectionClose(close)) => NegotiationAction::Fail {
                reply: vec![Frame::method(0, connection::CloseOk {})],
                error: NegotiationError::ClosedByBroker {
                    reply_code: close.reply_code,
                    reply_text: close.reply_text,
                },
            },
            (NegotiationState::WaitingStart, Method::ConnectionStart(start)) => self.on_start(start),
            (NegotiationState::WaitingTune, Method::ConnectionTune(tune)) => self.on_tune(&tune),
            (NegotiationState::WaitingOpenOk, Method::ConnectionOpenOk(_)) => {
                self.state = NegotiationState::Complete;
                NegotiationAction::Complete(std::mem::take(&mut self.negotiated))
            }
            (_, other) => self.unexpected(other.name()),
        }
    }

    fn on_start(&mut self, start: connection::Start) -> NegotiationAction {
        if (start.version_major, start.version_minor) != (0, 9) {
            return NegotiationAction::fail(NegotiationError::ProtocolVersionMismatch {
                major: start.version_major,
                minor: start.version_minor,
            });
        }
        let mechanism = self.config.credentials.mechanism();
        let offered = String::from_utf8_lossy(&start.mechanisms);
        if !offered.split_ascii_whitespace().any(|m| m == mechanism) {
            return NegotiationAction::fail(NegotiationError::UnsupportedAuthMechanism {
                mechanism: mechanism.to_owned(),
                offered: offered.into_owned(),
            });
        }

        self.negotiated.server_properties = start.server_properties;
        self.state = NegotiationState::WaitingTune;
        NegotiationAction::Reply(vec![Frame::method(
            0,
            connection::StartOk {
                client_properties: self.config.client_properties(),
                mechanism: mechanism.to_owned(),
                response: self.config.credentials.response().clone(),
                locale: self.config.locale.clone(),
            },
        )])
    }

    fn on_tune(&mut self, tune: &connection::Tune) -> NegotiationAction {
        let channel_max = decide(tune.channel_max, self.config.channel_max);
        let frame_max = decide(tune.frame_max, self.config.frame_max);
        let heartbeat = self.config.heartbeat.resolve(tune.heartbeat);
        self.negotiated.channel_max = channel_max;
        self.negotiated.frame_max = frame_max;
        self.negotiated.heartbeat = heartbeat;
        self.state = NegotiationState::WaitingOpenOk;
        NegotiationAction::Reply(vec![
            Frame::method(
                0,
                connection::TuneOk {
                    channel_max,
                    frame_max,
                    heartbeat,
                },
            ),
            Frame::method(
                0,
                connection::Open {
                    virtual_host: self.config.vhost.clone(),
                    ..connection::Open::default()
                },
            ),
        ])
    }

    fn unexpected(&self, received: &'static str) -> NegotiationAction {
        NegotiationAction::fail(NegotiationError::UnexpectedMethod {
            state: self.state.as_str(),
            received,
        })
    }
}

#[cfg(test)]
mod tests;
