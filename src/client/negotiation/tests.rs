//! Unit tests for the handshake state machine.

use bytes::Bytes;
use rstest::{fixture, rstest};

use super::*;
use crate::{
    client::config::{Credentials, HeartbeatSetting},
    frame::Frame,
    method::channel,
};

fn start_frame(major: u8, minor: u8, mechanisms: &'static [u8]) -> Frame {
    Frame::method(
        0,
        connection::Start {
            version_major: major,
            version_minor: minor,
            server_properties: Table::new().with("product", "RabbitMQ"),
            mechanisms: Bytes::from_static(mechanisms),
            locales: Bytes::from_static(b"en_US"),
        },
    )
}

fn tune_frame(channel_max: u16, frame_max: u32, heartbeat: u16) -> Frame {
    Frame::method(
        0,
        connection::Tune {
            channel_max,
            frame_max,
            heartbeat,
        },
    )
}

#[fixture]
fn negotiator() -> Negotiator {
    Negotiator::new(
        &ConnectionConfig::default()
            .vhost("orders")
            .channel_max(2047)
            .frame_max(131_072),
    )
}

fn replies(action: NegotiationAction) -> Vec<Frame> {
    match action {
        NegotiationAction::Reply(frames) => frames,
        other => panic!("expected reply, got {other:?}"),
    }
}

fn failure(action: NegotiationAction) -> NegotiationError {
    match action {
        NegotiationAction::Fail { error, .. } => error,
        other => panic!("expected failure, got {other:?}"),
    }
}

#[rstest]
#[case::server_unlimited(0, 100, 100)]
#[case::client_unlimited(100, 0, 100)]
#[case::server_smaller(50, 100, 50)]
#[case::client_smaller(100, 50, 50)]
#[case::both_unlimited(0, 0, 0)]
fn decide_picks_the_tighter_limit(#[case] server: u16, #[case] client: u16, #[case] expected: u16) {
    assert_eq!(decide(server, client), expected);
}

#[rstest]
fn start_emits_the_protocol_header(negotiator: Negotiator) {
    assert_eq!(
        replies(negotiator.start()),
        vec![Frame::ProtocolHeader(ProtocolHeader::AMQP_0_9_1)]
    );
    assert_eq!(negotiator.state(), NegotiationState::WaitingStart);
}

#[rstest]
fn full_handshake_reaches_complete(mut negotiator: Negotiator) {
    let reply = replies(negotiator.handle(start_frame(0, 9, b"AMQPLAIN PLAIN")));
    let [Frame::Method(MethodFrame { channel: 0, method: Method::ConnectionStartOk(start_ok) })] =
        reply.as_slice()
    else {
        panic!("expected start-ok, got {reply:?}");
    };
    assert_eq!(start_ok.mechanism, "PLAIN");
    assert_eq!(&start_ok.response[..], b"\0guest\0guest");
    assert!(start_ok.client_properties.get("capabilities").is_some());
    assert_eq!(negotiator.state(), NegotiationState::WaitingTune);

    let reply = replies(negotiator.handle(tune_frame(100, 131_072, 60)));
    assert_eq!(
        reply,
        vec![
            Frame::method(
                0,
                connection::TuneOk {
                    channel_max: 100,
                    frame_max: 131_072,
                    heartbeat: 60,
                }
            ),
            Frame::method(
                0,
                connection::Open {
                    virtual_host: "orders".into(),
                    ..connection::Open::default()
                }
            ),
        ]
    );
    assert_eq!(negotiator.state(), NegotiationState::WaitingOpenOk);

    let action = negotiator.handle(Frame::method(0, connection::OpenOk::default()));
    let NegotiationAction::Complete(negotiated) = action else {
        panic!("expected completion, got {action:?}");
    };
    assert_eq!(negotiated.channel_max, 100);
    assert_eq!(negotiated.frame_max, 131_072);
    assert_eq!(negotiated.heartbeat, 60);
    assert!(negotiated.server_properties.get("product").is_some());
    assert_eq!(negotiator.state(), NegotiationState::Complete);
}

#[rstest]
fn version_mismatch_is_rejected(mut negotiator: Negotiator) {
    assert_eq!(
        failure(negotiator.handle(start_frame(0, 8, b"PLAIN"))),
        NegotiationError::ProtocolVersionMismatch { major: 0, minor: 8 }
    );
}

#[rstest]
fn protocol_header_reply_means_version_rejected(mut negotiator: Negotiator) {
    let header = ProtocolHeader {
        major: 1,
        minor: 0,
        revision: 0,
    };
    assert!(matches!(
        failure(negotiator.handle(Frame::ProtocolHeader(header))),
        NegotiationError::ProtocolVersionMismatch { major: 1, minor: 0 }
    ));
}

#[test]
fn unsupported_mechanism_is_rejected() {
    let mut negotiator = Negotiator::new(&ConnectionConfig::default());
    let err = failure(negotiator.handle(start_frame(0, 9, b"EXTERNAL AMQPLAIN")));
    assert_eq!(
        err,
        NegotiationError::UnsupportedAuthMechanism {
            mechanism: "PLAIN".into(),
            offered: "EXTERNAL AMQPLAIN".into(),
        }
    );
}

#[test]
fn mechanism_match_is_exact() {
    let config = ConnectionConfig::default().credentials(Credentials::plain("u", "p"));
    let mut negotiator = Negotiator::new(&config);
    assert!(matches!(
        negotiator.handle(start_frame(0, 9, b"PLAINTEXT")),
        NegotiationAction::Fail {
            error: NegotiationError::UnsupportedAuthMechanism { .. },
            ..
        }
    ));
}

#[rstest]
#[case::tune_before_start(tune_frame(0, 0, 0), "connection.tune")]
#[case::open_ok_before_start(Frame::method(0, connection::OpenOk::default()), "connection.open-ok")]
#[case::data_channel(Frame::method(1, channel::OpenOk::default()), "channel.open-ok")]
#[case::heartbeat(Frame::Heartbeat, "heartbeat")]
fn out_of_order_frames_are_unexpected(
    mut negotiator: Negotiator,
    #[case] frame: Frame,
    #[case] received: &str,
) {
    let err = failure(negotiator.handle(frame));
    assert!(
        matches!(err, NegotiationError::UnexpectedMethod { received: r, state } if r == received && state == "waiting for connection.start"),
        "unexpected error {err:?}"
    );
}

#[rstest]
fn broker_close_is_answered_with_close_ok(mut negotiator: Negotiator) {
    let _ = negotiator.handle(start_frame(0, 9, b"PLAIN"));
    let action = negotiator.handle(Frame::method(
        0,
        connection::Close {
            reply_code: 403,
            reply_text: "ACCESS_REFUSED".into(),
            class_id: 10,
            method_id: 11,
        },
    ));
    assert_eq!(
        action,
        NegotiationAction::Fail {
            reply: vec![Frame::method(0, connection::CloseOk {})],
            error: NegotiationError::ClosedByBroker {
                reply_code: 403,
                reply_text: "ACCESS_REFUSED".into(),
            },
        }
    );
}

#[rstest]
fn frames_after_completion_are_unreachable(mut negotiator: Negotiator) {
    let _ = negotiator.handle(start_frame(0, 9, b"PLAIN"));
    let _ = negotiator.handle(tune_frame(0, 0, 0));
    let _ = negotiator.handle(Frame::method(0, connection::OpenOk::default()));
    assert_eq!(
        failure(negotiator.handle(Frame::Heartbeat)),
        NegotiationError::Unreachable
    );
}

#[rstest]
#[case::server_default(HeartbeatSetting::ServerDefault, 60, 60)]
#[case::disabled(HeartbeatSetting::Disabled, 60, 0)]
#[case::client_shorter(HeartbeatSetting::Seconds(10), 60, 10)]
#[case::server_off(HeartbeatSetting::Seconds(10), 0, 10)]
fn heartbeat_follows_client_setting(
    #[case] setting: HeartbeatSetting,
    #[case] server: u16,
    #[case] expected: u16,
) {
    let mut negotiator = Negotiator::new(&ConnectionConfig::default().heartbeat(setting));
    let _ = negotiator.handle(start_frame(0, 9, b"PLAIN"));
    let reply = replies(negotiator.handle(tune_frame(0, 0, server)));
    let Frame::Method(MethodFrame {
        method: Method::ConnectionTuneOk(tune_ok),
        ..
    }) = &reply[0]
    else {
        panic!("expected tune-ok");
    };
    assert_eq!(tune_ok.heartbeat, expected);
    assert_eq!(tune_ok.channel_max, 2047, "server unlimited defers to client");
    assert_eq!(tune_ok.frame_max, 131_072);
}
