//! Unit tests for content reassembly.

use bytes::Bytes;
use rstest::{fixture, rstest};

use super::*;
use crate::method::{basic, channel};

fn deliver(channel: u16, delivery_tag: u64) -> Frame {
    Frame::method(
        channel,
        basic::Deliver {
            consumer_tag: "ctag".into(),
            delivery_tag,
            exchange: "ex".into(),
            routing_key: "rk".into(),
            ..basic::Deliver::default()
        },
    )
}

fn header(channel: u16, body_size: u64) -> Frame {
    Frame::content_header(
        channel,
        body_size,
        BasicProperties::default().with_content_type("text/plain"),
    )
}

fn body(channel: u16, fragment: &'static [u8]) -> Frame {
    Frame::content_body(channel, Bytes::from_static(fragment))
}

#[fixture]
fn reassembler() -> Reassembler { Reassembler::new(131_072) }

fn content(routed: Routed) -> AssembledContent {
    match routed {
        Routed::Content(content) => content,
        other => panic!("expected content, got {other:?}"),
    }
}

#[rstest]
fn split_body_completes_after_last_fragment(mut reassembler: Reassembler) {
    assert_eq!(reassembler.push(deliver(1, 7)), Ok(Routed::Incomplete));
    assert_eq!(reassembler.push(header(1, 10)), Ok(Routed::Incomplete));
    assert_eq!(reassembler.push(body(1, b"hello ")), Ok(Routed::Incomplete));
    assert!(reassembler.is_assembling(1));

    let message = content(reassembler.push(body(1, b"amqp")).expect("complete"));
    assert_eq!(message.channel, 1);
    assert_eq!(message.body.len(), 10);
    assert_eq!(&message.body[..], b"hello amqp");
    assert_eq!(message.properties.content_type.as_deref(), Some("text/plain"));
    assert!(matches!(message.method, Method::BasicDeliver(ref d) if d.delivery_tag == 7));
    assert!(!reassembler.is_assembling(1));
}

#[rstest]
fn zero_length_body_completes_at_header(mut reassembler: Reassembler) {
    reassembler.push(deliver(2, 1)).expect("deliver");
    let message = content(reassembler.push(header(2, 0)).expect("header"));
    assert!(message.body.is_empty());
}

#[rstest]
fn get_ok_and_return_carry_content(mut reassembler: Reassembler) {
    reassembler
        .push(Frame::method(3, basic::GetOk::default()))
        .expect("get-ok");
    reassembler.push(header(3, 1)).expect("header");
    let message = content(reassembler.push(body(3, b"x")).expect("body"));
    assert!(matches!(message.method, Method::BasicGetOk(_)));

    reassembler
        .push(Frame::method(3, basic::Return::default()))
        .expect("return");
    reassembler.push(header(3, 0)).map(content).expect("header");
}

#[rstest]
fn channels_assemble_independently(mut reassembler: Reassembler) {
    reassembler.push(deliver(1, 1)).expect("deliver 1");
    reassembler.push(deliver(2, 2)).expect("deliver 2");
    reassembler.push(header(2, 3)).expect("header 2");
    reassembler.push(header(1, 3)).expect("header 1");
    reassembler.push(body(1, b"one")).map(content).expect("body 1");
    let second = content(reassembler.push(body(2, b"two")).expect("body 2"));
    assert_eq!(&second.body[..], b"two");
}

#[rstest]
fn plain_methods_pass_through(mut reassembler: Reassembler) {
    let frame = Frame::method(1, channel::OpenOk::default());
    let Frame::Method(expected) = frame.clone() else {
        unreachable!()
    };
    assert_eq!(reassembler.push(frame), Ok(Routed::Method(expected)));
    assert_eq!(
        reassembler.push(Frame::Heartbeat),
        Ok(Routed::Passthrough(Frame::Heartbeat))
    );
}

#[rstest]
#[case::header_without_method(header(1, 4), "content-header")]
#[case::body_without_method(body(1, b"x"), "content-body")]
fn stray_content_is_rejected(
    mut reassembler: Reassembler,
    #[case] frame: Frame,
    #[case] kind: &str,
) {
    assert!(matches!(
        reassembler.push(frame),
        Err(ReassemblyError::UnexpectedContent { channel: 1, kind: k }) if k == kind
    ));
}

#[rstest]
fn body_before_header_is_rejected(mut reassembler: Reassembler) {
    reassembler.push(deliver(1, 1)).expect("deliver");
    assert!(matches!(
        reassembler.push(body(1, b"early")),
        Err(ReassemblyError::UnexpectedContent { .. })
    ));
}

#[rstest]
#[case::deliver(deliver(0, 1))]
#[case::body(body(0, b"x"))]
fn channel_zero_never_carries_content(mut reassembler: Reassembler, #[case] frame: Frame) {
    assert_eq!(
        reassembler.push(frame),
        Err(ReassemblyError::ContentOnChannelZero)
    );
}

#[rstest]
fn method_during_content_is_interleaving(mut reassembler: Reassembler) {
    reassembler.push(deliver(1, 1)).expect("deliver");
    reassembler.push(header(1, 5)).expect("header");
    assert_eq!(
        reassembler.push(deliver(1, 2)),
        Err(ReassemblyError::InterleavedMethod {
            channel: 1,
            method: "basic.deliver",
        })
    );
}

#[rstest]
fn body_longer_than_declared_overflows(mut reassembler: Reassembler) {
    reassembler.push(deliver(1, 1)).expect("deliver");
    reassembler.push(header(1, 4)).expect("header");
    reassembler.push(body(1, b"ab")).expect("first fragment");
    assert_eq!(
        reassembler.push(body(1, b"cde")),
        Err(ReassemblyError::BodyOverflow {
            channel: 1,
            expected: 4,
            actual: 5,
        })
    );
}

#[test]
fn fragment_beyond_frame_max_is_rejected() {
    let mut reassembler = Reassembler::new(16);
    reassembler.push(deliver(1, 1)).expect("deliver");
    reassembler.push(header(1, 100)).expect("header");
    assert_eq!(
        reassembler.push(Frame::content_body(1, Bytes::from(vec![0_u8; 9]))),
        Err(ReassemblyError::FrameSizeLimitExceeded { max: 16, actual: 17 })
    );
}

#[test]
fn unlimited_frame_max_skips_the_size_check() {
    let mut reassembler = Reassembler::new(0);
    reassembler.push(deliver(1, 1)).expect("deliver");
    reassembler.push(header(1, 200_000)).expect("header");
    let message = content(
        reassembler
            .push(Frame::content_body(1, Bytes::from(vec![1_u8; 200_000])))
            .expect("large fragment"),
    );
    assert_eq!(message.body.len(), 200_000);
}

#[rstest]
fn discard_forgets_partial_content(mut reassembler: Reassembler) {
    reassembler.push(deliver(4, 1)).expect("deliver");
    reassembler.discard(4);
    assert!(!reassembler.is_assembling(4));
    assert!(matches!(
        reassembler.push(header(4, 1)),
        Err(ReassemblyError::UnexpectedContent { .. })
    ));
}

#[rstest]
#[case::at_the_limit(64, true)]
#[case::above_the_limit(65, false)]
fn declared_body_size_is_capped(#[case] size: u64, #[case] accepted: bool) {
    let mut reassembler = Reassembler::new(4096).with_max_body_size(64);
    reassembler.push(deliver(2, 1)).expect("deliver");
    let result = reassembler.push(header(2, size));
    if accepted {
        assert_eq!(result, Ok(Routed::Incomplete));
    } else {
        assert_eq!(
            result,
            Err(ReassemblyError::MessageTooLarge {
                channel: 2,
                size: 65,
                max: 64,
            })
        );
    }
}

#[test]
fn default_limit_rejects_absurd_declarations() {
    let mut reassembler = Reassembler::new(0);
    reassembler.push(deliver(1, 1)).expect("deliver");
    assert!(matches!(
        reassembler.push(header(1, u64::MAX)),
        Err(ReassemblyError::MessageTooLarge { max: DEFAULT_MAX_MESSAGE_SIZE, .. })
    ));
}
