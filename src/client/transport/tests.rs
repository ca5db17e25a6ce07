//! Unit tests for the framed transport task.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

use super::*;
use crate::method::channel;

type Peer = Framed<DuplexStream, AmqpCodec>;

fn transport() -> (FrameSender, InboundFrames, JoinHandle<()>, Peer, Arc<Activity>) {
    let (client, broker) = duplex(64 * 1024);
    let activity = Arc::new(Activity::new());
    let (sender, inbound, task) = spawn_transport(
        Framed::new(client, AmqpCodec::default()),
        Arc::clone(&activity),
        CancellationToken::new(),
        &TaskTracker::new(),
    );
    (
        sender,
        inbound,
        task,
        Framed::new(broker, AmqpCodec::default()),
        activity,
    )
}

#[tokio::test]
async fn batches_are_written_in_order() {
    let (sender, _inbound, _task, mut peer, _activity) = transport();
    sender
        .send_all(vec![
            Frame::method(1, channel::Open::default()),
            Frame::method(2, channel::Open::default()),
        ])
        .expect("queue batch");
    sender.send(Frame::Heartbeat).expect("queue heartbeat");

    let mut channels = Vec::new();
    for _ in 0..3 {
        let frame = peer.next().await.expect("frame").expect("decode");
        channels.push((frame.channel(), frame.kind()));
    }
    assert_eq!(
        channels,
        vec![(1, "channel.open"), (2, "channel.open"), (0, "heartbeat")]
    );
}

#[tokio::test(start_paused = true)]
async fn inbound_heartbeats_refresh_activity_but_are_not_forwarded() {
    let (_sender, mut inbound, _task, mut peer, activity) = transport();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(activity.since_inbound(), Duration::from_secs(5));

    peer.send(Frame::Heartbeat).await.expect("send heartbeat");
    peer.send(Frame::method(1, channel::OpenOk::default()))
        .await
        .expect("send open-ok");

    let frame = inbound.recv().await.expect("forwarded").expect("decoded");
    assert_eq!(frame, Frame::method(1, channel::OpenOk::default()));
    assert_eq!(activity.since_inbound(), Duration::ZERO);
}

#[tokio::test]
async fn peer_disconnect_ends_inbound_and_deactivates_sender() {
    let (sender, mut inbound, task, peer, _activity) = transport();
    drop(peer);
    assert!(inbound.recv().await.is_none());
    task.await.expect("transport task");
    assert!(!sender.is_active());
    assert_eq!(
        sender.send(Frame::Heartbeat),
        Err(ConnectionError::ConnectionIsClosed)
    );
}

#[tokio::test]
async fn decode_errors_are_forwarded_last() {
    let (_sender, mut inbound, task, mut peer, _activity) = transport();
    peer.get_mut()
        .write_all(&[9, 0, 0, 0, 0, 0, 0, 0xCE])
        .await
        .expect("write garbage");
    let err = inbound
        .recv()
        .await
        .expect("error item")
        .expect_err("unknown frame type");
    assert!(matches!(
        err,
        CodecError::Framing(crate::codec::FramingError::UnknownFrameType(9))
    ));
    assert!(inbound.recv().await.is_none());
    task.await.expect("transport task");
}

#[tokio::test]
async fn close_flushes_queued_frames() {
    let (sender, _inbound, task, mut peer, _activity) = transport();
    sender
        .send(Frame::method(0, crate::method::connection::CloseOk {}))
        .expect("queue close-ok");
    sender.close();
    task.await.expect("transport task");
    let frame = peer.next().await.expect("frame").expect("decode");
    assert_eq!(frame.kind(), "connection.close-ok");
    assert!(peer.next().await.is_none(), "stream shut down after flush");
}
