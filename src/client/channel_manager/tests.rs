//! Unit tests for the channel registry.

use rstest::{fixture, rstest};

use super::*;
use crate::{
    client::{channel::Reply, transport::Transport},
    frame::Frame,
    method::{Method, channel},
};

struct NullTransport;

impl Transport for NullTransport {
    fn send_all(&self, _frames: Vec<Frame>) -> Result<(), ConnectionError> { Ok(()) }

    fn is_active(&self) -> bool { true }

    fn close(&self) {}
}

#[fixture]
fn manager() -> ChannelManager { ChannelManager::new(3) }

#[rstest]
fn allocates_sequential_ids_and_registers_them(manager: ChannelManager) {
    let ids: Vec<u16> = (0..3)
        .map(|_| manager.allocate().expect("allocate").id())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(manager.len(), 3);
    assert!(matches!(
        manager.allocate(),
        Err(ConnectionError::MaxChannelsLimitReached)
    ));
    assert_eq!(manager.get(2).expect("registered").id(), 2);
}

#[rstest]
fn channel_zero_is_always_present(manager: ChannelManager) {
    let zero = manager.get(0).expect("channel 0");
    assert!(Arc::ptr_eq(&zero, manager.zero()));
    assert!(zero.is_open());
    assert!(manager.get(1).is_none());
}

#[rstest]
fn removed_ids_are_reused(manager: ChannelManager) {
    for _ in 0..3 {
        manager.allocate().expect("allocate");
    }
    manager.remove(2);
    assert!(manager.get(2).is_none());
    assert_eq!(manager.allocate().expect("reuse").id(), 2);
}

#[rstest]
fn removing_unknown_ids_is_harmless(manager: ChannelManager) {
    manager.remove(7);
    manager.remove(0);
    assert_eq!(manager.allocate().expect("allocate").id(), 1);
}

#[rstest]
#[tokio::test]
async fn fail_all_reaches_waiters_and_consumers(manager: ChannelManager) {
    let inner = manager.allocate().expect("allocate");
    let open = inner
        .request(&NullTransport, vec![Frame::method(1, channel::Open::default())], false)
        .expect("request");
    inner
        .resolve(Reply::Method(Method::ChannelOpenOk(channel::OpenOk::default())))
        .expect("waiter");
    open.await.expect("resolved").expect("open-ok");

    let pending = inner
        .request(&NullTransport, vec![Frame::method(1, channel::Flow { active: true })], false)
        .expect("request");
    let zero_pending = manager
        .zero()
        .request(&NullTransport, vec![Frame::Heartbeat], true)
        .expect("request on channel 0");

    manager.fail_all(&ConnectionError::ConnectionIsClosed);

    assert_eq!(
        pending.await.expect("failed waiter").expect_err("closed"),
        ConnectionError::ConnectionIsClosed
    );
    assert_eq!(
        zero_pending.await.expect("failed waiter").expect_err("closed"),
        ConnectionError::ConnectionIsClosed
    );
    assert!(!inner.is_open());
    assert!(!manager.zero().is_open());
}
