//! Unit tests for heartbeat timing.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use rstest::rstest;
use tokio::time::sleep;

use super::*;
use crate::client::error::ConnectionError;

#[derive(Clone, Default)]
struct RecordingTransport {
    frames: Arc<Mutex<Vec<Frame>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingTransport {
    fn heartbeats(&self) -> usize {
        self.frames
            .lock()
            .expect("lock")
            .iter()
            .filter(|frame| **frame == Frame::Heartbeat)
            .count()
    }

    fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }
}

impl Transport for RecordingTransport {
    fn send_all(&self, frames: Vec<Frame>) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::ConnectionIsClosed);
        }
        self.frames.lock().expect("lock").extend(frames);
        Ok(())
    }

    fn is_active(&self) -> bool { !self.is_closed() }

    fn close(&self) { self.closed.store(true, Ordering::SeqCst); }
}

#[tokio::test]
async fn zero_timeout_disables_the_monitor() {
    assert!(HeartbeatMonitor::new(0, Arc::new(Activity::new())).is_none());
}

#[rstest]
#[case::typical(60, 30_000)]
#[case::odd(5, 2_500)]
#[case::floor_of_one_second(1, 1_000)]
#[tokio::test]
async fn intervals_derive_from_timeout(#[case] timeout: u16, #[case] interval_ms: u64) {
    let monitor = HeartbeatMonitor::new(timeout, Arc::new(Activity::new())).expect("enabled");
    assert_eq!(monitor.interval(), Duration::from_millis(interval_ms));
    assert_eq!(monitor.max_interval(), Duration::from_secs(u64::from(timeout)));
}

#[tokio::test(start_paused = true)]
async fn tick_sends_after_outbound_silence_and_drops_after_inbound_silence() {
    let activity = Arc::new(Activity::new());
    let monitor = HeartbeatMonitor::new(10, Arc::clone(&activity)).expect("enabled");

    sleep(Duration::from_secs(2)).await;
    assert_eq!(monitor.tick(), HeartbeatTick::Idle);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(monitor.tick(), HeartbeatTick::SendHeartbeat);
    assert_eq!(monitor.tick(), HeartbeatTick::Idle, "send resets the outbound clock");

    activity.record_inbound();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(monitor.tick(), HeartbeatTick::SendHeartbeat);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(monitor.tick(), HeartbeatTick::Drop);
}

#[tokio::test(start_paused = true)]
async fn outbound_writes_postpone_heartbeats() {
    let activity = Arc::new(Activity::new());
    let monitor = HeartbeatMonitor::new(10, Arc::clone(&activity)).expect("enabled");
    sleep(Duration::from_secs(4)).await;
    activity.record_outbound();
    activity.record_inbound();
    sleep(Duration::from_secs(4)).await;
    assert_eq!(monitor.tick(), HeartbeatTick::Idle);
}

#[tokio::test(start_paused = true)]
async fn spawned_monitor_emits_heartbeats_then_closes_silent_link() {
    let activity = Arc::new(Activity::new());
    let transport = RecordingTransport::default();
    let shutdown = CancellationToken::new();
    let monitor = HeartbeatMonitor::new(10, Arc::clone(&activity)).expect("enabled");
    let task = monitor.spawn(transport.clone(), shutdown.clone(), &TaskTracker::new());

    sleep(Duration::from_millis(5_500)).await;
    assert_eq!(transport.heartbeats(), 1);
    activity.record_inbound();

    sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.heartbeats(), 2);
    assert!(!transport.is_closed());

    sleep(Duration::from_secs(10)).await;
    assert!(transport.is_closed(), "silent broker must be dropped");
    assert_eq!(transport.heartbeats(), 3);
    task.await.expect("monitor task");
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_monitor() {
    let transport = RecordingTransport::default();
    let shutdown = CancellationToken::new();
    let monitor = HeartbeatMonitor::new(2, Arc::new(Activity::new())).expect("enabled");
    let task = monitor.spawn(transport.clone(), shutdown.clone(), &TaskTracker::new());
    shutdown.cancel();
    task.await.expect("monitor task");
    sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.heartbeats(), 0);
    assert!(!transport.is_closed());
}
