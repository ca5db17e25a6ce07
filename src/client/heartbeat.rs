//! Liveness tracking and heartbeat emission.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, warn};

use super::transport::Transport;
use crate::frame::Frame;

/// Timestamps of the last frame read and written, shared between the
/// transport task and the heartbeat task.
#[derive(Debug)]
pub struct Activity {
    origin: Instant,
    last_inbound: AtomicU64,
    last_outbound: AtomicU64,
}

impl Default for Activity {
    fn default() -> Self { Self::new() }
}

impl Activity {
    /// Start tracking from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_inbound: AtomicU64::new(0),
            last_outbound: AtomicU64::new(0),
        }
    }

    fn now_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Note that a frame was read.
    pub fn record_inbound(&self) { self.last_inbound.store(self.now_millis(), Ordering::Relaxed); }

    /// Note that a frame was written.
    pub fn record_outbound(&self) { self.last_outbound.store(self.now_millis(), Ordering::Relaxed); }

    /// Time since the last frame was read.
    #[must_use]
    pub fn since_inbound(&self) -> Duration { self.since(&self.last_inbound) }

    /// Time since the last frame was written.
    #[must_use]
    pub fn since_outbound(&self) -> Duration { self.since(&self.last_outbound) }

    fn since(&self, stamp: &AtomicU64) -> Duration {
        Duration::from_millis(self.now_millis().saturating_sub(stamp.load(Ordering::Relaxed)))
    }
}

/// Decision taken on each timer tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// Nothing to do.
    Idle,
    /// The link has been quiet outbound; send a heartbeat.
    SendHeartbeat,
    /// The broker has been silent too long; drop the connection.
    Drop,
}

/// Applies the negotiated heartbeat timeout to an [`Activity`].
#[derive(Debug)]
pub struct HeartbeatMonitor {
    activity: Arc<Activity>,
    interval: Duration,
    max_interval: Duration,
}

impl HeartbeatMonitor {
    /// Monitor for a timeout of `timeout_secs`, or `None` when heartbeats
    /// are disabled.
    #[must_use]
    pub fn new(timeout_secs: u16, activity: Arc<Activity>) -> Option<Self> {
        if timeout_secs == 0 {
            return None;
        }
        let max_interval = Duration::from_secs(u64::from(timeout_secs));
        Some(Self {
            activity,
            interval: (max_interval / 2).max(Duration::from_secs(1)),
            max_interval,
        })
    }

    /// Timer period and the outbound silence that triggers a heartbeat.
    #[must_use]
    pub fn interval(&self) -> Duration { self.interval }

    /// Inbound silence that drops the connection.
    #[must_use]
    pub fn max_interval(&self) -> Duration { self.max_interval }

    /// Evaluate the link once.
    #[must_use]
    pub fn tick(&self) -> HeartbeatTick {
        if self.activity.since_inbound() > self.max_interval {
            return HeartbeatTick::Drop;
        }
        if self.activity.since_outbound() >= self.interval {
            self.activity.record_outbound();
            return HeartbeatTick::SendHeartbeat;
        }
        HeartbeatTick::Idle
    }

    /// Run the monitor on a repeating timer until `shutdown` fires, the
    /// transport stops accepting frames, or the broker goes silent.
    pub(crate) fn spawn<T>(
        self,
        transport: T,
        shutdown: CancellationToken,
        tracker: &TaskTracker,
    ) -> JoinHandle<()>
    where
        T: Transport + 'static,
    {
        tracker.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => match self.tick() {
                        HeartbeatTick::Idle => {}
                        HeartbeatTick::SendHeartbeat => {
                            debug!("sending heartbeat");
                            if transport.send(Frame::Heartbeat).is_err() {
                                break;
                            }
                        }
                        HeartbeatTick::Drop => {
                            warn!(
                                timeout_secs = self.max_interval.as_secs(),
                                "broker missed heartbeats; dropping connection"
                            );
                            crate::metrics::inc_errors("heartbeat");
                            transport.close();
                            break;
                        }
                    },
                }
            }
        })
    }
}

#[cfg(test)]
mod tests;
