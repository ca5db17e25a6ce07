//! Frame transport between the protocol engine and the socket.
//!
//! The engine only sees the [`Transport`] capability. [`spawn_transport`]
//! provides it over any `AsyncRead + AsyncWrite` stream by running one
//! task that owns the framed stream: it writes queued batches and forwards
//! decoded frames to a take-once inbound receiver.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::{codec::Framed, sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, trace};

use super::{error::ConnectionError, heartbeat::Activity};
use crate::{
    codec::{AmqpCodec, CodecError},
    frame::Frame,
    metrics::{self, Direction},
};

const INBOUND_CAPACITY: usize = 256;

/// Outbound side of a connection as seen by channels, the router and the
/// heartbeat monitor.
pub trait Transport: Send + Sync {
    /// Queue one frame.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::ConnectionIsClosed`] once the transport
    /// has shut down.
    fn send(&self, frame: Frame) -> Result<(), ConnectionError> { self.send_all(vec![frame]) }

    /// Queue frames to be written back to back, with no other frame between
    /// them.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::ConnectionIsClosed`] once the transport
    /// has shut down.
    fn send_all(&self, frames: Vec<Frame>) -> Result<(), ConnectionError>;

    /// Whether frames can still be queued.
    fn is_active(&self) -> bool;

    /// Stop the transport. Frames already queued are still written.
    fn close(&self);
}

/// Stream of decoded inbound frames. A codec error is the last item.
pub type InboundFrames = mpsc::Receiver<Result<Frame, CodecError>>;

/// [`Transport`] handle backed by the transport task.
#[derive(Clone, Debug)]
pub struct FrameSender {
    outbound: mpsc::UnboundedSender<Vec<Frame>>,
    shutdown: CancellationToken,
}

impl Transport for FrameSender {
    fn send_all(&self, frames: Vec<Frame>) -> Result<(), ConnectionError> {
        if self.shutdown.is_cancelled() {
            return Err(ConnectionError::ConnectionIsClosed);
        }
        self.outbound
            .send(frames)
            .map_err(|_| ConnectionError::ConnectionIsClosed)
    }

    fn is_active(&self) -> bool { !self.shutdown.is_cancelled() && !self.outbound.is_closed() }

    fn close(&self) { self.shutdown.cancel(); }
}

/// Start the transport task over `framed` on `tracker`.
///
/// Returns the outbound handle, the inbound frame receiver and the task
/// handle. The task ends when `shutdown` fires, the peer closes the stream
/// or a read or write fails; in every case it cancels `shutdown` and drops
/// the inbound sender.
pub fn spawn_transport<S>(
    framed: Framed<S, AmqpCodec>,
    activity: Arc<Activity>,
    shutdown: CancellationToken,
    tracker: &TaskTracker,
) -> (FrameSender, InboundFrames, JoinHandle<()>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
    let sender = FrameSender {
        outbound: outbound_tx,
        shutdown: shutdown.clone(),
    };
    let task = TransportTask {
        framed,
        outbound: outbound_rx,
        inbound: inbound_tx,
        activity,
        shutdown,
    };
    (sender, inbound_rx, tracker.spawn(task.run()))
}

struct TransportTask<S> {
    framed: Framed<S, AmqpCodec>,
    outbound: mpsc::UnboundedReceiver<Vec<Frame>>,
    inbound: mpsc::Sender<Result<Frame, CodecError>>,
    activity: Arc<Activity>,
    shutdown: CancellationToken,
}

impl<S> TransportTask<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,
                batch = self.outbound.recv() => {
                    let Some(batch) = batch else { break };
                    if let Err(err) = self.write_batch(batch).await {
                        error!(error = %err, "failed to write frames");
                        metrics::inc_errors("write");
                        let _ = self.inbound.send(Err(err)).await;
                        break;
                    }
                }
                frame = self.framed.next() => match frame {
                    Some(Ok(frame)) => {
                        self.activity.record_inbound();
                        metrics::inc_frames(Direction::Inbound);
                        if frame == Frame::Heartbeat {
                            trace!("heartbeat received");
                            continue;
                        }
                        if self.inbound.send(Ok(frame)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        error!(error = %err, "failed to read frame");
                        metrics::inc_errors("read");
                        let _ = self.inbound.send(Err(err)).await;
                        break;
                    }
                    None => {
                        debug!("broker closed the stream");
                        break;
                    }
                },
            }
        }

        self.shutdown.cancel();
        while let Ok(batch) = self.outbound.try_recv() {
            if self.write_batch(batch).await.is_err() {
                break;
            }
        }
        if let Err(err) = self.framed.close().await {
            debug!(error = %err, "error while closing the stream");
        }
    }

    async fn write_batch(&mut self, batch: Vec<Frame>) -> Result<(), CodecError> {
        for frame in batch {
            trace!(channel = frame.channel(), kind = frame.kind(), "writing frame");
            self.framed.feed(frame).await?;
            metrics::inc_frames(Direction::Outbound);
        }
        self.framed.flush().await?;
        self.activity.record_outbound();
        Ok(())
    }
}

#[cfg(test)]
mod tests;
