//! Connection handle: handshake driver and owner of the background tasks.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::timeout,
};
use tokio_util::{codec::Framed, sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, debug, info, warn};

use super::{
    channel::{Channel, Reply},
    channel_manager::ChannelManager,
    config::ConnectionConfig,
    error::{ClientError, ConnectionError, NegotiationError},
    heartbeat::{Activity, HeartbeatMonitor},
    negotiation::{Negotiated, NegotiationAction, Negotiator},
    reassembly::Reassembler,
    router::Router,
    tracing_config::TracingConfig,
    tracing_helpers::{close_span, connect_span, emit_timing_event, timing_start},
    transport::{FrameSender, Transport, spawn_transport},
};
use crate::{
    codec::AmqpCodec,
    frame::Frame,
    method::{Method, connection},
    metrics::{self, Direction},
};

/// An open AMQP connection.
///
/// Three background tasks serve the connection: the transport task owns
/// the socket, the router dispatches inbound frames to channels and the
/// heartbeat monitor (when negotiated) keeps the link alive. All of them
/// stop when the connection is closed or dropped.
#[derive(Debug)]
pub struct Connection {
    transport: FrameSender,
    manager: Arc<ChannelManager>,
    negotiated: Negotiated,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    tracing: TracingConfig,
}

impl Connection {
    /// Connect over TCP to the configured broker and complete the
    /// handshake.
    ///
    /// ```no_run
    /// use amqp_wire::client::{ClientError, Connection, ConnectionConfig};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), ClientError> {
    /// let config = ConnectionConfig::new("localhost").vhost("/");
    /// let connection = Connection::connect(&config).await?;
    /// let channel = connection.open_channel().await?;
    /// channel.basic_publish("", "jobs", &b"hello"[..], Default::default())?;
    /// drop(channel);
    /// connection.close().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Fails when the socket cannot be opened or the handshake fails.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(config.addr()).await?;
        stream.set_nodelay(true)?;
        Self::open_with(stream, config).await
    }

    /// Complete the handshake over an already connected stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Negotiation`] when the broker rejects the
    /// handshake or it does not finish within the configured timeout, and
    /// I/O or codec errors from the stream.
    pub async fn open_with<S>(stream: S, config: &ConnectionConfig) -> Result<Self, ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let span = connect_span(&config.tracing, &config.addr(), &config.vhost);
        let start = timing_start(config.tracing.connect_timing);
        let result = async {
            let mut framed = Framed::new(stream, AmqpCodec::default());
            let negotiated =
                match timeout(config.negotiation_timeout, negotiate(&mut framed, config)).await {
                    Ok(result) => result,
                    Err(_) => Err(NegotiationError::TimedOut.into()),
                };
            let negotiated = match negotiated {
                Ok(negotiated) => negotiated,
                Err(err) => {
                    warn!(error = %err, "negotiation failed");
                    metrics::inc_errors("negotiation");
                    return Err(err);
                }
            };
            framed.codec_mut().set_frame_max(negotiated.frame_max);
            Ok(Self::start(framed, negotiated, config))
        }
        .instrument(span)
        .await;
        emit_timing_event(start);
        result
    }

    fn start<S>(framed: Framed<S, AmqpCodec>, negotiated: Negotiated, config: &ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let activity = Arc::new(Activity::new());
        let (transport, inbound, _) =
            spawn_transport(framed, Arc::clone(&activity), shutdown.clone(), &tracker);
        let manager = Arc::new(ChannelManager::new(negotiated.channel_max));
        Router::new(
            Arc::clone(&manager),
            Reassembler::new(negotiated.frame_max).with_max_body_size(config.max_message_size),
            transport.clone(),
            inbound,
            shutdown.clone(),
        )
        .spawn(&tracker);
        if let Some(monitor) = HeartbeatMonitor::new(negotiated.heartbeat, activity) {
            monitor.spawn(transport.clone(), shutdown.clone(), &tracker);
        }
        metrics::inc_connections();
        info!(
            channel_max = negotiated.channel_max,
            frame_max = negotiated.frame_max,
            heartbeat = negotiated.heartbeat,
            "connection established"
        );
        Self {
            transport,
            manager,
            negotiated,
            shutdown,
            tracker,
            tracing: config.tracing.clone(),
        }
    }

    /// Parameters agreed during the handshake.
    #[must_use]
    pub fn negotiated(&self) -> &Negotiated { &self.negotiated }

    /// Whether the connection can still carry frames.
    #[must_use]
    pub fn is_open(&self) -> bool { self.transport.is_active() }

    /// Number of channels currently allocated.
    #[must_use]
    pub fn channel_count(&self) -> usize { self.manager.len() }

    /// Allocate the next channel id and open the channel.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MaxChannelsLimitReached`] when every id is
    /// in use, and fails when the connection is closed.
    pub async fn open_channel(&self) -> Result<Channel<'_>, ClientError> {
        if !self.is_open() {
            return Err(ConnectionError::ConnectionIsClosed.into());
        }
        let channel = Channel::new(self, self.manager.allocate()?);
        channel.open().await?;
        Ok(channel)
    }

    /// Close the connection with `connection.close` and wait for the
    /// background tasks to finish. A connection the broker already closed
    /// is shut down without error.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnexpectedReply`] when the broker answers with
    /// something other than `connection.close-ok`.
    pub async fn close(self) -> Result<(), ClientError> {
        let span = close_span(&self.tracing);
        let start = timing_start(self.tracing.close_timing);
        let result = self.send_close().instrument(span.clone()).await;
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        emit_timing_event(start);
        span.in_scope(|| info!("connection closed"));
        result
    }

    async fn send_close(&self) -> Result<(), ClientError> {
        let close = Frame::method(
            0,
            connection::Close {
                reply_code: 200,
                reply_text: "OK".into(),
                ..connection::Close::default()
            },
        );
        let waiter = match self.manager.zero().request(&self.transport, vec![close], true) {
            Ok(waiter) => waiter,
            Err(ConnectionError::ConnectionIsClosed | ConnectionError::ChannelIsClosed) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        match waiter.await.unwrap_or(Err(ConnectionError::ConnectionIsClosed)) {
            Ok(Reply::Method(Method::ConnectionCloseOk(_))) | Err(ConnectionError::ConnectionIsClosed) => Ok(()),
            Ok(other) => Err(ClientError::UnexpectedReply {
                expected: connection::CloseOk::NAME,
                received: other.name(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Resolves once the connection has shut down for any reason.
    pub async fn closed(&self) { self.shutdown.cancelled().await; }

    pub(crate) fn transport(&self) -> &FrameSender { &self.transport }

    pub(crate) fn tracing(&self) -> &TracingConfig { &self.tracing }

    pub(crate) fn release_channel(&self, id: u16) { self.manager.remove(id); }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
        metrics::dec_connections();
    }
}

/// Drive the handshake to completion on `framed`.
async fn negotiate<S>(
    framed: &mut Framed<S, AmqpCodec>,
    config: &ConnectionConfig,
) -> Result<Negotiated, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut negotiator = Negotiator::new(config);
    let mut action = negotiator.start();
    loop {
        match action {
            NegotiationAction::Reply(frames) => write_frames(framed, frames).await?,
            NegotiationAction::Complete(negotiated) => return Ok(negotiated),
            NegotiationAction::Fail { reply, error } => {
                if let Err(err) = write_frames(framed, reply).await {
                    debug!(error = %err, "could not send final handshake reply");
                }
                return Err(error.into());
            }
        }
        let frame = loop {
            let frame = framed
                .next()
                .await
                .ok_or(ConnectionError::ConnectionIsClosed)??;
            metrics::inc_frames(Direction::Inbound);
            if frame != Frame::Heartbeat {
                break frame;
            }
        };
        debug!(
            state = negotiator.state().as_str(),
            kind = frame.kind(),
            "handshake frame"
        );
        action = negotiator.handle(frame);
    }
}

async fn write_frames<S>(framed: &mut Framed<S, AmqpCodec>, frames: Vec<Frame>) -> Result<(), ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for frame in frames {
        framed.feed(frame).await?;
        metrics::inc_frames(Direction::Outbound);
    }
    framed.flush().await?;
    Ok(())
}
