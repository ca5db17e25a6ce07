//! Logical channels multiplexed over one connection.
//!
//! Synchronous methods are correlated with their replies by order alone:
//! each call queues a one-shot waiter and the router resolves the oldest
//! waiter on that channel with the next reply. The waiter is queued and the
//! request sent under the same lock, so queue order always matches wire
//! order.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug};

use super::{
    connection::Connection,
    error::{ClientError, ConnectionError},
    message::{Consumer, DeliveryRx, DeliveryTx, ExchangeType, Message, QueueDeclareResult},
    reassembly::AssembledContent,
    tracing_helpers::{call_span, emit_timing_event, publish_span, timing_start},
    transport::Transport,
};
use crate::{
    codec::{MAX_FRAME_LENGTH, Table, frame_ceiling},
    frame::{BasicProperties, FRAME_OVERHEAD, Frame},
    method::{Method, basic, channel, exchange, queue, tx},
    metrics,
};

/// What the router hands a waiting call.
#[derive(Debug)]
pub(crate) enum Reply {
    Method(Method),
    Content(AssembledContent),
}

impl Reply {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Method(method) => method.name(),
            Self::Content(content) => content.method.name(),
        }
    }
}

type Waiter = oneshot::Sender<Result<Reply, ConnectionError>>;

/// Match a reply against the `-ok` method a call expects.
macro_rules! expect_reply {
    ($reply:expr, $variant:ident, $ty:ty) => {
        match $reply {
            Reply::Method(Method::$variant(ok)) => Ok(ok),
            other => Err(ClientError::UnexpectedReply {
                expected: <$ty>::NAME,
                received: other.name(),
            }),
        }
    };
}

#[derive(Debug)]
struct ChannelState {
    open: bool,
    detached: bool,
    pending: VecDeque<Waiter>,
    deliveries: Option<DeliveryTx>,
    consumer: Option<DeliveryRx>,
}

impl ChannelState {
    fn new(open: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            open,
            detached: false,
            pending: VecDeque::new(),
            deliveries: Some(tx),
            consumer: Some(rx),
        }
    }
}

/// Shared channel state, owned by the channel manager and reached by both
/// the application handle and the router.
#[derive(Debug)]
pub(crate) struct ChannelInner {
    id: u16,
    state: Mutex<ChannelState>,
}

impl ChannelInner {
    pub(crate) fn new(id: u16, open: bool) -> Self {
        Self {
            id,
            state: Mutex::new(ChannelState::new(open)),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn id(&self) -> u16 { self.id }

    pub(crate) fn is_open(&self) -> bool { self.state().open }

    pub(crate) fn is_detached(&self) -> bool { self.state().detached }

    /// Send `frames` and queue a waiter for the reply.
    pub(crate) fn request(
        &self,
        transport: &dyn Transport,
        frames: Vec<Frame>,
        require_open: bool,
    ) -> Result<oneshot::Receiver<Result<Reply, ConnectionError>>, ConnectionError> {
        let mut state = self.state();
        if require_open && !state.open {
            return Err(ConnectionError::ChannelIsClosed);
        }
        let (tx, rx) = oneshot::channel();
        transport.send_all(frames)?;
        state.pending.push_back(tx);
        Ok(rx)
    }

    /// Send `frames` that expect no reply.
    pub(crate) fn send(&self, transport: &dyn Transport, frames: Vec<Frame>) -> Result<(), ConnectionError> {
        let state = self.state();
        if !state.open {
            return Err(ConnectionError::ChannelIsClosed);
        }
        transport.send_all(frames)
    }

    /// Resolve the oldest waiter. Gives the reply back when nobody waits.
    pub(crate) fn resolve(&self, reply: Reply) -> Result<(), Reply> {
        let Some(waiter) = self.state().pending.pop_front() else {
            return Err(reply);
        };
        // A dropped receiver means the caller gave up; the reply is still
        // consumed so later waiters stay aligned.
        let _ = waiter.send(Ok(reply));
        Ok(())
    }

    pub(crate) fn deliver(&self, message: Message) {
        if let Some(deliveries) = &self.state().deliveries {
            let _ = deliveries.send(Ok(message));
        }
    }

    /// End the delivery stream without an error.
    pub(crate) fn end_deliveries(&self) { self.state().deliveries = None; }

    pub(crate) fn take_consumer(&self) -> Result<DeliveryRx, ConnectionError> {
        self.state()
            .consumer
            .take()
            .ok_or(ConnectionError::ConsumerAlreadyTaken)
    }

    fn restore_consumer(&self, deliveries: DeliveryRx) {
        self.state().consumer.get_or_insert(deliveries);
    }

    pub(crate) fn mark_open(&self) {
        let mut state = self.state();
        if state.deliveries.is_none() {
            *state = ChannelState::new(true);
        }
        if !state.open && self.id != 0 {
            metrics::inc_channels();
        }
        state.open = true;
    }

    fn mark_closed(&self, state: &mut ChannelState) {
        if state.open && self.id != 0 {
            metrics::dec_channels();
        }
        state.open = false;
    }

    /// Mark the channel closed, failing waiters and ending the delivery
    /// stream with `error`, or ending it quietly when `error` is `None`.
    pub(crate) fn shut(&self, error: Option<ConnectionError>) {
        let mut state = self.state();
        self.mark_closed(&mut state);
        let failure = error.clone().unwrap_or(ConnectionError::ChannelIsClosed);
        for waiter in state.pending.drain(..) {
            let _ = waiter.send(Err(failure.clone()));
        }
        if let (Some(deliveries), Some(error)) = (state.deliveries.take(), error) {
            let _ = deliveries.send(Err(error));
        }
    }

    /// Mark a dropped handle whose `channel.close` is still in flight.
    pub(crate) fn detach(&self) {
        let mut state = self.state();
        self.mark_closed(&mut state);
        state.detached = true;
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize { self.state().pending.len() }
}

/// A channel borrowed from its [`Connection`].
///
/// Dropping the handle closes the channel on the broker (if still open) and
/// returns its id to the allocator.
///
/// Names longer than a short string allows, or frames above the negotiated
/// `frame_max`, fail the one call with [`ClientError::InvalidArgument`];
/// the channel and connection stay usable.
#[derive(Debug)]
pub struct Channel<'a> {
    connection: &'a Connection,
    inner: Arc<ChannelInner>,
}

impl<'a> Channel<'a> {
    pub(crate) fn new(connection: &'a Connection, inner: Arc<ChannelInner>) -> Self {
        Self { connection, inner }
    }

    /// Channel id.
    #[must_use]
    pub fn id(&self) -> u16 { self.inner.id() }

    /// Whether the channel accepts operations.
    #[must_use]
    pub fn is_open(&self) -> bool { self.inner.is_open() && self.connection.is_open() }

    fn frame(&self, method: impl Into<Method>) -> Frame { Frame::method(self.id(), method) }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        if self.connection.is_open() {
            Ok(())
        } else {
            Err(ConnectionError::ConnectionIsClosed.into())
        }
    }

    /// Reject frames the transport could not write, so a bad argument fails
    /// only this call and nothing reaches the wire.
    fn check_frames(&self, frames: &[Frame]) -> Result<(), ClientError> {
        let ceiling = frame_ceiling(self.connection.negotiated().frame_max);
        frames
            .iter()
            .try_for_each(|frame| frame.validate(ceiling))
            .map_err(|err| ClientError::InvalidArgument(err.to_string()))
    }

    async fn call_with(&self, method: Method, require_open: bool) -> Result<Reply, ClientError> {
        self.ensure_connected()?;
        let name = method.name();
        let frames = vec![self.frame(method)];
        self.check_frames(&frames)?;
        let tracing = self.connection.tracing();
        let span = call_span(tracing, self.id(), name);
        let start = timing_start(tracing.call_timing);
        let result = async {
            let waiter =
                self.inner
                    .request(self.connection.transport(), frames, require_open)?;
            let reply = waiter
                .await
                .unwrap_or(Err(ConnectionError::ConnectionIsClosed))?;
            Ok::<_, ClientError>(reply)
        }
        .instrument(span.clone())
        .await;
        span.record("result", if result.is_ok() { "ok" } else { "error" });
        emit_timing_event(start);
        result
    }

    async fn call(&self, method: impl Into<Method>) -> Result<Reply, ClientError> {
        self.call_with(method.into(), true).await
    }

    fn send(&self, method: impl Into<Method>) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let frames = vec![self.frame(method)];
        self.check_frames(&frames)?;
        self.inner.send(self.connection.transport(), frames)?;
        Ok(())
    }

    /// Open the channel, or reopen it after a close. Does nothing when the
    /// channel is already open.
    ///
    /// # Errors
    ///
    /// Fails when the connection is closed or the broker refuses.
    pub async fn open(&self) -> Result<(), ClientError> {
        if self.inner.is_open() {
            return Ok(());
        }
        let reply = self.call_with(channel::Open::default().into(), false).await?;
        expect_reply!(reply, ChannelOpenOk, channel::OpenOk)?;
        self.inner.mark_open();
        debug!(channel = self.id(), "channel opened");
        Ok(())
    }

    /// Close the channel. The handle can be reopened with [`Channel::open`].
    /// Closing a closed channel does nothing.
    ///
    /// # Errors
    ///
    /// Fails when the connection is closed.
    pub async fn close(&self, reply_code: u16, reply_text: &str) -> Result<(), ClientError> {
        let result = self
            .call(channel::Close {
                reply_code,
                reply_text: reply_text.to_owned(),
                ..channel::Close::default()
            })
            .await;
        let reply = match result {
            Ok(reply) => reply,
            // Closed already, possibly by the broker while our close was in
            // flight.
            Err(ClientError::Connection(ConnectionError::ChannelIsClosed)) => return Ok(()),
            Err(err) => return Err(err),
        };
        expect_reply!(reply, ChannelCloseOk, channel::CloseOk)?;
        self.inner.shut(None);
        debug!(channel = self.id(), "channel closed");
        Ok(())
    }

    /// Limit unacknowledged deliveries.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`] when `prefetch_size` exceeds
    /// `i32::MAX`, and fails when the channel or connection is closed.
    pub async fn basic_qos(
        &self,
        prefetch_size: u32,
        prefetch_count: u16,
        global: bool,
    ) -> Result<(), ClientError> {
        if i32::try_from(prefetch_size).is_err() {
            return Err(ClientError::InvalidArgument(format!(
                "prefetch_size {prefetch_size} exceeds {}",
                i32::MAX
            )));
        }
        let reply = self
            .call(basic::Qos {
                prefetch_size,
                prefetch_count,
                global,
            })
            .await?;
        expect_reply!(reply, BasicQosOk, basic::QosOk)?;
        Ok(())
    }

    /// Declare a durable exchange.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed, or the broker closes
    /// the channel because the exchange exists with different settings.
    pub async fn exchange_declare(&self, name: &str, kind: ExchangeType) -> Result<(), ClientError> {
        let reply = self
            .call(exchange::Declare {
                exchange: name.to_owned(),
                kind: kind.as_str().to_owned(),
                durable: true,
                ..exchange::Declare::default()
            })
            .await?;
        expect_reply!(reply, ExchangeDeclareOk, exchange::DeclareOk)?;
        Ok(())
    }

    /// Delete an exchange.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub async fn exchange_delete(&self, name: &str, if_unused: bool) -> Result<(), ClientError> {
        let reply = self
            .call(exchange::Delete {
                exchange: name.to_owned(),
                if_unused,
                ..exchange::Delete::default()
            })
            .await?;
        expect_reply!(reply, ExchangeDeleteOk, exchange::DeleteOk)?;
        Ok(())
    }

    /// Declare a durable queue. An empty name asks the broker to generate
    /// one.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub async fn queue_declare(&self, name: &str) -> Result<QueueDeclareResult, ClientError> {
        let reply = self
            .call(queue::Declare {
                queue: name.to_owned(),
                durable: true,
                ..queue::Declare::default()
            })
            .await?;
        let ok = expect_reply!(reply, QueueDeclareOk, queue::DeclareOk)?;
        Ok(QueueDeclareResult {
            queue: ok.queue,
            message_count: ok.message_count,
            consumer_count: ok.consumer_count,
        })
    }

    fn bind_method(
        queue: &str,
        exchange: &str,
        routing_key: Option<&str>,
        arguments: Table,
        no_wait: bool,
    ) -> queue::Bind {
        queue::Bind {
            queue: queue.to_owned(),
            exchange: exchange.to_owned(),
            routing_key: routing_key.unwrap_or(queue).to_owned(),
            no_wait,
            arguments,
            ..queue::Bind::default()
        }
    }

    /// Bind `queue` to `exchange` and wait for confirmation. Without a
    /// routing key the queue name is used.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: Option<&str>,
        arguments: Table,
    ) -> Result<(), ClientError> {
        let reply = self
            .call(Self::bind_method(queue, exchange, routing_key, arguments, false))
            .await?;
        expect_reply!(reply, QueueBindOk, queue::BindOk)?;
        Ok(())
    }

    /// Bind without waiting; the broker closes the channel if binding
    /// fails.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub fn queue_bind_no_wait(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: Option<&str>,
        arguments: Table,
    ) -> Result<(), ClientError> {
        self.send(Self::bind_method(queue, exchange, routing_key, arguments, true))
    }

    /// Remove a binding.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub async fn queue_unbind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: Table,
    ) -> Result<(), ClientError> {
        let reply = self
            .call(queue::Unbind {
                queue: queue.to_owned(),
                exchange: exchange.to_owned(),
                routing_key: routing_key.to_owned(),
                arguments,
                ..queue::Unbind::default()
            })
            .await?;
        expect_reply!(reply, QueueUnbindOk, queue::UnbindOk)?;
        Ok(())
    }

    /// Drop every ready message in `queue`, returning how many were purged.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub async fn queue_purge(&self, queue: &str) -> Result<u32, ClientError> {
        let reply = self
            .call(queue::Purge {
                queue: queue.to_owned(),
                ..queue::Purge::default()
            })
            .await?;
        Ok(expect_reply!(reply, QueuePurgeOk, queue::PurgeOk)?.message_count)
    }

    /// Delete `queue`, returning how many messages it held.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub async fn queue_delete(&self, queue: &str, if_unused: bool, if_empty: bool) -> Result<u32, ClientError> {
        let reply = self
            .call(queue::Delete {
                queue: queue.to_owned(),
                if_unused,
                if_empty,
                ..queue::Delete::default()
            })
            .await?;
        Ok(expect_reply!(reply, QueueDeleteOk, queue::DeleteOk)?.message_count)
    }

    /// Publish `body`, split into body frames that fit the negotiated frame
    /// size. Method, header and body frames are queued as one batch, so
    /// publishes from concurrent tasks never interleave on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`] when the exchange, routing
    /// key or a property does not fit its wire field, and fails when the
    /// channel or connection is closed. Nothing is sent on error.
    pub fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: impl Into<Bytes>,
        properties: BasicProperties,
    ) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let body = body.into();
        let tracing = self.connection.tracing();
        let span = publish_span(tracing, self.id(), body.len());
        let start = timing_start(tracing.publish_timing);
        let frames = publish_frames(
            self.id(),
            exchange,
            routing_key,
            body,
            properties,
            self.connection.negotiated().frame_max,
        );
        span.record("frames", frames.len());
        let result = span.in_scope(|| {
            self.check_frames(&frames)?;
            self.inner
                .send(self.connection.transport(), frames)
                .map_err(ClientError::from)
        });
        emit_timing_event(start);
        result?;
        metrics::inc_published();
        Ok(())
    }

    /// Start consuming `queue` and return the channel's delivery stream.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::ConsumerAlreadyTaken`] when the stream was
    /// handed out before, and fails when the channel or connection is
    /// closed.
    pub async fn basic_consume(&self, queue: &str, consumer_tag: &str) -> Result<Consumer, ClientError> {
        let deliveries = self.inner.take_consumer()?;
        let result = self
            .call(basic::Consume {
                queue: queue.to_owned(),
                consumer_tag: consumer_tag.to_owned(),
                ..basic::Consume::default()
            })
            .await
            .and_then(|reply| expect_reply!(reply, BasicConsumeOk, basic::ConsumeOk));
        match result {
            Ok(ok) => Ok(Consumer::new(self.id(), ok.consumer_tag, deliveries)),
            Err(err) => {
                self.inner.restore_consumer(deliveries);
                Err(err)
            }
        }
    }

    /// Cancel a consumer. Its stream ends once the broker confirms.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub async fn basic_cancel(&self, consumer_tag: &str) -> Result<(), ClientError> {
        let reply = self
            .call(basic::Cancel {
                consumer_tag: consumer_tag.to_owned(),
                no_wait: false,
            })
            .await?;
        expect_reply!(reply, BasicCancelOk, basic::CancelOk)?;
        self.inner.end_deliveries();
        Ok(())
    }

    /// Fetch one message from `queue`, or `None` when it is empty.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub async fn basic_get(&self, queue: &str, no_ack: bool) -> Result<Option<Message>, ClientError> {
        let reply = self
            .call(basic::Get {
                queue: queue.to_owned(),
                no_ack,
                ..basic::Get::default()
            })
            .await?;
        match reply {
            Reply::Method(Method::BasicGetEmpty(_)) => Ok(None),
            Reply::Content(content) => {
                let received = content.method.name();
                Message::from_content(content)
                    .map(Some)
                    .ok_or(ClientError::UnexpectedReply {
                        expected: basic::GetOk::NAME,
                        received,
                    })
            }
            other => Err(ClientError::UnexpectedReply {
                expected: basic::GetOk::NAME,
                received: other.name(),
            }),
        }
    }

    /// Acknowledge one delivery, or every delivery up to it.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub fn basic_ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), ClientError> {
        self.send(basic::Ack {
            delivery_tag,
            multiple,
        })
    }

    /// Reject one delivery, or every delivery up to it.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub fn basic_nack(&self, delivery_tag: u64, multiple: bool, requeue: bool) -> Result<(), ClientError> {
        self.send(basic::Nack {
            delivery_tag,
            multiple,
            requeue,
        })
    }

    /// Reject a single delivery.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub fn basic_reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), ClientError> {
        self.send(basic::Reject {
            delivery_tag,
            requeue,
        })
    }

    /// Put the channel in transactional mode.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub async fn tx_select(&self) -> Result<(), ClientError> {
        let reply = self.call(tx::Select {}).await?;
        expect_reply!(reply, TxSelectOk, tx::SelectOk)?;
        Ok(())
    }

    /// Commit the current transaction.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub async fn tx_commit(&self) -> Result<(), ClientError> {
        let reply = self.call(tx::Commit {}).await?;
        expect_reply!(reply, TxCommitOk, tx::CommitOk)?;
        Ok(())
    }

    /// Abandon the current transaction.
    ///
    /// # Errors
    ///
    /// Fails when the channel or connection is closed.
    pub async fn tx_rollback(&self) -> Result<(), ClientError> {
        let reply = self.call(tx::Rollback {}).await?;
        expect_reply!(reply, TxRollbackOk, tx::RollbackOk)?;
        Ok(())
    }
}

impl Drop for Channel<'_> {
    fn drop(&mut self) {
        let id = self.id();
        if self.inner.is_open() {
            // The id returns to the allocator once the broker confirms.
            self.inner.detach();
            let close = channel::Close {
                reply_code: 200,
                reply_text: "OK".into(),
                ..channel::Close::default()
            };
            if self.connection.transport().send(Frame::method(id, close)).is_ok() {
                return;
            }
        }
        self.connection.release_channel(id);
    }
}

/// Frames for one publish: method, content header and body fragments no
/// larger than `frame_max - 8` bytes. `frame_max == 0` falls back to the
/// codec's hard ceiling.
pub(crate) fn publish_frames(
    channel: u16,
    exchange: &str,
    routing_key: &str,
    body: Bytes,
    properties: BasicProperties,
    frame_max: u32,
) -> Vec<Frame> {
    let body_size = body.len() as u64;
    let mut frames = vec![
        Frame::method(
            channel,
            basic::Publish {
                exchange: exchange.to_owned(),
                routing_key: routing_key.to_owned(),
                ..basic::Publish::default()
            },
        ),
        Frame::content_header(channel, body_size, properties),
    ];
    let frame_limit = match usize::try_from(frame_max) {
        Ok(0) | Err(_) => MAX_FRAME_LENGTH,
        Ok(max) => max.min(MAX_FRAME_LENGTH),
    };
    let max_fragment = frame_limit.saturating_sub(FRAME_OVERHEAD).max(1);
    let mut rest = body;
    while !rest.is_empty() {
        let fragment = rest.split_to(rest.len().min(max_fragment));
        frames.push(Frame::content_body(channel, fragment));
    }
    frames
}
