//! Inbound dispatch: routes every decoded frame to the channel it belongs to.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use super::{
    channel::{ChannelInner, Reply},
    channel_manager::ChannelManager,
    error::ConnectionError,
    message::Message,
    reassembly::{AssembledContent, Reassembler, ReassemblyError, Routed},
    transport::{FrameSender, InboundFrames, Transport},
};
use crate::{
    codec::{CodecError, FramingError},
    frame::{Frame, MethodFrame},
    method::{Method, basic, channel, connection},
    metrics,
};

/// Reply codes that mean an orderly close.
const NORMAL_CLOSE: [u16; 2] = [0, 200];

pub(crate) struct Router {
    manager: Arc<ChannelManager>,
    reassembler: Reassembler,
    transport: FrameSender,
    inbound: InboundFrames,
    shutdown: CancellationToken,
}

impl Router {
    pub(crate) fn new(
        manager: Arc<ChannelManager>,
        reassembler: Reassembler,
        transport: FrameSender,
        inbound: InboundFrames,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            manager,
            reassembler,
            transport,
            inbound,
            shutdown,
        }
    }

    pub(crate) fn spawn(self, tracker: &TaskTracker) -> JoinHandle<()> { tracker.spawn(self.run()) }

    async fn run(mut self) {
        let failure = loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break ConnectionError::ConnectionIsClosed,
                frame = self.inbound.recv() => match frame {
                    Some(Ok(frame)) => {
                        if let Err(err) = self.route(frame) {
                            break err;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "inbound stream failed");
                        break match err {
                            CodecError::Framing(FramingError::OversizedFrame { size, max }) => {
                                ConnectionError::FrameSizeLimitExceeded {
                                    max: u32::try_from(max).unwrap_or(u32::MAX),
                                    actual: size,
                                }
                            }
                            _ => ConnectionError::ConnectionIsClosed,
                        };
                    }
                    None => break ConnectionError::ConnectionIsClosed,
                },
            }
        };
        debug!(error = %failure, "router stopped");
        self.manager.fail_all(&failure);
        self.transport.close();
    }

    /// Route one frame. An error is fatal to the connection.
    fn route(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        debug!(channel = frame.channel(), kind = frame.kind(), "routing frame");
        match self.reassembler.push(frame) {
            Ok(Routed::Method(method)) => self.on_method(method),
            Ok(Routed::Content(content)) => {
                self.on_content(content);
                Ok(())
            }
            Ok(Routed::Incomplete) => Ok(()),
            Ok(Routed::Passthrough(frame)) => {
                warn!(kind = frame.kind(), "ignoring unexpected frame");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "malformed content stream");
                metrics::inc_errors("reassembly");
                Err(match err {
                    ReassemblyError::FrameSizeLimitExceeded { max, actual } => {
                        ConnectionError::FrameSizeLimitExceeded { max, actual }
                    }
                    ReassemblyError::MessageTooLarge { size, max, .. } => {
                        ConnectionError::MessageSizeLimitExceeded { max, actual: size }
                    }
                    _ => ConnectionError::ConnectionIsClosed,
                })
            }
        }
    }

    fn on_method(&mut self, frame: MethodFrame) -> Result<(), ConnectionError> {
        let MethodFrame { channel, method } = frame;
        if channel == 0 {
            return self.on_connection_method(method);
        }
        let Some(inner) = self.manager.get(channel) else {
            warn!(channel, method = method.name(), "frame for unknown channel");
            return Ok(());
        };
        match method {
            Method::ChannelClose(close) => {
                self.on_channel_close(&inner, &close);
                Ok(())
            }
            Method::ChannelCloseOk(_) if inner.is_detached() => {
                self.manager.remove(channel);
                Ok(())
            }
            Method::ChannelFlow(flow) => {
                debug!(channel, active = flow.active, "broker flow control");
                self.reply(channel, channel::FlowOk { active: flow.active });
                Ok(())
            }
            Method::BasicCancel(cancel) => {
                info!(channel, consumer_tag = %cancel.consumer_tag, "broker cancelled consumer");
                inner.end_deliveries();
                if !cancel.no_wait {
                    self.reply(
                        channel,
                        basic::CancelOk {
                            consumer_tag: cancel.consumer_tag,
                        },
                    );
                }
                Ok(())
            }
            method => {
                if let Err(reply) = inner.resolve(Reply::Method(method)) {
                    warn!(channel, method = reply.name(), "unsolicited reply");
                }
                Ok(())
            }
        }
    }

    fn on_connection_method(&self, method: Method) -> Result<(), ConnectionError> {
        match method {
            Method::ConnectionClose(close) => {
                self.reply(0, connection::CloseOk {});
                if NORMAL_CLOSE.contains(&close.reply_code) {
                    info!(reply_code = close.reply_code, reply_text = %close.reply_text, "broker closed connection");
                } else {
                    error!(
                        reply_code = close.reply_code,
                        reply_text = %close.reply_text,
                        class_id = close.class_id,
                        method_id = close.method_id,
                        "broker closed connection"
                    );
                    metrics::inc_errors("connection.close");
                }
                Err(ConnectionError::ConnectionIsClosed)
            }
            method => {
                if let Err(reply) = self.manager.zero().resolve(Reply::Method(method)) {
                    warn!(method = reply.name(), "unsolicited connection method");
                }
                Ok(())
            }
        }
    }

    fn on_channel_close(&mut self, inner: &ChannelInner, close: &channel::Close) {
        let channel = inner.id();
        warn!(
            channel,
            reply_code = close.reply_code,
            reply_text = %close.reply_text,
            class_id = close.class_id,
            method_id = close.method_id,
            "broker closed channel"
        );
        metrics::inc_errors("channel.close");
        self.reassembler.discard(channel);
        let detached = inner.is_detached();
        inner.shut(Some(ConnectionError::ChannelIsClosed));
        if detached {
            self.manager.remove(channel);
        }
        self.reply(channel, channel::CloseOk {});
    }

    fn on_content(&self, content: AssembledContent) {
        let channel = content.channel;
        let Some(inner) = self.manager.get(channel) else {
            warn!(channel, "content for unknown channel");
            return;
        };
        match content.method {
            Method::BasicDeliver(_) => {
                if let Some(message) = Message::from_content(content) {
                    metrics::inc_delivered();
                    inner.deliver(message);
                }
            }
            Method::BasicReturn(ref returned) => {
                warn!(
                    channel,
                    reply_code = returned.reply_code,
                    reply_text = %returned.reply_text,
                    exchange = %returned.exchange,
                    routing_key = %returned.routing_key,
                    "message returned by broker"
                );
            }
            _ => {
                if let Err(reply) = inner.resolve(Reply::Content(content)) {
                    warn!(channel, method = reply.name(), "unsolicited content");
                }
            }
        }
    }

    /// A failed reply means the transport is gone; the loop notices on the
    /// next receive.
    fn reply(&self, channel: u16, method: impl Into<Method>) {
        if let Err(err) = self.transport.send(Frame::method(channel, method)) {
            debug!(channel, error = %err, "could not send reply");
        }
    }
}
