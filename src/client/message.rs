//! Values handed to applications: messages, declare results and consumer
//! streams.

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

use super::{error::ConnectionError, reassembly::AssembledContent};
use crate::{frame::BasicProperties, method::Method};

/// A message received through `basic.deliver` or `basic.get`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    /// Message payload.
    pub body: Bytes,
    /// Content properties.
    pub properties: BasicProperties,
    /// Tag to acknowledge the message with.
    pub delivery_tag: u64,
    /// Consumer the message was delivered to; empty for `basic.get`.
    pub consumer_tag: String,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key used when publishing.
    pub routing_key: String,
    /// Whether the broker delivered this message before.
    pub redelivered: bool,
}

impl Message {
    /// Build a message from assembled `basic.deliver` or `basic.get-ok`
    /// content. Other methods yield `None`.
    pub(crate) fn from_content(content: AssembledContent) -> Option<Self> {
        let AssembledContent {
            method,
            properties,
            body,
            ..
        } = content;
        match method {
            Method::BasicDeliver(deliver) => Some(Self {
                body,
                properties,
                delivery_tag: deliver.delivery_tag,
                consumer_tag: deliver.consumer_tag,
                exchange: deliver.exchange,
                routing_key: deliver.routing_key,
                redelivered: deliver.redelivered,
            }),
            Method::BasicGetOk(get_ok) => Some(Self {
                body,
                properties,
                delivery_tag: get_ok.delivery_tag,
                consumer_tag: String::new(),
                exchange: get_ok.exchange,
                routing_key: get_ok.routing_key,
                redelivered: get_ok.redelivered,
            }),
            _ => None,
        }
    }
}

/// Broker answer to `queue.declare`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueDeclareResult {
    /// Queue name, generated by the broker when declared with an empty name.
    pub queue: String,
    /// Messages ready in the queue.
    pub message_count: u32,
    /// Active consumers on the queue.
    pub consumer_count: u32,
}

/// Exchange routing algorithm.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ExchangeType {
    /// Exact routing key match.
    #[default]
    Direct,
    /// Every bound queue.
    Fanout,
    /// Dotted pattern match.
    Topic,
    /// Header match.
    Headers,
    /// Plugin-provided type, such as `x-delayed-message`.
    Custom(String),
}

impl ExchangeType {
    /// Name sent in `exchange.declare`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Direct => "direct",
            Self::Fanout => "fanout",
            Self::Topic => "topic",
            Self::Headers => "headers",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

pub(crate) type DeliveryTx = mpsc::UnboundedSender<Result<Message, ConnectionError>>;
pub(crate) type DeliveryRx = mpsc::UnboundedReceiver<Result<Message, ConnectionError>>;

/// Deliveries for one channel, returned by
/// [`crate::client::Channel::basic_consume`].
///
/// The stream yields messages until the consumer is cancelled or the
/// channel closes. A connection or channel failure is reported as a final
/// `Err` item.
#[derive(Debug)]
pub struct Consumer {
    channel: u16,
    consumer_tag: String,
    deliveries: DeliveryRx,
}

impl Consumer {
    pub(crate) fn new(channel: u16, consumer_tag: String, deliveries: DeliveryRx) -> Self {
        Self {
            channel,
            consumer_tag,
            deliveries,
        }
    }

    /// Channel the consumer runs on.
    #[must_use]
    pub fn channel(&self) -> u16 { self.channel }

    /// Tag the broker confirmed for this consumer.
    #[must_use]
    pub fn consumer_tag(&self) -> &str { &self.consumer_tag }
}

impl Stream for Consumer {
    type Item = Result<Message, ConnectionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.deliveries.poll_recv(cx)
    }
}
