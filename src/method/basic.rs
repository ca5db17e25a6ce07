//! `basic` class: publishing, consuming and acknowledgement.
//!
//! `publish`, `return`, `deliver` and `get-ok` are followed by a content
//! header and body frames on the same channel.

use crate::codec::Table;

/// Class identifier of `basic`; also the class of every content header.
pub const CLASS_ID: u16 = 60;

amqp_method! {
    /// Limit unacknowledged deliveries.
    Qos(CLASS_ID, 10, "basic.qos") {
        prefetch_size: u32,
        prefetch_count: u16,
        global: bool,
    }

    QosOk(CLASS_ID, 11, "basic.qos-ok") {}

    /// Start a consumer.
    Consume(CLASS_ID, 20, "basic.consume") {
        reserved_1: u16,
        queue: String,
        consumer_tag: String,
        no_local: bool,
        no_ack: bool,
        exclusive: bool,
        no_wait: bool,
        arguments: Table,
    }

    ConsumeOk(CLASS_ID, 21, "basic.consume-ok") {
        consumer_tag: String,
    }

    /// End a consumer. Brokers also send this when a queue disappears.
    Cancel(CLASS_ID, 30, "basic.cancel") {
        consumer_tag: String,
        no_wait: bool,
    }

    CancelOk(CLASS_ID, 31, "basic.cancel-ok") {
        consumer_tag: String,
    }

    /// Publish a message; content follows.
    Publish(CLASS_ID, 40, "basic.publish") {
        reserved_1: u16,
        exchange: String,
        routing_key: String,
        mandatory: bool,
        immediate: bool,
    }

    /// Unroutable message handed back; content follows.
    Return(CLASS_ID, 50, "basic.return") {
        reply_code: u16,
        reply_text: String,
        exchange: String,
        routing_key: String,
    }

    /// Message pushed to a consumer; content follows.
    Deliver(CLASS_ID, 60, "basic.deliver") {
        consumer_tag: String,
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
    }

    /// Fetch one message.
    Get(CLASS_ID, 70, "basic.get") {
        reserved_1: u16,
        queue: String,
        no_ack: bool,
    }

    /// Fetched message; content follows.
    GetOk(CLASS_ID, 71, "basic.get-ok") {
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
        message_count: u32,
    }

    /// Nothing to fetch.
    GetEmpty(CLASS_ID, 72, "basic.get-empty") {
        reserved_1: String,
    }

    Ack(CLASS_ID, 80, "basic.ack") {
        delivery_tag: u64,
        multiple: bool,
    }

    Reject(CLASS_ID, 90, "basic.reject") {
        delivery_tag: u64,
        requeue: bool,
    }

    RecoverAsync(CLASS_ID, 100, "basic.recover-async") {
        requeue: bool,
    }

    /// Redeliver unacknowledged messages.
    Recover(CLASS_ID, 110, "basic.recover") {
        requeue: bool,
    }

    RecoverOk(CLASS_ID, 111, "basic.recover-ok") {}

    /// Reject one or more deliveries (RabbitMQ extension).
    Nack(CLASS_ID, 120, "basic.nack") {
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    }
}
