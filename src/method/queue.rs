//! `queue` class.

use crate::codec::Table;

/// Class identifier of `queue`.
pub const CLASS_ID: u16 = 50;

amqp_method! {
    /// Declare a queue; an empty name asks the broker to generate one.
    Declare(CLASS_ID, 10, "queue.declare") {
        reserved_1: u16,
        queue: String,
        passive: bool,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        no_wait: bool,
        arguments: Table,
    }

    /// Declared queue name and its current counts.
    DeclareOk(CLASS_ID, 11, "queue.declare-ok") {
        queue: String,
        message_count: u32,
        consumer_count: u32,
    }

    /// Bind a queue to an exchange.
    Bind(CLASS_ID, 20, "queue.bind") {
        reserved_1: u16,
        queue: String,
        exchange: String,
        routing_key: String,
        no_wait: bool,
        arguments: Table,
    }

    BindOk(CLASS_ID, 21, "queue.bind-ok") {}

    /// Drop every ready message in a queue.
    Purge(CLASS_ID, 30, "queue.purge") {
        reserved_1: u16,
        queue: String,
        no_wait: bool,
    }

    PurgeOk(CLASS_ID, 31, "queue.purge-ok") {
        message_count: u32,
    }

    /// Delete a queue.
    Delete(CLASS_ID, 40, "queue.delete") {
        reserved_1: u16,
        queue: String,
        if_unused: bool,
        if_empty: bool,
        no_wait: bool,
    }

    DeleteOk(CLASS_ID, 41, "queue.delete-ok") {
        message_count: u32,
    }

    /// Remove a binding.
    Unbind(CLASS_ID, 50, "queue.unbind") {
        reserved_1: u16,
        queue: String,
        exchange: String,
        routing_key: String,
        arguments: Table,
    }

    UnbindOk(CLASS_ID, 51, "queue.unbind-ok") {}
}
