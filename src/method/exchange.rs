//! `exchange` class.

use crate::codec::Table;

/// Class identifier of `exchange`.
pub const CLASS_ID: u16 = 40;

amqp_method! {
    /// Declare an exchange.
    Declare(CLASS_ID, 10, "exchange.declare") {
        reserved_1: u16,
        exchange: String,
        /// Exchange type, such as `direct` or `topic`.
        kind: String,
        passive: bool,
        durable: bool,
        auto_delete: bool,
        internal: bool,
        no_wait: bool,
        arguments: Table,
    }

    DeclareOk(CLASS_ID, 11, "exchange.declare-ok") {}

    /// Delete an exchange.
    Delete(CLASS_ID, 20, "exchange.delete") {
        reserved_1: u16,
        exchange: String,
        if_unused: bool,
        no_wait: bool,
    }

    DeleteOk(CLASS_ID, 21, "exchange.delete-ok") {}
}
