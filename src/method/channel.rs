//! `channel` class.

use bytes::Bytes;

/// Class identifier of `channel`.
pub const CLASS_ID: u16 = 20;

amqp_method! {
    /// Open a channel.
    Open(CLASS_ID, 10, "channel.open") {
        reserved_1: String,
    }

    /// Channel opened.
    OpenOk(CLASS_ID, 11, "channel.open-ok") {
        reserved_1: Bytes,
    }

    /// Pause or resume content flow.
    Flow(CLASS_ID, 20, "channel.flow") {
        active: bool,
    }

    /// Confirm a flow change.
    FlowOk(CLASS_ID, 21, "channel.flow-ok") {
        active: bool,
    }

    /// Request a channel close.
    Close(CLASS_ID, 40, "channel.close") {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    }

    /// Confirm a channel close.
    CloseOk(CLASS_ID, 41, "channel.close-ok") {}
}
