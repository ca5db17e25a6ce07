//! `connection` class: handshake, tuning and connection close.

use bytes::Bytes;

use crate::codec::Table;

/// Class identifier of `connection`.
pub const CLASS_ID: u16 = 10;

amqp_method! {
    /// Broker greeting announcing its version, properties and mechanisms.
    Start(CLASS_ID, 10, "connection.start") {
        version_major: u8,
        version_minor: u8,
        server_properties: Table,
        /// Space-separated SASL mechanisms.
        mechanisms: Bytes,
        /// Space-separated locales.
        locales: Bytes,
    }

    /// Client properties, chosen mechanism and its response.
    StartOk(CLASS_ID, 11, "connection.start-ok") {
        client_properties: Table,
        mechanism: String,
        response: Bytes,
        locale: String,
    }

    /// SASL challenge.
    Secure(CLASS_ID, 20, "connection.secure") {
        challenge: Bytes,
    }

    /// SASL challenge response.
    SecureOk(CLASS_ID, 21, "connection.secure-ok") {
        response: Bytes,
    }

    /// Broker tuning proposal.
    Tune(CLASS_ID, 30, "connection.tune") {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    }

    /// Tuning the client settled on.
    TuneOk(CLASS_ID, 31, "connection.tune-ok") {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    }

    /// Open a virtual host.
    Open(CLASS_ID, 40, "connection.open") {
        virtual_host: String,
        reserved_1: String,
        reserved_2: bool,
    }

    /// Virtual host opened.
    OpenOk(CLASS_ID, 41, "connection.open-ok") {
        reserved_1: String,
    }

    /// Request a connection close, naming the failing method if any.
    Close(CLASS_ID, 50, "connection.close") {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    }

    /// Confirm a connection close.
    CloseOk(CLASS_ID, 51, "connection.close-ok") {}
}
