//! Metric helpers for `amqp-wire`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. With the
//! `metrics` feature disabled the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open broker connections.
pub const CONNECTIONS_ACTIVE: &str = "amqp_wire_connections_active";
/// Name of the gauge tracking open channels.
pub const CHANNELS_ACTIVE: &str = "amqp_wire_channels_active";
/// Name of the counter tracking frames written or read.
pub const FRAMES_PROCESSED: &str = "amqp_wire_frames_processed_total";
/// Name of the counter tracking published messages.
pub const MESSAGES_PUBLISHED: &str = "amqp_wire_messages_published_total";
/// Name of the counter tracking delivered messages.
pub const MESSAGES_DELIVERED: &str = "amqp_wire_messages_delivered_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "amqp_wire_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames read from the broker.
    Inbound,
    /// Frames written to the broker.
    Outbound,
}

impl Direction {
    #[cfg_attr(
        not(feature = "metrics"),
        expect(dead_code, reason = "labels are only used by the metrics recorder")
    )]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Increment the active channels gauge.
pub fn inc_channels() {
    #[cfg(feature = "metrics")]
    gauge!(CHANNELS_ACTIVE).increment(1.0);
}

/// Decrement the active channels gauge.
pub fn dec_channels() {
    #[cfg(feature = "metrics")]
    gauge!(CHANNELS_ACTIVE).decrement(1.0);
}

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a message handed to the broker.
pub fn inc_published() {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_PUBLISHED).increment(1);
}

/// Record a fully reassembled inbound message.
pub fn inc_delivered() {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_DELIVERED).increment(1);
}

/// Record an error occurrence, labelled by where it surfaced.
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}
