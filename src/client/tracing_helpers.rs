//! Tracing span and event helpers for connection and channel operations.
//!
//! These helpers centralise span creation with dynamic level selection and
//! per-command timing emission, keeping the instrumentation out of the
//! channel methods.

use tokio::time::Instant;
use tracing::{Level, Span};

use super::tracing_config::TracingConfig;

/// Create a tracing span at a dynamically selected level.
///
/// Each branch calls the matching `tracing::<level>_span!` macro so span
/// metadata stays static per branch while the branch choice is dynamic.
macro_rules! dynamic_span {
    ($level:expr, $name:expr $(, $($field:tt)*)?) => {
        match $level {
            Level::ERROR => tracing::error_span!($name $(, $($field)*)?),
            Level::WARN  => tracing::warn_span!($name $(, $($field)*)?),
            Level::INFO  => tracing::info_span!($name $(, $($field)*)?),
            Level::DEBUG => tracing::debug_span!($name $(, $($field)*)?),
            Level::TRACE => tracing::trace_span!($name $(, $($field)*)?),
        }
    };
}

/// Create a span for connecting and negotiating.
#[expect(
    clippy::cognitive_complexity,
    reason = "complexity from dynamic_span! macro expansion; five match arms are inherent"
)]
pub(crate) fn connect_span(config: &TracingConfig, peer_addr: &str, vhost: &str) -> Span {
    dynamic_span!(
        config.connect_level,
        "amqp.connect",
        peer.addr = peer_addr,
        vhost = vhost
    )
}

/// Create a span for a synchronous channel method.
///
/// The `result` field is recorded when the reply arrives using
/// [`Span::record`].
#[expect(
    clippy::cognitive_complexity,
    reason = "complexity from dynamic_span! macro expansion"
)]
pub(crate) fn call_span(config: &TracingConfig, channel: u16, method: &'static str) -> Span {
    dynamic_span!(
        config.call_level,
        "amqp.call",
        channel = channel,
        method = method,
        result = tracing::field::Empty
    )
}

/// Create a span for `basic_publish`.
#[expect(
    clippy::cognitive_complexity,
    reason = "complexity from dynamic_span! macro expansion"
)]
pub(crate) fn publish_span(config: &TracingConfig, channel: u16, body_bytes: usize) -> Span {
    dynamic_span!(
        config.publish_level,
        "amqp.publish",
        channel = channel,
        body.bytes = body_bytes,
        frames = tracing::field::Empty
    )
}

/// Create a span for closing the connection.
#[expect(
    clippy::cognitive_complexity,
    reason = "complexity from dynamic_span! macro expansion"
)]
pub(crate) fn close_span(config: &TracingConfig) -> Span {
    dynamic_span!(config.close_level, "amqp.close")
}

/// Start a timer when timing is enabled for an operation.
pub(crate) fn timing_start(enabled: bool) -> Option<Instant> { enabled.then(Instant::now) }

/// Record elapsed time if timing was enabled for this operation.
///
/// `start` is `None` when timing is disabled. When `Some`, an event is
/// emitted with the `elapsed_us` field at `DEBUG` level.
pub(crate) fn emit_timing_event(start: Option<Instant>) {
    if let Some(start) = start {
        let elapsed_us = start.elapsed().as_micros();
        tracing::debug!(elapsed_us = elapsed_us, "operation.timing");
    }
}
