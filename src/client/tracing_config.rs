//! Tracing configuration for connection and channel operations.
//!
//! [`TracingConfig`] controls which operations emit tracing spans and
//! whether per-command elapsed-time events are recorded.

use tracing::Level;

/// Controls tracing span levels and per-command timing.
///
/// By default, lifecycle operations (`connect`, `close`) emit spans at
/// `INFO` level. High-frequency operations (`call`, `publish`) emit spans at
/// `DEBUG` level. Per-command timing is disabled for all operations by
/// default.
///
/// Spans are always created at the configured level. When no `tracing`
/// subscriber is installed, span creation is a no-op. When per-command
/// timing is enabled for an operation, an additional event recording
/// `elapsed_us` is emitted when the operation completes.
///
/// # Examples
///
/// ```
/// use amqp_wire::client::TracingConfig;
/// use tracing::Level;
///
/// let config = TracingConfig::default()
///     .with_connect_timing(true)
///     .with_call_level(Level::TRACE);
/// let _ = config;
/// ```
#[expect(
    clippy::struct_excessive_bools,
    reason = "one independent timing flag per operation category"
)]
#[derive(Clone, Debug)]
pub struct TracingConfig {
    pub(crate) connect_level: Level,
    pub(crate) call_level: Level,
    pub(crate) publish_level: Level,
    pub(crate) close_level: Level,
    pub(crate) connect_timing: bool,
    pub(crate) call_timing: bool,
    pub(crate) publish_timing: bool,
    pub(crate) close_timing: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            connect_level: Level::INFO,
            call_level: Level::DEBUG,
            publish_level: Level::DEBUG,
            close_level: Level::INFO,
            connect_timing: false,
            call_timing: false,
            publish_timing: false,
            close_timing: false,
        }
    }
}

impl TracingConfig {
    /// Set the tracing level for connecting and negotiating.
    #[must_use]
    pub fn with_connect_level(mut self, level: Level) -> Self {
        self.connect_level = level;
        self
    }

    /// Enable or disable timing for connecting and negotiating.
    ///
    /// When enabled, an event recording `elapsed_us` is emitted at `DEBUG`
    /// level once the handshake finishes.
    #[must_use]
    pub fn with_connect_timing(mut self, enabled: bool) -> Self {
        self.connect_timing = enabled;
        self
    }

    /// Set the tracing level for synchronous channel methods.
    #[must_use]
    pub fn with_call_level(mut self, level: Level) -> Self {
        self.call_level = level;
        self
    }

    /// Enable or disable timing for synchronous channel methods.
    #[must_use]
    pub fn with_call_timing(mut self, enabled: bool) -> Self {
        self.call_timing = enabled;
        self
    }

    /// Set the tracing level for `basic_publish`.
    #[must_use]
    pub fn with_publish_level(mut self, level: Level) -> Self {
        self.publish_level = level;
        self
    }

    /// Enable or disable timing for `basic_publish`.
    #[must_use]
    pub fn with_publish_timing(mut self, enabled: bool) -> Self {
        self.publish_timing = enabled;
        self
    }

    /// Set the tracing level for connection close.
    #[must_use]
    pub fn with_close_level(mut self, level: Level) -> Self {
        self.close_level = level;
        self
    }

    /// Enable or disable timing for connection close.
    #[must_use]
    pub fn with_close_timing(mut self, enabled: bool) -> Self {
        self.close_timing = enabled;
        self
    }

    /// Set the tracing level for all operations at once.
    ///
    /// # Examples
    ///
    /// ```
    /// use amqp_wire::client::TracingConfig;
    /// use tracing::Level;
    ///
    /// let config = TracingConfig::default().with_all_levels(Level::TRACE);
    /// let _ = config;
    /// ```
    #[must_use]
    pub fn with_all_levels(mut self, level: Level) -> Self {
        self.connect_level = level;
        self.call_level = level;
        self.publish_level = level;
        self.close_level = level;
        self
    }

    /// Enable or disable timing for all operations at once.
    #[must_use]
    pub fn with_all_timing(mut self, enabled: bool) -> Self {
        self.connect_timing = enabled;
        self.call_timing = enabled;
        self.publish_timing = enabled;
        self.close_timing = enabled;
        self
    }
}
