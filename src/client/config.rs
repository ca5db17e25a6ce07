//! Connection settings for broker clients.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use super::{reassembly::DEFAULT_MAX_MESSAGE_SIZE, tracing_config::TracingConfig};
use crate::codec::{FieldValue, Table};

/// Default AMQP port.
pub const DEFAULT_PORT: u16 = 5672;
/// Channel limit requested unless configured otherwise.
pub const DEFAULT_CHANNEL_MAX: u16 = 2047;
/// Frame size requested unless configured otherwise.
pub const DEFAULT_FRAME_MAX: u32 = 131_072;
const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(30);

/// SASL mechanism and its opaque response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    mechanism: String,
    response: Bytes,
}

impl Credentials {
    /// `PLAIN` credentials for `username` and `password`.
    ///
    /// # Examples
    ///
    /// ```
    /// use amqp_wire::client::Credentials;
    ///
    /// let credentials = Credentials::plain("guest", "secret");
    /// assert_eq!(credentials.mechanism(), "PLAIN");
    /// assert_eq!(&credentials.response()[..], b"\0guest\0secret");
    /// ```
    #[must_use]
    pub fn plain(username: &str, password: &str) -> Self {
        let mut response = BytesMut::with_capacity(username.len() + password.len() + 2);
        response.put_u8(0);
        response.put_slice(username.as_bytes());
        response.put_u8(0);
        response.put_slice(password.as_bytes());
        Self {
            mechanism: "PLAIN".into(),
            response: response.freeze(),
        }
    }

    /// Mechanism name sent in `connection.start-ok`.
    #[must_use]
    pub fn mechanism(&self) -> &str { &self.mechanism }

    /// Mechanism response sent in `connection.start-ok`.
    #[must_use]
    pub fn response(&self) -> &Bytes { &self.response }
}

impl Default for Credentials {
    fn default() -> Self { Self::plain("guest", "guest") }
}

/// How the client answers the broker's heartbeat proposal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeartbeatSetting {
    /// Accept whatever the broker proposes.
    #[default]
    ServerDefault,
    /// Turn heartbeats off.
    Disabled,
    /// Use at most this many seconds.
    Seconds(u16),
}

impl HeartbeatSetting {
    /// Heartbeat timeout in seconds given the broker's proposal.
    #[must_use]
    pub fn resolve(self, server: u16) -> u16 {
        match self {
            Self::ServerDefault => server,
            Self::Disabled => 0,
            Self::Seconds(client) => super::negotiation::decide(server, client),
        }
    }
}

/// Settings for [`crate::client::Connection::connect`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use amqp_wire::client::{ConnectionConfig, Credentials, HeartbeatSetting};
///
/// let config = ConnectionConfig::new("rabbit.internal")
///     .port(5673)
///     .vhost("orders")
///     .credentials(Credentials::plain("svc", "s3cret"))
///     .heartbeat(HeartbeatSetting::Seconds(30))
///     .negotiation_timeout(Duration::from_secs(5));
/// assert_eq!(config.addr(), "rabbit.internal:5673");
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) vhost: String,
    pub(crate) credentials: Credentials,
    pub(crate) channel_max: u16,
    pub(crate) frame_max: u32,
    pub(crate) heartbeat: HeartbeatSetting,
    pub(crate) client_properties: Table,
    pub(crate) locale: String,
    pub(crate) negotiation_timeout: Duration,
    pub(crate) max_message_size: u64,
    pub(crate) tracing: TracingConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self { Self::new("localhost") }
}

impl ConnectionConfig {
    /// Settings for `host` with every other value at its default.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            vhost: "/".into(),
            credentials: Credentials::default(),
            channel_max: DEFAULT_CHANNEL_MAX,
            frame_max: DEFAULT_FRAME_MAX,
            heartbeat: HeartbeatSetting::default(),
            client_properties: Table::new(),
            locale: "en_US".into(),
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            tracing: TracingConfig::default(),
        }
    }

    /// Set the broker port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the virtual host opened after tuning.
    #[must_use]
    pub fn vhost(mut self, vhost: impl Into<String>) -> Self {
        self.vhost = vhost.into();
        self
    }

    /// Set the SASL credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the channel limit requested during tuning; 0 asks for no limit.
    #[must_use]
    pub fn channel_max(mut self, channel_max: u16) -> Self {
        self.channel_max = channel_max;
        self
    }

    /// Set the frame size requested during tuning; 0 asks for no limit.
    #[must_use]
    pub fn frame_max(mut self, frame_max: u32) -> Self {
        self.frame_max = frame_max;
        self
    }

    /// Set the heartbeat policy.
    #[must_use]
    pub fn heartbeat(mut self, heartbeat: HeartbeatSetting) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Add a client property, replacing a default of the same name.
    ///
    /// # Examples
    ///
    /// ```
    /// use amqp_wire::client::ConnectionConfig;
    /// use amqp_wire::codec::FieldValue;
    ///
    /// let config = ConnectionConfig::default().client_property("connection_name", "billing-worker");
    /// let properties = config.client_properties();
    /// assert!(properties.get("connection_name").is_some());
    /// assert!(matches!(properties.get("product"), Some(FieldValue::LongString(_))));
    /// ```
    #[must_use]
    pub fn client_property(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.client_properties.insert(key, value);
        self
    }

    /// Set the locale sent in `connection.start-ok`.
    #[must_use]
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Bound the whole handshake, from TCP connect to `connection.open-ok`.
    #[must_use]
    pub fn negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    /// Largest message body the client will assemble. A broker announcing a
    /// bigger body fails the connection with
    /// [`MessageSizeLimitExceeded`](crate::client::ConnectionError::MessageSizeLimitExceeded).
    #[must_use]
    pub fn max_message_size(mut self, max: u64) -> Self {
        self.max_message_size = max;
        self
    }

    /// Configure tracing spans and timing.
    #[must_use]
    pub fn tracing_config(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }

    /// `host:port` to connect to.
    #[must_use]
    pub fn addr(&self) -> String { format!("{}:{}", self.host, self.port) }

    /// Client properties advertised in `connection.start-ok`: the defaults
    /// overlaid with configured entries.
    #[must_use]
    pub fn client_properties(&self) -> Table {
        let mut properties = default_client_properties();
        properties.merge(&self.client_properties);
        properties
    }
}

fn default_client_properties() -> Table {
    Table::new()
        .with("product", env!("CARGO_PKG_NAME"))
        .with("platform", "Rust")
        .with("version", env!("CARGO_PKG_VERSION"))
        .with("information", env!("CARGO_PKG_DESCRIPTION"))
        .with(
            "capabilities",
            Table::new()
                .with("authentication_failure_close", true)
                .with("basic.nack", true)
                .with("consumer_cancel_notify", true),
        )
}
