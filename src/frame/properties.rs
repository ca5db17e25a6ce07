//! Basic-class content properties.
//!
//! Presence is signalled by 16-bit flag words. Each word describes up to 15
//! properties from its high bit down; bit 0 set means another word follows.

use crate::codec::{
    DecodeError,
    EncodeError,
    FieldReader,
    FieldSink,
    FieldWriter,
    SizeCounter,
    Table,
    Timestamp,
    WireField,
};

/// Flag bits for the first property word.
pub mod flags {
    /// `content-type`
    pub const CONTENT_TYPE: u16 = 1 << 15;
    /// `content-encoding`
    pub const CONTENT_ENCODING: u16 = 1 << 14;
    /// `headers`
    pub const HEADERS: u16 = 1 << 13;
    /// `delivery-mode`
    pub const DELIVERY_MODE: u16 = 1 << 12;
    /// `priority`
    pub const PRIORITY: u16 = 1 << 11;
    /// `correlation-id`
    pub const CORRELATION_ID: u16 = 1 << 10;
    /// `reply-to`
    pub const REPLY_TO: u16 = 1 << 9;
    /// `expiration`
    pub const EXPIRATION: u16 = 1 << 8;
    /// `message-id`
    pub const MESSAGE_ID: u16 = 1 << 7;
    /// `timestamp`
    pub const TIMESTAMP: u16 = 1 << 6;
    /// `type`
    pub const TYPE: u16 = 1 << 5;
    /// `user-id`
    pub const USER_ID: u16 = 1 << 4;
    /// `app-id`
    pub const APP_ID: u16 = 1 << 3;
    /// `cluster-id`
    pub const CLUSTER_ID: u16 = 1 << 2;
    /// Another flag word follows.
    pub const CONTINUATION: u16 = 1;
}

const PROPERTIES_PER_WORD: usize = 15;

/// Optional message properties carried by a content header.
///
/// # Examples
///
/// ```
/// use amqp_wire::frame::BasicProperties;
///
/// let properties = BasicProperties::default()
///     .with_content_type("application/json")
///     .with_delivery_mode(2);
/// assert_eq!(properties.delivery_mode, Some(2));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicProperties {
    /// MIME content type.
    pub content_type: Option<String>,
    /// MIME content encoding.
    pub content_encoding: Option<String>,
    /// Application headers.
    pub headers: Option<Table>,
    /// 1 for transient, 2 for persistent.
    pub delivery_mode: Option<u8>,
    /// Priority, 0 to 9.
    pub priority: Option<u8>,
    /// Application correlation identifier.
    pub correlation_id: Option<String>,
    /// Address to reply to.
    pub reply_to: Option<String>,
    /// Expiration specification.
    pub expiration: Option<String>,
    /// Application message identifier.
    pub message_id: Option<String>,
    /// Message timestamp.
    pub timestamp: Option<Timestamp>,
    /// Message type name.
    pub kind: Option<String>,
    /// Creating user id.
    pub user_id: Option<String>,
    /// Creating application id.
    pub app_id: Option<String>,
    /// Intra-cluster routing identifier.
    pub cluster_id: Option<String>,
}

macro_rules! with_setters {
    (@into $($(#[$meta:meta])* $setter:ident => $field:ident: $ty:ty),* $(,)?) => {
        impl BasicProperties {
            $(
                $(#[$meta])*
                #[must_use]
                pub fn $setter(mut self, value: impl Into<$ty>) -> Self {
                    self.$field = Some(value.into());
                    self
                }
            )*
        }
    };
    (@exact $($(#[$meta:meta])* $setter:ident => $field:ident: $ty:ty),* $(,)?) => {
        impl BasicProperties {
            $(
                $(#[$meta])*
                #[must_use]
                pub fn $setter(mut self, value: $ty) -> Self {
                    self.$field = Some(value);
                    self
                }
            )*
        }
    };
}

with_setters! {
    @into
    /// Set `content-type`.
    with_content_type => content_type: String,
    /// Set `content-encoding`.
    with_content_encoding => content_encoding: String,
    /// Set `correlation-id`.
    with_correlation_id => correlation_id: String,
    /// Set `reply-to`.
    with_reply_to => reply_to: String,
    /// Set `expiration`.
    with_expiration => expiration: String,
    /// Set `message-id`.
    with_message_id => message_id: String,
    /// Set `type`.
    with_kind => kind: String,
    /// Set `user-id`.
    with_user_id => user_id: String,
    /// Set `app-id`.
    with_app_id => app_id: String,
    /// Set `cluster-id`.
    with_cluster_id => cluster_id: String,
}

with_setters! {
    @exact
    /// Set application headers.
    with_headers => headers: Table,
    /// Set `delivery-mode`.
    with_delivery_mode => delivery_mode: u8,
    /// Set `priority`.
    with_priority => priority: u8,
    /// Set `timestamp`.
    with_timestamp => timestamp: Timestamp,
}

/// Visit every property in flag order, calling `$apply!(field)` on each.
macro_rules! each_property {
    ($apply:ident) => {
        $apply!(content_type);
        $apply!(content_encoding);
        $apply!(headers);
        $apply!(delivery_mode);
        $apply!(priority);
        $apply!(correlation_id);
        $apply!(reply_to);
        $apply!(expiration);
        $apply!(message_id);
        $apply!(timestamp);
        $apply!(kind);
        $apply!(user_id);
        $apply!(app_id);
        $apply!(cluster_id);
    };
}

impl BasicProperties {
    fn presence(&self) -> Vec<bool> {
        let mut present = Vec::with_capacity(PROPERTIES_PER_WORD);
        macro_rules! push {
            ($field:ident) => {
                present.push(self.$field.is_some())
            };
        }
        each_property!(push);
        present
    }

    /// Flag words announcing which properties are present.
    ///
    /// Always at least one word; every word but the last carries the
    /// continuation bit.
    #[must_use]
    pub fn flag_words(&self) -> Vec<u16> {
        let presence = self.presence();
        let mut words: Vec<u16> = presence
            .chunks(PROPERTIES_PER_WORD)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .filter(|(_, present)| **present)
                    .fold(0, |word, (index, _)| word | (1 << (15 - index)))
            })
            .collect();
        while words.len() > 1 && words.last() == Some(&0) {
            words.pop();
        }
        let last = words.len() - 1;
        for word in &mut words[..last] {
            *word |= flags::CONTINUATION;
        }
        words
    }

    fn write_fields<S: FieldSink>(&self, sink: &mut S) -> Result<(), EncodeError> {
        for word in self.flag_words() {
            sink.short(word);
        }
        macro_rules! emit {
            ($field:ident) => {
                if let Some(value) = &self.$field {
                    value.write(sink)?;
                }
            };
        }
        each_property!(emit);
        Ok(())
    }

    /// Encoded size: flag words plus present values.
    #[must_use]
    pub fn bytes_count(&self) -> usize { SizeCounter::measure(|counter| self.write_fields(counter)) }

    /// Append flag words and present values to `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when a string property exceeds the short
    /// string limit.
    pub fn encode(&self, writer: &mut FieldWriter<'_>) -> Result<(), EncodeError> {
        self.write_fields(writer)
    }

    /// Read flag words and the values they announce.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when a value is truncated or malformed, or
    /// when a flag announces a property this crate does not know.
    pub fn decode(reader: &mut FieldReader) -> Result<Self, DecodeError> {
        let mut presence = Vec::with_capacity(PROPERTIES_PER_WORD);
        loop {
            let word = reader.short()?;
            presence.extend((0..PROPERTIES_PER_WORD).map(|index| word & (1 << (15 - index)) != 0));
            if word & flags::CONTINUATION == 0 {
                break;
            }
        }

        let mut properties = Self::default();
        let mut announced = presence.into_iter();
        macro_rules! read {
            ($field:ident) => {
                if announced.next().unwrap_or(false) {
                    properties.$field = Some(WireField::read(reader)?);
                }
            };
        }
        each_property!(read);
        if announced.any(|present| present) {
            return Err(DecodeError::UnknownProperty);
        }
        Ok(properties)
    }
}
