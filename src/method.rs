//! AMQP 0-9-1 method definitions and the decode registry.
//!
//! Each class module declares its methods with [`amqp_method!`], which
//! generates the argument struct and a single field walker used for both
//! encoding and size accounting. [`Method`] closes over every supported
//! method and [`Method::lookup`] maps a `(class, method)` pair to its decoder.
//!
//! The set covers the base protocol plus `basic.nack`.

use crate::codec::{DecodeError, EncodeError, FieldReader, FieldSink, SizeCounter};

/// Declare method argument structs.
///
/// Field types pick the wire kind: `u8` octet, `u16` short, `u32` long,
/// `u64` long-long, `bool` bit, `String` short string, `Bytes` long string,
/// `Table` field table and `Timestamp` timestamp.
macro_rules! amqp_method {
    ($(
        $(#[$meta:meta])*
        $name:ident ($class:expr, $method:expr, $label:literal) {
            $($(#[$fmeta:meta])* $field:ident: $ty:ty),* $(,)?
        }
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Debug, Default, PartialEq)]
            pub struct $name {
                $($(#[$fmeta])* pub $field: $ty,)*
            }

            impl $name {
                /// Class identifier.
                pub const CLASS_ID: u16 = $class;
                /// Method identifier within the class.
                pub const METHOD_ID: u16 = $method;
                /// Dotted protocol name.
                pub const NAME: &str = $label;

                #[allow(unused_variables, reason = "methods without arguments ignore the reader")]
                pub(crate) fn decode_fields(
                    reader: &mut $crate::codec::FieldReader,
                ) -> Result<Self, $crate::codec::DecodeError> {
                    Ok(Self {
                        $($field: $crate::codec::WireField::read(reader)?,)*
                    })
                }

                #[allow(unused_variables, reason = "methods without arguments ignore the sink")]
                pub(crate) fn write_fields<S: $crate::codec::FieldSink>(
                    &self,
                    sink: &mut S,
                ) -> Result<(), $crate::codec::EncodeError> {
                    $($crate::codec::WireField::write(&self.$field, sink)?;)*
                    Ok(())
                }
            }
        )*
    };
}

pub mod basic;
pub mod channel;
pub mod connection;
pub mod exchange;
pub mod queue;
pub mod tx;

/// Decoder produced by [`Method::lookup`].
pub type MethodDecoder = fn(&mut FieldReader) -> Result<Method, DecodeError>;

macro_rules! method_registry {
    ($($(#[$meta:meta])* $variant:ident($ty:ty)),* $(,)?) => {
        /// Every method this crate can send or receive.
        #[derive(Clone, Debug, PartialEq)]
        pub enum Method {
            $($(#[$meta])* $variant($ty),)*
        }

        impl Method {
            /// Class identifier.
            #[must_use]
            pub fn class_id(&self) -> u16 {
                match self {
                    $(Self::$variant(_) => <$ty>::CLASS_ID,)*
                }
            }

            /// Method identifier within the class.
            #[must_use]
            pub fn method_id(&self) -> u16 {
                match self {
                    $(Self::$variant(_) => <$ty>::METHOD_ID,)*
                }
            }

            /// Dotted protocol name, such as `basic.deliver`.
            #[must_use]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => <$ty>::NAME,)*
                }
            }

            /// Find the decoder for a `(class, method)` pair.
            #[must_use]
            pub fn lookup(class_id: u16, method_id: u16) -> Option<MethodDecoder> {
                $(
                    if class_id == <$ty>::CLASS_ID && method_id == <$ty>::METHOD_ID {
                        return Some(|reader: &mut FieldReader| {
                            <$ty>::decode_fields(reader).map(Self::$variant)
                        });
                    }
                )*
                None
            }

            pub(crate) fn write_fields<S: FieldSink>(&self, sink: &mut S) -> Result<(), EncodeError> {
                match self {
                    $(Self::$variant(method) => method.write_fields(sink),)*
                }
            }
        }

        $(
            impl From<$ty> for Method {
                fn from(method: $ty) -> Self { Self::$variant(method) }
            }
        )*
    };
}

method_registry! {
    ConnectionStart(connection::Start),
    ConnectionStartOk(connection::StartOk),
    ConnectionSecure(connection::Secure),
    ConnectionSecureOk(connection::SecureOk),
    ConnectionTune(connection::Tune),
    ConnectionTuneOk(connection::TuneOk),
    ConnectionOpen(connection::Open),
    ConnectionOpenOk(connection::OpenOk),
    ConnectionClose(connection::Close),
    ConnectionCloseOk(connection::CloseOk),
    ChannelOpen(channel::Open),
    ChannelOpenOk(channel::OpenOk),
    ChannelFlow(channel::Flow),
    ChannelFlowOk(channel::FlowOk),
    ChannelClose(channel::Close),
    ChannelCloseOk(channel::CloseOk),
    ExchangeDeclare(exchange::Declare),
    ExchangeDeclareOk(exchange::DeclareOk),
    ExchangeDelete(exchange::Delete),
    ExchangeDeleteOk(exchange::DeleteOk),
    QueueDeclare(queue::Declare),
    QueueDeclareOk(queue::DeclareOk),
    QueueBind(queue::Bind),
    QueueBindOk(queue::BindOk),
    QueuePurge(queue::Purge),
    QueuePurgeOk(queue::PurgeOk),
    QueueDelete(queue::Delete),
    QueueDeleteOk(queue::DeleteOk),
    QueueUnbind(queue::Unbind),
    QueueUnbindOk(queue::UnbindOk),
    BasicQos(basic::Qos),
    BasicQosOk(basic::QosOk),
    BasicConsume(basic::Consume),
    BasicConsumeOk(basic::ConsumeOk),
    BasicCancel(basic::Cancel),
    BasicCancelOk(basic::CancelOk),
    BasicPublish(basic::Publish),
    BasicReturn(basic::Return),
    BasicDeliver(basic::Deliver),
    BasicGet(basic::Get),
    BasicGetOk(basic::GetOk),
    BasicGetEmpty(basic::GetEmpty),
    BasicAck(basic::Ack),
    BasicReject(basic::Reject),
    BasicRecoverAsync(basic::RecoverAsync),
    BasicRecover(basic::Recover),
    BasicRecoverOk(basic::RecoverOk),
    BasicNack(basic::Nack),
    TxSelect(tx::Select),
    TxSelectOk(tx::SelectOk),
    TxCommit(tx::Commit),
    TxCommitOk(tx::CommitOk),
    TxRollback(tx::Rollback),
    TxRollbackOk(tx::RollbackOk),
}

impl Method {
    /// Size of the encoded arguments, excluding the class and method ids.
    #[must_use]
    pub fn fields_bytes_count(&self) -> usize {
        SizeCounter::measure(|counter| self.write_fields(counter))
    }

    /// Whether a content header and body frames follow this method.
    #[must_use]
    pub fn has_content(&self) -> bool {
        matches!(
            self,
            Self::BasicPublish(_) | Self::BasicReturn(_) | Self::BasicDeliver(_) | Self::BasicGetOk(_)
        )
    }
}
