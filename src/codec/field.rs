//! Field tables and their typed values.
//!
//! Type tags follow the RabbitMQ errata for AMQP 0-9-1, which is what
//! brokers actually speak: `s` is a signed 16-bit integer, so there is no
//! short-string value; strings travel as long strings (`S`).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use super::{
    error::{DecodeError, EncodeError},
    wire::{FieldReader, FieldSink, FieldWriter},
};

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Build a timestamp from milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self { Self(millis) }

    /// Milliseconds since the epoch.
    #[must_use]
    pub const fn as_millis(self) -> u64 { self.0 }

    /// The current wall-clock time, saturating at the epoch for clocks set
    /// before 1970.
    #[must_use]
    pub fn now() -> Self { Self::from(SystemTime::now()) }
}

impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        let millis = value
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis());
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

impl From<Timestamp> for SystemTime {
    fn from(value: Timestamp) -> Self { UNIX_EPOCH + Duration::from_millis(value.0) }
}

/// Fixed-point decimal: `value / 10^scale`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Decimal {
    /// Number of decimal digits after the point.
    pub scale: u8,
    /// Unscaled value.
    pub value: i32,
}

/// A typed value stored in a [`Table`] or field array.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// `t`
    Bool(bool),
    /// `b`
    I8(i8),
    /// `B`
    U8(u8),
    /// `s`
    I16(i16),
    /// `u`
    U16(u16),
    /// `I`
    I32(i32),
    /// `i`
    U32(u32),
    /// `l`
    I64(i64),
    /// `f`
    F32(f32),
    /// `d`
    F64(f64),
    /// `D`
    Decimal(Decimal),
    /// `S`
    LongString(Bytes),
    /// `T`
    Timestamp(Timestamp),
    /// `F`
    Table(Table),
    /// `A`
    Array(Vec<FieldValue>),
    /// `x`
    Bytes(Bytes),
    /// `V`
    Void,
}

impl FieldValue {
    /// One-octet wire tag for this variant.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Self::Bool(_) => b't',
            Self::I8(_) => b'b',
            Self::U8(_) => b'B',
            Self::I16(_) => b's',
            Self::U16(_) => b'u',
            Self::I32(_) => b'I',
            Self::U32(_) => b'i',
            Self::I64(_) => b'l',
            Self::F32(_) => b'f',
            Self::F64(_) => b'd',
            Self::Decimal(_) => b'D',
            Self::LongString(_) => b'S',
            Self::Timestamp(_) => b'T',
            Self::Table(_) => b'F',
            Self::Array(_) => b'A',
            Self::Bytes(_) => b'x',
            Self::Void => b'V',
        }
    }

    /// Encoded size including the tag octet.
    #[must_use]
    pub fn bytes_count(&self) -> usize {
        1 + match self {
            Self::Void => 0,
            Self::Bool(_) | Self::I8(_) | Self::U8(_) => 1,
            Self::I16(_) | Self::U16(_) => 2,
            Self::I32(_) | Self::U32(_) | Self::F32(_) => 4,
            Self::Decimal(_) => 5,
            Self::I64(_) | Self::F64(_) | Self::Timestamp(_) => 8,
            Self::LongString(value) | Self::Bytes(value) => 4 + value.len(),
            Self::Table(table) => table.bytes_count(),
            Self::Array(values) => 4 + values.iter().map(Self::bytes_count).sum::<usize>(),
        }
    }

    /// Decode a tagged value.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownFieldType`] for unrecognised tags and
    /// [`DecodeError::InsufficientData`] for truncated input.
    pub fn decode(reader: &mut FieldReader) -> Result<Self, DecodeError> {
        let tag = reader.octet()?;
        Ok(match tag {
            b't' => Self::Bool(reader.octet()? != 0),
            b'b' => Self::I8(reader.signed_octet()?),
            b'B' => Self::U8(reader.octet()?),
            b's' => Self::I16(reader.signed_short()?),
            b'u' => Self::U16(reader.short()?),
            b'I' => Self::I32(reader.signed_long()?),
            b'i' => Self::U32(reader.long()?),
            b'l' => Self::I64(reader.signed_longlong()?),
            b'f' => Self::F32(reader.float()?),
            b'd' => Self::F64(reader.double()?),
            b'D' => Self::Decimal(Decimal {
                scale: reader.octet()?,
                value: reader.signed_long()?,
            }),
            b'S' => Self::LongString(reader.longstr()?),
            b'T' => Self::Timestamp(reader.timestamp()?),
            b'F' => Self::Table(Table::decode(reader)?),
            b'A' => Self::Array(decode_array(reader)?),
            b'x' => Self::Bytes(reader.longstr()?),
            b'V' => Self::Void,
            other => return Err(DecodeError::UnknownFieldType(other)),
        })
    }

    /// Append the tagged encoding to `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when a nested key or length cannot be encoded.
    pub fn encode(&self, writer: &mut FieldWriter<'_>) -> Result<(), EncodeError> {
        writer.octet(self.tag());
        match self {
            Self::Void => {}
            Self::Bool(value) => writer.octet(u8::from(*value)),
            Self::I8(value) => writer.signed_octet(*value),
            Self::U8(value) => writer.octet(*value),
            Self::I16(value) => writer.signed_short(*value),
            Self::U16(value) => writer.short(*value),
            Self::I32(value) => writer.signed_long(*value),
            Self::U32(value) => writer.long(*value),
            Self::I64(value) => writer.signed_longlong(*value),
            Self::F32(value) => writer.float(*value),
            Self::F64(value) => writer.double(*value),
            Self::Decimal(decimal) => {
                writer.octet(decimal.scale);
                writer.signed_long(decimal.value);
            }
            Self::LongString(value) | Self::Bytes(value) => writer.longstr(value)?,
            Self::Timestamp(value) => writer.longlong(value.as_millis()),
            Self::Table(table) => table.encode(writer)?,
            Self::Array(values) => {
                let offset = writer.reserve_long();
                for value in values {
                    value.encode(writer)?;
                }
                writer.patch_long(offset)?;
            }
        }
        Ok(())
    }
}

fn decode_array(reader: &mut FieldReader) -> Result<Vec<FieldValue>, DecodeError> {
    let len = reader.long()? as usize;
    let mut inner = FieldReader::new(reader.bytes(len)?);
    let mut values = Vec::new();
    while inner.remaining() > 0 {
        values.push(FieldValue::decode(&mut inner)?);
    }
    Ok(values)
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self { Self::Bool(value) }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self { Self::I32(value) }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self { Self::I64(value) }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self { Self::LongString(Bytes::copy_from_slice(value.as_bytes())) }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self { Self::LongString(Bytes::from(value)) }
}

impl From<Table> for FieldValue {
    fn from(value: Table) -> Self { Self::Table(value) }
}

impl From<Timestamp> for FieldValue {
    fn from(value: Timestamp) -> Self { Self::Timestamp(value) }
}

/// String-keyed field table preserving insertion order.
///
/// Keys are unique: inserting an existing key replaces its value in place,
/// which gives last-wins semantics when decoding duplicate keys.
///
/// # Examples
///
/// ```
/// use amqp_wire::codec::{FieldValue, Table};
///
/// let mut table = Table::new();
/// table.insert("x-max-priority", 10);
/// table.insert("x-max-priority", 5);
/// assert_eq!(table.get("x-max-priority"), Some(&FieldValue::I32(5)));
/// assert_eq!(table.len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    entries: Vec<(String, FieldValue)>,
}

impl Table {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Insert or replace `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`Self::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find_map(|(existing, value)| (existing == key).then_some(value))
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let index = self.entries.iter().position(|(existing, _)| existing == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Copy every entry of `other` into `self`, replacing shared keys.
    pub fn merge(&mut self, other: &Table) {
        for (key, value) in other.iter() {
            self.insert(key.clone(), value.clone());
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    /// Encoded size including the four-octet length prefix.
    #[must_use]
    pub fn bytes_count(&self) -> usize {
        4 + self
            .entries
            .iter()
            .map(|(key, value)| 1 + key.len() + value.bytes_count())
            .sum::<usize>()
    }

    /// Decode a length-prefixed table.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the table or any nested value is malformed.
    pub fn decode(reader: &mut FieldReader) -> Result<Self, DecodeError> {
        let len = reader.long()? as usize;
        let mut inner = FieldReader::new(reader.bytes(len)?);
        let mut table = Self::new();
        while inner.remaining() > 0 {
            let key = inner.shortstr()?;
            let value = FieldValue::decode(&mut inner)?;
            table.insert(key, value);
        }
        Ok(table)
    }

    /// Append the length-prefixed encoding to `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when a key is too long or a nested value cannot
    /// be encoded.
    pub fn encode(&self, writer: &mut FieldWriter<'_>) -> Result<(), EncodeError> {
        let offset = writer.reserve_long();
        for (key, value) in &self.entries {
            writer.shortstr(key)?;
            value.encode(writer)?;
        }
        writer.patch_long(offset)
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Table {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (key, value) in iter {
            table.insert(key, value);
        }
        table
    }
}
