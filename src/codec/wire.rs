//! Primitive field readers and writers.
//!
//! AMQP method arguments are a flat sequence of octets, shorts, longs,
//! long-longs, bits, short strings, long strings, tables and timestamps, all
//! big-endian. [`FieldReader`] consumes them from a payload, [`FieldWriter`]
//! appends them to a buffer and [`SizeCounter`] measures them without
//! writing. Consecutive bits share one octet, least-significant bit first;
//! any other field closes the run.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    error::{DecodeError, EncodeError},
    field::{Table, Timestamp},
};

/// Longest short string accepted for encoding.
pub const SHORT_STRING_MAX: usize = u8::MAX as usize - 1;

/// Cursor over a frame payload.
#[derive(Debug)]
pub struct FieldReader {
    buf: Bytes,
    bits: Option<(u8, u8)>,
}

impl FieldReader {
    /// Wrap a payload for reading.
    #[must_use]
    pub fn new(buf: Bytes) -> Self { Self { buf, bits: None } }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize { self.buf.remaining() }

    /// Take whatever is left of the payload.
    pub fn rest(&mut self) -> Bytes {
        self.bits = None;
        self.buf.split_off(0)
    }

    fn ensure(&mut self, needed: usize) -> Result<(), DecodeError> {
        self.bits = None;
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(DecodeError::InsufficientData { needed, remaining });
        }
        Ok(())
    }

    /// Read an unsigned octet.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InsufficientData`] when the payload is exhausted.
    pub fn octet(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read a big-endian `u16`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InsufficientData`] when the payload is exhausted.
    pub fn short(&mut self) -> Result<u16, DecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    /// Read a big-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InsufficientData`] when the payload is exhausted.
    pub fn long(&mut self) -> Result<u32, DecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    /// Read a big-endian `u64`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InsufficientData`] when the payload is exhausted.
    pub fn longlong(&mut self) -> Result<u64, DecodeError> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    pub(crate) fn signed_octet(&mut self) -> Result<i8, DecodeError> {
        self.ensure(1)?;
        Ok(self.buf.get_i8())
    }

    pub(crate) fn signed_short(&mut self) -> Result<i16, DecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    pub(crate) fn signed_long(&mut self) -> Result<i32, DecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub(crate) fn signed_longlong(&mut self) -> Result<i64, DecodeError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    pub(crate) fn float(&mut self) -> Result<f32, DecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    pub(crate) fn double(&mut self) -> Result<f64, DecodeError> {
        self.ensure(8)?;
        Ok(self.buf.get_f64())
    }

    /// Read one packed bit, fetching a fresh octet when the current run is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InsufficientData`] when a new octet is needed and
    /// the payload is exhausted.
    pub fn bit(&mut self) -> Result<bool, DecodeError> {
        let (octet, index) = match self.bits {
            Some((octet, index)) if index < 8 => (octet, index),
            _ => (self.octet()?, 0),
        };
        self.bits = Some((octet, index + 1));
        Ok(octet & (1 << index) != 0)
    }

    /// Read `len` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InsufficientData`] when fewer bytes remain.
    pub fn bytes(&mut self, len: usize) -> Result<Bytes, DecodeError> {
        self.ensure(len)?;
        Ok(self.buf.copy_to_bytes(len))
    }

    /// Read a short string: one length octet followed by UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the payload is truncated or the bytes are
    /// not valid UTF-8.
    pub fn shortstr(&mut self) -> Result<String, DecodeError> {
        let len = usize::from(self.octet()?);
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Read a long string: a four-octet length followed by opaque bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InsufficientData`] when the payload is truncated.
    pub fn longstr(&mut self) -> Result<Bytes, DecodeError> {
        let len = self.long()? as usize;
        self.bytes(len)
    }

    /// Read a field table.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the table or any nested value is malformed.
    pub fn table(&mut self) -> Result<Table, DecodeError> { Table::decode(self) }

    /// Read a timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InsufficientData`] when the payload is exhausted.
    pub fn timestamp(&mut self) -> Result<Timestamp, DecodeError> {
        self.longlong().map(Timestamp::from_millis)
    }
}

/// Destination for method arguments.
///
/// Implemented by [`FieldWriter`], which encodes, and by [`SizeCounter`],
/// which only measures. Method definitions drive both through the same
/// field list so the two can never disagree.
pub trait FieldSink {
    /// Emit an unsigned octet.
    fn octet(&mut self, value: u8);
    /// Emit a `u16`.
    fn short(&mut self, value: u16);
    /// Emit a `u32`.
    fn long(&mut self, value: u32);
    /// Emit a `u64`.
    fn longlong(&mut self, value: u64);
    /// Emit one packed bit.
    fn bit(&mut self, value: bool);

    /// Emit a short string.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::ShortStringTooLong`] past [`SHORT_STRING_MAX`] bytes.
    fn shortstr(&mut self, value: &str) -> Result<(), EncodeError>;

    /// Emit a long string.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::LengthOverflow`] when the length exceeds `u32`.
    fn longstr(&mut self, value: &[u8]) -> Result<(), EncodeError>;

    /// Emit a field table.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when a key or nested value cannot be encoded.
    fn table(&mut self, value: &Table) -> Result<(), EncodeError>;
}

fn check_shortstr(value: &str) -> Result<u8, EncodeError> {
    u8::try_from(value.len())
        .ok()
        .filter(|len| usize::from(*len) <= SHORT_STRING_MAX)
        .ok_or(EncodeError::ShortStringTooLong {
            len: value.len(),
            max: SHORT_STRING_MAX,
        })
}

fn check_long_len(len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::LengthOverflow(len))
}

/// Appends encoded fields to a [`BytesMut`].
#[derive(Debug)]
pub struct FieldWriter<'a> {
    buf: &'a mut BytesMut,
    bits: Option<(usize, u8)>,
}

impl<'a> FieldWriter<'a> {
    /// Start writing at the end of `buf`.
    pub fn new(buf: &'a mut BytesMut) -> Self { Self { buf, bits: None } }

    /// Append raw bytes.
    pub fn raw(&mut self, value: &[u8]) {
        self.bits = None;
        self.buf.put_slice(value);
    }

    pub(crate) fn signed_octet(&mut self, value: i8) {
        self.bits = None;
        self.buf.put_i8(value);
    }

    pub(crate) fn signed_short(&mut self, value: i16) {
        self.bits = None;
        self.buf.put_i16(value);
    }

    pub(crate) fn signed_long(&mut self, value: i32) {
        self.bits = None;
        self.buf.put_i32(value);
    }

    pub(crate) fn signed_longlong(&mut self, value: i64) {
        self.bits = None;
        self.buf.put_i64(value);
    }

    pub(crate) fn float(&mut self, value: f32) {
        self.bits = None;
        self.buf.put_f32(value);
    }

    pub(crate) fn double(&mut self, value: f64) {
        self.bits = None;
        self.buf.put_f64(value);
    }

    /// Write a four-octet placeholder and return its offset for [`Self::patch_long`].
    pub(crate) fn reserve_long(&mut self) -> usize {
        self.bits = None;
        let offset = self.buf.len();
        self.buf.put_u32(0);
        offset
    }

    /// Overwrite a placeholder with the number of bytes written since it.
    pub(crate) fn patch_long(&mut self, offset: usize) -> Result<(), EncodeError> {
        let written = check_long_len(self.buf.len() - offset - 4)?;
        self.buf[offset..offset + 4].copy_from_slice(&written.to_be_bytes());
        self.bits = None;
        Ok(())
    }
}

impl FieldSink for FieldWriter<'_> {
    fn octet(&mut self, value: u8) {
        self.bits = None;
        self.buf.put_u8(value);
    }

    fn short(&mut self, value: u16) {
        self.bits = None;
        self.buf.put_u16(value);
    }

    fn long(&mut self, value: u32) {
        self.bits = None;
        self.buf.put_u32(value);
    }

    fn longlong(&mut self, value: u64) {
        self.bits = None;
        self.buf.put_u64(value);
    }

    fn bit(&mut self, value: bool) {
        let (offset, index) = match self.bits {
            Some((offset, index)) if index < 8 => (offset, index),
            _ => {
                self.buf.put_u8(0);
                (self.buf.len() - 1, 0)
            }
        };
        if value {
            self.buf[offset] |= 1 << index;
        }
        self.bits = Some((offset, index + 1));
    }

    fn shortstr(&mut self, value: &str) -> Result<(), EncodeError> {
        let len = check_shortstr(value)?;
        self.octet(len);
        self.raw(value.as_bytes());
        Ok(())
    }

    fn longstr(&mut self, value: &[u8]) -> Result<(), EncodeError> {
        let len = check_long_len(value.len())?;
        self.long(len);
        self.raw(value);
        Ok(())
    }

    fn table(&mut self, value: &Table) -> Result<(), EncodeError> { value.encode(self) }
}

/// Measures encoded size without producing bytes.
///
/// Counting accepts every value, including strings the writer would reject,
/// so a size is only meaningful for values that also encode.
#[derive(Debug, Default)]
pub struct SizeCounter {
    total: usize,
    bits: u8,
}

impl SizeCounter {
    /// Run `write` against a fresh counter and return the byte total.
    pub fn measure(write: impl FnOnce(&mut Self) -> Result<(), EncodeError>) -> usize {
        let mut counter = Self::default();
        // The counter never fails, so the result carries no information.
        let _ = write(&mut counter);
        counter.total
    }

    fn add(&mut self, len: usize) {
        self.bits = 0;
        self.total += len;
    }
}

impl FieldSink for SizeCounter {
    fn octet(&mut self, _value: u8) { self.add(1); }

    fn short(&mut self, _value: u16) { self.add(2); }

    fn long(&mut self, _value: u32) { self.add(4); }

    fn longlong(&mut self, _value: u64) { self.add(8); }

    fn bit(&mut self, _value: bool) {
        if self.bits == 0 || self.bits == 8 {
            self.total += 1;
            self.bits = 0;
        }
        self.bits += 1;
    }

    fn shortstr(&mut self, value: &str) -> Result<(), EncodeError> {
        self.add(1 + value.len());
        Ok(())
    }

    fn longstr(&mut self, value: &[u8]) -> Result<(), EncodeError> {
        self.add(4 + value.len());
        Ok(())
    }

    fn table(&mut self, value: &Table) -> Result<(), EncodeError> {
        self.add(value.bytes_count());
        Ok(())
    }
}

/// A type that maps onto exactly one AMQP argument kind.
pub trait WireField: Sized {
    /// Read a value of this kind.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the payload is truncated or malformed.
    fn read(reader: &mut FieldReader) -> Result<Self, DecodeError>;

    /// Write this value to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when the value cannot be represented.
    fn write<S: FieldSink>(&self, sink: &mut S) -> Result<(), EncodeError>;
}

macro_rules! infallible_wire_field {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl WireField for $ty {
                fn read(reader: &mut FieldReader) -> Result<Self, DecodeError> { reader.$kind() }

                fn write<S: FieldSink>(&self, sink: &mut S) -> Result<(), EncodeError> {
                    sink.$kind(*self);
                    Ok(())
                }
            }
        )*
    };
}

infallible_wire_field!(u8 => octet, u16 => short, u32 => long, u64 => longlong, bool => bit);

impl WireField for String {
    fn read(reader: &mut FieldReader) -> Result<Self, DecodeError> { reader.shortstr() }

    fn write<S: FieldSink>(&self, sink: &mut S) -> Result<(), EncodeError> { sink.shortstr(self) }
}

impl WireField for Bytes {
    fn read(reader: &mut FieldReader) -> Result<Self, DecodeError> { reader.longstr() }

    fn write<S: FieldSink>(&self, sink: &mut S) -> Result<(), EncodeError> { sink.longstr(self) }
}

impl WireField for Table {
    fn read(reader: &mut FieldReader) -> Result<Self, DecodeError> { reader.table() }

    fn write<S: FieldSink>(&self, sink: &mut S) -> Result<(), EncodeError> { sink.table(self) }
}

impl WireField for Timestamp {
    fn read(reader: &mut FieldReader) -> Result<Self, DecodeError> { reader.timestamp() }

    fn write<S: FieldSink>(&self, sink: &mut S) -> Result<(), EncodeError> {
        sink.longlong(self.as_millis());
        Ok(())
    }
}
