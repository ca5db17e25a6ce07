//! Unit tests for the primitive codec, field tables and the stream codec.

use bytes::{BufMut, Bytes, BytesMut};
use proptest::prelude::*;
use rstest::rstest;
use tokio_util::codec::{Decoder, Encoder};

use super::*;
use crate::frame::Frame;

fn write_with(f: impl FnOnce(&mut FieldWriter<'_>) -> Result<(), EncodeError>) -> BytesMut {
    let mut buf = BytesMut::new();
    let mut writer = FieldWriter::new(&mut buf);
    f(&mut writer).expect("encode should succeed");
    buf
}

fn reader(bytes: &[u8]) -> FieldReader { FieldReader::new(Bytes::copy_from_slice(bytes)) }

#[test]
fn integers_are_big_endian() {
    let buf = write_with(|w| {
        w.octet(0x01);
        w.short(0x0203);
        w.long(0x0405_0607);
        w.longlong(0x0809_0A0B_0C0D_0E0F);
        Ok(())
    });
    assert_eq!(
        &buf[..],
        &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]
    );

    let mut r = reader(&buf);
    assert_eq!(r.octet().expect("octet"), 0x01);
    assert_eq!(r.short().expect("short"), 0x0203);
    assert_eq!(r.long().expect("long"), 0x0405_0607);
    assert_eq!(r.longlong().expect("longlong"), 0x0809_0A0B_0C0D_0E0F);
    assert_eq!(r.remaining(), 0);
}

#[rstest]
#[case::short(2, &[0x01])]
#[case::long(4, &[0, 0, 1])]
#[case::empty(1, &[])]
fn truncated_reads_report_insufficient_data(#[case] needed: usize, #[case] input: &[u8]) {
    let mut r = reader(input);
    let err = match needed {
        1 => r.octet().map(|_| ()),
        2 => r.short().map(|_| ()),
        _ => r.long().map(|_| ()),
    }
    .expect_err("read should fail");
    assert_eq!(
        err,
        DecodeError::InsufficientData {
            needed,
            remaining: input.len(),
        }
    );
}

#[rstest]
#[case::all_set([true, true, true, true], 0b1111)]
#[case::second_clear([true, false, true, true], 0b1101)]
#[case::none_set([false, false, false, false], 0b0000)]
fn bits_pack_lsb_first(#[case] bits: [bool; 4], #[case] expected: u8) {
    let buf = write_with(|w| {
        for bit in bits {
            w.bit(bit);
        }
        Ok(())
    });
    assert_eq!(&buf[..], &[expected]);

    let mut r = reader(&buf);
    let decoded: Vec<bool> = (0..4).map(|_| r.bit().expect("bit")).collect();
    assert_eq!(decoded, bits);
}

#[test]
fn ninth_bit_starts_a_new_octet() {
    let buf = write_with(|w| {
        for _ in 0..9 {
            w.bit(true);
        }
        Ok(())
    });
    assert_eq!(&buf[..], &[0xFF, 0x01]);

    let counted = SizeCounter::measure(|counter| {
        for _ in 0..9 {
            counter.bit(true);
        }
        Ok(())
    });
    assert_eq!(counted, 2);
}

#[test]
fn non_bit_field_closes_bit_run() {
    let buf = write_with(|w| {
        w.bit(true);
        w.octet(7);
        w.bit(true);
        Ok(())
    });
    assert_eq!(&buf[..], &[0x01, 0x07, 0x01]);
}

#[test]
fn short_string_limit_is_enforced() {
    let ok = "a".repeat(SHORT_STRING_MAX);
    let buf = write_with(|w| w.shortstr(&ok));
    assert_eq!(buf.len(), SHORT_STRING_MAX + 1);

    let mut buf = BytesMut::new();
    let too_long = "a".repeat(SHORT_STRING_MAX + 1);
    let err = FieldWriter::new(&mut buf)
        .shortstr(&too_long)
        .expect_err("oversized short string must fail");
    assert_eq!(
        err,
        EncodeError::ShortStringTooLong {
            len: SHORT_STRING_MAX + 1,
            max: SHORT_STRING_MAX,
        }
    );
}

#[test]
fn invalid_utf8_short_string_is_rejected() {
    let mut r = reader(&[2, 0xC3, 0x28]);
    assert_eq!(r.shortstr(), Err(DecodeError::InvalidUtf8));
}

#[test]
fn table_length_excludes_its_own_prefix() {
    let table = Table::new().with("a", true);
    let buf = write_with(|w| w.table(&table));
    // key (1 + 1) + tag (1) + value (1)
    assert_eq!(&buf[..4], &4_u32.to_be_bytes());
    assert_eq!(&buf[4..], &[1, b'a', b't', 1]);
    assert_eq!(buf.len(), table.bytes_count());
}

#[test]
fn duplicate_keys_decode_last_wins() {
    let mut raw = BytesMut::new();
    raw.put_u32(8);
    raw.put_slice(&[1, b'k', b'B', 1]);
    raw.put_slice(&[1, b'k', b'B', 2]);
    let table = Table::decode(&mut FieldReader::new(raw.freeze())).expect("decode table");
    assert_eq!(table.len(), 1);
    assert_eq!(table.get("k"), Some(&FieldValue::U8(2)));
}

#[test]
fn unknown_field_tag_is_rejected() {
    let mut r = reader(&[b'Z', 0]);
    assert_eq!(
        FieldValue::decode(&mut r),
        Err(DecodeError::UnknownFieldType(b'Z'))
    );
}

#[rstest]
#[case::void(FieldValue::Void, &[b'V'])]
#[case::int16(FieldValue::I16(-2), &[b's', 0xFF, 0xFE])]
#[case::uint32(FieldValue::U32(1), &[b'i', 0, 0, 0, 1])]
#[case::decimal(FieldValue::Decimal(Decimal { scale: 2, value: 314 }), &[b'D', 2, 0, 0, 1, 0x3A])]
#[case::long_string(FieldValue::from("hi"), &[b'S', 0, 0, 0, 2, b'h', b'i'])]
#[case::timestamp(FieldValue::Timestamp(Timestamp::from_millis(1)), &[b'T', 0, 0, 0, 0, 0, 0, 0, 1])]
#[case::array(
    FieldValue::Array(vec![FieldValue::Bool(true), FieldValue::U8(9)]),
    &[b'A', 0, 0, 0, 4, b't', 1, b'B', 9]
)]
fn field_values_use_rabbitmq_tags(#[case] value: FieldValue, #[case] expected: &[u8]) {
    let buf = write_with(|w| value.encode(w));
    assert_eq!(&buf[..], expected);
    assert_eq!(value.bytes_count(), expected.len());
    let decoded = FieldValue::decode(&mut reader(expected)).expect("decode value");
    assert_eq!(decoded, value);
}

fn leaf_value() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        any::<bool>().prop_map(FieldValue::Bool),
        any::<i8>().prop_map(FieldValue::I8),
        any::<u8>().prop_map(FieldValue::U8),
        any::<i16>().prop_map(FieldValue::I16),
        any::<u16>().prop_map(FieldValue::U16),
        any::<i32>().prop_map(FieldValue::I32),
        any::<u32>().prop_map(FieldValue::U32),
        any::<i64>().prop_map(FieldValue::I64),
        (-1.0e6_f64..1.0e6).prop_map(FieldValue::F64),
        (any::<u8>(), any::<i32>())
            .prop_map(|(scale, value)| FieldValue::Decimal(Decimal { scale, value })),
        proptest::collection::vec(any::<u8>(), 0..32)
            .prop_map(|bytes| FieldValue::LongString(Bytes::from(bytes))),
        any::<u64>().prop_map(|millis| FieldValue::Timestamp(Timestamp::from_millis(millis))),
        proptest::collection::vec(any::<u8>(), 0..16)
            .prop_map(|bytes| FieldValue::Bytes(Bytes::from(bytes))),
        Just(FieldValue::Void),
    ]
}

fn field_value() -> impl Strategy<Value = FieldValue> {
    leaf_value().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(FieldValue::Array),
            proptest::collection::vec(("[a-z]{1,8}", inner), 0..4)
                .prop_map(|entries| FieldValue::Table(entries.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn tables_round_trip_and_match_bytes_count(
        entries in proptest::collection::vec(("[a-z-]{1,12}", field_value()), 0..8)
    ) {
        let table: Table = entries.into_iter().collect();
        let buf = write_with(|w| w.table(&table));
        prop_assert_eq!(buf.len(), table.bytes_count());
        let decoded = Table::decode(&mut FieldReader::new(buf.freeze())).expect("decode table");
        prop_assert_eq!(decoded, table);
    }
}

#[test]
fn codec_decodes_heartbeat_and_waits_for_partial_frames() {
    let mut codec = AmqpCodec::default();
    let mut buf = BytesMut::from(&[8_u8, 0, 0, 0, 0][..]);
    assert!(codec.decode(&mut buf).expect("partial header").is_none());
    buf.put_slice(&[0, 0, 0xCE]);
    assert_eq!(
        codec.decode(&mut buf).expect("decode heartbeat"),
        Some(Frame::Heartbeat)
    );
    assert!(buf.is_empty());
}

#[test]
fn codec_decodes_protocol_header() {
    let mut codec = AmqpCodec::default();
    let mut buf = BytesMut::from(&b"AMQP\x00\x00\x09\x01"[..]);
    assert_eq!(
        codec.decode(&mut buf).expect("decode header"),
        Some(Frame::ProtocolHeader(crate::frame::ProtocolHeader::AMQP_0_9_1))
    );
}

#[test]
fn codec_rejects_oversized_frames_before_buffering() {
    let mut codec = AmqpCodec::new(MIN_FRAME_LENGTH);
    let size = u32::try_from(MIN_FRAME_LENGTH).expect("fits in u32");
    let mut buf = BytesMut::new();
    buf.put_u8(3);
    buf.put_u16(1);
    buf.put_u32(size);
    let err = codec.decode(&mut buf).expect_err("oversized frame");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::OversizedFrame { size, max })
            if size == MIN_FRAME_LENGTH + 8 && max == MIN_FRAME_LENGTH
    ));
}

#[rstest]
#[case::mid_header(&[1, 0, 1], EofError::MidHeader { bytes_received: 3, header_size: 7 })]
#[case::mid_frame(&[1, 0, 1, 0, 0, 0, 4, 0], EofError::MidFrame { bytes_received: 8, expected: 12 })]
#[case::mid_protocol_header(b"AMQP", EofError::MidHeader { bytes_received: 4, header_size: 8 })]
fn codec_reports_truncation_at_eof(#[case] input: &[u8], #[case] expected: EofError) {
    let mut codec = AmqpCodec::default();
    let mut buf = BytesMut::from(input);
    let err = codec.decode_eof(&mut buf).expect_err("truncated stream");
    assert!(matches!(err, CodecError::Eof(eof) if eof == expected));
}

#[test]
fn codec_clean_eof_yields_none() {
    let mut codec = AmqpCodec::default();
    let mut buf = BytesMut::new();
    assert!(codec.decode_eof(&mut buf).expect("clean eof").is_none());
}

#[rstest]
#[case(1, MIN_FRAME_LENGTH)]
#[case(MAX_FRAME_LENGTH + 1, MAX_FRAME_LENGTH)]
fn codec_clamps_max_frame_length(#[case] input: usize, #[case] expected: usize) {
    assert_eq!(AmqpCodec::new(input).max_frame_length(), expected);
}

#[rstest]
#[case::unlimited(0, MAX_FRAME_LENGTH)]
#[case::negotiated(131_072, 131_072)]
#[case::below_minimum(512, MIN_FRAME_LENGTH)]
fn codec_applies_negotiated_frame_max(#[case] frame_max: u32, #[case] expected: usize) {
    let mut codec = AmqpCodec::default();
    codec.set_frame_max(frame_max);
    assert_eq!(codec.max_frame_length(), expected);
}

#[test]
fn codec_refuses_to_encode_oversized_frames() {
    let mut codec = AmqpCodec::new(MIN_FRAME_LENGTH);
    let frame = Frame::content_body(1, Bytes::from(vec![0_u8; MIN_FRAME_LENGTH]));
    let mut buf = BytesMut::new();
    let err = codec.encode(frame, &mut buf).expect_err("oversized frame");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::OversizedFrame { .. })
    ));
    assert!(buf.is_empty());
}
