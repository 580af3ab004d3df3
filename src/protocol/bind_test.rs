use pretty_assertions::assert_eq;

use crate::constant::{DataType, Precision};
use crate::error::Error;
use crate::protocol::bind::{
    BindBuffer, ColumnDescriptor, encode_bind_buffers, read_column_descriptors,
    write_column_descriptors,
};
use crate::value::{Timestamp, Value};

#[test]
fn test_bind_int_column_layout() {
    let buffer = BindBuffer::ints(1, [Some(7), None, Some(-1)]).unwrap();

    assert_eq!(buffer.rows(), 3);
    assert_eq!(buffer.values(), &[7, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
    assert_eq!(buffer.lengths(), &[4, 4, 4]);
    assert!(buffer.null_bitmap().is_null(1));
    assert!(!buffer.null_bitmap().is_null(0));
}

#[test]
fn test_bind_nchar_column_layout() {
    let buffer = BindBuffer::nchars(2, 30, [Some("ab"), None, Some("xyz")]).unwrap();

    assert_eq!(buffer.values(), b"abxyz");
    assert_eq!(buffer.lengths(), &[2, 0, 3]);
    assert_eq!(buffer.null_bitmap().as_bytes(), &[0b010]);
}

#[test]
fn test_bind_all_null_fixed_column_keeps_width() {
    let buffer = BindBuffer::from_values(DataType::BigInt, 8, 0, [None::<i64>, None, None]).unwrap();
    assert_eq!(buffer.values().len(), 24);
    assert_eq!(buffer.null_bitmap().as_bytes(), &[0b111]);
}

#[test]
fn test_bind_rejects_type_mismatch() {
    let mut buffer = BindBuffer::fixed(DataType::Int, 0).unwrap();
    let err = buffer.push(1.5f64).unwrap_err();
    assert!(matches!(err, Error::BadUsageError(_)));
    assert_eq!(buffer.rows(), 0);
}

#[test]
fn test_bind_rejects_value_wider_than_declared() {
    let mut buffer = BindBuffer::new(DataType::NChar, 4, 0).unwrap();
    buffer.push("abcd").unwrap();
    let err = buffer.push("abcde").unwrap_err();
    assert!(matches!(err, Error::BadUsageError(_)));
    assert_eq!(buffer.rows(), 1);
    assert_eq!(buffer.values(), b"abcd");
}

#[test]
fn test_bind_rejects_wrong_fixed_width() {
    assert!(matches!(
        BindBuffer::new(DataType::Int, 8, 0),
        Err(Error::BadUsageError(_))
    ));
    assert!(matches!(
        BindBuffer::fixed(DataType::NChar, 0),
        Err(Error::BadUsageError(_))
    ));
}

#[test]
fn test_bind_timestamp_accepts_raw_and_tagged() {
    let mut buffer = BindBuffer::fixed(DataType::Timestamp, 0).unwrap();
    buffer.push(1_700_000_000_000i64).unwrap();
    buffer.push(Timestamp::millis(1_700_000_000_001)).unwrap();
    buffer.push(Value::Null).unwrap();
    assert_eq!(buffer.rows(), 3);
    assert_eq!(&buffer.values()[8..16], &1_700_000_000_001i64.to_le_bytes());
}

#[test]
fn test_bind_clear_rearms_buffer() {
    let mut buffer = BindBuffer::ints(0, [Some(1), Some(2)]).unwrap();
    buffer.clear();
    assert_eq!(buffer.rows(), 0);
    buffer.push(3i32).unwrap();
    assert_eq!(buffer.values(), &[3, 0, 0, 0]);
    assert_eq!(buffer.data_type(), DataType::Int);
}

#[test]
fn test_encode_rejects_mismatched_row_counts() {
    let a = BindBuffer::ints(0, [Some(1), Some(2)]).unwrap();
    let b = BindBuffer::ints(1, [Some(1)]).unwrap();
    assert!(matches!(
        encode_bind_buffers(&[a, b]),
        Err(Error::BadUsageError(_))
    ));
    assert!(matches!(encode_bind_buffers(&[]), Err(Error::BadUsageError(_))));
}

#[test]
fn test_encode_block_bytes() {
    let ts = BindBuffer::timestamps(0, [Some(1), Some(2)]).unwrap();
    let name = BindBuffer::nchars(1, 8, [Some("a"), None::<&str>]).unwrap();
    let bytes = encode_bind_buffers(&[ts, name]).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(&2u32.to_le_bytes()); // rows
    expected.extend_from_slice(&2u32.to_le_bytes()); // columns
    expected.extend_from_slice(&1i64.to_le_bytes());
    expected.extend_from_slice(&2i64.to_le_bytes());
    expected.push(0); // no nulls
    expected.extend_from_slice(&1u32.to_le_bytes()); // lengths
    expected.extend_from_slice(&0u32.to_le_bytes());
    expected.push(b'a');
    expected.push(0b10);
    assert_eq!(bytes, expected);
}

#[test]
fn test_column_descriptors_round_trip() {
    let buffers = [
        BindBuffer::fixed(DataType::Timestamp, 0).unwrap(),
        BindBuffer::new(DataType::NChar, 30, 1).unwrap(),
    ];
    let mut out = Vec::new();
    write_column_descriptors(&mut out, &buffers).unwrap();
    let (descriptors, rest) = read_column_descriptors(&out).unwrap();
    assert!(rest.is_empty());
    assert_eq!(
        descriptors,
        vec![
            ColumnDescriptor {
                data_type: DataType::Timestamp,
                width: 8,
                ordinal: 0,
            },
            ColumnDescriptor {
                data_type: DataType::NChar,
                width: 30,
                ordinal: 1,
            },
        ]
    );
    assert_eq!(
        descriptors[1].column_meta(Precision::Millisecond).width,
        30
    );
}
