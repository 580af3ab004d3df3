use pretty_assertions::assert_eq;

use crate::col::ColumnMeta;
use crate::constant::{DataType, Precision};
use crate::error::Error;
use crate::protocol::bind::{BindBuffer, encode_bind_buffers};
use crate::protocol::block::decode_block;
use crate::value::{Timestamp, Value};

fn weather_buffers() -> Vec<BindBuffer> {
    vec![
        BindBuffer::timestamps(0, [Some(1_000), Some(2_000), Some(3_000), Some(4_000)]).unwrap(),
        BindBuffer::ints(1, [Some(1), None, Some(3), None]).unwrap(),
        BindBuffer::from_values(DataType::Double, 8, 2, [None, Some(0.5), None, Some(-2.0)])
            .unwrap(),
        BindBuffer::from_values(DataType::Bool, 1, 3, [Some(true), Some(false), None, None])
            .unwrap(),
        BindBuffer::from_values(
            DataType::Binary,
            64,
            4,
            [Some("hello"), None, Some(""), Some("x")],
        )
        .unwrap(),
        BindBuffer::nchars(5, 64, [None, Some("涛思数据"), Some("b"), None]).unwrap(),
    ]
}

fn schema_of(buffers: &[BindBuffer], precision: Precision) -> Vec<ColumnMeta> {
    buffers.iter().map(|b| b.column_meta(precision)).collect()
}

#[test]
fn test_bind_buffers_decode_back() {
    let buffers = weather_buffers();
    let schema = schema_of(&buffers, Precision::Millisecond);
    let bytes = encode_bind_buffers(&buffers).unwrap();
    let block = decode_block(&schema, &bytes).unwrap();

    assert_eq!(block.rows(), 4);
    assert_eq!(block.num_columns(), 6);

    assert_eq!(block.value(0, 0).unwrap(), Value::Timestamp(Timestamp::millis(1_000)));
    assert_eq!(block.value(3, 0).unwrap(), Value::Timestamp(Timestamp::millis(4_000)));

    let ints: Vec<_> = (0..4).map(|r| block.value(r, 1).unwrap()).collect();
    assert_eq!(ints, vec![Value::Int(1), Value::Null, Value::Int(3), Value::Null]);

    assert_eq!(block.value(1, 2).unwrap(), Value::Double(0.5));
    assert!(block.is_null(0, 2));
    assert_eq!(block.value(0, 3).unwrap(), Value::Bool(true));
    assert_eq!(block.value(1, 3).unwrap(), Value::Bool(false));

    assert_eq!(block.value(0, 4).unwrap(), Value::Binary(b"hello"));
    assert_eq!(block.value(1, 4).unwrap(), Value::Null);
    assert_eq!(block.value(2, 4).unwrap(), Value::Binary(b""));
    assert_eq!(block.value(1, 5).unwrap().as_str(), Some("涛思数据"));
    assert_eq!(block.value(3, 5).unwrap(), Value::Null);
}

#[test]
fn test_zero_row_block() {
    let buffers = vec![
        BindBuffer::fixed(DataType::Timestamp, 0).unwrap(),
        BindBuffer::new(DataType::NChar, 10, 1).unwrap(),
    ];
    let schema = schema_of(&buffers, Precision::Nanosecond);
    let bytes = encode_bind_buffers(&buffers).unwrap();
    assert_eq!(bytes.len(), 8);

    let block = decode_block(&schema, &bytes).unwrap();
    assert!(block.is_empty());
    assert!(matches!(block.value(0, 0), Err(Error::BadUsageError(_))));
}

#[test]
fn test_truncated_block_is_malformed_at_every_cut() {
    let buffers = weather_buffers();
    let schema = schema_of(&buffers, Precision::Millisecond);
    let bytes = encode_bind_buffers(&buffers).unwrap();

    for cut in 0..bytes.len() {
        let result = decode_block(&schema, &bytes[..cut]);
        assert!(
            matches!(result, Err(Error::MalformedFrame(_))),
            "cut at {cut} decoded"
        );
    }
}

#[test]
fn test_trailing_bytes_are_malformed() {
    let buffers = weather_buffers();
    let schema = schema_of(&buffers, Precision::Millisecond);
    let mut bytes = encode_bind_buffers(&buffers).unwrap();
    bytes.push(0);
    assert!(matches!(
        decode_block(&schema, &bytes),
        Err(Error::MalformedFrame(_))
    ));
}

#[test]
fn test_column_count_mismatch_is_malformed() {
    let buffers = weather_buffers();
    let schema = schema_of(&buffers[..2], Precision::Millisecond);
    let bytes = encode_bind_buffers(&buffers).unwrap();
    assert!(matches!(
        decode_block(&schema, &bytes),
        Err(Error::MalformedFrame(_))
    ));
}

#[test]
fn test_huge_declared_rows_do_not_allocate() {
    let schema = vec![ColumnMeta::new("v", DataType::NChar, Precision::Millisecond)];
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&[0; 16]);
    assert!(matches!(
        decode_block(&schema, &bytes),
        Err(Error::MalformedFrame(_))
    ));
}

#[test]
fn test_timestamp_takes_schema_precision() {
    let buffers = vec![BindBuffer::timestamps(0, [Some(1626006833639000)]).unwrap()];
    let schema = schema_of(&buffers, Precision::Microsecond);
    let bytes = encode_bind_buffers(&buffers).unwrap();
    let block = decode_block(&schema, &bytes).unwrap();
    assert_eq!(
        block.value(0, 0).unwrap(),
        Value::Timestamp(Timestamp::new(1626006833639000, Precision::Microsecond))
    );
}
