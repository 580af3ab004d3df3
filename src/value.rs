/// Typed column values
use crate::constant::{DataType, Precision};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use simdutf8::basic::from_utf8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// NULL value
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    UTinyInt(u8),
    USmallInt(u16),
    UInt(u32),
    UBigInt(u64),
    Float(f32),
    Double(f64),
    /// TIMESTAMP tagged with the result's precision
    Timestamp(Timestamp),
    /// BINARY / VARCHAR, VARBINARY, GEOMETRY
    Binary(&'a [u8]),
    /// NCHAR - validated UTF-8
    NChar(&'a str),
    /// JSON (tag columns only)
    Json(&'a str),
}

impl<'a> Value<'a> {
    /// Decode one value from exactly the bytes of a single element
    ///
    /// Fixed-width types require `raw.len()` to equal their width.
    pub fn decode(data_type: DataType, precision: Precision, raw: &'a [u8]) -> Result<Self> {
        if let Some(width) = data_type.fixed_width()
            && raw.len() != width
        {
            return Err(Error::MalformedFrame(format!(
                "{:?} value must be {} bytes, got {}",
                data_type,
                width,
                raw.len()
            )));
        }

        let value = match data_type {
            DataType::Null => Value::Null,
            DataType::Bool => Value::Bool(read_int_1(raw)?.0 != 0),
            DataType::TinyInt => Value::TinyInt(read_int_1(raw)?.0 as i8),
            DataType::UTinyInt => Value::UTinyInt(read_int_1(raw)?.0),
            DataType::SmallInt => Value::SmallInt(read_int_2(raw)?.0 as i16),
            DataType::USmallInt => Value::USmallInt(read_int_2(raw)?.0),
            DataType::Int => Value::Int(read_int_4(raw)?.0 as i32),
            DataType::UInt => Value::UInt(read_int_4(raw)?.0),
            DataType::BigInt => Value::BigInt(read_int_8(raw)?.0 as i64),
            DataType::UBigInt => Value::UBigInt(read_int_8(raw)?.0),
            DataType::Float => Value::Float(f32::from_bits(read_int_4(raw)?.0)),
            DataType::Double => Value::Double(f64::from_bits(read_int_8(raw)?.0)),
            DataType::Timestamp => Value::Timestamp(Timestamp::new(
                read_int_8(raw)?.0 as i64,
                precision,
            )),
            DataType::Binary | DataType::VarBinary | DataType::Geometry => Value::Binary(raw),
            DataType::NChar => Value::NChar(decode_utf8(raw)?),
            DataType::Json => Value::Json(decode_utf8(raw)?),
        };
        Ok(value)
    }

    /// Append the wire bytes of this value
    ///
    /// `Null` writes nothing; callers pad fixed-width sections themselves.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            Value::Null => {}
            Value::Bool(v) => write_int_1(out, v as u8),
            Value::TinyInt(v) => write_int_1(out, v as u8),
            Value::UTinyInt(v) => write_int_1(out, v),
            Value::SmallInt(v) => write_int_2(out, v as u16),
            Value::USmallInt(v) => write_int_2(out, v),
            Value::Int(v) => write_int_4(out, v as u32),
            Value::UInt(v) => write_int_4(out, v),
            Value::BigInt(v) => write_int_8(out, v as u64),
            Value::UBigInt(v) => write_int_8(out, v),
            Value::Float(v) => write_int_4(out, v.to_bits()),
            Value::Double(v) => write_int_8(out, v.to_bits()),
            Value::Timestamp(ts) => write_int_8(out, ts.value as u64),
            Value::Binary(v) => write_bytes_fix(out, v),
            Value::NChar(v) | Value::Json(v) => write_bytes_fix(out, v.as_bytes()),
        }
    }

    /// The data type this value encodes as
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::TinyInt(_) => DataType::TinyInt,
            Value::SmallInt(_) => DataType::SmallInt,
            Value::Int(_) => DataType::Int,
            Value::BigInt(_) => DataType::BigInt,
            Value::UTinyInt(_) => DataType::UTinyInt,
            Value::USmallInt(_) => DataType::USmallInt,
            Value::UInt(_) => DataType::UInt,
            Value::UBigInt(_) => DataType::UBigInt,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Binary(_) => DataType::Binary,
            Value::NChar(_) => DataType::NChar,
            Value::Json(_) => DataType::Json,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Widen any integer or timestamp value to i64
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Bool(v) => Some(v as i64),
            Value::TinyInt(v) => Some(v.into()),
            Value::SmallInt(v) => Some(v.into()),
            Value::Int(v) => Some(v.into()),
            Value::BigInt(v) => Some(v),
            Value::UTinyInt(v) => Some(v.into()),
            Value::USmallInt(v) => Some(v.into()),
            Value::UInt(v) => Some(v.into()),
            Value::UBigInt(v) => i64::try_from(v).ok(),
            Value::Timestamp(ts) => Some(ts.value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v.into()),
            Value::Double(v) => Some(v),
            _ => None,
        }
    }

    /// Text content of NCHAR, JSON, or UTF-8 BINARY values
    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            Value::NChar(v) | Value::Json(v) => Some(v),
            Value::Binary(v) => from_utf8(v).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            Value::Binary(v) => Some(v),
            Value::NChar(v) | Value::Json(v) => Some(v.as_bytes()),
            _ => None,
        }
    }
}

fn decode_utf8(raw: &[u8]) -> Result<&str> {
    from_utf8(raw).map_err(|_| Error::malformed("text column is not valid UTF-8"))
}

// ============================================================================
// Timestamp
// ============================================================================

/// A raw timestamp with the unit its integer is expressed in
///
/// No unit conversion happens on decode; use `to_unit` explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub value: i64,
    pub precision: Precision,
}

impl Timestamp {
    pub fn new(value: i64, precision: Precision) -> Self {
        Self { value, precision }
    }

    pub fn millis(value: i64) -> Self {
        Self::new(value, Precision::Millisecond)
    }

    /// Re-express in another unit, truncating toward negative infinity when coarsening
    pub fn to_unit(&self, precision: Precision) -> Option<Self> {
        let from = self.precision.per_second();
        let to = precision.per_second();
        let value = if to >= from {
            self.value.checked_mul(to / from)?
        } else {
            self.value.div_euclid(from / to)
        };
        Some(Self::new(value, precision))
    }

    #[cfg(feature = "with-chrono")]
    pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let nanos = self.to_unit(Precision::Nanosecond)?.value;
        Some(chrono::DateTime::from_timestamp_nanos(nanos))
    }

    #[cfg(feature = "with-chrono")]
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>, precision: Precision) -> Option<Self> {
        let value = match precision {
            Precision::Second => dt.timestamp(),
            Precision::Millisecond => dt.timestamp_millis(),
            Precision::Microsecond => dt.timestamp_micros(),
            Precision::Nanosecond => dt.timestamp_nanos_opt()?,
        };
        Some(Self::new(value, precision))
    }
}

// ============================================================================
// NULL Bitmap
// ============================================================================

/// Per-row NULL bitmap of a column section
///
/// Each bit represents whether a row is NULL (1 = NULL, 0 = not NULL),
/// row `i` at bit `i & 7` of byte `i >> 3`.
#[derive(Debug, Clone, Copy)]
pub struct NullBitmap<'a> {
    bitmap: &'a [u8],
}

impl<'a> NullBitmap<'a> {
    pub fn new(bitmap: &'a [u8]) -> Self {
        Self { bitmap }
    }

    /// Bytes needed for `rows` bits
    pub fn len_for(rows: usize) -> usize {
        rows.div_ceil(8)
    }

    /// Check if the row at the given index is NULL
    pub fn is_null(&self, idx: usize) -> bool {
        let byte_pos = idx >> 3;
        let bit_offset = idx & 7;

        match self.bitmap.get(byte_pos) {
            Some(byte) => (byte & (1 << bit_offset)) != 0,
            None => false,
        }
    }

    /// Get the raw bitmap bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bitmap
    }
}

/// Set the NULL bit of row `idx` in a bitmap sized with `NullBitmap::len_for`
pub fn set_null_bit(bitmap: &mut [u8], idx: usize) {
    if let Some(byte) = bitmap.get_mut(idx >> 3) {
        *byte |= 1 << (idx & 7);
    }
}

#[cfg(test)]
#[path = "value_test.rs"]
mod value_test;
