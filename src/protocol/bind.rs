//! Parameter binding buffers.
//!
//! A `BindBuffer` holds one column of bound values in wire layout: a values
//! section, a parallel length array, and a NULL bitmap. Buffers are moved
//! into the statement session when bound; clone one to bind it again.

use crate::col::ColumnMeta;
use crate::constant::{DataType, Precision};
use crate::error::{Error, Result};
use crate::protocol::block::{ColumnSection, encode_block};
use crate::protocol::primitive::*;
use crate::value::{NullBitmap, Timestamp, Value, set_null_bit};

/// Trait for encoding a single bound value
///
/// # Examples
/// - `42i32` into an INT column
/// - `"California.LosAngeles"` into an NCHAR column
/// - `None::<i64>` as NULL
pub trait Param {
    /// Returns true if this parameter is NULL
    fn is_null(&self) -> bool {
        false
    }

    /// Whether this value can be stored in a column of `data_type`
    fn accepts(&self, data_type: DataType) -> bool;

    /// Encode the value bytes
    ///
    /// Only called if `is_null()` returns false.
    fn encode_value(&self, out: &mut Vec<u8>) -> Result<()>;
}

macro_rules! impl_param_scalar {
    ($ty:ty, $variant:ident, $($accepted:ident)|+) => {
        impl Param for $ty {
            fn accepts(&self, data_type: DataType) -> bool {
                matches!(data_type, $(DataType::$accepted)|+)
            }

            fn encode_value(&self, out: &mut Vec<u8>) -> Result<()> {
                Value::$variant(*self).encode(out);
                Ok(())
            }
        }
    };
}

impl_param_scalar!(bool, Bool, Bool);
impl_param_scalar!(i8, TinyInt, TinyInt);
impl_param_scalar!(i16, SmallInt, SmallInt);
impl_param_scalar!(i32, Int, Int);
// Raw i64 binds to TIMESTAMP in the database's precision
impl_param_scalar!(i64, BigInt, BigInt | Timestamp);
impl_param_scalar!(u8, UTinyInt, UTinyInt);
impl_param_scalar!(u16, USmallInt, USmallInt);
impl_param_scalar!(u32, UInt, UInt);
impl_param_scalar!(u64, UBigInt, UBigInt);
impl_param_scalar!(f32, Float, Float);
impl_param_scalar!(f64, Double, Double);
impl_param_scalar!(Timestamp, Timestamp, Timestamp);

impl Param for &str {
    fn accepts(&self, data_type: DataType) -> bool {
        data_type.is_text() || data_type == DataType::VarBinary
    }

    fn encode_value(&self, out: &mut Vec<u8>) -> Result<()> {
        write_bytes_fix(out, self.as_bytes());
        Ok(())
    }
}

impl Param for String {
    fn accepts(&self, data_type: DataType) -> bool {
        self.as_str().accepts(data_type)
    }

    fn encode_value(&self, out: &mut Vec<u8>) -> Result<()> {
        self.as_str().encode_value(out)
    }
}

impl Param for &[u8] {
    fn accepts(&self, data_type: DataType) -> bool {
        matches!(
            data_type,
            DataType::Binary | DataType::VarBinary | DataType::Geometry
        )
    }

    fn encode_value(&self, out: &mut Vec<u8>) -> Result<()> {
        write_bytes_fix(out, self);
        Ok(())
    }
}

impl Param for Vec<u8> {
    fn accepts(&self, data_type: DataType) -> bool {
        self.as_slice().accepts(data_type)
    }

    fn encode_value(&self, out: &mut Vec<u8>) -> Result<()> {
        self.as_slice().encode_value(out)
    }
}

impl Param for Value<'_> {
    fn is_null(&self) -> bool {
        Value::is_null(self)
    }

    fn accepts(&self, data_type: DataType) -> bool {
        match self {
            Value::Binary(v) => v.accepts(data_type),
            Value::NChar(v) | Value::Json(v) => v.accepts(data_type),
            Value::BigInt(_) => data_type == DataType::BigInt || data_type == DataType::Timestamp,
            other => other.data_type() == data_type,
        }
    }

    fn encode_value(&self, out: &mut Vec<u8>) -> Result<()> {
        self.encode(out);
        Ok(())
    }
}

impl<T: Param> Param for Option<T> {
    fn is_null(&self) -> bool {
        match self {
            Some(value) => value.is_null(),
            None => true,
        }
    }

    fn accepts(&self, data_type: DataType) -> bool {
        match self {
            Some(value) => value.accepts(data_type),
            None => true,
        }
    }

    fn encode_value(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Some(value) => value.encode_value(out),
            None => Ok(()),
        }
    }
}

/// One column of bound values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindBuffer {
    data_type: DataType,
    width: u32,
    ordinal: u16,
    values: Vec<u8>,
    lengths: Vec<u32>,
    nulls: Vec<u8>,
    rows: usize,
}

impl BindBuffer {
    /// Create an empty buffer for column `ordinal`
    ///
    /// `width` must equal the type's fixed width for fixed types; for
    /// variable types it is the declared maximum (`nchar(30)` is 30), or 0
    /// for no client-side limit.
    pub fn new(data_type: DataType, width: u32, ordinal: u16) -> Result<Self> {
        if data_type == DataType::Null {
            return Err(Error::BadUsageError("cannot bind a NULL-typed column".into()));
        }
        if let Some(fixed) = data_type.fixed_width()
            && fixed != width as usize
        {
            return Err(Error::BadUsageError(format!(
                "{data_type:?} has width {fixed}, got {width}"
            )));
        }
        Ok(Self {
            data_type,
            width,
            ordinal,
            values: Vec::new(),
            lengths: Vec::new(),
            nulls: Vec::new(),
            rows: 0,
        })
    }

    /// Create a buffer for a fixed-width type
    pub fn fixed(data_type: DataType, ordinal: u16) -> Result<Self> {
        let width = data_type.fixed_width().ok_or_else(|| {
            Error::BadUsageError(format!("{data_type:?} is variable width, declare a width"))
        })?;
        Self::new(data_type, width as u32, ordinal)
    }

    /// Build a buffer from a sequence of values
    pub fn from_values<P, I>(data_type: DataType, width: u32, ordinal: u16, values: I) -> Result<Self>
    where
        P: Param,
        I: IntoIterator<Item = P>,
    {
        let mut buffer = Self::new(data_type, width, ordinal)?;
        for value in values {
            buffer.push(value)?;
        }
        Ok(buffer)
    }

    /// TIMESTAMP column of raw values in the database precision
    pub fn timestamps<I>(ordinal: u16, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = Option<i64>>,
    {
        Self::from_values(DataType::Timestamp, 8, ordinal, values)
    }

    /// INT column
    pub fn ints<I>(ordinal: u16, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = Option<i32>>,
    {
        Self::from_values(DataType::Int, 4, ordinal, values)
    }

    /// NCHAR column with a declared maximum byte width
    pub fn nchars<S, I>(ordinal: u16, width: u32, values: I) -> Result<Self>
    where
        S: AsRef<str>,
        I: IntoIterator<Item = Option<S>>,
    {
        let mut buffer = Self::new(DataType::NChar, width, ordinal)?;
        for value in values {
            match value {
                Some(s) => buffer.push(s.as_ref())?,
                None => buffer.push_null(),
            }
        }
        Ok(buffer)
    }

    /// Append one value
    ///
    /// On error the buffer is left unchanged.
    pub fn push<P: Param>(&mut self, value: P) -> Result<()> {
        if value.is_null() {
            self.push_null();
            return Ok(());
        }
        if !value.accepts(self.data_type) {
            return Err(Error::BadUsageError(format!(
                "{} cannot be bound to a {:?} column",
                std::any::type_name::<P>(),
                self.data_type
            )));
        }

        let start = self.values.len();
        if let Err(e) = value.encode_value(&mut self.values) {
            self.values.truncate(start);
            return Err(e);
        }
        let len = self.values.len() - start;

        let fits = match self.data_type.fixed_width() {
            Some(fixed) => len == fixed,
            None => self.width == 0 || len <= self.width as usize,
        };
        if !fits {
            self.values.truncate(start);
            return Err(Error::BadUsageError(format!(
                "{} byte value exceeds the declared width {} of column {}",
                len, self.width, self.ordinal
            )));
        }

        self.lengths.push(len_u32(len)?);
        self.grow_rows();
        Ok(())
    }

    /// Append a NULL
    ///
    /// Fixed-width columns still reserve `width` zero bytes for the row.
    pub fn push_null(&mut self) {
        match self.data_type.fixed_width() {
            Some(fixed) => {
                self.values.resize(self.values.len() + fixed, 0);
                self.lengths.push(fixed as u32);
            }
            None => self.lengths.push(0),
        }
        let row = self.rows;
        self.grow_rows();
        set_null_bit(&mut self.nulls, row);
    }

    fn grow_rows(&mut self) {
        self.rows += 1;
        self.nulls.resize(NullBitmap::len_for(self.rows), 0);
    }

    /// Drop all rows, keeping type, width, ordinal, and allocations
    pub fn clear(&mut self) {
        self.values.clear();
        self.lengths.clear();
        self.nulls.clear();
        self.rows = 0;
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn ordinal(&self) -> u16 {
        self.ordinal
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    /// Per-row byte lengths (`width` for fixed types, 0 for NULL variable rows)
    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }

    pub fn null_bitmap(&self) -> NullBitmap<'_> {
        NullBitmap::new(&self.nulls)
    }

    /// Result column metadata this buffer decodes against
    pub fn column_meta(&self, precision: Precision) -> ColumnMeta {
        ColumnMeta::new(format!("c{}", self.ordinal), self.data_type, precision)
            .with_width(self.width)
    }

    fn section(&self) -> ColumnSection<'_> {
        ColumnSection {
            data_type: self.data_type,
            values: &self.values,
            lengths: &self.lengths,
            nulls: &self.nulls,
        }
    }
}

/// Row count shared by every buffer, checking they agree
pub fn common_rows(buffers: &[BindBuffer]) -> Result<usize> {
    let Some(first) = buffers.first() else {
        return Err(Error::BadUsageError("no columns bound".into()));
    };
    if let Some(other) = buffers.iter().find(|b| b.rows != first.rows) {
        return Err(Error::BadUsageError(format!(
            "column {} has {} rows, column {} has {}",
            first.ordinal, first.rows, other.ordinal, other.rows
        )));
    }
    Ok(first.rows)
}

/// Encode bound columns as one columnar block
pub fn encode_bind_buffers(buffers: &[BindBuffer]) -> Result<Vec<u8>> {
    let rows = common_rows(buffers)?;
    let sections: Vec<ColumnSection<'_>> = buffers.iter().map(BindBuffer::section).collect();
    let capacity = 8 + buffers
        .iter()
        .map(|b| b.values.len() + b.lengths.len() * 4 + b.nulls.len())
        .sum::<usize>();
    let mut out = Vec::with_capacity(capacity);
    encode_block(&mut out, rows, &sections)?;
    Ok(out)
}

/// Type tag, element width, and ordinal of one bound column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub data_type: DataType,
    pub width: u32,
    pub ordinal: u16,
}

impl ColumnDescriptor {
    pub fn column_meta(&self, precision: Precision) -> ColumnMeta {
        ColumnMeta::new(format!("c{}", self.ordinal), self.data_type, precision)
            .with_width(self.width)
    }
}

/// Write `count u16` then `type u8 | width u32 | ordinal u16` per buffer
pub fn write_column_descriptors(out: &mut Vec<u8>, buffers: &[BindBuffer]) -> Result<()> {
    let count = u16::try_from(buffers.len())
        .map_err(|_| Error::BadUsageError(format!("{} columns bound", buffers.len())))?;
    write_int_2(out, count);
    for buffer in buffers {
        write_int_1(out, buffer.data_type as u8);
        write_int_4(out, buffer.width);
        write_int_2(out, buffer.ordinal);
    }
    Ok(())
}

/// Read column descriptors written by `write_column_descriptors`
pub fn read_column_descriptors(data: &[u8]) -> Result<(Vec<ColumnDescriptor>, &[u8])> {
    let (count, mut rest) = read_int_2(data)?;
    let mut descriptors = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (tag, r) = read_int_1(rest)?;
        let data_type = DataType::from_u8(tag)
            .ok_or_else(|| Error::MalformedFrame(format!("unknown data type {tag}")))?;
        let (width, r) = read_int_4(r)?;
        let (ordinal, r) = read_int_2(r)?;
        rest = r;
        descriptors.push(ColumnDescriptor {
            data_type,
            width,
            ordinal,
        });
    }
    Ok((descriptors, rest))
}

#[cfg(test)]
#[path = "bind_test.rs"]
mod bind_test;
