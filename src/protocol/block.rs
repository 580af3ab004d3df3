//! Columnar block codec.
//!
//! Layout (all integers little-endian):
//! ```text
//! rows u32 | columns u32 | column*
//! fixed width:    values[rows * width]           | null_bitmap[ceil(rows / 8)]
//! variable width: lengths[rows * u32] | values   | null_bitmap[ceil(rows / 8)]
//! ```
//! Result blocks and bind payloads share this layout.

use crate::col::ColumnMeta;
use crate::constant::{DataType, Precision};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use crate::value::{NullBitmap, Value};

/// One decoded column of a block
#[derive(Debug, Clone)]
pub struct ColumnData {
    data_type: DataType,
    precision: Precision,
    width: usize,
    values: Vec<u8>,
    /// `rows + 1` offsets into `values` for variable-width columns, empty otherwise
    offsets: Vec<usize>,
    nulls: Vec<u8>,
}

impl ColumnData {
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn null_bitmap(&self) -> NullBitmap<'_> {
        NullBitmap::new(&self.nulls)
    }

    /// Raw bytes of one element, `None` when out of range
    pub fn raw(&self, row: usize) -> Option<&[u8]> {
        if self.offsets.is_empty() {
            let start = row.checked_mul(self.width)?;
            self.values.get(start..start.checked_add(self.width)?)
        } else {
            let start = *self.offsets.get(row)?;
            let end = *self.offsets.get(row + 1)?;
            self.values.get(start..end)
        }
    }

    /// Decode one element; a set NULL bit wins over the value bytes
    pub fn value(&self, row: usize) -> Result<Value<'_>> {
        if self.null_bitmap().is_null(row) {
            return Ok(Value::Null);
        }
        let raw = self
            .raw(row)
            .ok_or_else(|| Error::BadUsageError(format!("row {row} out of range")))?;
        Value::decode(self.data_type, self.precision, raw)
    }
}

/// A decoded block of rows, column by column
#[derive(Debug, Clone)]
pub struct ResultBlock {
    rows: usize,
    columns: Vec<ColumnData>,
}

impl ResultBlock {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnData> {
        self.columns.get(index)
    }

    pub fn is_null(&self, row: usize, col: usize) -> bool {
        self.columns
            .get(col)
            .is_some_and(|column| column.null_bitmap().is_null(row))
    }

    /// Decode the value at (`row`, `col`)
    pub fn value(&self, row: usize, col: usize) -> Result<Value<'_>> {
        if row >= self.rows {
            return Err(Error::BadUsageError(format!(
                "row {} out of range ({} rows)",
                row, self.rows
            )));
        }
        let column = self.columns.get(col).ok_or_else(|| {
            Error::BadUsageError(format!(
                "column {} out of range ({} columns)",
                col,
                self.columns.len()
            ))
        })?;
        column.value(row)
    }
}

/// Decode a block against the result schema
///
/// Never reads past `data`; any shortfall, count mismatch, or trailing byte
/// is `MalformedFrame`.
pub fn decode_block(schema: &[ColumnMeta], data: &[u8]) -> Result<ResultBlock> {
    let (rows, rest) = read_int_4(data)?;
    let (num_columns, mut rest) = read_int_4(rest)?;
    if num_columns as usize != schema.len() {
        return Err(Error::MalformedFrame(format!(
            "block has {} columns, schema has {}",
            num_columns,
            schema.len()
        )));
    }

    let rows = rows as usize;
    let bitmap_len = NullBitmap::len_for(rows);
    let mut columns = Vec::with_capacity(schema.len());

    for meta in schema {
        let (values, offsets, width, after_values) = match meta.data_type.fixed_width() {
            Some(width) => {
                let size = rows
                    .checked_mul(width)
                    .ok_or_else(|| Error::malformed("fixed column size overflows"))?;
                let (values, after) = read_string_fix(rest, size)?;
                (values, Vec::new(), width, after)
            }
            None => {
                let table_size = rows
                    .checked_mul(4)
                    .ok_or_else(|| Error::malformed("length table size overflows"))?;
                let (table, after_table) = read_string_fix(rest, table_size)?;

                let mut offsets = Vec::with_capacity(rows + 1);
                let mut total = 0usize;
                offsets.push(0);
                for chunk in table.chunks_exact(4) {
                    let (len, _) = read_int_4(chunk)?;
                    total = total
                        .checked_add(len as usize)
                        .ok_or_else(|| Error::malformed("variable column size overflows"))?;
                    offsets.push(total);
                }
                let (values, after) = read_string_fix(after_table, total)?;
                (values, offsets, 0, after)
            }
        };
        let (nulls, after_nulls) = read_string_fix(after_values, bitmap_len)?;
        rest = after_nulls;

        columns.push(ColumnData {
            data_type: meta.data_type,
            precision: meta.precision,
            width,
            values: values.to_vec(),
            offsets,
            nulls: nulls.to_vec(),
        });
    }

    if !rest.is_empty() {
        return Err(Error::MalformedFrame(format!(
            "{} trailing bytes after block",
            rest.len()
        )));
    }

    Ok(ResultBlock { rows, columns })
}

/// One column section to encode
pub(crate) struct ColumnSection<'a> {
    pub data_type: DataType,
    pub values: &'a [u8],
    pub lengths: &'a [u32],
    pub nulls: &'a [u8],
}

/// Encode column sections that all hold `rows` rows
pub(crate) fn encode_block(out: &mut Vec<u8>, rows: usize, sections: &[ColumnSection<'_>]) -> Result<()> {
    write_int_4(out, len_u32(rows)?);
    write_int_4(out, len_u32(sections.len())?);
    for section in sections {
        if section.data_type.is_var_width() {
            for &len in section.lengths {
                write_int_4(out, len);
            }
        }
        write_bytes_fix(out, section.values);
        write_bytes_fix(out, section.nulls);
    }
    Ok(())
}

#[cfg(test)]
#[path = "block_test.rs"]
mod block_test;
