use crate::constant::{DataType, Precision};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

/// Column metadata of a query result
///
/// Produced once per query from the schema reply and shared read-only by
/// every block of that result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: DataType,
    /// Element width for fixed types; declared maximum for variable types
    pub width: u32,
    pub nullable: bool,
    /// Unit of timestamp values in this column
    pub precision: Precision,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: DataType, precision: Precision) -> Self {
        let width = data_type.fixed_width().unwrap_or(0) as u32;
        Self {
            name: name.into(),
            data_type,
            width,
            nullable: true,
            precision,
        }
    }

    /// Override the declared width, e.g. `nchar(64)`
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn is_var_width(&self) -> bool {
        self.data_type.is_var_width()
    }

    /// Parse one field entry: `type u8 | nullable u8 | width u32 | name_len u16 | name`
    pub fn read(data: &[u8], precision: Precision) -> Result<(Self, &[u8])> {
        let (type_tag, rest) = read_int_1(data)?;
        let data_type = DataType::from_u8(type_tag)
            .ok_or_else(|| Error::MalformedFrame(format!("unknown data type {type_tag}")))?;
        let (nullable, rest) = read_int_1(rest)?;
        let (width, rest) = read_int_4(rest)?;
        let (name, rest) = read_string_len2(rest)?;

        if let Some(fixed) = data_type.fixed_width()
            && fixed != width as usize
        {
            return Err(Error::MalformedFrame(format!(
                "{data_type:?} column declares width {width}, expected {fixed}"
            )));
        }

        let meta = Self {
            name: String::from_utf8_lossy(name).into_owned(),
            data_type,
            width,
            nullable: nullable != 0,
            precision,
        };
        Ok((meta, rest))
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        write_int_1(out, self.data_type as u8);
        write_int_1(out, self.nullable as u8);
        write_int_4(out, self.width);
        write_string_len2(out, self.name.as_bytes())
    }
}
