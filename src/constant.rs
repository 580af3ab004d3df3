/// Request/response action codes
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Connect = 0x01,
    BinaryQuery = 0x06,
    Fetch = 0x07,
    FreeResult = 0x08,
    InsertLines = 0x09,
    StmtPrepare = 0x0a,
    StmtSetTags = 0x0b,
    StmtBind = 0x0c,
    StmtExec = 0x0d,
    StmtClose = 0x0e,
}

impl Action {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x01 => Some(Self::Connect),
            0x06 => Some(Self::BinaryQuery),
            0x07 => Some(Self::Fetch),
            0x08 => Some(Self::FreeResult),
            0x09 => Some(Self::InsertLines),
            0x0a => Some(Self::StmtPrepare),
            0x0b => Some(Self::StmtSetTags),
            0x0c => Some(Self::StmtBind),
            0x0d => Some(Self::StmtExec),
            0x0e => Some(Self::StmtClose),
            _ => None,
        }
    }
}

/// Status code of a successful reply
pub const CODE_SUCCESS: u32 = 0;

/// Version of the binary query meta layout
pub const BINARY_QUERY_VERSION: u16 = 1;

/// Version of the connect meta layout
pub const CONNECT_VERSION: u16 = 1;

/// Column data type tags
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Null = 0,
    Bool = 1,
    TinyInt = 2,
    SmallInt = 3,
    Int = 4,
    BigInt = 5,
    Float = 6,
    Double = 7,
    /// BINARY / VARCHAR
    Binary = 8,
    Timestamp = 9,
    NChar = 10,
    UTinyInt = 11,
    USmallInt = 12,
    UInt = 13,
    UBigInt = 14,
    Json = 15,
    VarBinary = 16,
    Geometry = 20,
}

impl DataType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Null),
            1 => Some(Self::Bool),
            2 => Some(Self::TinyInt),
            3 => Some(Self::SmallInt),
            4 => Some(Self::Int),
            5 => Some(Self::BigInt),
            6 => Some(Self::Float),
            7 => Some(Self::Double),
            8 => Some(Self::Binary),
            9 => Some(Self::Timestamp),
            10 => Some(Self::NChar),
            11 => Some(Self::UTinyInt),
            12 => Some(Self::USmallInt),
            13 => Some(Self::UInt),
            14 => Some(Self::UBigInt),
            15 => Some(Self::Json),
            16 => Some(Self::VarBinary),
            20 => Some(Self::Geometry),
            _ => None,
        }
    }

    /// Byte width of one value, or `None` for variable-width types
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Null => Some(0),
            Self::Bool | Self::TinyInt | Self::UTinyInt => Some(1),
            Self::SmallInt | Self::USmallInt => Some(2),
            Self::Int | Self::UInt | Self::Float => Some(4),
            Self::BigInt | Self::UBigInt | Self::Double | Self::Timestamp => Some(8),
            Self::Binary | Self::NChar | Self::Json | Self::VarBinary | Self::Geometry => None,
        }
    }

    pub fn is_var_width(self) -> bool {
        self.fixed_width().is_none()
    }

    /// Types whose payload is UTF-8 text
    pub fn is_text(self) -> bool {
        matches!(self, Self::Binary | Self::NChar | Self::Json)
    }
}

/// Resolution of a timestamp column's raw integer values
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Precision {
    #[default]
    Millisecond = 0,
    Microsecond = 1,
    Nanosecond = 2,
    Second = 3,
}

impl Precision {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Millisecond),
            1 => Some(Self::Microsecond),
            2 => Some(Self::Nanosecond),
            3 => Some(Self::Second),
            _ => None,
        }
    }

    /// Number of units in one second
    pub fn per_second(self) -> i64 {
        match self {
            Self::Second => 1,
            Self::Millisecond => 1_000,
            Self::Microsecond => 1_000_000,
            Self::Nanosecond => 1_000_000_000,
        }
    }
}

/// Schemaless text protocols
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemalessProtocol {
    Line = 1,
}

impl SchemalessProtocol {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Line),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "constant_test.rs"]
mod constant_test;
