use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TsError;

/// Element types. Discriminants are the on-wire dtype codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DType {
    #[default]
    Void = 0,
    Int8 = 1,
    UInt8 = 2,
    Int16 = 3,
    UInt16 = 4,
    Int32 = 5,
    UInt32 = 6,
    Int64 = 7,
    UInt64 = 8,
    Float16 = 9,
    Float32 = 10,
    Float64 = 11,
    /// Opaque pointer-sized value, always 8 bytes.
    Ptr = 12,
    Char8 = 13,
    Char16 = 14,
    Char32 = 15,
    Unknown8 = 16,
    Unknown16 = 17,
    Unknown32 = 18,
    Unknown64 = 19,
    Unknown128 = 20,
}

impl DType {
    const ALL: [DType; 21] = [
        DType::Void,
        DType::Int8,
        DType::UInt8,
        DType::Int16,
        DType::UInt16,
        DType::Int32,
        DType::UInt32,
        DType::Int64,
        DType::UInt64,
        DType::Float16,
        DType::Float32,
        DType::Float64,
        DType::Ptr,
        DType::Char8,
        DType::Char16,
        DType::Char32,
        DType::Unknown8,
        DType::Unknown16,
        DType::Unknown32,
        DType::Unknown64,
        DType::Unknown128,
    ];

    /// Size in bytes of a single element.
    pub fn type_bytes(&self) -> usize {
        match self {
            DType::Void => 0,
            DType::Int8 | DType::UInt8 | DType::Char8 | DType::Unknown8 => 1,
            DType::Int16 | DType::UInt16 | DType::Float16 | DType::Char16 | DType::Unknown16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 | DType::Char32 | DType::Unknown32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 | DType::Ptr | DType::Unknown64 => 8,
            DType::Unknown128 => 16,
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float16 | DType::Float32 | DType::Float64)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DType::Int8
                | DType::UInt8
                | DType::Int16
                | DType::UInt16
                | DType::Int32
                | DType::UInt32
                | DType::Int64
                | DType::UInt64
        )
    }
}

impl TryFrom<u8> for DType {
    type Error = TsError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        DType::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| TsError::CorruptFormat(format!("dtype code {code} out of range")))
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Void => "void",
            DType::Int8 => "int8",
            DType::UInt8 => "uint8",
            DType::Int16 => "int16",
            DType::UInt16 => "uint16",
            DType::Int32 => "int32",
            DType::UInt32 => "uint32",
            DType::Int64 => "int64",
            DType::UInt64 => "uint64",
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Ptr => "ptr",
            DType::Char8 => "char8",
            DType::Char16 => "char16",
            DType::Char32 => "char32",
            DType::Unknown8 => "unknown8",
            DType::Unknown16 => "unknown16",
            DType::Unknown32 => "unknown32",
            DType::Unknown64 => "unknown64",
            DType::Unknown128 => "unknown128",
        };
        f.write_str(name)
    }
}
