use thiserror::Error;

use crate::{DType, Device};

#[derive(Error, Debug)]
pub enum TsError {
    #[error("Cannot allocate {bytes} bytes on {device}")]
    AllocationFailure { device: Device, bytes: usize },

    #[error("Memory of {available} bytes cannot hold {required} bytes")]
    InsufficientMemory { required: usize, available: usize },

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Shape {dims:?} has an extent or rank beyond the u32 wire limit")]
    ShapeOverflow { dims: Vec<usize> },

    #[error("Index {index} out of range({len})")]
    OutOfRange { index: usize, len: usize },

    #[error("Context <{0}> needed, but not given")]
    ContextMissing(&'static str),

    #[error("Corrupt format: {0}")]
    CorruptFormat(String),

    #[error("DType mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    #[error("Device mismatch: expected {expected}, got {got}")]
    DeviceMismatch { expected: Device, got: Device },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operation not supported for dtype {0}")]
    UnsupportedDType(DType),

    #[error("Integer division by zero")]
    DivisionByZero,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TsError {
    /// Stream read failure; a short read means the stream is truncated.
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            TsError::CorruptFormat("unexpected end of stream".into())
        } else {
            TsError::Io(err)
        }
    }
}
