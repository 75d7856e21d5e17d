use std::fmt;

use crate::{DType, Shape};

/// Element type plus shape, independent of any storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Prototype {
    dtype: DType,
    shape: Shape,
}

impl Prototype {
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Self {
        Self {
            dtype,
            shape: shape.into(),
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn sizes(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn dims(&self) -> usize {
        self.shape.ndim()
    }

    pub fn count(&self) -> usize {
        self.shape.numel()
    }

    pub fn type_bytes(&self) -> usize {
        self.dtype.type_bytes()
    }

    /// Bytes needed to hold every element.
    pub fn bytes(&self) -> usize {
        self.count() * self.type_bytes()
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)
    }
}
