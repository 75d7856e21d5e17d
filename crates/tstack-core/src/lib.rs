//! # tstack-core
//!
//! Value and ownership model of the tstack inference engine: devices,
//! element types, prototypes, device-bound memory, allocation controllers
//! and multi-field tensors, plus the tensor binary format.

pub mod config;
pub mod controller;
pub mod device;
pub mod dtype;
pub mod element;
pub mod error;
pub mod memory;
pub mod prototype;
pub mod serialization;
pub mod shape;
pub mod tensor;

pub use config::{AllocPolicy, MemoryConfig};
pub use controller::{
    DynamicMemoryController, MemoryController, PoolMemoryController, PoolStats, SharedController,
};
pub use device::{Device, DeviceKind};
pub use dtype::DType;
pub use element::Element;
pub use error::TsError;
pub use memory::{memcpy, memcpy_bytes, Memory};
pub use prototype::Prototype;
pub use shape::{Extents, Shape};
pub use tensor::Tensor;

pub type Result<T> = std::result::Result<T, TsError>;
