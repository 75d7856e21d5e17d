//! # tstack-backend
//!
//! Operator-side building blocks: the shape policy shared by binary
//! element-wise operators, the [`ElementWiseReduce`] operator trait that
//! routes each call to a specialised kernel, and host reference kernels.

pub mod broadcast;
pub mod cpu;
pub mod element_wise;

pub use broadcast::{collapse, is_bias, is_scalar, plan, reduce, DispatchPath, DispatchPlan};
pub use cpu::{Arith, BinaryOp, CpuBinary};
pub use element_wise::ElementWiseReduce;
