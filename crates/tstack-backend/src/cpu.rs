//! Host reference kernels for binary arithmetic.

use tstack_core::{DType, Device, Element, Result, Shape, Tensor, TsError};

use crate::broadcast::{collapse, reduce, DispatchPath};
use crate::element_wise::ElementWiseReduce;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        }
    }
}

/// Element types the reference kernels compute on.
pub trait Arith: Element {
    /// `None` when the result is undefined for the type.
    fn apply(op: BinaryOp, a: Self, b: Self) -> Option<Self>;
}

macro_rules! impl_arith_float {
    ($($ty:ty),*) => {
        $(
            impl Arith for $ty {
                fn apply(op: BinaryOp, a: Self, b: Self) -> Option<Self> {
                    Some(match op {
                        BinaryOp::Add => a + b,
                        BinaryOp::Sub => a - b,
                        BinaryOp::Mul => a * b,
                        BinaryOp::Div => a / b,
                    })
                }
            }
        )*
    };
}

impl_arith_float!(f32, f64);

impl Arith for i32 {
    fn apply(op: BinaryOp, a: Self, b: Self) -> Option<Self> {
        match op {
            BinaryOp::Add => Some(a.wrapping_add(b)),
            BinaryOp::Sub => Some(a.wrapping_sub(b)),
            BinaryOp::Mul => Some(a.wrapping_mul(b)),
            BinaryOp::Div if b == 0 => None,
            BinaryOp::Div => Some(a.wrapping_div(b)),
        }
    }
}

/// Binary arithmetic on host memory for FLOAT32, FLOAT64 and INT32.
///
/// Integer arithmetic wraps on overflow; integer division by zero fails.
#[derive(Debug, Clone, Copy)]
pub struct CpuBinary {
    op: BinaryOp,
}

impl CpuBinary {
    pub fn new(op: BinaryOp) -> Self {
        Self { op }
    }

    pub fn add() -> Self {
        Self::new(BinaryOp::Add)
    }

    pub fn sub() -> Self {
        Self::new(BinaryOp::Sub)
    }

    pub fn mul() -> Self {
        Self::new(BinaryOp::Mul)
    }

    pub fn div() -> Self {
        Self::new(BinaryOp::Div)
    }

    pub fn op(&self) -> BinaryOp {
        self.op
    }

    fn compute(&self, lhs: &Tensor, rhs: &Tensor, out: &Tensor, path: DispatchPath) -> Result<()> {
        match lhs.dtype() {
            DType::Float32 => self.typed::<f32>(lhs, rhs, out, path),
            DType::Float64 => self.typed::<f64>(lhs, rhs, out, path),
            DType::Int32 => self.typed::<i32>(lhs, rhs, out, path),
            other => Err(TsError::UnsupportedDType(other)),
        }
    }

    fn typed<T: Arith>(
        &self,
        lhs: &Tensor,
        rhs: &Tensor,
        out: &Tensor,
        path: DispatchPath,
    ) -> Result<()> {
        let a = lhs.to_vec::<T>()?;
        let b = rhs.to_vec::<T>()?;
        let op = self.op;

        let result: Option<Vec<T>> = match path {
            DispatchPath::SameShape => {
                if a.len() != b.len() {
                    return Err(shape_mismatch(lhs, rhs));
                }
                a.iter().zip(&b).map(|(&x, &y)| T::apply(op, x, y)).collect()
            }
            DispatchPath::Scalar => {
                let &[y] = b.as_slice() else {
                    return Err(shape_mismatch(lhs, rhs));
                };
                a.iter().map(|&x| T::apply(op, x, y)).collect()
            }
            DispatchPath::Bias(dim) => {
                let dims = lhs.sizes();
                if dim >= dims.len() || b.len() != dims[dim] {
                    return Err(shape_mismatch(lhs, rhs));
                }
                let inner: usize = dims[dim + 1..].iter().product();
                a.iter()
                    .enumerate()
                    .map(|(i, &x)| T::apply(op, x, b[(i / inner) % b.len()]))
                    .collect()
            }
            DispatchPath::Broadcast => {
                let (l, r, o, _) = reduce(lhs.shape(), rhs.shape(), true)?;
                broadcast(op, &a, &b, &l, &r, &o)
            }
        };

        let result = result.ok_or(TsError::DivisionByZero)?;
        out.copy_from_slice(&result)
    }
}

impl ElementWiseReduce for CpuBinary {
    fn name(&self) -> &'static str {
        self.op.name()
    }

    fn memory_device(&self) -> Device {
        Device::cpu()
    }

    fn reduce_with_broadcast(&self, lhs: &Tensor, rhs: &Tensor, out: &mut Tensor) -> Result<()> {
        self.compute(lhs, rhs, out, DispatchPath::Broadcast)
    }

    fn reduce_with_same_shape(&self, lhs: &Tensor, rhs: &Tensor, out: &mut Tensor) -> Result<()> {
        self.compute(lhs, rhs, out, DispatchPath::SameShape)
    }

    fn reduce_with_bias(
        &self,
        lhs: &Tensor,
        rhs: &Tensor,
        out: &mut Tensor,
        dim: usize,
    ) -> Result<()> {
        self.compute(lhs, rhs, out, DispatchPath::Bias(dim))
    }

    fn reduce_with_scalar(&self, lhs: &Tensor, rhs: &Tensor, out: &mut Tensor) -> Result<()> {
        self.compute(lhs, rhs, out, DispatchPath::Scalar)
    }
}

fn shape_mismatch(lhs: &Tensor, rhs: &Tensor) -> TsError {
    TsError::ShapeMismatch {
        expected: lhs.sizes().to_vec(),
        got: rhs.sizes().to_vec(),
    }
}

/// Element strides of `shape` inside `out`; broadcast axes get stride 0.
fn broadcast_strides(shape: &Shape, out: &Shape) -> Vec<usize> {
    shape
        .contiguous_strides()
        .iter()
        .zip(shape.dims().iter().zip(out.dims()))
        .map(|(&stride, (&d, &o))| if d == o { stride } else { 0 })
        .collect()
}

fn broadcast<T: Arith>(
    op: BinaryOp,
    a: &[T],
    b: &[T],
    lhs: &Shape,
    rhs: &Shape,
    out: &Shape,
) -> Option<Vec<T>> {
    let (lhs, rhs, out) = collapse(lhs, rhs, out);
    let lhs_strides = broadcast_strides(&lhs, &out);
    let rhs_strides = broadcast_strides(&rhs, &out);
    let dims = out.dims();

    let count = out.numel();
    let mut result = Vec::with_capacity(count);
    let mut index = vec![0usize; dims.len()];
    let (mut ia, mut ib) = (0usize, 0usize);
    for _ in 0..count {
        result.push(T::apply(op, a[ia], b[ib])?);
        // odometer step over the output index
        for axis in (0..dims.len()).rev() {
            index[axis] += 1;
            ia += lhs_strides[axis];
            ib += rhs_strides[axis];
            if index[axis] < dims[axis] {
                break;
            }
            ia -= lhs_strides[axis] * dims[axis];
            ib -= rhs_strides[axis] * dims[axis];
            index[axis] = 0;
        }
    }
    Some(result)
}
