//! Shape policy for binary element-wise operators.
//!
//! Operands are right-aligned and the shorter one is padded with leading
//! 1s. Each aligned pair must be equal or contain a 1; the output takes the
//! larger extent. [`plan`] then picks the cheapest kernel path for the
//! padded shapes.

use smallvec::SmallVec;
use tracing::trace;
use tstack_core::{Result, Shape, Tensor, TsError};

/// True iff the shape holds exactly one element, whatever its rank.
pub fn is_scalar(shape: &Shape) -> bool {
    shape.numel() == 1
}

/// Detects `rhs` as a bias along one axis of `lhs` and returns that axis.
///
/// `rhs` qualifies when it has exactly one non-unit extent and that extent
/// equals `lhs[dim]`. A rank-1 `rhs` is matched against `lhs` from the last
/// axis backwards and the first equal extent wins. Any other `rhs` is
/// right-aligned to `lhs` and `dim` is the position of its non-unit extent.
pub fn is_bias(lhs: &Shape, rhs: &Shape) -> Option<usize> {
    if rhs.ndim() > lhs.ndim() || rhs.ndim() == 0 {
        return None;
    }
    if rhs.ndim() == 1 {
        let extent = rhs.dims()[0];
        if extent == 1 {
            return None;
        }
        return lhs.dims().iter().rposition(|&d| d == extent);
    }

    let padded = rhs.pad_front(lhs.ndim());
    let mut non_unit = padded.dims().iter().enumerate().filter(|&(_, &d)| d != 1);
    let (dim, &extent) = non_unit.next()?;
    if non_unit.next().is_some() || lhs.dims()[dim] != extent {
        return None;
    }
    Some(dim)
}

/// Aligns `lhs` and `rhs` and computes the output shape.
///
/// Returns `(lhs', rhs', out, broadcasted)` where the first three share one
/// rank and `broadcasted` tells whether any aligned pair differed. With
/// `broadcast` off every aligned pair must match exactly.
pub fn reduce(lhs: &Shape, rhs: &Shape, broadcast: bool) -> Result<(Shape, Shape, Shape, bool)> {
    let rank = lhs.ndim().max(rhs.ndim());
    let lhs_padded = lhs.pad_front(rank);
    let rhs_padded = rhs.pad_front(rank);
    let mismatch = || TsError::ShapeMismatch {
        expected: lhs.dims().to_vec(),
        got: rhs.dims().to_vec(),
    };

    let mut out = SmallVec::<[usize; 4]>::with_capacity(rank);
    let mut broadcasted = false;
    for (&a, &b) in lhs_padded.dims().iter().zip(rhs_padded.dims()) {
        if a == b {
            out.push(a);
            continue;
        }
        if !broadcast || (a != 1 && b != 1) {
            return Err(mismatch());
        }
        broadcasted = true;
        out.push(if a == 1 { b } else { a });
    }
    Ok((lhs_padded, rhs_padded, Shape::new(&out), broadcasted))
}

/// Merges adjacent axes that broadcast the same way.
///
/// All three shapes must share one rank, as returned by [`reduce`]. Axes
/// where the output extent is 1 are dropped. The element order of every
/// operand is unchanged, so a kernel may run on the collapsed shapes
/// directly. The result always has rank at least 1.
pub fn collapse(lhs: &Shape, rhs: &Shape, out: &Shape) -> (Shape, Shape, Shape) {
    let mut l = SmallVec::<[usize; 4]>::new();
    let mut r = SmallVec::<[usize; 4]>::new();
    let mut o = SmallVec::<[usize; 4]>::new();
    let mut last: Option<(bool, bool)> = None;

    for ((&a, &b), &c) in lhs.dims().iter().zip(rhs.dims()).zip(out.dims()) {
        if c == 1 {
            continue;
        }
        let pattern = (a != c, b != c);
        if last == Some(pattern) {
            if let (Some(la), Some(rb), Some(oc)) = (l.last_mut(), r.last_mut(), o.last_mut()) {
                *la *= a;
                *rb *= b;
                *oc *= c;
            }
        } else {
            l.push(a);
            r.push(b);
            o.push(c);
            last = Some(pattern);
        }
    }
    if o.is_empty() {
        let unit = Shape::new(&[1]);
        return (unit.clone(), unit.clone(), unit);
    }
    (Shape::new(&l), Shape::new(&r), Shape::new(&o))
}

/// Kernel path for one binary element-wise call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPath {
    SameShape,
    Scalar,
    Bias(usize),
    Broadcast,
}

/// Padded operand shapes, output shape and the chosen path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub path: DispatchPath,
    pub lhs: Shape,
    pub rhs: Shape,
    pub out: Shape,
}

/// Chooses the kernel path for `lhs op rhs`.
///
/// Operands must agree on dtype and memory device; nothing is converted or
/// moved.
pub fn plan(lhs: &Tensor, rhs: &Tensor) -> Result<DispatchPlan> {
    if lhs.dtype() != rhs.dtype() {
        return Err(TsError::DTypeMismatch {
            expected: lhs.dtype(),
            got: rhs.dtype(),
        });
    }
    if lhs.device() != rhs.device() {
        return Err(TsError::DeviceMismatch {
            expected: lhs.device(),
            got: rhs.device(),
        });
    }

    let (lhs_shape, rhs_shape, out, broadcasted) = reduce(lhs.shape(), rhs.shape(), true)?;
    let path = if !broadcasted {
        DispatchPath::SameShape
    } else if is_scalar(&rhs_shape) {
        DispatchPath::Scalar
    } else if lhs_shape == out {
        is_bias(&lhs_shape, &rhs_shape).map_or(DispatchPath::Broadcast, DispatchPath::Bias)
    } else {
        DispatchPath::Broadcast
    };
    trace!(?path, lhs = %lhs_shape, rhs = %rhs_shape, out = %out, "dispatch planned");

    Ok(DispatchPlan {
        path,
        lhs: lhs_shape,
        rhs: rhs_shape,
        out,
    })
}
