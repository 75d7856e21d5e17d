use smallvec::SmallVec;
use std::fmt;
use std::iter;

/// Inline extent storage. Ranks up to 4 (NCHW) never touch the heap.
pub type Extents = SmallVec<[usize; 4]>;

/// Extents of one tensor field, outermost first.
///
/// A rank-0 shape describes a single element. A shape with any zero extent
/// describes no elements at all.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    extents: Extents,
}

impl Shape {
    pub fn new(dims: &[usize]) -> Self {
        dims.iter().copied().collect()
    }

    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn ndim(&self) -> usize {
        self.extents.len()
    }

    /// Element count; 1 for a rank-0 shape.
    pub fn numel(&self) -> usize {
        self.extents.iter().product()
    }

    /// Element count, or `None` if the product leaves `usize`.
    pub fn checked_numel(&self) -> Option<usize> {
        self.extents
            .iter()
            .try_fold(1usize, |count, &extent| count.checked_mul(extent))
    }

    pub fn dims(&self) -> &[usize] {
        &self.extents
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.extents.get(axis).copied()
    }

    pub fn is_rank0(&self) -> bool {
        self.extents.is_empty()
    }

    /// Row-major element strides; the innermost axis has stride 1.
    pub fn contiguous_strides(&self) -> Extents {
        let mut strides: Extents = self
            .extents
            .iter()
            .rev()
            .scan(1usize, |step, &extent| {
                let stride = *step;
                *step = step.saturating_mul(extent);
                Some(stride)
            })
            .collect();
        strides.reverse();
        strides
    }

    /// Prepends unit extents until the shape has `rank` axes. Shapes already
    /// at or above `rank` come back unchanged.
    pub fn pad_front(&self, rank: usize) -> Shape {
        let missing = rank.saturating_sub(self.ndim());
        iter::repeat(1)
            .take(missing)
            .chain(self.extents.iter().copied())
            .collect()
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shape").field(&self.dims()).finish()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let mut extents = self.extents.iter();
        if let Some(first) = extents.next() {
            write!(f, "{first}")?;
            for extent in extents {
                write!(f, ", {extent}")?;
            }
        }
        f.write_str("]")
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        dims.into_iter().collect()
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape {
            extents: Extents::from_vec(dims),
        }
    }
}

impl From<Extents> for Shape {
    fn from(extents: Extents) -> Self {
        Shape { extents }
    }
}

impl From<&Shape> for Vec<usize> {
    fn from(shape: &Shape) -> Self {
        shape.extents.to_vec()
    }
}

impl FromIterator<usize> for Shape {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Shape {
            extents: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel() {
        assert_eq!(Shape::scalar().numel(), 1);
        assert_eq!(Shape::from([2, 3, 4]).numel(), 24);
        assert_eq!(Shape::from([2, 0, 4]).numel(), 0);
    }

    #[test]
    fn test_checked_numel() {
        assert_eq!(Shape::scalar().checked_numel(), Some(1));
        assert_eq!(Shape::from([2, 3, 4]).checked_numel(), Some(24));
        assert_eq!(Shape::from([usize::MAX, 2]).checked_numel(), None);
        // overflow is reported before a trailing zero is reached
        assert_eq!(Shape::from([usize::MAX, 2, 0]).checked_numel(), None);
        assert_eq!(Shape::from([0, usize::MAX, 2]).checked_numel(), Some(0));
    }

    #[test]
    fn test_strides() {
        let s = Shape::from([2, 3, 4]);
        assert_eq!(s.contiguous_strides().as_slice(), &[12, 4, 1]);
        assert_eq!(Shape::from([5]).contiguous_strides().as_slice(), &[1]);
        assert!(Shape::scalar().contiguous_strides().is_empty());
    }

    #[test]
    fn test_pad_front() {
        assert_eq!(Shape::from([3]).pad_front(3), Shape::from([1, 1, 3]));
        assert_eq!(Shape::from([2, 3]).pad_front(1), Shape::from([2, 3]));
        assert_eq!(Shape::scalar().pad_front(2), Shape::from([1, 1]));
    }

    #[test]
    fn test_conversions_agree() {
        let expected = Shape::new(&[1, 3, 2, 2, 5]);
        assert_eq!(Shape::from(vec![1, 3, 2, 2, 5]), expected);
        assert_eq!(Shape::from([1usize, 3, 2, 2, 5].as_slice()), expected);
        assert_eq!(Shape::from(Extents::from_slice(&[1, 3, 2, 2, 5])), expected);
        assert_eq!(Vec::from(&expected), vec![1, 3, 2, 2, 5]);
        assert_eq!(expected.dim(4), Some(5));
        assert_eq!(expected.dim(5), None);
        assert!(Shape::new(&[]).is_rank0());
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::from([2, 3]).to_string(), "[2, 3]");
        assert_eq!(Shape::from([7]).to_string(), "[7]");
        assert_eq!(Shape::scalar().to_string(), "[]");
        assert_eq!(format!("{:?}", Shape::scalar()), "Shape([])");
        assert_eq!(format!("{:?}", Shape::from([2, 3])), "Shape([2, 3])");
    }
}
