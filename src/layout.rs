// src/layout.rs
//! Decomposition of a tensor shape into `[outer_size, num_classes, inner_size]`
//! around the softmax axis.

use crate::error::{KernelError, Result};

/// Flattened view of a row-major tensor around one axis.
///
/// Element `k` of work unit `idx` lives at `axis_offset(idx) + k * inner_size`.
/// Only built through [`AxisLayout::new`] or [`AxisLayout::from_shape`], so
/// `num_classes >= 1` and `len()` never overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisLayout {
    outer_size: usize,
    num_classes: usize,
    inner_size: usize,
}

impl AxisLayout {
    pub fn new(outer_size: usize, num_classes: usize, inner_size: usize) -> Result<Self> {
        if num_classes == 0 {
            return Err(KernelError::invalid("num_classes must be at least 1"));
        }
        outer_size
            .checked_mul(num_classes)
            .and_then(|n| n.checked_mul(inner_size))
            .ok_or_else(|| {
                KernelError::invalid(format!(
                    "shape [{outer_size}, {num_classes}, {inner_size}] overflows usize"
                ))
            })?;
        Ok(Self { outer_size, num_classes, inner_size })
    }

    /// Splits `shape` around `axis`. Negative axes count from the end.
    pub fn from_shape(shape: &[usize], axis: isize) -> Result<Self> {
        let axis = normalize_axis(shape.len(), axis)?;
        let product = |dims: &[usize]| {
            dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)).ok_or_else(|| {
                KernelError::invalid(format!("shape {shape:?} overflows usize"))
            })
        };
        let outer_size = product(&shape[..axis])?;
        let inner_size = product(&shape[axis + 1..])?;
        Self::new(outer_size, shape[axis], inner_size)
    }

    pub fn outer_size(&self) -> usize {
        self.outer_size
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn inner_size(&self) -> usize {
        self.inner_size
    }

    /// Number of independent `(outer, inner)` work units.
    pub fn num_work_units(&self) -> usize {
        self.outer_size * self.inner_size
    }

    /// Total element count of the flattened tensor.
    pub fn len(&self) -> usize {
        self.outer_size * self.num_classes * self.inner_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(outer, inner)` coordinates of work unit `index`.
    ///
    /// A layout with `inner_size == 0` has no work units; every index maps
    /// to `(index, 0)`.
    pub fn work_unit(&self, index: usize) -> (usize, usize) {
        match self.inner_size {
            0 => (index, 0),
            inner => (index / inner, index % inner),
        }
    }

    /// Flat offset of element 0 along the axis for work unit `index`.
    pub fn axis_offset(&self, index: usize) -> usize {
        let (outer, inner) = self.work_unit(index);
        outer * self.num_classes * self.inner_size + inner
    }
}

pub(crate) fn normalize_axis(ndim: usize, axis: isize) -> Result<usize> {
    if ndim == 0 {
        return Err(KernelError::invalid("softmax needs a tensor with at least one axis"));
    }
    let resolved = if axis < 0 { axis + ndim as isize } else { axis };
    if resolved < 0 || resolved as usize >= ndim {
        return Err(KernelError::invalid(format!(
            "axis {axis} out of range for a {ndim}-d tensor"
        )));
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_shape_splits_around_axis() {
        let l = AxisLayout::from_shape(&[2, 3, 4, 5], 1).unwrap();
        assert_eq!(l, AxisLayout { outer_size: 2, num_classes: 3, inner_size: 20 });
        assert_eq!(l.len(), 120);
        assert_eq!(l.num_work_units(), 40);
    }

    #[test]
    fn negative_axis_counts_from_end() {
        let l = AxisLayout::from_shape(&[2, 3, 4], -1).unwrap();
        assert_eq!(l, AxisLayout { outer_size: 6, num_classes: 4, inner_size: 1 });
        let l = AxisLayout::from_shape(&[2, 3, 4], -3).unwrap();
        assert_eq!(l, AxisLayout { outer_size: 1, num_classes: 2, inner_size: 12 });
    }

    #[test]
    fn rejects_bad_axis_and_empty_classes() {
        assert!(AxisLayout::from_shape(&[2, 3], 2).is_err());
        assert!(AxisLayout::from_shape(&[2, 3], -3).is_err());
        assert!(AxisLayout::from_shape(&[], 0).is_err());
        assert!(AxisLayout::from_shape(&[4, 0, 2], 1).is_err());
        assert!(AxisLayout::new(1, 0, 1).is_err());
    }

    #[test]
    fn rejects_overflowing_shape() {
        assert!(AxisLayout::new(usize::MAX, 2, 1).is_err());
        assert!(AxisLayout::new(usize::MAX / 2 + 1, 2, 1).is_err());
        assert!(AxisLayout::new(1, usize::MAX, 2).is_err());
        assert!(AxisLayout::from_shape(&[usize::MAX, 2, 1], 1).is_err());
    }

    #[test]
    fn getters_expose_validated_dims() {
        let l = AxisLayout::new(2, 3, 4).unwrap();
        assert_eq!((l.outer_size(), l.num_classes(), l.inner_size()), (2, 3, 4));
    }

    #[test]
    fn empty_inner_has_no_work_and_does_not_divide_by_zero() {
        let l = AxisLayout::new(3, 2, 0).unwrap();
        assert!(l.is_empty());
        assert_eq!(l.work_unit(7), (7, 0));
    }

    #[test]
    fn axis_offset_matches_middle_loop_formula() {
        let l = AxisLayout::new(2, 3, 4).unwrap();
        // idx 5 -> outer 1, inner 1 -> 1*3*4 + 1
        assert_eq!(l.work_unit(5), (1, 1));
        assert_eq!(l.axis_offset(5), 13);
        assert_eq!(l.axis_offset(0), 0);
        assert_eq!(l.axis_offset(3), 3);
    }

    #[test]
    fn zero_outer_or_inner_has_no_work() {
        assert_eq!(AxisLayout::new(0, 3, 4).unwrap().num_work_units(), 0);
        assert_eq!(AxisLayout::new(3, 3, 0).unwrap().num_work_units(), 0);
    }
}
