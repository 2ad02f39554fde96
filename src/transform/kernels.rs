// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Strided element loops.
//!
//! All loops walk the output shape in row-major order with one odometer,
//! carrying one accumulated offset per operand. Operand strides are
//! first aligned to the output dims ([`align_strides`]); a dim absent
//! from an operand gets stride 0, which also realizes broadcasting.

use crate::dimensions::{Dimensions, Strides, MAX_NDIM};

/// Strides of `dims` re-expressed against `out`: position `k` holds the
/// operand stride of `out`'s `k`-th dim, or 0 when the operand lacks it.
pub(crate) fn align_strides(
    dims: &Dimensions,
    strides: &Strides,
    out: &Dimensions,
) -> [isize; MAX_NDIM] {
    let mut aligned = [0isize; MAX_NDIM];
    for (k, dim) in out.labels().enumerate() {
        if let Some(i) = dims.index_of(dim) {
            aligned[k] = strides.get(i);
        }
    }
    aligned
}

/// Walk `shape` in row-major order, calling `f` with the per-operand
/// element offsets. `bases` are the starting offsets (view offsets),
/// `strides` the aligned strides of each operand.
pub(crate) fn for_each_offsets<const K: usize>(
    shape: &[usize],
    bases: [usize; K],
    strides: [&[isize; MAX_NDIM]; K],
    mut f: impl FnMut([usize; K]),
) {
    let volume: usize = shape.iter().product();
    if volume == 0 {
        return;
    }
    let ndim = shape.len();
    let mut index = [0usize; MAX_NDIM];
    let mut offsets = [0isize; K];
    for (o, &b) in offsets.iter_mut().zip(bases.iter()) {
        *o = b as isize;
    }
    for _ in 0..volume {
        let mut current = [0usize; K];
        for (c, &o) in current.iter_mut().zip(offsets.iter()) {
            debug_assert!(o >= 0);
            *c = o as usize;
        }
        f(current);
        for axis in (0..ndim).rev() {
            index[axis] += 1;
            for k in 0..K {
                offsets[k] += strides[k][axis];
            }
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
            for k in 0..K {
                offsets[k] -= strides[k][axis] * shape[axis] as isize;
            }
        }
    }
}

/// Iterator over the element offsets of one strided view, in row-major
/// (logical) order.
pub(crate) struct LogicalOffsets {
    shape: [usize; MAX_NDIM],
    strides: [isize; MAX_NDIM],
    ndim: usize,
    index: [usize; MAX_NDIM],
    offset: isize,
    remaining: usize,
}

impl LogicalOffsets {
    pub(crate) fn new(dims: &Dimensions, strides: &Strides, offset: usize) -> LogicalOffsets {
        let mut shape = [0usize; MAX_NDIM];
        shape[..dims.ndim()].copy_from_slice(dims.shape());
        let mut s = [0isize; MAX_NDIM];
        s[..dims.ndim()].copy_from_slice(strides.as_slice(dims.ndim()));
        LogicalOffsets {
            shape,
            strides: s,
            ndim: dims.ndim(),
            index: [0; MAX_NDIM],
            offset: offset as isize,
            remaining: dims.volume(),
        }
    }
}

impl Iterator for LogicalOffsets {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.offset as usize;
        for axis in (0..self.ndim).rev() {
            self.index[axis] += 1;
            self.offset += self.strides[axis];
            if self.index[axis] < self.shape[axis] {
                break;
            }
            self.index[axis] = 0;
            self.offset -= self.strides[axis] * self.shape[axis] as isize;
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for LogicalOffsets {}

/// Map one strided operand into a fresh contiguous vector.
pub(crate) fn map1<A, O>(
    shape: &[usize],
    a: &[A],
    a_base: usize,
    a_strides: &[isize; MAX_NDIM],
    mut f: impl FnMut(&A) -> O,
) -> Vec<O> {
    let mut out = Vec::with_capacity(shape.iter().product());
    for_each_offsets(shape, [a_base], [a_strides], |[off]| {
        out.push(f(&a[off]));
    });
    out
}

/// Map two strided operands into a fresh contiguous vector.
pub(crate) fn map2<A, B, O>(
    shape: &[usize],
    a: &[A],
    a_base: usize,
    a_strides: &[isize; MAX_NDIM],
    b: &[B],
    b_base: usize,
    b_strides: &[isize; MAX_NDIM],
    mut f: impl FnMut(&A, &B) -> O,
) -> Vec<O> {
    let mut out = Vec::with_capacity(shape.iter().product());
    for_each_offsets(
        shape,
        [a_base, b_base],
        [a_strides, b_strides],
        |[off_a, off_b]| {
            out.push(f(&a[off_a], &b[off_b]));
        },
    );
    out
}

/// Update a strided output in place from one strided operand.
pub(crate) fn zip_mut1<O, B>(
    shape: &[usize],
    out: &mut [O],
    out_base: usize,
    out_strides: &[isize; MAX_NDIM],
    b: &[B],
    b_base: usize,
    b_strides: &[isize; MAX_NDIM],
    mut f: impl FnMut(&mut O, &B),
) {
    for_each_offsets(
        shape,
        [out_base, b_base],
        [out_strides, b_strides],
        |[off_out, off_b]| {
            f(&mut out[off_out], &b[off_b]);
        },
    );
}

/// Update a strided output in place, element by element.
pub(crate) fn map_mut(
    shape: &[usize],
    base: usize,
    strides: &[isize; MAX_NDIM],
    mut f: impl FnMut(usize),
) {
    for_each_offsets(shape, [base], [strides], |[off]| f(off));
}

/// Elements above which the contiguous parallel path is worthwhile.
#[cfg(feature = "rayon")]
pub(crate) const PARALLEL_THRESHOLD: usize = 16_384;

/// Contiguous two-operand map, split over a thread pool. Used by the
/// dispatcher for parallel-safe ops on canonical-layout operands.
#[cfg(feature = "rayon")]
pub(crate) fn par_map2<A, B, O>(a: &[A], b: &[B], f: impl Fn(&A, &B) -> O + Sync) -> Vec<O>
where
    A: Sync,
    B: Sync,
    O: Send,
{
    use rayon::prelude::*;
    a.par_iter().zip_eq(b.par_iter()).map(|(x, y)| f(x, y)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dim::Dim;

    fn dims2(x: usize, y: usize) -> Dimensions {
        Dimensions::from_pairs(&[(Dim::new("x"), x), (Dim::new("y"), y)]).unwrap()
    }

    #[test]
    fn logical_offsets_row_major() {
        let dims = dims2(2, 3);
        let strides = Strides::row_major(&dims);
        let offs: Vec<_> = LogicalOffsets::new(&dims, &strides, 0).collect();
        assert_eq!(offs, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn logical_offsets_transposed() {
        let dims = dims2(2, 3);
        // Strides of the y-x transpose of a 3x2 row-major block.
        let mut strides = Strides::default();
        strides.set(0, 1);
        strides.set(1, 2);
        let offs: Vec<_> = LogicalOffsets::new(&dims, &strides, 0).collect();
        assert_eq!(offs, vec![0, 2, 4, 1, 3, 5]);
    }

    #[test]
    fn map2_broadcasts_with_zero_stride() {
        let dims = dims2(2, 2);
        let a = [1, 2, 3, 4];
        let b = [10, 20];
        let a_strides = [2isize, 1, 0, 0, 0, 0];
        // b varies only along y.
        let b_strides = [0isize, 1, 0, 0, 0, 0];
        let out = map2(dims.shape(), &a, 0, &a_strides, &b, 0, &b_strides, |x, y| x + y);
        assert_eq!(out, vec![11, 22, 13, 24]);
    }

    #[test]
    fn scalar_shape_visits_once() {
        let mut count = 0;
        for_each_offsets(&[], [0usize], [&[0isize; MAX_NDIM]], |_| count += 1);
        assert_eq!(count, 1);
    }
}
