// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;

use crate::dim::Dim;
use crate::error::{ArrayError, Result};

/// The maximum rank of an array. Exceeding it yields `DimensionError`.
pub const MAX_NDIM: usize = 6;

/// An ordered map from [`Dim`] to extent.
///
/// Entries are unique and iteration order is memory-layout order, the
/// outermost dimension first. Extents are non-negative; a `Dimensions`
/// with no entries describes a 0-d (scalar) array of volume 1.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Dimensions {
    labels: [Option<Dim>; MAX_NDIM],
    shape: [usize; MAX_NDIM],
    ndim: usize,
}

impl Dimensions {
    /// An empty (scalar) `Dimensions`.
    pub fn new() -> Dimensions {
        Dimensions::default()
    }

    /// Build from `(dim, extent)` pairs, outermost first.
    ///
    /// Fails with `DimensionError` on duplicate labels or more than
    /// [`MAX_NDIM`] entries.
    pub fn from_pairs(pairs: &[(Dim, usize)]) -> Result<Dimensions> {
        let mut dims = Dimensions::new();
        for &(dim, extent) in pairs {
            dims.push(dim, extent)?;
        }
        Ok(dims)
    }

    /// The number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// The extents, outermost first.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape[..self.ndim]
    }

    /// The labels, outermost first.
    pub fn labels(&self) -> impl Iterator<Item = Dim> + '_ {
        self.labels[..self.ndim].iter().map(|d| d.unwrap())
    }

    /// Iterate over `(dim, extent)` pairs, outermost first.
    pub fn iter(&self) -> impl Iterator<Item = (Dim, usize)> + '_ {
        self.labels()
            .zip(self.shape[..self.ndim].iter().copied())
    }

    /// The label at position `index`.
    ///
    /// ***Panics*** if `index >= ndim()`.
    pub fn label(&self, index: usize) -> Dim {
        assert!(index < self.ndim);
        self.labels[index].unwrap()
    }

    /// The product of all extents; 1 for a scalar.
    pub fn volume(&self) -> usize {
        self.shape().iter().product()
    }

    /// Whether `dim` is present.
    pub fn contains(&self, dim: Dim) -> bool {
        self.index_of(dim).is_some()
    }

    /// The position of `dim`, if present.
    pub fn index_of(&self, dim: Dim) -> Option<usize> {
        self.labels[..self.ndim]
            .iter()
            .position(|&d| d == Some(dim))
    }

    /// The extent of `dim`.
    ///
    /// Fails with `DimensionError` if `dim` is absent.
    pub fn extent(&self, dim: Dim) -> Result<usize> {
        self.index_of(dim)
            .map(|i| self.shape[i])
            .ok_or_else(|| {
                ArrayError::dimension(format!("dimension {} not found in {}", dim, self))
            })
    }

    /// Append `(dim, extent)` as the new innermost entry.
    ///
    /// Fails with `DimensionError` on a duplicate label, an invalid
    /// label, or when the rank cap of [`MAX_NDIM`] is reached.
    pub fn push(&mut self, dim: Dim, extent: usize) -> Result<()> {
        self.insert(self.ndim, dim, extent)
    }

    /// Insert `(dim, extent)` at `position`, shifting later entries in.
    pub fn insert(&mut self, position: usize, dim: Dim, extent: usize) -> Result<()> {
        if dim.is_invalid() {
            return Err(ArrayError::dimension("cannot use the invalid dim as a label"));
        }
        if self.contains(dim) {
            return Err(ArrayError::dimension(format!(
                "duplicate dimension {} in {}",
                dim, self
            )));
        }
        if self.ndim == MAX_NDIM {
            return Err(ArrayError::dimension(format!(
                "rank cap of {} dimensions exceeded by {}",
                MAX_NDIM, dim
            )));
        }
        assert!(position <= self.ndim);
        for i in (position..self.ndim).rev() {
            self.labels[i + 1] = self.labels[i];
            self.shape[i + 1] = self.shape[i];
        }
        self.labels[position] = Some(dim);
        self.shape[position] = extent;
        self.ndim += 1;
        Ok(())
    }

    /// Remove `dim`.
    ///
    /// Fails with `DimensionError` if `dim` is absent.
    pub fn erase(&mut self, dim: Dim) -> Result<()> {
        let index = self.index_of(dim).ok_or_else(|| {
            ArrayError::dimension(format!("dimension {} not found in {}", dim, self))
        })?;
        self.remove_at(index);
        Ok(())
    }

    pub(crate) fn set_extent_at(&mut self, index: usize, extent: usize) {
        assert!(index < self.ndim);
        self.shape[index] = extent;
    }

    pub(crate) fn remove_at(&mut self, index: usize) {
        for i in index..self.ndim - 1 {
            self.labels[i] = self.labels[i + 1];
            self.shape[i] = self.shape[i + 1];
        }
        self.ndim -= 1;
        self.labels[self.ndim] = None;
        self.shape[self.ndim] = 0;
    }

    /// Relabel `from` as `to` without touching extents.
    ///
    /// Fails with `DimensionError` if `from` is absent or `to` already
    /// present.
    pub fn rename(&mut self, from: Dim, to: Dim) -> Result<()> {
        if to.is_invalid() {
            return Err(ArrayError::dimension("cannot rename to the invalid dim"));
        }
        if self.contains(to) {
            return Err(ArrayError::dimension(format!(
                "cannot rename {} to {}: already present in {}",
                from, to, self
            )));
        }
        let index = self.index_of(from).ok_or_else(|| {
            ArrayError::dimension(format!("dimension {} not found in {}", from, self))
        })?;
        self.labels[index] = Some(to);
        Ok(())
    }

    /// Return a copy reordered according to `order`.
    ///
    /// `order` must be a permutation of the labels; an empty `order`
    /// reverses. Fails with `DimensionError` otherwise.
    pub fn permute(&self, order: &[Dim]) -> Result<Dimensions> {
        if order.is_empty() {
            let mut out = Dimensions::new();
            for (dim, extent) in self.iter().collect::<Vec<_>>().into_iter().rev() {
                out.push(dim, extent)?;
            }
            return Ok(out);
        }
        if order.len() != self.ndim {
            return Err(ArrayError::dimension(format!(
                "permutation of length {} does not match {}",
                order.len(),
                self
            )));
        }
        let mut out = Dimensions::new();
        for &dim in order {
            out.push(dim, self.extent(dim)?)?;
        }
        Ok(out)
    }

    /// Broadcast test: every `(dim, extent)` of `other` is present in
    /// `self` with the same extent.
    pub fn includes(&self, other: &Dimensions) -> bool {
        other
            .iter()
            .all(|(dim, extent)| self.extent(dim).map(|e| e == extent).unwrap_or(false))
    }

    /// Whether `self` can be broadcast to `target`.
    pub fn broadcastable_to(&self, target: &Dimensions) -> bool {
        target.includes(self)
    }

    /// The left-to-right union of input dims: output dims of an
    /// element-wise operation. Dims keep the order of first appearance;
    /// a label reappearing with a different extent is a `DimensionError`.
    pub fn union(inputs: &[&Dimensions]) -> Result<Dimensions> {
        let mut out = Dimensions::new();
        for dims in inputs {
            for (dim, extent) in dims.iter() {
                match out.extent(dim) {
                    Ok(existing) if existing == extent => {}
                    Ok(existing) => {
                        return Err(ArrayError::dimension(format!(
                            "mismatching extent for {}: {} vs {}",
                            dim, existing, extent
                        )))
                    }
                    Err(_) => out.push(dim, extent)?,
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (dim, extent)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", dim, extent)?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dimensions{}", self)
    }
}

/// Per-dimension element strides of a [`Variable`](crate::Variable) or a
/// view. The canonical layout is row-major; sliced, transposed or
/// broadcast views carry non-canonical strides (zero strides encode
/// broadcast dims).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Strides {
    strides: [isize; MAX_NDIM],
}

impl Strides {
    /// Canonical row-major strides for `dims`.
    pub fn row_major(dims: &Dimensions) -> Strides {
        let mut strides = [0isize; MAX_NDIM];
        let mut step = 1isize;
        for i in (0..dims.ndim()).rev() {
            strides[i] = step;
            step *= dims.shape()[i] as isize;
        }
        Strides { strides }
    }

    /// The strides for the first `ndim` dims.
    #[inline]
    pub fn as_slice(&self, ndim: usize) -> &[isize] {
        &self.strides[..ndim]
    }

    /// The full fixed-capacity stride array.
    #[inline]
    pub(crate) fn raw(&self) -> &[isize; MAX_NDIM] {
        &self.strides
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> isize {
        self.strides[index]
    }

    #[inline]
    pub(crate) fn set(&mut self, index: usize, stride: isize) {
        self.strides[index] = stride;
    }

    pub(crate) fn remove_at(&mut self, index: usize, ndim: usize) {
        for i in index..ndim - 1 {
            self.strides[i] = self.strides[i + 1];
        }
        self.strides[ndim - 1] = 0;
    }

    pub(crate) fn insert_at(&mut self, index: usize, ndim: usize, stride: isize) {
        for i in (index..ndim).rev() {
            self.strides[i + 1] = self.strides[i];
        }
        self.strides[index] = stride;
    }

    /// Whether these are the canonical row-major strides for `dims`.
    pub fn is_row_major(&self, dims: &Dimensions) -> bool {
        *self == Strides::row_major(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xyz() -> (Dim, Dim, Dim) {
        (Dim::new("x"), Dim::new("y"), Dim::new("z"))
    }

    #[test]
    fn ordered_and_unique() {
        let (x, y, _) = xyz();
        let mut dims = Dimensions::from_pairs(&[(x, 2), (y, 3)]).unwrap();
        assert_eq!(dims.ndim(), 2);
        assert_eq!(dims.shape(), &[2, 3]);
        assert_eq!(dims.volume(), 6);
        assert_eq!(dims.index_of(y), Some(1));
        assert!(dims.push(x, 4).is_err());
        dims.erase(x).unwrap();
        assert_eq!(dims.shape(), &[3]);
    }

    #[test]
    fn empty_volume_is_one() {
        assert_eq!(Dimensions::new().volume(), 1);
    }

    #[test]
    fn rank_cap() {
        let mut dims = Dimensions::new();
        for i in 0..MAX_NDIM {
            dims.push(Dim::new(&format!("d{}", i)), 1).unwrap();
        }
        assert_eq!(
            dims.push(Dim::new("one-too-many"), 1).unwrap_err().kind(),
            crate::ErrorKind::Dimension
        );
    }

    #[test]
    fn rename_rejects_existing_target() {
        let (x, y, z) = xyz();
        let mut dims = Dimensions::from_pairs(&[(x, 2), (y, 3)]).unwrap();
        assert!(dims.rename(x, y).is_err());
        dims.rename(x, z).unwrap();
        assert_eq!(dims.label(0), z);
    }

    #[test]
    fn includes_requires_equal_extents() {
        let (x, y, _) = xyz();
        let big = Dimensions::from_pairs(&[(x, 2), (y, 3)]).unwrap();
        let small = Dimensions::from_pairs(&[(y, 3)]).unwrap();
        let wrong = Dimensions::from_pairs(&[(y, 4)]).unwrap();
        assert!(big.includes(&small));
        assert!(small.broadcastable_to(&big));
        assert!(!big.includes(&wrong));
    }

    #[test]
    fn union_keeps_first_appearance_order() {
        let (x, y, z) = xyz();
        let a = Dimensions::from_pairs(&[(x, 2), (y, 3)]).unwrap();
        let b = Dimensions::from_pairs(&[(z, 4), (y, 3)]).unwrap();
        let u = Dimensions::union(&[&a, &b]).unwrap();
        assert_eq!(u.labels().collect::<Vec<_>>(), vec![x, y, z]);
        let conflicting = Dimensions::from_pairs(&[(x, 5)]).unwrap();
        assert!(Dimensions::union(&[&a, &conflicting]).is_err());
    }

    #[test]
    fn row_major_strides() {
        let (x, y, z) = xyz();
        let dims = Dimensions::from_pairs(&[(x, 2), (y, 3), (z, 4)]).unwrap();
        let strides = Strides::row_major(&dims);
        assert_eq!(strides.as_slice(3), &[12, 4, 1]);
        assert!(strides.is_row_major(&dims));
    }

    #[test]
    fn permute() {
        let (x, y, _) = xyz();
        let dims = Dimensions::from_pairs(&[(x, 2), (y, 3)]).unwrap();
        let yx = dims.permute(&[y, x]).unwrap();
        assert_eq!(yx.shape(), &[3, 2]);
        assert_eq!(dims.permute(&[]).unwrap(), yx);
        assert!(dims.permute(&[x]).is_err());
    }
}
