// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Zero-copy slicing, transposition and broadcasting, plus the borrowed
//! view types.

use std::fmt;

use crate::data::{with_dense, with_dense_dtype, Data, Element};
use crate::dim::Dim;
use crate::dimensions::{Dimensions, Strides};
use crate::dtype::DType;
use crate::error::{ArrayError, Result};
use crate::transform::kernels::{align_strides, zip_mut1};
use crate::unit::Unit;
use crate::variable::Variable;

impl Variable {
    fn dim_index(&self, dim: Dim) -> Result<usize> {
        self.dims.index_of(dim).ok_or_else(|| {
            ArrayError::dimension(format!("dimension {} not found in {}", dim, self.dims))
        })
    }

    /// A zero-copy view of the sub-range `[begin, end)` along `dim`.
    ///
    /// Fails with `DimensionError` if `dim` is absent and `SliceError`
    /// if the range is out of bounds. The result shares this variable's
    /// storage and keeps it alive.
    pub fn slice(&self, dim: Dim, begin: usize, end: usize) -> Result<Variable> {
        let axis = self.dim_index(dim)?;
        let extent = self.dims.shape()[axis];
        if begin > end || end > extent {
            return Err(ArrayError::slice(format!(
                "slice [{}, {}) of dimension {} is out of range 0..{}",
                begin, end, dim, extent
            )));
        }
        let mut out = self.clone();
        out.offset = (self.offset as isize + begin as isize * self.strides.get(axis)) as usize;
        out.dims.set_extent_at(axis, end - begin);
        Ok(out)
    }

    /// A view with `dim` removed, selecting element `index`.
    ///
    /// Negative indices wrap once from the end. Fails with
    /// `DimensionError` if `dim` is absent and `SliceError` if the index
    /// is out of bounds.
    pub fn slice_index(&self, dim: Dim, index: isize) -> Result<Variable> {
        let axis = self.dim_index(dim)?;
        let extent = self.dims.shape()[axis] as isize;
        let wrapped = if index < 0 { index + extent } else { index };
        if wrapped < 0 || wrapped >= extent {
            return Err(ArrayError::slice(format!(
                "index {} of dimension {} is out of range for extent {}",
                index, dim, extent
            )));
        }
        let mut out = self.clone();
        out.offset = (self.offset as isize + wrapped * self.strides.get(axis)) as usize;
        out.dims.remove_at(axis);
        out.strides.remove_at(axis, self.dims.ndim());
        Ok(out)
    }

    /// A transposed view.
    ///
    /// `order` must be a permutation of the dims; an empty `order`
    /// reverses them. Fails with `DimensionError` otherwise.
    pub fn transpose(&self, order: &[Dim]) -> Result<Variable> {
        let dims = self.dims.permute(order)?;
        let mut strides = Strides::default();
        for (k, d) in dims.labels().enumerate() {
            let i = self.dims.index_of(d).expect("permute checked the labels");
            strides.set(k, self.strides.get(i));
        }
        let mut out = self.clone();
        out.dims = dims;
        out.strides = strides;
        Ok(out)
    }

    /// A view broadcast to `target`.
    ///
    /// Every dim of `self` must be present in `target` with the same
    /// extent (`DimensionError` otherwise); dims new in `target` get
    /// stride 0.
    pub fn broadcast(&self, target: &Dimensions) -> Result<Variable> {
        if !target.includes(&self.dims) {
            return Err(ArrayError::dimension(format!(
                "cannot broadcast {} to {}",
                self.dims, target
            )));
        }
        let mut strides = Strides::default();
        for (k, d) in target.labels().enumerate() {
            if let Some(i) = self.dims.index_of(d) {
                strides.set(k, self.strides.get(i));
            }
        }
        let mut out = self.clone();
        out.dims = *target;
        out.strides = strides;
        Ok(out)
    }

    /// A borrowed read-only view of the whole variable.
    pub fn view(&self) -> VariableView<'_> {
        VariableView { source: self }
    }

    /// A borrowed mutable view of the whole variable. Shared storage is
    /// un-shared first, so writes mutate only this variable.
    pub fn view_mut(&mut self) -> VariableViewMut<'_> {
        self.ensure_unique();
        let (dims, strides, offset) = (self.dims, self.strides, self.offset);
        VariableViewMut {
            source: self,
            dims,
            strides,
            offset,
        }
    }

    /// A mutable view of the sub-range `[begin, end)` along `dim`;
    /// writing through it mutates this variable.
    pub fn slice_mut(&mut self, dim: Dim, begin: usize, end: usize) -> Result<VariableViewMut<'_>> {
        // Validate geometry on a cheap shared view first.
        let window = self.slice(dim, begin, end)?;
        let (dims, strides, offset) = (window.dims, window.strides, window.offset);
        drop(window);
        self.ensure_unique();
        Ok(VariableViewMut {
            source: self,
            dims,
            strides,
            offset,
        })
    }

    /// Break sharing of the underlying buffers.
    pub(crate) fn ensure_unique(&mut self) {
        fn unshare(data: &mut Data) {
            match data {
                Data::VariableBins(bins) => {
                    bins.indices.make_mut();
                }
                Data::DataArrayBins(bins) => {
                    bins.indices.make_mut();
                }
                Data::DatasetBins(bins) => {
                    bins.indices.make_mut();
                }
                data => with_dense!(data, buf, _T => {
                    buf.make_mut();
                }, _ => { unreachable!() }),
            }
        }
        unshare(&mut self.values);
        if let Some(variances) = &mut self.variances {
            unshare(variances);
        }
    }
}

/// A non-owning read-only view of a [`Variable`].
#[derive(Copy, Clone)]
pub struct VariableView<'a> {
    source: &'a Variable,
}

impl<'a> VariableView<'a> {
    /// The viewed variable.
    pub fn variable(&self) -> &'a Variable {
        self.source
    }

    pub fn dims(&self) -> &Dimensions {
        &self.source.dims
    }

    pub fn unit(&self) -> Unit {
        self.source.unit
    }

    pub fn dtype(&self) -> DType {
        self.source.dtype()
    }

    /// An owning handle sharing the same storage.
    pub fn to_variable(&self) -> Variable {
        self.source.clone()
    }
}

impl fmt::Debug for VariableView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VariableView({:?})", self.source)
    }
}

/// A non-owning mutable view of a [`Variable`]. Writes go to the parent
/// variable's storage.
pub struct VariableViewMut<'a> {
    pub(crate) source: &'a mut Variable,
    pub(crate) dims: Dimensions,
    pub(crate) strides: Strides,
    pub(crate) offset: usize,
}

impl<'a> VariableViewMut<'a> {
    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn unit(&self) -> Unit {
        self.source.unit
    }

    pub fn dtype(&self) -> DType {
        self.source.dtype()
    }

    /// Copy `src` into the viewed elements of the parent variable,
    /// broadcasting `src` where needed.
    ///
    /// `src` must match in dtype and unit, carry variances exactly when
    /// the parent does, and be broadcast-compatible to the view's dims.
    pub fn assign(&mut self, src: &Variable) -> Result<()> {
        if src.dtype() != self.source.dtype() {
            return Err(ArrayError::dtype(format!(
                "cannot assign dtype {} into {}",
                src.dtype(),
                self.source.dtype()
            )));
        }
        if src.dtype().is_binned() {
            return Err(ArrayError::not_implemented(
                "assignment through a view is not supported for binned data",
            ));
        }
        if src.unit != self.source.unit {
            return Err(ArrayError::unit(format!(
                "cannot assign unit {} into {}",
                src.unit, self.source.unit
            )));
        }
        if src.has_variances() != self.source.has_variances() {
            return Err(ArrayError::variances(
                "assignment requires variances on both sides or neither",
            ));
        }
        if !self.dims.includes(&src.dims) {
            return Err(ArrayError::dimension(format!(
                "cannot assign {} into view over {}",
                src.dims, self.dims
            )));
        }
        // An aliasing source would be clobbered mid-copy.
        let src = if src.shares_buffer_with(self.source) {
            src.copy()
        } else {
            src.clone()
        };

        fn copy_part<T: Element>(
            dst: &mut Data,
            dst_dims: &Dimensions,
            dst_strides: &Strides,
            dst_offset: usize,
            src: &Data,
            src_dims: &Dimensions,
            src_strides: &Strides,
            src_offset: usize,
        ) {
            let src_aligned = align_strides(src_dims, src_strides, dst_dims);
            let mut dst_aligned = [0isize; crate::dimensions::MAX_NDIM];
            dst_aligned[..dst_dims.ndim()].copy_from_slice(dst_strides.as_slice(dst_dims.ndim()));
            let src_buf = T::buffer(src).expect("dtype checked").as_slice();
            let dst_buf = T::buffer_mut(dst).expect("dtype checked").make_mut();
            zip_mut1(
                dst_dims.shape(),
                dst_buf,
                dst_offset,
                &dst_aligned,
                src_buf,
                src_offset,
                &src_aligned,
                |d, s| *d = s.clone(),
            );
        }

        let dims = self.dims;
        let strides = self.strides;
        let offset = self.offset;
        with_dense_dtype!(self.source.dtype(), T => {
            copy_part::<T>(
                &mut self.source.values,
                &dims,
                &strides,
                offset,
                &src.values,
                &src.dims,
                &src.strides,
                src.offset,
            );
            if let (Some(dst_var), Some(src_var)) = (&mut self.source.variances, &src.variances) {
                copy_part::<T>(
                    dst_var,
                    &dims,
                    &strides,
                    offset,
                    src_var,
                    &src.dims,
                    &src.strides,
                    src.offset,
                );
            }
        }, _ => { unreachable!() });
        Ok(())
    }
}

impl fmt::Debug for VariableViewMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VariableViewMut(dims: {:?})", self.dims)
    }
}
