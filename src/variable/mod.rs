// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The [`Variable`] type: a typed, unit-bearing, multi-dimensional array
//! with optional variances and optional binned (ragged) data.

use std::fmt;

use crate::data::{Data, Element};
use crate::dim::Dim;
use crate::dimensions::{Dimensions, Strides};
use crate::dtype::DType;
use crate::error::{ArrayError, Result};
use crate::transform::kernels::LogicalOffsets;
use crate::unit::Unit;

pub mod bins;
mod constructors;
mod slicing;

pub use slicing::{VariableView, VariableViewMut};

/// A typed, labeled, unit-carrying multi-dimensional array.
///
/// A `Variable` owns (or shares) contiguous storage and addresses it
/// through named [`Dimensions`] and per-dim [`Strides`]. Cloning is
/// cheap and shares the storage; mutation copies on write unless the
/// handle is the unique owner. [`slice`](Variable::slice),
/// [`transpose`](Variable::transpose) and
/// [`broadcast`](Variable::broadcast) return zero-copy variables that
/// keep the parent buffer alive; [`copy`](Variable::copy) materializes
/// an independent contiguous array.
///
/// Optionally a `Variable` carries per-element variances (same dims,
/// dtype and unit as the values), or is *binned*: its elements are
/// `[begin, end)` ranges into a shared event buffer (see
/// [`Variable::make_bins`]).
#[derive(Clone)]
pub struct Variable {
    pub(crate) dims: Dimensions,
    pub(crate) strides: Strides,
    pub(crate) offset: usize,
    pub(crate) unit: Unit,
    pub(crate) values: Data,
    pub(crate) variances: Option<Data>,
}

impl Variable {
    /// The dimensions of this variable.
    #[inline]
    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    /// The number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.ndim()
    }

    /// The extents, outermost first.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.dims.shape()
    }

    /// The total number of elements (1 for a scalar).
    #[inline]
    pub fn volume(&self) -> usize {
        self.dims.volume()
    }

    /// The element strides.
    #[inline]
    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    /// The physical unit.
    #[inline]
    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// The element type tag.
    #[inline]
    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    /// Whether per-element variances are present.
    #[inline]
    pub fn has_variances(&self) -> bool {
        self.variances.is_some()
    }

    /// Whether this variable holds binned (ragged) data.
    #[inline]
    pub fn is_binned(&self) -> bool {
        self.dtype().is_binned()
    }

    /// Whether the storage is contiguous in canonical row-major order.
    pub fn is_contiguous(&self) -> bool {
        self.offset == 0
            && self.strides.is_row_major(&self.dims)
            && self.values.len() == self.volume()
    }

    pub(crate) fn logical_offsets(&self) -> LogicalOffsets {
        LogicalOffsets::new(&self.dims, &self.strides, self.offset)
    }

    /// Read access to the values as a typed slice.
    ///
    /// Fails with `TypeError` on a dtype mismatch and with `SliceError`
    /// when the variable is a non-contiguous view (use
    /// [`to_vec`](Variable::to_vec) or [`copy`](Variable::copy) there).
    pub fn values<T: Element>(&self) -> Result<&[T]> {
        let buffer = T::buffer(&self.values).ok_or_else(|| self.dtype_mismatch::<T>())?;
        if !self.is_contiguous() {
            return Err(ArrayError::slice(format!(
                "cannot borrow values of a non-contiguous view over {}; copy first",
                self.dims
            )));
        }
        Ok(buffer.as_slice())
    }

    /// Read access to the variances as a typed slice.
    ///
    /// Fails with `VariancesError` when absent; otherwise like
    /// [`values`](Variable::values).
    pub fn variances<T: Element>(&self) -> Result<&[T]> {
        let variances = self.variances.as_ref().ok_or_else(|| {
            ArrayError::variances(format!("variable over {} has no variances", self.dims))
        })?;
        let buffer = T::buffer(variances).ok_or_else(|| self.dtype_mismatch::<T>())?;
        if !self.is_contiguous() {
            return Err(ArrayError::slice(format!(
                "cannot borrow variances of a non-contiguous view over {}; copy first",
                self.dims
            )));
        }
        Ok(buffer.as_slice())
    }

    /// The values in logical (row-major) order, materialized.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let buffer = T::buffer(&self.values).ok_or_else(|| self.dtype_mismatch::<T>())?;
        let slice = buffer.as_slice();
        Ok(self.logical_offsets().map(|o| slice[o].clone()).collect())
    }

    /// The variances in logical (row-major) order, materialized.
    pub fn variances_to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let variances = self.variances.as_ref().ok_or_else(|| {
            ArrayError::variances(format!("variable over {} has no variances", self.dims))
        })?;
        let buffer = T::buffer(variances).ok_or_else(|| self.dtype_mismatch::<T>())?;
        let slice = buffer.as_slice();
        Ok(self.logical_offsets().map(|o| slice[o].clone()).collect())
    }

    /// The single element of a scalar (volume-1) variable.
    ///
    /// Fails with `DimensionError` when the volume is not 1.
    pub fn value<T: Element>(&self) -> Result<T> {
        if self.volume() != 1 {
            return Err(ArrayError::dimension(format!(
                "expected a scalar, got dims {}",
                self.dims
            )));
        }
        let buffer = T::buffer(&self.values).ok_or_else(|| self.dtype_mismatch::<T>())?;
        Ok(buffer.as_slice()[self.offset].clone())
    }

    /// The variance of a scalar (volume-1) variable.
    pub fn variance<T: Element>(&self) -> Result<T> {
        if self.volume() != 1 {
            return Err(ArrayError::dimension(format!(
                "expected a scalar, got dims {}",
                self.dims
            )));
        }
        let variances = self.variances.as_ref().ok_or_else(|| {
            ArrayError::variances("scalar variable has no variance")
        })?;
        let buffer = T::buffer(variances).ok_or_else(|| self.dtype_mismatch::<T>())?;
        Ok(buffer.as_slice()[self.offset].clone())
    }

    fn dtype_mismatch<T: Element>(&self) -> ArrayError {
        ArrayError::dtype(format!(
            "expected dtype {}, got {}",
            T::DTYPE,
            self.dtype()
        ))
    }

    /// Replace the unit.
    pub fn set_unit(&mut self, unit: Unit) {
        self.unit = unit;
    }

    /// Return a copy with the given unit.
    pub fn with_unit(&self, unit: Unit) -> Variable {
        let mut out = self.clone();
        out.unit = unit;
        out
    }

    /// Set or drop the variances.
    ///
    /// `variances` must match this variable's dims, dtype and unit, and
    /// the dtype must be floating; `VariancesError` otherwise. Setting
    /// variances on a non-contiguous view is rejected.
    pub fn set_variances(&mut self, variances: Option<&Variable>) -> Result<()> {
        let Some(variances) = variances else {
            self.variances = None;
            return Ok(());
        };
        if !self.is_contiguous() {
            return Err(ArrayError::variances(
                "cannot set variances through a non-contiguous view",
            ));
        }
        if !self.dtype().is_float() {
            return Err(ArrayError::variances(format!(
                "variances require a floating dtype, got {}",
                self.dtype()
            )));
        }
        if variances.dtype() != self.dtype() {
            return Err(ArrayError::variances(format!(
                "variance dtype {} does not match value dtype {}",
                variances.dtype(),
                self.dtype()
            )));
        }
        if variances.dims != self.dims {
            return Err(ArrayError::variances(format!(
                "variance dims {} do not match value dims {}",
                variances.dims, self.dims
            )));
        }
        if variances.unit != self.unit {
            return Err(ArrayError::variances(format!(
                "variance unit {} does not match value unit {}",
                variances.unit, self.unit
            )));
        }
        self.variances = Some(variances.values.gather(variances.logical_offsets()));
        Ok(())
    }

    /// Strip the variances, returning the values-only variable.
    pub fn without_variances(&self) -> Variable {
        let mut out = self.clone();
        out.variances = None;
        out
    }

    /// Relabel dimension `from` as `to`.
    ///
    /// Fails with `DimensionError` if `from` is absent or `to` present.
    pub fn rename_dims(&mut self, from: Dim, to: Dim) -> Result<()> {
        self.dims.rename(from, to)
    }

    /// An independent, contiguous deep copy.
    pub fn copy(&self) -> Variable {
        if self.is_binned() {
            return bins::deep_copy(self);
        }
        Variable {
            dims: self.dims,
            strides: Strides::row_major(&self.dims),
            offset: 0,
            unit: self.unit,
            values: self.values.gather(self.logical_offsets()),
            variances: self
                .variances
                .as_ref()
                .map(|v| v.gather(self.logical_offsets())),
        }
    }

    /// Whether `self` and `other` address the same underlying storage.
    pub(crate) fn shares_buffer_with(&self, other: &Variable) -> bool {
        self.values.shares_buffer_with(&other.values)
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Variable) -> bool {
        if self.dims != other.dims
            || self.unit != other.unit
            || self.dtype() != other.dtype()
            || self.has_variances() != other.has_variances()
        {
            return false;
        }
        if self.is_binned() {
            return bins::binned_eq(self, other);
        }
        if !self
            .values
            .eq_elements(self.logical_offsets(), &other.values, other.logical_offsets())
        {
            return false;
        }
        match (&self.variances, &other.variances) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a.eq_elements(self.logical_offsets(), b, other.logical_offsets())
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("dims", &self.dims)
            .field("dtype", &format_args!("{}", self.dtype()))
            .field("unit", &format_args!("{}", self.unit))
            .field("variances", &self.has_variances())
            .finish()
    }
}
