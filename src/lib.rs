// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The `dimarray` crate provides labeled, unit-aware, uncertainty-
//! carrying multi-dimensional arrays.
//!
//! - [`Variable`]: a typed array with named dimensions, a physical
//!   [`Unit`], optional per-element variances and optional binned
//!   (ragged) data.
//! - [`DataArray`] / [`Dataset`]: composition layers adding named
//!   coordinates, masks and attributes over shared, reference-counted
//!   storage.
//!
//! ## Highlights
//!
//! - Dimensions are addressed by label ([`Dim`]), not position;
//!   element-wise operations broadcast automatically over the
//!   left-to-right union of the operands' dims.
//! - Every operation propagates physical units and, where present,
//!   variances using first-order rules for independent inputs.
//! - Slicing, transposing and broadcasting are zero-copy views;
//!   storage is copy-on-write and shared between cheap clones.
//! - Ragged data is modeled as *binned* variables: each element of an
//!   outer array addresses a `[begin, end)` range of a shared event
//!   buffer.
//! - All fallible operations return [`Result`] with a categorized
//!   [`ArrayError`] and leave their operands untouched on error.
//!
//! ## Crate Feature Flags
//!
//! - `rayon`
//!   - Optional
//!   - Splits large, parallel-safe element-wise kernels over a thread
//!     pool.
//! - `approx`
//!   - Optional
//!   - Implements `approx::AbsDiffEq`/`RelativeEq` for [`Variable`].

mod buffer;
#[doc(hidden)]
pub mod data;
mod dim;
mod dimensions;
mod dtype;
mod error;
pub mod dataset;
pub mod ops;
pub mod shape;
mod spatial;
mod transform;
mod unit;
mod variable;

#[cfg(feature = "approx")]
mod variable_approx;

pub use crate::buffer::Buffer;
pub use crate::data::Element;
pub use crate::dataset::groupby::{groupby, groupby_bins, GroupBy};
pub use crate::dataset::slice::{
    slice_by_single_value, slice_by_value, slice_dataset_by_value,
};
pub use crate::dataset::{is_edges, Attrs, Coords, DataArray, Dataset, Masks};
pub use crate::dim::Dim;
pub use crate::dimensions::{Dimensions, Strides, MAX_NDIM};
pub use crate::dtype::{DType, IndexPair, TimePoint};
pub use crate::error::{ArrayError, ErrorKind, Result};
pub use crate::spatial::{Affine3, Matrix3, Rotation, Translation, Vector3};
pub use crate::unit::Unit;
pub use crate::variable::bins::BinBuffer;
pub use crate::variable::{Variable, VariableView, VariableViewMut};

pub use crate::ops::arithmetic::{
    add, add_assign, div_assign, divide, elementwise_with_variance_broadcast, mul_assign,
    multiply, negate, sub_assign, subtract, ArithOp,
};
pub use crate::ops::comparison::{
    equal, greater, greater_equal, isclose, less, less_equal, not_equal,
};
pub use crate::ops::math::{
    abs, acos, acosh, asin, asinh, astype, atan, atan2, atanh, cos, cosh, norm, reciprocal,
    sin, sinh, sqrt, tan, tanh,
};
pub use crate::ops::reduction::{
    all, any, bins_max, bins_mean, bins_min, bins_sum, max, mean, min, sum,
};
pub use crate::shape::{broadcast, concat, flatten, fold, rebin, resize, squeeze, transpose};

pub mod prelude {
    //! Common imports for working with the crate.
    pub use crate::{
        ArrayError, DType, DataArray, Dataset, Dim, Dimensions, ErrorKind, Result, Unit, Variable,
    };
}
