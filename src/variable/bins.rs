// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Binned (ragged) data: every element of the outer shape is a
//! `[begin, end)` range into a shared event buffer.

use crate::buffer::Buffer;
use crate::data::{BinData, Data};
use crate::dataset::{DataArray, Dataset};
use crate::dim::Dim;
use crate::dtype::{DType, IndexPair};
use crate::error::{ArrayError, Result};
use crate::unit::Unit;
use crate::variable::Variable;

/// A type that can serve as the event buffer of binned data:
/// [`Variable`], [`DataArray`] or [`Dataset`].
///
/// The trait is sealed; it exists so [`Variable::make_bins`] and the
/// binned kernels can be written once over all three buffer kinds.
pub trait BinBuffer: Clone + PartialEq + std::fmt::Debug + Sized + 'static + private::Sealed {
    /// The dtype of a binned variable with this buffer kind.
    const BIN_DTYPE: DType;

    #[doc(hidden)]
    fn extent_of(&self, dim: Dim) -> Result<usize>;
    #[doc(hidden)]
    fn slice_range(&self, dim: Dim, begin: usize, end: usize) -> Result<Self>;
    #[doc(hidden)]
    fn concat_pair(a: &Self, b: &Self, dim: Dim) -> Result<Self>;
    #[doc(hidden)]
    fn bin_data(data: &Data) -> Option<&BinData<Self>>;
    #[doc(hidden)]
    fn into_data(bins: BinData<Self>) -> Data;
}

mod private {
    pub trait Sealed {}
    impl Sealed for crate::variable::Variable {}
    impl Sealed for crate::dataset::DataArray {}
    impl Sealed for crate::dataset::Dataset {}
}

impl BinBuffer for Variable {
    const BIN_DTYPE: DType = DType::VariableBins;

    fn extent_of(&self, dim: Dim) -> Result<usize> {
        self.dims().extent(dim)
    }

    fn slice_range(&self, dim: Dim, begin: usize, end: usize) -> Result<Variable> {
        self.slice(dim, begin, end)
    }

    fn concat_pair(a: &Variable, b: &Variable, dim: Dim) -> Result<Variable> {
        crate::shape::concat(a, b, dim)
    }

    fn bin_data(data: &Data) -> Option<&BinData<Variable>> {
        match data {
            Data::VariableBins(bins) => Some(bins),
            _ => None,
        }
    }

    fn into_data(bins: BinData<Variable>) -> Data {
        Data::VariableBins(bins)
    }
}

impl BinBuffer for DataArray {
    const BIN_DTYPE: DType = DType::DataArrayBins;

    fn extent_of(&self, dim: Dim) -> Result<usize> {
        self.data().dims().extent(dim)
    }

    fn slice_range(&self, dim: Dim, begin: usize, end: usize) -> Result<DataArray> {
        self.slice(dim, begin, end)
    }

    fn concat_pair(a: &DataArray, b: &DataArray, dim: Dim) -> Result<DataArray> {
        crate::dataset::shape::concat(a, b, dim)
    }

    fn bin_data(data: &Data) -> Option<&BinData<DataArray>> {
        match data {
            Data::DataArrayBins(bins) => Some(bins),
            _ => None,
        }
    }

    fn into_data(bins: BinData<DataArray>) -> Data {
        Data::DataArrayBins(bins)
    }
}

impl BinBuffer for Dataset {
    const BIN_DTYPE: DType = DType::DatasetBins;

    fn extent_of(&self, dim: Dim) -> Result<usize> {
        self.dims().extent(dim)
    }

    fn slice_range(&self, dim: Dim, begin: usize, end: usize) -> Result<Dataset> {
        self.slice(dim, begin, end)
    }

    fn concat_pair(a: &Dataset, b: &Dataset, dim: Dim) -> Result<Dataset> {
        crate::dataset::shape::concat_dataset(a, b, dim)
    }

    fn bin_data(data: &Data) -> Option<&BinData<Dataset>> {
        match data {
            Data::DatasetBins(bins) => Some(bins),
            _ => None,
        }
    }

    fn into_data(bins: BinData<Dataset>) -> Data {
        Data::DatasetBins(bins)
    }
}

/// Dispatch over the binned variants of [`Data`], binding the `BinData`
/// and a type alias for the buffer kind.
macro_rules! with_bin_data {
    ($data:expr, $bins:ident, $B:ident => $body:block, _ => $fallback:block) => {
        match $data {
            $crate::data::Data::VariableBins($bins) => {
                type $B = $crate::variable::Variable;
                $body
            }
            $crate::data::Data::DataArrayBins($bins) => {
                type $B = $crate::dataset::DataArray;
                $body
            }
            $crate::data::Data::DatasetBins($bins) => {
                type $B = $crate::dataset::Dataset;
                $body
            }
            _ => $fallback,
        }
    };
}
pub(crate) use with_bin_data;

impl Variable {
    /// Create a binned variable.
    ///
    /// `indices` must be an `index_pair` variable; each entry addresses
    /// the contiguous range `[begin, end)` along `dim` inside `buffer`.
    /// Ranges may be empty, out of order, and may overlap (overlapping
    /// bins are readable but rejected by in-place operations).
    ///
    /// Fails with `TypeError` for a non-`index_pair` `indices`,
    /// `DimensionError` when `buffer` lacks `dim`, and
    /// `BinnedDataError` for ranges outside the buffer.
    pub fn make_bins<B: BinBuffer>(indices: &Variable, dim: Dim, buffer: B) -> Result<Variable> {
        if indices.dtype() != DType::IndexPair {
            return Err(ArrayError::dtype(format!(
                "bin indices must have dtype index_pair, got {}",
                indices.dtype()
            )));
        }
        if indices.has_variances() {
            return Err(ArrayError::variances("bin indices cannot have variances"));
        }
        let extent = buffer.extent_of(dim)? as i64;
        let pairs = indices.to_vec::<IndexPair>()?;
        for pair in &pairs {
            if pair.begin < 0 || pair.begin > pair.end || pair.end > extent {
                return Err(ArrayError::binned_data(format!(
                    "bin range {} does not fit buffer extent {} along {}",
                    pair, extent, dim
                )));
            }
        }
        Ok(Variable::from_parts(
            *indices.dims(),
            Unit::none(),
            B::into_data(BinData {
                indices: Buffer::from_vec(pairs),
                dim,
                buffer: Box::new(buffer),
            }),
            None,
        ))
    }

    /// The dim inside the event buffer along which bins are contiguous.
    ///
    /// Fails with `TypeError` on dense variables.
    pub fn bin_dim(&self) -> Result<Dim> {
        with_bin_data!(&self.values, bins, _B => { Ok(bins.dim) }, _ => {
            Err(ArrayError::dtype(format!(
                "expected binned data, got dtype {}",
                self.dtype()
            )))
        })
    }

    /// The bin index ranges as an `index_pair` variable over the outer
    /// dims.
    pub fn bin_indices(&self) -> Result<Variable> {
        with_bin_data!(&self.values, bins, _B => {
            let slice = bins.indices.as_slice();
            let pairs: Vec<IndexPair> = self.logical_offsets().map(|o| slice[o]).collect();
            Variable::from_values(self.dims, Unit::none(), pairs)
        }, _ => {
            Err(ArrayError::dtype(format!(
                "expected binned data, got dtype {}",
                self.dtype()
            )))
        })
    }

    /// The number of events in each bin, as a dense `i64` variable over
    /// the outer dims.
    pub fn bin_sizes(&self) -> Result<Variable> {
        with_bin_data!(&self.values, bins, _B => {
            let slice = bins.indices.as_slice();
            let sizes: Vec<i64> = self
                .logical_offsets()
                .map(|o| slice[o].len() as i64)
                .collect();
            Variable::from_values(self.dims, Unit::none(), sizes)
        }, _ => {
            Err(ArrayError::dtype(format!(
                "expected binned data, got dtype {}",
                self.dtype()
            )))
        })
    }

    /// The event buffer of binned data with a `Variable` buffer.
    ///
    /// Fails with `TypeError` for dense variables or other buffer kinds.
    pub fn bin_buffer(&self) -> Result<&Variable> {
        match &self.values {
            Data::VariableBins(bins) => Ok(&bins.buffer),
            _ => Err(ArrayError::dtype(format!(
                "expected bin<Variable> data, got dtype {}",
                self.dtype()
            ))),
        }
    }

    /// The event buffer of binned data with a `DataArray` buffer.
    pub fn bin_buffer_data_array(&self) -> Result<&DataArray> {
        match &self.values {
            Data::DataArrayBins(bins) => Ok(&bins.buffer),
            _ => Err(ArrayError::dtype(format!(
                "expected bin<DataArray> data, got dtype {}",
                self.dtype()
            ))),
        }
    }
}

/// Per-bin equality of two binned variables of equal dims and dtype.
pub(crate) fn binned_eq(a: &Variable, b: &Variable) -> bool {
    fn eq_impl<B: BinBuffer>(a: &Variable, b: &Variable) -> bool {
        let (Some(ba), Some(bb)) = (B::bin_data(&a.values), B::bin_data(&b.values)) else {
            return false;
        };
        if ba.dim != bb.dim {
            return false;
        }
        let ia = ba.indices.as_slice();
        let ib = bb.indices.as_slice();
        for (off_a, off_b) in a.logical_offsets().zip(b.logical_offsets()) {
            let (ra, rb) = (ia[off_a].range(), ib[off_b].range());
            let sa = ba.buffer.slice_range(ba.dim, ra.start, ra.end);
            let sb = bb.buffer.slice_range(bb.dim, rb.start, rb.end);
            match (sa, sb) {
                (Ok(sa), Ok(sb)) if sa == sb => {}
                _ => return false,
            }
        }
        true
    }
    with_bin_data!(&a.values, _bins, B => { eq_impl::<B>(a, b) }, _ => { false })
}

/// An independent copy with a compacted event buffer: events appear in
/// bin order with no gaps, and indices are rebuilt accordingly.
pub(crate) fn deep_copy(v: &Variable) -> Variable {
    fn copy_impl<B: BinBuffer>(v: &Variable) -> Variable {
        let bins = B::bin_data(&v.values).expect("caller checked the dtype");
        let slice = bins.indices.as_slice();
        let mut new_pairs = Vec::with_capacity(v.volume());
        let mut merged: Option<B> = None;
        let mut cursor = 0i64;
        for off in v.logical_offsets() {
            let range = slice[off].range();
            let part = bins
                .buffer
                .slice_range(bins.dim, range.start, range.end)
                .expect("bin indices were validated on construction");
            let len = (range.end - range.start) as i64;
            new_pairs.push(IndexPair::new(cursor, cursor + len));
            cursor += len;
            merged = Some(match merged {
                None => part,
                Some(acc) => {
                    B::concat_pair(&acc, &part, bins.dim).expect("bins share one buffer layout")
                }
            });
        }
        let buffer = match merged {
            Some(buffer) => buffer,
            None => bins
                .buffer
                .slice_range(bins.dim, 0, 0)
                .expect("empty slice of the bin dim"),
        };
        Variable::from_parts(
            v.dims,
            v.unit,
            B::into_data(BinData {
                indices: Buffer::from_vec(new_pairs),
                dim: bins.dim,
                buffer: Box::new(buffer),
            }),
            None,
        )
    }
    with_bin_data!(&v.values, _bins, B => { copy_impl::<B>(v) }, _ => {
        unreachable!("deep_copy is only called for binned variables")
    })
}

/// A binned variable shaped like `v` with all bins empty.
pub(crate) fn empty_like(v: &Variable) -> Result<Variable> {
    fn impl_<B: BinBuffer>(v: &Variable) -> Result<Variable> {
        let bins = B::bin_data(&v.values).expect("caller checked the dtype");
        let buffer = bins.buffer.slice_range(bins.dim, 0, 0)?;
        Ok(Variable::from_parts(
            v.dims,
            v.unit,
            B::into_data(BinData {
                indices: Buffer::from_vec(vec![IndexPair::default(); v.volume()]),
                dim: bins.dim,
                buffer: Box::new(buffer),
            }),
            None,
        ))
    }
    with_bin_data!(&v.values, _bins, B => { impl_::<B>(v) }, _ => {
        Err(ArrayError::dtype("expected binned data"))
    })
}

/// Whether any two non-empty bins overlap. Overlapping bins are fine to
/// read but must not be mutated in place.
pub(crate) fn has_overlapping_bins(v: &Variable) -> bool {
    with_bin_data!(&v.values, bins, _B => {
        let slice = bins.indices.as_slice();
        let mut ranges: Vec<IndexPair> = v
            .logical_offsets()
            .map(|o| slice[o])
            .filter(|p| !p.is_empty())
            .collect();
        ranges.sort_by_key(|p| p.begin);
        ranges.windows(2).any(|w| w[1].begin < w[0].end)
    }, _ => { false })
}

/// Concatenate two binned variables along `dim`.
///
/// When `dim` is an outer dim the index arrays are joined (the second
/// shifted past the first buffer); when `dim` lives inside the buffers,
/// corresponding bins are joined event-wise.
pub(crate) fn concat_binned(a: &Variable, b: &Variable, dim: Dim) -> Result<Variable> {
    fn impl_<B: BinBuffer>(a: &Variable, b: &Variable, dim: Dim) -> Result<Variable> {
        let bins_a = B::bin_data(&a.values).expect("caller checked the dtype");
        let Some(bins_b) = B::bin_data(&b.values) else {
            return Err(ArrayError::dtype(format!(
                "cannot concatenate binned dtypes {} and {}",
                a.dtype(),
                b.dtype()
            )));
        };
        if bins_a.dim != bins_b.dim {
            return Err(ArrayError::binned_data(format!(
                "mismatching bin dims {} and {}",
                bins_a.dim, bins_b.dim
            )));
        }
        let bin_dim = bins_a.dim;
        if a.dims.contains(dim) || b.dims.contains(dim) {
            let dims = crate::shape::concat_dims(&a.dims, &b.dims, dim)?;
            // Joining index arrays back to back is only well-defined
            // along the outermost dim; interior dims would interleave.
            if dims.index_of(dim) != Some(0) {
                return Err(ArrayError::not_implemented(format!(
                    "concatenation of binned data along interior dim {}",
                    dim
                )));
            }
            let shift = bins_a.buffer.extent_of(bin_dim)? as i64;
            let slice_a = bins_a.indices.as_slice();
            let slice_b = bins_b.indices.as_slice();
            let mut pairs: Vec<IndexPair> = a.logical_offsets().map(|o| slice_a[o]).collect();
            pairs.extend(
                b.logical_offsets()
                    .map(|o| IndexPair::new(slice_b[o].begin + shift, slice_b[o].end + shift)),
            );
            let buffer = B::concat_pair(&bins_a.buffer, &bins_b.buffer, bin_dim)?;
            Ok(Variable::from_parts(
                dims,
                a.unit,
                B::into_data(BinData {
                    indices: Buffer::from_vec(pairs),
                    dim: bin_dim,
                    buffer: Box::new(buffer),
                }),
                None,
            ))
        } else {
            // Event-wise concat: bins pair up one-to-one.
            if a.dims != b.dims {
                return Err(ArrayError::dimension(format!(
                    "mismatching outer dims {} and {} for event-wise concatenation",
                    a.dims, b.dims
                )));
            }
            let slice_a = bins_a.indices.as_slice();
            let slice_b = bins_b.indices.as_slice();
            let mut pairs = Vec::with_capacity(a.volume());
            let mut merged: Option<B> = None;
            let mut cursor = 0i64;
            for (off_a, off_b) in a.logical_offsets().zip(b.logical_offsets()) {
                let (ra, rb) = (slice_a[off_a].range(), slice_b[off_b].range());
                let part_a = bins_a.buffer.slice_range(bin_dim, ra.start, ra.end)?;
                let part_b = bins_b.buffer.slice_range(bin_dim, rb.start, rb.end)?;
                let joined = B::concat_pair(&part_a, &part_b, dim)?;
                let len = joined.extent_of(bin_dim)? as i64;
                pairs.push(IndexPair::new(cursor, cursor + len));
                cursor += len;
                merged = Some(match merged {
                    None => joined,
                    Some(acc) => B::concat_pair(&acc, &joined, bin_dim)?,
                });
            }
            let buffer = match merged {
                Some(buffer) => buffer,
                None => bins_a.buffer.slice_range(bin_dim, 0, 0)?,
            };
            Ok(Variable::from_parts(
                a.dims,
                a.unit,
                B::into_data(BinData {
                    indices: Buffer::from_vec(pairs),
                    dim: bin_dim,
                    buffer: Box::new(buffer),
                }),
                None,
            ))
        }
    }
    with_bin_data!(&a.values, _bins, B => { impl_::<B>(a, b, dim) }, _ => {
        Err(ArrayError::dtype("expected binned data"))
    })
}

