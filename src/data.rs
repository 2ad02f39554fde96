// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Type-erased element storage.
//!
//! A [`Variable`](crate::Variable) pairs a [`DType`] tag with one of the
//! typed buffers below. Kernels re-enter typed code through the
//! [`with_dense!`] dispatch macro or through [`Element`]; both are
//! exhaustive over the closed dtype set.

use std::fmt;

use num_traits::{Float, NumCast, Signed};

use crate::buffer::Buffer;
use crate::dataset::{DataArray, Dataset};
use crate::dim::Dim;
use crate::dtype::{DType, IndexPair, TimePoint};
use crate::error::{ArrayError, Result};
use crate::spatial::{Affine3, Matrix3, Rotation, Translation, Vector3};
use crate::variable::Variable;

/// The ragged payload of a binned variable: one `[begin, end)` range per
/// outer element, the dim those ranges run along, and the event buffer.
#[derive(Clone, Debug)]
pub struct BinData<B> {
    pub indices: Buffer<IndexPair>,
    pub dim: Dim,
    pub buffer: Box<B>,
}

/// Type-erased storage for one dtype.
#[derive(Clone, Debug)]
pub enum Data {
    Float64(Buffer<f64>),
    Float32(Buffer<f32>),
    Int64(Buffer<i64>),
    Int32(Buffer<i32>),
    Bool(Buffer<bool>),
    Str(Buffer<String>),
    TimePoint(Buffer<TimePoint>),
    Vector3(Buffer<Vector3>),
    Matrix3(Buffer<Matrix3>),
    Affine3(Buffer<Affine3>),
    Rotation(Buffer<Rotation>),
    Translation(Buffer<Translation>),
    IndexPair(Buffer<IndexPair>),
    VariableBins(BinData<Variable>),
    DataArrayBins(BinData<DataArray>),
    DatasetBins(BinData<Dataset>),
    DataArrayElem(Buffer<DataArray>),
    DatasetElem(Buffer<Dataset>),
}

/// Dispatch over the dense variants of [`Data`], binding the buffer and
/// a local type alias for the element type. Binned variants fall through
/// to the final arm.
macro_rules! with_dense {
    ($data:expr, $buf:ident, $T:ident => $body:block, _ => $fallback:block) => {
        match $data {
            $crate::data::Data::Float64($buf) => {
                type $T = f64;
                $body
            }
            $crate::data::Data::Float32($buf) => {
                type $T = f32;
                $body
            }
            $crate::data::Data::Int64($buf) => {
                type $T = i64;
                $body
            }
            $crate::data::Data::Int32($buf) => {
                type $T = i32;
                $body
            }
            $crate::data::Data::Bool($buf) => {
                type $T = bool;
                $body
            }
            $crate::data::Data::Str($buf) => {
                type $T = ::std::string::String;
                $body
            }
            $crate::data::Data::TimePoint($buf) => {
                type $T = $crate::dtype::TimePoint;
                $body
            }
            $crate::data::Data::Vector3($buf) => {
                type $T = $crate::spatial::Vector3;
                $body
            }
            $crate::data::Data::Matrix3($buf) => {
                type $T = $crate::spatial::Matrix3;
                $body
            }
            $crate::data::Data::Affine3($buf) => {
                type $T = $crate::spatial::Affine3;
                $body
            }
            $crate::data::Data::Rotation($buf) => {
                type $T = $crate::spatial::Rotation;
                $body
            }
            $crate::data::Data::Translation($buf) => {
                type $T = $crate::spatial::Translation;
                $body
            }
            $crate::data::Data::IndexPair($buf) => {
                type $T = $crate::dtype::IndexPair;
                $body
            }
            $crate::data::Data::DataArrayElem($buf) => {
                type $T = $crate::dataset::DataArray;
                $body
            }
            $crate::data::Data::DatasetElem($buf) => {
                type $T = $crate::dataset::Dataset;
                $body
            }
            _ => $fallback,
        }
    };
}
pub(crate) use with_dense;

/// Dispatch over the dense dtype tags without touching any storage,
/// binding only a local type alias. Binned and wrapper-free dtypes fall
/// through to the final arm.
macro_rules! with_dense_dtype {
    ($dtype:expr, $T:ident => $body:block, _ => $fallback:block) => {
        match $dtype {
            $crate::dtype::DType::Float64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::dtype::DType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::dtype::DType::Bool => {
                type $T = bool;
                $body
            }
            $crate::dtype::DType::String => {
                type $T = ::std::string::String;
                $body
            }
            $crate::dtype::DType::TimePoint => {
                type $T = $crate::dtype::TimePoint;
                $body
            }
            $crate::dtype::DType::Vector3 => {
                type $T = $crate::spatial::Vector3;
                $body
            }
            $crate::dtype::DType::Matrix3 => {
                type $T = $crate::spatial::Matrix3;
                $body
            }
            $crate::dtype::DType::Affine3 => {
                type $T = $crate::spatial::Affine3;
                $body
            }
            $crate::dtype::DType::Rotation => {
                type $T = $crate::spatial::Rotation;
                $body
            }
            $crate::dtype::DType::Translation => {
                type $T = $crate::spatial::Translation;
                $body
            }
            $crate::dtype::DType::IndexPair => {
                type $T = $crate::dtype::IndexPair;
                $body
            }
            $crate::dtype::DType::DataArray => {
                type $T = $crate::dataset::DataArray;
                $body
            }
            $crate::dtype::DType::Dataset => {
                type $T = $crate::dataset::Dataset;
                $body
            }
            _ => $fallback,
        }
    };
}
pub(crate) use with_dense_dtype;

/// Dispatch over the numeric dtype tags (`f64 f32 i64 i32`) only.
macro_rules! with_numeric_dtype {
    ($dtype:expr, $T:ident => $body:block, _ => $fallback:block) => {
        match $dtype {
            $crate::dtype::DType::Float64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::dtype::DType::Int32 => {
                type $T = i32;
                $body
            }
            _ => $fallback,
        }
    };
}
pub(crate) use with_numeric_dtype;

/// Dispatch over the floating dtype tags (`f64 f32`) only.
macro_rules! with_float_dtype {
    ($dtype:expr, $T:ident => $body:block, _ => $fallback:block) => {
        match $dtype {
            $crate::dtype::DType::Float64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::Float32 => {
                type $T = f32;
                $body
            }
            _ => $fallback,
        }
    };
}
pub(crate) use with_float_dtype;

/// An element type of the closed dtype set.
///
/// This trait is the typed gateway into the erased [`Data`] storage; it
/// is implemented exactly for the types named by [`DType`] and cannot be
/// implemented outside the crate.
pub trait Element: Clone + PartialEq + fmt::Debug + 'static + private::Sealed {
    /// The dtype tag of this element type.
    const DTYPE: DType;

    #[doc(hidden)]
    fn data_from(buffer: Buffer<Self>) -> Data;
    #[doc(hidden)]
    fn buffer(data: &Data) -> Option<&Buffer<Self>>;
    #[doc(hidden)]
    fn buffer_mut(data: &mut Data) -> Option<&mut Buffer<Self>>;
}

mod private {
    pub trait Sealed {}
}

macro_rules! impl_element {
    ($t:ty, $variant:ident, $dtype:ident) => {
        impl private::Sealed for $t {}
        impl Element for $t {
            const DTYPE: DType = DType::$dtype;

            fn data_from(buffer: Buffer<Self>) -> Data {
                Data::$variant(buffer)
            }

            fn buffer(data: &Data) -> Option<&Buffer<Self>> {
                match data {
                    Data::$variant(buffer) => Some(buffer),
                    _ => None,
                }
            }

            fn buffer_mut(data: &mut Data) -> Option<&mut Buffer<Self>> {
                match data {
                    Data::$variant(buffer) => Some(buffer),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(f64, Float64, Float64);
impl_element!(f32, Float32, Float32);
impl_element!(i64, Int64, Int64);
impl_element!(i32, Int32, Int32);
impl_element!(bool, Bool, Bool);
impl_element!(String, Str, String);
impl_element!(TimePoint, TimePoint, TimePoint);
impl_element!(Vector3, Vector3, Vector3);
impl_element!(Matrix3, Matrix3, Matrix3);
impl_element!(Affine3, Affine3, Affine3);
impl_element!(Rotation, Rotation, Rotation);
impl_element!(Translation, Translation, Translation);
impl_element!(IndexPair, IndexPair, IndexPair);
impl_element!(DataArray, DataArrayElem, DataArray);
impl_element!(Dataset, DatasetElem, Dataset);

/// Numeric element types the arithmetic kernels are instantiated for.
pub(crate) trait NumericElement: Element + Copy + PartialOrd + Signed + NumCast {
    const MAX: Self;
    const LOWEST: Self;
}

impl NumericElement for f64 {
    const MAX: f64 = f64::MAX;
    const LOWEST: f64 = f64::MIN;
}
impl NumericElement for f32 {
    const MAX: f32 = f32::MAX;
    const LOWEST: f32 = f32::MIN;
}
impl NumericElement for i64 {
    const MAX: i64 = i64::MAX;
    const LOWEST: i64 = i64::MIN;
}
impl NumericElement for i32 {
    const MAX: i32 = i32::MAX;
    const LOWEST: i32 = i32::MIN;
}

/// Floating element types that can carry variances.
pub(crate) trait FloatElement: NumericElement + Float {}
impl FloatElement for f64 {}
impl FloatElement for f32 {}

impl Data {
    /// The dtype tag of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            Data::Float64(_) => DType::Float64,
            Data::Float32(_) => DType::Float32,
            Data::Int64(_) => DType::Int64,
            Data::Int32(_) => DType::Int32,
            Data::Bool(_) => DType::Bool,
            Data::Str(_) => DType::String,
            Data::TimePoint(_) => DType::TimePoint,
            Data::Vector3(_) => DType::Vector3,
            Data::Matrix3(_) => DType::Matrix3,
            Data::Affine3(_) => DType::Affine3,
            Data::Rotation(_) => DType::Rotation,
            Data::Translation(_) => DType::Translation,
            Data::IndexPair(_) => DType::IndexPair,
            Data::VariableBins(_) => DType::VariableBins,
            Data::DataArrayBins(_) => DType::DataArrayBins,
            Data::DatasetBins(_) => DType::DatasetBins,
            Data::DataArrayElem(_) => DType::DataArray,
            Data::DatasetElem(_) => DType::Dataset,
        }
    }

    /// The number of stored outer elements (index pairs for bins).
    pub fn len(&self) -> usize {
        match self {
            Data::VariableBins(bins) => bins.indices.len(),
            Data::DataArrayBins(bins) => bins.indices.len(),
            Data::DatasetBins(bins) => bins.indices.len(),
            data => with_dense!(data, buf, _T => { buf.len() }, _ => { unreachable!() }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Default-filled storage of `len` elements.
    ///
    /// Fails with `TypeError` for dtypes without a default element
    /// (`DataArray`, `Dataset` and the binned dtypes).
    pub fn zeros(dtype: DType, len: usize) -> Result<Data> {
        Ok(match dtype {
            DType::Float64 => Data::Float64(Buffer::from_vec(vec![0.0f64; len])),
            DType::Float32 => Data::Float32(Buffer::from_vec(vec![0.0f32; len])),
            DType::Int64 => Data::Int64(Buffer::from_vec(vec![0i64; len])),
            DType::Int32 => Data::Int32(Buffer::from_vec(vec![0i32; len])),
            DType::Bool => Data::Bool(Buffer::from_vec(vec![false; len])),
            DType::String => Data::Str(Buffer::from_vec(vec![String::new(); len])),
            DType::TimePoint => Data::TimePoint(Buffer::from_vec(vec![TimePoint::default(); len])),
            DType::Vector3 => Data::Vector3(Buffer::from_vec(vec![Vector3::zero(); len])),
            DType::Matrix3 => Data::Matrix3(Buffer::from_vec(vec![Matrix3::default(); len])),
            DType::Affine3 => Data::Affine3(Buffer::from_vec(vec![Affine3::identity(); len])),
            DType::Rotation => Data::Rotation(Buffer::from_vec(vec![Rotation::identity(); len])),
            DType::Translation => {
                Data::Translation(Buffer::from_vec(vec![Translation::identity(); len]))
            }
            DType::IndexPair => Data::IndexPair(Buffer::from_vec(vec![IndexPair::default(); len])),
            other => {
                return Err(ArrayError::dtype(format!(
                    "cannot default-construct elements of dtype {}",
                    other
                )))
            }
        })
    }

    /// Clone the elements at `offsets`, in order, into fresh contiguous
    /// storage. For binned data this gathers the index pairs; compacting
    /// the event buffer is the caller's concern.
    pub(crate) fn gather(&self, offsets: impl Iterator<Item = usize>) -> Data {
        match self {
            Data::VariableBins(bins) => Data::VariableBins(BinData {
                indices: gather_buffer(&bins.indices, offsets),
                dim: bins.dim,
                buffer: bins.buffer.clone(),
            }),
            Data::DataArrayBins(bins) => Data::DataArrayBins(BinData {
                indices: gather_buffer(&bins.indices, offsets),
                dim: bins.dim,
                buffer: bins.buffer.clone(),
            }),
            Data::DatasetBins(bins) => Data::DatasetBins(BinData {
                indices: gather_buffer(&bins.indices, offsets),
                dim: bins.dim,
                buffer: bins.buffer.clone(),
            }),
            data => with_dense!(data, buf, _T => {
                Data::from(gather_buffer(buf, offsets))
            }, _ => { unreachable!() }),
        }
    }

    /// Clone elements picked from two same-dtype storages into fresh
    /// contiguous storage: `(false, o)` takes `self[o]`, `(true, o)`
    /// takes `other[o]`. Used by concatenation; binned data never gets
    /// here.
    pub(crate) fn gather_pair(
        &self,
        other: &Data,
        picks: impl Iterator<Item = (bool, usize)>,
    ) -> Data {
        with_dense!(self, buf, T => {
            let a = buf.as_slice();
            let b = <T as Element>::buffer(other)
                .expect("caller checked the dtypes")
                .as_slice();
            let values: Vec<T> = picks
                .map(|(from_other, o)| if from_other { b[o].clone() } else { a[o].clone() })
                .collect();
            Data::from(values)
        }, _ => {
            unreachable!("gather_pair is not used for binned data")
        })
    }

    /// Compare the elements addressed by the two offset sequences.
    /// `false` when the dtypes differ. Binned variants compare their
    /// index pairs only; per-bin content comparison lives at the
    /// `Variable` level.
    pub(crate) fn eq_elements(
        &self,
        offsets: impl Iterator<Item = usize>,
        other: &Data,
        other_offsets: impl Iterator<Item = usize>,
    ) -> bool {
        fn eq_typed<T: PartialEq>(
            a: &[T],
            offs_a: impl Iterator<Item = usize>,
            b: &[T],
            offs_b: impl Iterator<Item = usize>,
        ) -> bool {
            let mut offs_b = offs_b;
            for off_a in offs_a {
                match offs_b.next() {
                    Some(off_b) if a[off_a] == b[off_b] => {}
                    _ => return false,
                }
            }
            offs_b.next().is_none()
        }
        with_dense!(self, buf, T => {
            match <T as Element>::buffer(other) {
                Some(other_buf) => eq_typed(
                    buf.as_slice(),
                    offsets,
                    other_buf.as_slice(),
                    other_offsets,
                ),
                None => false,
            }
        }, _ => {
            let (a, b) = match (self, other) {
                (Data::VariableBins(a), Data::VariableBins(b)) => (&a.indices, &b.indices),
                (Data::DataArrayBins(a), Data::DataArrayBins(b)) => (&a.indices, &b.indices),
                (Data::DatasetBins(a), Data::DatasetBins(b)) => (&a.indices, &b.indices),
                _ => return false,
            };
            eq_typed(a.as_slice(), offsets, b.as_slice(), other_offsets)
        })
    }

    /// Whether the two storages share an allocation (aliasing test for
    /// in-place kernels).
    pub(crate) fn shares_buffer_with(&self, other: &Data) -> bool {
        macro_rules! same {
            ($($variant:ident),*) => {
                match (self, other) {
                    $((Data::$variant(a), Data::$variant(b)) => a.ptr_eq(b),)*
                    (Data::VariableBins(a), Data::VariableBins(b)) => a.indices.ptr_eq(&b.indices),
                    (Data::DataArrayBins(a), Data::DataArrayBins(b)) => a.indices.ptr_eq(&b.indices),
                    (Data::DatasetBins(a), Data::DatasetBins(b)) => a.indices.ptr_eq(&b.indices),
                    _ => false,
                }
            };
        }
        same!(
            Float64,
            Float32,
            Int64,
            Int32,
            Bool,
            Str,
            TimePoint,
            Vector3,
            Matrix3,
            Affine3,
            Rotation,
            Translation,
            IndexPair,
            DataArrayElem,
            DatasetElem
        )
    }
}

fn gather_buffer<T: Clone>(buf: &Buffer<T>, offsets: impl Iterator<Item = usize>) -> Buffer<T> {
    let slice = buf.as_slice();
    Buffer::from_vec(offsets.map(|o| slice[o].clone()).collect())
}

impl<T: Element> From<Buffer<T>> for Data {
    fn from(buffer: Buffer<T>) -> Data {
        T::data_from(buffer)
    }
}

impl<T: Element> From<Vec<T>> for Data {
    fn from(v: Vec<T>) -> Data {
        T::data_from(Buffer::from_vec(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_round_trip() {
        let data = Data::from(vec![1.0f64, 2.0, 3.0]);
        assert_eq!(data.dtype(), DType::Float64);
        assert_eq!(data.len(), 3);
        assert_eq!(<f64 as Element>::buffer(&data).unwrap().as_slice(), &[1.0, 2.0, 3.0]);
        assert!(<f32 as Element>::buffer(&data).is_none());
    }

    #[test]
    fn gather_reorders() {
        let data = Data::from(vec![10i64, 20, 30]);
        let gathered = data.gather([2usize, 0].into_iter());
        assert_eq!(<i64 as Element>::buffer(&gathered).unwrap().as_slice(), &[30, 10]);
    }

    #[test]
    fn zeros_rejects_wrapper_dtypes() {
        assert!(Data::zeros(DType::Float32, 2).is_ok());
        assert!(Data::zeros(DType::DataArray, 2).is_err());
        assert!(Data::zeros(DType::VariableBins, 2).is_err());
    }

    #[test]
    fn eq_elements_respects_offsets() {
        let a = Data::from(vec![1i32, 2, 3]);
        let b = Data::from(vec![3i32, 2, 1]);
        assert!(a.eq_elements([0usize, 2].into_iter(), &b, [2usize, 0].into_iter()));
        assert!(!a.eq_elements([0usize].into_iter(), &b, [0usize].into_iter()));
    }
}
