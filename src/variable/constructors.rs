// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Constructors for dense variables.

use crate::data::{Data, Element};
use crate::dim::Dim;
use crate::dimensions::{Dimensions, Strides};
use crate::dtype::DType;
use crate::error::{ArrayError, Result};
use crate::unit::Unit;
use crate::variable::Variable;

/// The unit a freshly constructed variable of `dtype` gets when none is
/// given: `none` for non-quantity dtypes, dimensionless otherwise.
pub fn default_unit(dtype: DType) -> Unit {
    match dtype {
        DType::String
        | DType::Bool
        | DType::IndexPair
        | DType::DataArray
        | DType::Dataset
        | DType::VariableBins
        | DType::DataArrayBins
        | DType::DatasetBins => Unit::none(),
        _ => Unit::one(),
    }
}

impl Variable {
    /// Assemble a variable from canonical contiguous parts.
    pub(crate) fn from_parts(
        dims: Dimensions,
        unit: Unit,
        values: Data,
        variances: Option<Data>,
    ) -> Variable {
        debug_assert_eq!(values.len(), dims.volume());
        debug_assert!(variances.as_ref().map_or(true, |v| v.len() == values.len()));
        Variable {
            strides: Strides::row_major(&dims),
            offset: 0,
            dims,
            unit,
            values,
            variances,
        }
    }

    /// A zero-filled variable.
    ///
    /// Fails with `TypeError` for dtypes without a default element.
    pub fn zeros(dims: Dimensions, unit: Unit, dtype: DType, with_variances: bool) -> Result<Variable> {
        let volume = dims.volume();
        let values = Data::zeros(dtype, volume)?;
        let variances = if with_variances {
            if !dtype.is_float() {
                return Err(ArrayError::variances(format!(
                    "variances require a floating dtype, got {}",
                    dtype
                )));
            }
            Some(Data::zeros(dtype, volume)?)
        } else {
            None
        };
        Ok(Variable::from_parts(dims, unit, values, variances))
    }

    /// An "uninitialized" variable; elements are default-filled.
    pub fn empty(dims: Dimensions, unit: Unit, dtype: DType, with_variances: bool) -> Result<Variable> {
        Variable::zeros(dims, unit, dtype, with_variances)
    }

    /// A one-filled numeric variable; with variances, they are 1 too.
    pub fn ones(dims: Dimensions, unit: Unit, dtype: DType, with_variances: bool) -> Result<Variable> {
        fn filled<T: Element>(n: usize, value: T) -> Data {
            Data::from(vec![value; n])
        }
        let volume = dims.volume();
        let values = match dtype {
            DType::Float64 => filled(volume, 1.0f64),
            DType::Float32 => filled(volume, 1.0f32),
            DType::Int64 => filled(volume, 1i64),
            DType::Int32 => filled(volume, 1i32),
            other => {
                return Err(ArrayError::dtype(format!(
                    "ones is only defined for numeric dtypes, got {}",
                    other
                )))
            }
        };
        let variances = if with_variances {
            if !dtype.is_float() {
                return Err(ArrayError::variances(format!(
                    "variances require a floating dtype, got {}",
                    dtype
                )));
            }
            Some(match dtype {
                DType::Float64 => filled(volume, 1.0f64),
                _ => filled(volume, 1.0f32),
            })
        } else {
            None
        };
        Ok(Variable::from_parts(dims, unit, values, variances))
    }

    /// A zero-filled variable shaped like `self`. A binned variable
    /// yields empty bins over a drained event buffer.
    pub fn zeros_like(&self) -> Result<Variable> {
        if self.is_binned() {
            return super::bins::empty_like(self);
        }
        Variable::zeros(self.dims, self.unit, self.dtype(), self.has_variances())
    }

    /// A one-filled variable shaped like `self`.
    pub fn ones_like(&self) -> Result<Variable> {
        Variable::ones(self.dims, self.unit, self.dtype(), self.has_variances())
    }

    /// A variable filled with copies of `value`.
    pub fn full<T: Element>(dims: Dimensions, unit: Unit, value: T) -> Variable {
        let volume = dims.volume();
        Variable::from_parts(dims, unit, Data::from(vec![value; volume]), None)
    }

    /// A variable over `dims` owning `values`.
    ///
    /// Fails with `DimensionError` when the value count does not match
    /// the volume of `dims`.
    pub fn from_values<T: Element>(dims: Dimensions, unit: Unit, values: Vec<T>) -> Result<Variable> {
        if values.len() != dims.volume() {
            return Err(ArrayError::dimension(format!(
                "got {} values for dims {} of volume {}",
                values.len(),
                dims,
                dims.volume()
            )));
        }
        Ok(Variable::from_parts(dims, unit, Data::from(values), None))
    }

    /// A variable over `dims` owning `values` and `variances`.
    ///
    /// The element type must be floating (`VariancesError` otherwise).
    pub fn from_values_and_variances<T: Element>(
        dims: Dimensions,
        unit: Unit,
        values: Vec<T>,
        variances: Vec<T>,
    ) -> Result<Variable> {
        if !T::DTYPE.is_float() {
            return Err(ArrayError::variances(format!(
                "variances require a floating dtype, got {}",
                T::DTYPE
            )));
        }
        if values.len() != dims.volume() || variances.len() != values.len() {
            return Err(ArrayError::dimension(format!(
                "got {} values and {} variances for dims {} of volume {}",
                values.len(),
                variances.len(),
                dims,
                dims.volume()
            )));
        }
        Ok(Variable::from_parts(
            dims,
            unit,
            Data::from(values),
            Some(Data::from(variances)),
        ))
    }

    /// A 0-d variable holding `value` with the dtype's default unit.
    pub fn scalar<T: Element>(value: T) -> Variable {
        Variable::scalar_with_unit(value, default_unit(T::DTYPE))
    }

    /// A 0-d variable holding `value` with the given unit.
    pub fn scalar_with_unit<T: Element>(value: T, unit: Unit) -> Variable {
        Variable::from_parts(Dimensions::new(), unit, Data::from(vec![value]), None)
    }

    /// A 0-d variable with a value and a variance.
    pub fn scalar_with_variance<T: Element>(value: T, variance: T, unit: Unit) -> Result<Variable> {
        if !T::DTYPE.is_float() {
            return Err(ArrayError::variances(format!(
                "variances require a floating dtype, got {}",
                T::DTYPE
            )));
        }
        Ok(Variable::from_parts(
            Dimensions::new(),
            unit,
            Data::from(vec![value]),
            Some(Data::from(vec![variance])),
        ))
    }

    /// The integers `0..n` along `dim`, dimensionless `i64`.
    pub fn arange(dim: Dim, n: usize) -> Result<Variable> {
        let dims = Dimensions::from_pairs(&[(dim, n)])?;
        let values: Vec<i64> = (0..n as i64).collect();
        Ok(Variable::from_parts(dims, Unit::one(), Data::from(values), None))
    }

    /// `n` evenly spaced `f64` values from `start` to `stop` inclusive.
    pub fn linspace(dim: Dim, start: f64, stop: f64, n: usize) -> Result<Variable> {
        let dims = Dimensions::from_pairs(&[(dim, n)])?;
        let values: Vec<f64> = match n {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (stop - start) / (n - 1) as f64;
                (0..n).map(|i| start + step * i as f64).collect()
            }
        };
        Ok(Variable::from_parts(dims, Unit::one(), Data::from(values), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Dim {
        Dim::new("x")
    }

    #[test]
    fn from_values_checks_volume() {
        let dims = Dimensions::from_pairs(&[(x(), 3)]).unwrap();
        assert!(Variable::from_values(dims, Unit::m(), vec![1.0, 2.0]).is_err());
        let v = Variable::from_values(dims, Unit::m(), vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(v.volume(), 3);
        assert_eq!(v.unit(), Unit::m());
        assert_eq!(v.dtype(), DType::Float64);
    }

    #[test]
    fn variances_must_be_float() {
        let dims = Dimensions::from_pairs(&[(x(), 2)]).unwrap();
        assert!(
            Variable::from_values_and_variances(dims, Unit::one(), vec![1i64, 2], vec![1, 2])
                .is_err()
        );
        assert!(Variable::zeros(dims, Unit::one(), DType::Int32, true).is_err());
    }

    #[test]
    fn scalar_default_units() {
        assert_eq!(Variable::scalar(1.0f64).unit(), Unit::one());
        assert_eq!(Variable::scalar("a".to_owned()).unit(), Unit::none());
        assert_eq!(Variable::scalar(true).unit(), Unit::none());
    }

    #[test]
    fn arange_and_linspace() {
        let a = Variable::arange(x(), 4).unwrap();
        assert_eq!(a.to_vec::<i64>().unwrap(), vec![0, 1, 2, 3]);
        let l = Variable::linspace(x(), 0.0, 1.0, 5).unwrap();
        assert_eq!(l.to_vec::<f64>().unwrap(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(Variable::linspace(x(), 2.0, 3.0, 1).unwrap().to_vec::<f64>().unwrap(), vec![2.0]);
    }

    #[test]
    fn zero_volume_materializes_nothing() {
        let dims = Dimensions::from_pairs(&[(x(), 0)]).unwrap();
        let v = Variable::zeros(dims, Unit::counts(), DType::Float64, false).unwrap();
        assert_eq!(v.volume(), 0);
        assert_eq!(v.values::<f64>().unwrap().len(), 0);
        assert_eq!(v.dtype(), DType::Float64);
        assert_eq!(v.unit(), Unit::counts());
    }
}
