// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Element-wise math: absolute value, square root, trigonometric and
//! hyperbolic functions, vector norm and dtype conversion.

use std::f64::consts::PI;

use crate::data::{with_float_dtype, Data, Element, FloatElement, NumericElement};
use crate::dimensions::Dimensions;
use crate::dtype::DType;
use crate::error::{ArrayError, Result};
use crate::spatial::Vector3;
use crate::transform::kernels::{align_strides, map1, map2};
use crate::transform::variance::ValueAndVariance;
use crate::transform::{self, Flags, FloatUnaryOp, NumericUnaryOp};
use crate::unit::Unit;
use crate::variable::Variable;

struct AbsOp;

impl NumericUnaryOp for AbsOp {
    const NAME: &'static str = "abs";

    fn unit(u: Unit) -> Result<Unit> {
        Ok(u)
    }

    fn apply<T: NumericElement>(x: T) -> T {
        x.abs()
    }

    fn apply_vv<T: FloatElement>(x: ValueAndVariance<T>) -> ValueAndVariance<T> {
        x.abs()
    }
}

/// Element-wise absolute value; variances are unchanged.
pub fn abs(a: &Variable) -> Result<Variable> {
    transform::unary_numeric::<AbsOp>(a)
}

struct SqrtOp;

impl FloatUnaryOp for SqrtOp {
    const NAME: &'static str = "sqrt";

    fn unit(u: Unit) -> Result<Unit> {
        u.sqrt()
    }

    fn apply<T: FloatElement>(x: T) -> T {
        x.sqrt()
    }

    fn apply_vv<T: FloatElement>(x: ValueAndVariance<T>) -> ValueAndVariance<T> {
        x.sqrt()
    }
}

/// Element-wise square root; the unit must have a square root too.
pub fn sqrt(a: &Variable) -> Result<Variable> {
    transform::unary_float::<SqrtOp>(a)
}

struct ReciprocalOp;

impl FloatUnaryOp for ReciprocalOp {
    const NAME: &'static str = "reciprocal";

    fn unit(u: Unit) -> Result<Unit> {
        Ok(u.recip())
    }

    fn apply<T: FloatElement>(x: T) -> T {
        x.recip()
    }

    fn apply_vv<T: FloatElement>(x: ValueAndVariance<T>) -> ValueAndVariance<T> {
        x.recip()
    }
}

/// Element-wise `1 / a`.
pub fn reciprocal(a: &Variable) -> Result<Variable> {
    transform::unary_float::<ReciprocalOp>(a)
}

fn angle_to_dimensionless(name: &str, u: Unit) -> Result<Unit> {
    if u.is_angle() {
        Ok(Unit::one())
    } else {
        Err(ArrayError::unit(format!(
            "{} requires rad or deg, got {}",
            name, u
        )))
    }
}

fn dimensionless_to(name: &str, u: Unit, out: Unit) -> Result<Unit> {
    if u.is_one() {
        Ok(out)
    } else {
        Err(ArrayError::unit(format!(
            "{} requires a dimensionless input, got {}",
            name, u
        )))
    }
}

fn no_variances() -> Flags {
    Flags {
        expect_variance: [Some(false), Some(false)],
        ..Flags::default()
    }
}

// Trigonometry takes angles in rad; deg inputs are folded in by an
// exact pi/180 prescale.
macro_rules! trig_op {
    ($op:ident, $fn_name:ident, $method:ident) => {
        struct $op;

        impl FloatUnaryOp for $op {
            const NAME: &'static str = stringify!($fn_name);

            fn flags() -> Flags {
                no_variances()
            }

            fn unit(u: Unit) -> Result<Unit> {
                angle_to_dimensionless(Self::NAME, u)
            }

            fn input_scale(u: Unit) -> f64 {
                if u.is_deg() {
                    PI / 180.0
                } else {
                    1.0
                }
            }

            fn apply<T: FloatElement>(x: T) -> T {
                x.$method()
            }

            fn apply_vv<T: FloatElement>(_x: ValueAndVariance<T>) -> ValueAndVariance<T> {
                unreachable!("variances are rejected up front")
            }
        }

        /// Element-wise
        #[doc = concat!("`", stringify!($fn_name), "`")]
        /// of an angle (`rad` or `deg`); variances are not supported.
        pub fn $fn_name(a: &Variable) -> Result<Variable> {
            transform::unary_float::<$op>(a)
        }
    };
}

trig_op!(SinOp, sin, sin);
trig_op!(CosOp, cos, cos);
trig_op!(TanOp, tan, tan);

// Inverse trigonometry returns angles in rad from dimensionless input.
macro_rules! inverse_trig_op {
    ($op:ident, $fn_name:ident, $method:ident) => {
        struct $op;

        impl FloatUnaryOp for $op {
            const NAME: &'static str = stringify!($fn_name);

            fn flags() -> Flags {
                no_variances()
            }

            fn unit(u: Unit) -> Result<Unit> {
                dimensionless_to(Self::NAME, u, Unit::rad())
            }

            fn apply<T: FloatElement>(x: T) -> T {
                x.$method()
            }

            fn apply_vv<T: FloatElement>(_x: ValueAndVariance<T>) -> ValueAndVariance<T> {
                unreachable!("variances are rejected up front")
            }
        }

        /// Element-wise
        #[doc = concat!("`", stringify!($fn_name), "`")]
        /// returning `rad`; variances are not supported.
        pub fn $fn_name(a: &Variable) -> Result<Variable> {
            transform::unary_float::<$op>(a)
        }
    };
}

inverse_trig_op!(AsinOp, asin, asin);
inverse_trig_op!(AcosOp, acos, acos);
inverse_trig_op!(AtanOp, atan, atan);

macro_rules! hyperbolic_op {
    ($op:ident, $fn_name:ident, $method:ident) => {
        struct $op;

        impl FloatUnaryOp for $op {
            const NAME: &'static str = stringify!($fn_name);

            fn flags() -> Flags {
                no_variances()
            }

            fn unit(u: Unit) -> Result<Unit> {
                dimensionless_to(Self::NAME, u, Unit::one())
            }

            fn apply<T: FloatElement>(x: T) -> T {
                x.$method()
            }

            fn apply_vv<T: FloatElement>(_x: ValueAndVariance<T>) -> ValueAndVariance<T> {
                unreachable!("variances are rejected up front")
            }
        }

        /// Element-wise
        #[doc = concat!("`", stringify!($fn_name), "`")]
        /// of a dimensionless input; variances are not supported.
        pub fn $fn_name(a: &Variable) -> Result<Variable> {
            transform::unary_float::<$op>(a)
        }
    };
}

hyperbolic_op!(SinhOp, sinh, sinh);
hyperbolic_op!(CoshOp, cosh, cosh);
hyperbolic_op!(TanhOp, tanh, tanh);
hyperbolic_op!(AsinhOp, asinh, asinh);
hyperbolic_op!(AcoshOp, acosh, acosh);
hyperbolic_op!(AtanhOp, atanh, atanh);

/// Element-wise `atan2(y, x)` in `rad`.
///
/// `y` and `x` must share a unit and be of floating dtype; variances
/// are not supported.
pub fn atan2(y: &Variable, x: &Variable) -> Result<Variable> {
    if y.unit() != x.unit() {
        return Err(ArrayError::unit(format!(
            "atan2 requires equal units, got {} and {}",
            y.unit(),
            x.unit()
        )));
    }
    if y.has_variances() || x.has_variances() {
        return Err(ArrayError::variances("atan2 does not accept variances"));
    }
    let dtype = match DType::promote(y.dtype(), x.dtype()) {
        Some(dtype) if dtype.is_float() => dtype,
        _ => {
            return Err(ArrayError::dtype(format!(
                "atan2 does not support dtypes ({}, {})",
                y.dtype(),
                x.dtype()
            )))
        }
    };
    let out_dims = Dimensions::union(&[y.dims(), x.dims()])?;
    let y = transform::convert_numeric(y, dtype)?;
    let x = transform::convert_numeric(x, dtype)?;
    with_float_dtype!(dtype, T => {
        let yv = <T as Element>::buffer(&y.values).expect("converted above").as_slice();
        let xv = <T as Element>::buffer(&x.values).expect("converted above").as_slice();
        let sy = align_strides(y.dims(), y.strides(), &out_dims);
        let sx = align_strides(x.dims(), x.strides(), &out_dims);
        let values = map2(out_dims.shape(), yv, y.offset, &sy, xv, x.offset, &sx, |a, b| {
            a.atan2(*b)
        });
        Ok(Variable::from_parts(out_dims, Unit::rad(), Data::from(values), None))
    }, _ => { unreachable!() })
}

/// Element-wise Euclidean norm of a `vector3` variable.
pub fn norm(a: &Variable) -> Result<Variable> {
    if a.dtype() != DType::Vector3 {
        return Err(ArrayError::dtype(format!(
            "norm requires dtype vector3, got {}",
            a.dtype()
        )));
    }
    let av = Vector3::buffer(&a.values).expect("dtype matched").as_slice();
    let sa = align_strides(a.dims(), a.strides(), a.dims());
    let values = map1(a.dims().shape(), av, a.offset, &sa, |v| v.norm());
    Ok(Variable::from_parts(*a.dims(), a.unit(), Data::from(values), None))
}

/// Convert to another numeric dtype, materializing a contiguous copy.
///
/// Converting a variance-carrying variable to an integer dtype is a
/// `VariancesError`; converting to the same dtype is a plain copy.
pub fn astype(a: &Variable, dtype: DType) -> Result<Variable> {
    if a.dtype() == dtype {
        return Ok(a.copy());
    }
    transform::convert_numeric(a, dtype)
}
