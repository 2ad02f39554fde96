// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Arithmetic on variables: named fallible functions plus the operator
//! sugar. Numeric dtypes run through the generic transform kernels;
//! strings, time points and the spatial types take dedicated paths.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::data::{Data, Element, FloatElement, NumericElement};
use crate::dimensions::Dimensions;
use crate::dtype::{DType, TimePoint};
use crate::error::{ArrayError, Result};
use crate::spatial::{Affine3, Matrix3, Rotation, Translation, Vector3};
use crate::transform::kernels::{align_strides, map1, map2};
use crate::transform::variance::ValueAndVariance;
use crate::transform::{self, BinaryOp, Flags, NumericUnaryOp};
use crate::unit::Unit;
use crate::variable::Variable;

fn same_unit(name: &str, a: Unit, b: Unit) -> Result<Unit> {
    if a == b {
        Ok(a)
    } else {
        Err(ArrayError::unit(format!(
            "{} requires equal units, got {} and {}",
            name, a, b
        )))
    }
}

pub(crate) struct AddOp;

impl BinaryOp for AddOp {
    const NAME: &'static str = "add";

    fn flags() -> Flags {
        Flags {
            parallel_safe: true,
            ..Flags::default()
        }
    }

    fn unit(a: Unit, b: Unit) -> Result<Unit> {
        same_unit(Self::NAME, a, b)
    }

    fn apply<T: NumericElement>(a: T, b: T) -> T {
        a + b
    }

    fn apply_vv<T: FloatElement>(
        a: ValueAndVariance<T>,
        b: ValueAndVariance<T>,
    ) -> ValueAndVariance<T> {
        a + b
    }
}

pub(crate) struct SubOp;

impl BinaryOp for SubOp {
    const NAME: &'static str = "subtract";

    fn flags() -> Flags {
        Flags {
            parallel_safe: true,
            ..Flags::default()
        }
    }

    fn unit(a: Unit, b: Unit) -> Result<Unit> {
        same_unit(Self::NAME, a, b)
    }

    fn apply<T: NumericElement>(a: T, b: T) -> T {
        a - b
    }

    fn apply_vv<T: FloatElement>(
        a: ValueAndVariance<T>,
        b: ValueAndVariance<T>,
    ) -> ValueAndVariance<T> {
        a - b
    }
}

pub(crate) struct MulOp;

impl BinaryOp for MulOp {
    const NAME: &'static str = "multiply";

    fn flags() -> Flags {
        Flags {
            parallel_safe: true,
            ..Flags::default()
        }
    }

    fn unit(a: Unit, b: Unit) -> Result<Unit> {
        Ok(a * b)
    }

    fn apply<T: NumericElement>(a: T, b: T) -> T {
        a * b
    }

    fn apply_vv<T: FloatElement>(
        a: ValueAndVariance<T>,
        b: ValueAndVariance<T>,
    ) -> ValueAndVariance<T> {
        a * b
    }
}

pub(crate) struct DivOp;

impl BinaryOp for DivOp {
    const NAME: &'static str = "divide";

    fn flags() -> Flags {
        Flags {
            parallel_safe: true,
            ..Flags::default()
        }
    }

    fn unit(a: Unit, b: Unit) -> Result<Unit> {
        Ok(a / b)
    }

    fn apply<T: NumericElement>(a: T, b: T) -> T {
        a / b
    }

    fn apply_vv<T: FloatElement>(
        a: ValueAndVariance<T>,
        b: ValueAndVariance<T>,
    ) -> ValueAndVariance<T> {
        a / b
    }
}

struct NegOp;

impl NumericUnaryOp for NegOp {
    const NAME: &'static str = "negate";

    fn unit(u: Unit) -> Result<Unit> {
        Ok(u)
    }

    fn apply<T: NumericElement>(x: T) -> T {
        -x
    }

    fn apply_vv<T: FloatElement>(x: ValueAndVariance<T>) -> ValueAndVariance<T> {
        -x
    }
}

/// A map over two operands of fixed element types, for the dtype
/// combinations outside the numeric kernels. These dtypes never carry
/// variances, which is rejected up front.
fn special_binary<A: Element, B: Element, O: Element>(
    name: &str,
    a: &Variable,
    b: &Variable,
    unit: Unit,
    f: impl Fn(&A, &B) -> O,
) -> Result<Variable> {
    if a.has_variances() || b.has_variances() {
        return Err(ArrayError::variances(format!(
            "{} does not accept variances on dtypes ({}, {})",
            name,
            a.dtype(),
            b.dtype()
        )));
    }
    let out_dims = Dimensions::union(&[a.dims(), b.dims()])?;
    let av = A::buffer(&a.values).expect("caller matched the dtype").as_slice();
    let bv = B::buffer(&b.values).expect("caller matched the dtype").as_slice();
    let sa = align_strides(a.dims(), a.strides(), &out_dims);
    let sb = align_strides(b.dims(), b.strides(), &out_dims);
    let values = map2(out_dims.shape(), av, a.offset, &sa, bv, b.offset, &sb, f);
    Ok(Variable::from_parts(out_dims, unit, Data::from(values), None))
}

/// Element-wise `a + b`.
pub fn add(a: &Variable, b: &Variable) -> Result<Variable> {
    match (a.dtype(), b.dtype()) {
        (DType::String, DType::String) => special_binary(
            "add",
            a,
            b,
            same_unit("add", a.unit(), b.unit())?,
            |x: &String, y: &String| format!("{}{}", x, y),
        ),
        (DType::TimePoint, DType::Int64) => special_binary(
            "add",
            a,
            b,
            same_unit("add", a.unit(), b.unit())?,
            |x: &TimePoint, y: &i64| x.offset(*y),
        ),
        (DType::Int64, DType::TimePoint) => special_binary(
            "add",
            a,
            b,
            same_unit("add", a.unit(), b.unit())?,
            |x: &i64, y: &TimePoint| y.offset(*x),
        ),
        (DType::Vector3, DType::Vector3) => special_binary(
            "add",
            a,
            b,
            same_unit("add", a.unit(), b.unit())?,
            |x: &Vector3, y: &Vector3| *x + *y,
        ),
        _ => transform::binary::<AddOp>(a, b),
    }
}

/// Element-wise `a - b`.
pub fn subtract(a: &Variable, b: &Variable) -> Result<Variable> {
    match (a.dtype(), b.dtype()) {
        (DType::TimePoint, DType::Int64) => special_binary(
            "subtract",
            a,
            b,
            same_unit("subtract", a.unit(), b.unit())?,
            |x: &TimePoint, y: &i64| x.offset(-*y),
        ),
        (DType::TimePoint, DType::TimePoint) => special_binary(
            "subtract",
            a,
            b,
            same_unit("subtract", a.unit(), b.unit())?,
            |x: &TimePoint, y: &TimePoint| x.since(*y),
        ),
        (DType::Vector3, DType::Vector3) => special_binary(
            "subtract",
            a,
            b,
            same_unit("subtract", a.unit(), b.unit())?,
            |x: &Vector3, y: &Vector3| *x - *y,
        ),
        _ => transform::binary::<SubOp>(a, b),
    }
}

/// Element-wise `a * b`, including the spatial compositions
/// (matrix x matrix, rotation x vector and friends).
pub fn multiply(a: &Variable, b: &Variable) -> Result<Variable> {
    let unit = a.unit() * b.unit();
    match (a.dtype(), b.dtype()) {
        (DType::Float64, DType::Vector3) => {
            special_binary("multiply", a, b, unit, |x: &f64, y: &Vector3| *x * *y)
        }
        (DType::Vector3, DType::Float64) => {
            special_binary("multiply", a, b, unit, |x: &Vector3, y: &f64| *x * *y)
        }
        (DType::Matrix3, DType::Matrix3) => {
            special_binary("multiply", a, b, unit, |x: &Matrix3, y: &Matrix3| *x * *y)
        }
        (DType::Matrix3, DType::Vector3) => {
            special_binary("multiply", a, b, unit, |x: &Matrix3, y: &Vector3| *x * *y)
        }
        (DType::Rotation, DType::Rotation) => {
            special_binary("multiply", a, b, unit, |x: &Rotation, y: &Rotation| *x * *y)
        }
        (DType::Rotation, DType::Vector3) => {
            special_binary("multiply", a, b, unit, |x: &Rotation, y: &Vector3| *x * *y)
        }
        (DType::Translation, DType::Translation) => special_binary(
            "multiply",
            a,
            b,
            unit,
            |x: &Translation, y: &Translation| *x * *y,
        ),
        (DType::Translation, DType::Vector3) => special_binary(
            "multiply",
            a,
            b,
            unit,
            |x: &Translation, y: &Vector3| *x * *y,
        ),
        (DType::Affine3, DType::Affine3) => {
            special_binary("multiply", a, b, unit, |x: &Affine3, y: &Affine3| *x * *y)
        }
        (DType::Affine3, DType::Vector3) => {
            special_binary("multiply", a, b, unit, |x: &Affine3, y: &Vector3| *x * *y)
        }
        (DType::Rotation, DType::Translation) => special_binary(
            "multiply",
            a,
            b,
            unit,
            |x: &Rotation, y: &Translation| Affine3::from(*x) * Affine3::from(*y),
        ),
        (DType::Translation, DType::Rotation) => special_binary(
            "multiply",
            a,
            b,
            unit,
            |x: &Translation, y: &Rotation| Affine3::from(*x) * Affine3::from(*y),
        ),
        _ => transform::binary::<MulOp>(a, b),
    }
}

/// Element-wise `a / b`.
pub fn divide(a: &Variable, b: &Variable) -> Result<Variable> {
    let unit = a.unit() / b.unit();
    match (a.dtype(), b.dtype()) {
        (DType::Vector3, DType::Float64) => {
            special_binary("divide", a, b, unit, |x: &Vector3, y: &f64| *x * (1.0 / *y))
        }
        _ => transform::binary::<DivOp>(a, b),
    }
}

/// Element-wise negation.
pub fn negate(a: &Variable) -> Result<Variable> {
    if a.dtype() == DType::Vector3 {
        let av = Vector3::buffer(&a.values).expect("dtype matched").as_slice();
        let sa = align_strides(a.dims(), a.strides(), a.dims());
        let values = map1(a.dims().shape(), av, a.offset, &sa, |x| -*x);
        return Ok(Variable::from_parts(*a.dims(), a.unit(), Data::from(values), None));
    }
    transform::unary_numeric::<NegOp>(a)
}

/// Element-wise `1 / a` lives in [`crate::ops::math::reciprocal`].
///
/// In-place `op=` forms: the output keeps its dtype and unit; promotion
/// or a unit change is an error, and the right-hand side is copied first
/// when it aliases the output.
pub fn add_assign(out: &mut Variable, rhs: &Variable) -> Result<()> {
    in_place(out, rhs, add, transform::binary_in_place::<AddOp>)
}

pub fn sub_assign(out: &mut Variable, rhs: &Variable) -> Result<()> {
    in_place(out, rhs, subtract, transform::binary_in_place::<SubOp>)
}

pub fn mul_assign(out: &mut Variable, rhs: &Variable) -> Result<()> {
    in_place(out, rhs, multiply, transform::binary_in_place::<MulOp>)
}

pub fn div_assign(out: &mut Variable, rhs: &Variable) -> Result<()> {
    in_place(out, rhs, divide, transform::binary_in_place::<DivOp>)
}

fn in_place(
    out: &mut Variable,
    rhs: &Variable,
    fallback: impl Fn(&Variable, &Variable) -> Result<Variable>,
    kernel: impl Fn(&mut Variable, &Variable) -> Result<()>,
) -> Result<()> {
    if out.dtype().is_numeric() || out.is_binned() {
        return kernel(out, rhs);
    }
    // Special dtypes (time points, spatial) have no promoting kernels;
    // compute out of place and require dtype, unit and dims unchanged.
    let result = fallback(out, rhs)?;
    if result.dtype() != out.dtype() {
        return Err(ArrayError::dtype(format!(
            "in-place operation would change dtype {} to {}",
            out.dtype(),
            result.dtype()
        )));
    }
    if result.unit() != out.unit() {
        return Err(ArrayError::unit(format!(
            "in-place operation would change unit {} to {}",
            out.unit(),
            result.unit()
        )));
    }
    if result.dims() != out.dims() {
        return Err(ArrayError::dimension(format!(
            "in-place operation would broadcast {} to {}",
            out.dims(),
            result.dims()
        )));
    }
    *out = result;
    Ok(())
}

/// Element-wise arithmetic selector for callers that need the
/// variance-broadcast opt-in.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Like the plain arithmetic functions, but permits broadcasting a
/// variance-carrying operand, which duplicates variances and drops the
/// independence assumption of the propagation rules.
pub fn elementwise_with_variance_broadcast(
    op: ArithOp,
    a: &Variable,
    b: &Variable,
) -> Result<Variable> {
    match op {
        ArithOp::Add => transform::binary::<ForcedAdd>(a, b),
        ArithOp::Subtract => transform::binary::<ForcedSub>(a, b),
        ArithOp::Multiply => transform::binary::<ForcedMul>(a, b),
        ArithOp::Divide => transform::binary::<ForcedDiv>(a, b),
    }
}

macro_rules! forced_op {
    ($forced:ident, $base:ident) => {
        pub(crate) struct $forced;

        impl BinaryOp for $forced {
            const NAME: &'static str = $base::NAME;

            fn flags() -> Flags {
                Flags {
                    force_variance_broadcast: true,
                    ..$base::flags()
                }
            }

            fn unit(a: Unit, b: Unit) -> Result<Unit> {
                $base::unit(a, b)
            }

            fn apply<T: NumericElement>(a: T, b: T) -> T {
                $base::apply(a, b)
            }

            fn apply_vv<T: FloatElement>(
                a: ValueAndVariance<T>,
                b: ValueAndVariance<T>,
            ) -> ValueAndVariance<T> {
                $base::apply_vv(a, b)
            }
        }
    };
}

forced_op!(ForcedAdd, AddOp);
forced_op!(ForcedSub, SubOp);
forced_op!(ForcedMul, MulOp);
forced_op!(ForcedDiv, DivOp);

// Operator sugar. Like the underlying named functions these apply
// element-wise with broadcasting; failures surface as panics here, so
// use the named functions where errors must be handled.

macro_rules! impl_binary_operator {
    ($trt:ident, $mth:ident, $func:ident, $doc:expr) => {
        /// Perform elementwise
        #[doc = $doc]
        /// between references and return the result as a new `Variable`.
        ///
        /// ***Panics*** on unit, dtype or shape errors; see
        #[doc = concat!("[`", stringify!($func), "`] for the fallible form.")]
        impl $trt<&Variable> for &Variable {
            type Output = Variable;
            fn $mth(self, rhs: &Variable) -> Variable {
                $func(self, rhs).unwrap_or_else(|e| panic!("{}", e))
            }
        }

        /// Perform elementwise
        #[doc = $doc]
        /// with a dimensionless scalar on the right.
        impl $trt<f64> for &Variable {
            type Output = Variable;
            fn $mth(self, rhs: f64) -> Variable {
                $func(self, &Variable::scalar(rhs)).unwrap_or_else(|e| panic!("{}", e))
            }
        }
    };
}

impl_binary_operator!(Add, add, add, "addition");
impl_binary_operator!(Sub, sub, subtract, "subtraction");
impl_binary_operator!(Mul, mul, multiply, "multiplication");
impl_binary_operator!(Div, div, divide, "division");

macro_rules! impl_assign_operator {
    ($trt:ident, $mth:ident, $func:ident, $doc:expr) => {
        #[doc = $doc]
        ///
        /// ***Panics*** on unit, dtype or shape errors; see
        #[doc = concat!("[`", stringify!($func), "`] for the fallible form.")]
        impl $trt<&Variable> for Variable {
            fn $mth(&mut self, rhs: &Variable) {
                $func(self, rhs).unwrap_or_else(|e| panic!("{}", e))
            }
        }

        #[doc = $doc]
        impl $trt<f64> for Variable {
            fn $mth(&mut self, rhs: f64) {
                $func(self, &Variable::scalar(rhs)).unwrap_or_else(|e| panic!("{}", e))
            }
        }
    };
}

impl_assign_operator!(
    AddAssign,
    add_assign,
    add_assign,
    "Perform `self += rhs` as elementwise addition (in place)."
);
impl_assign_operator!(
    SubAssign,
    sub_assign,
    sub_assign,
    "Perform `self -= rhs` as elementwise subtraction (in place)."
);
impl_assign_operator!(
    MulAssign,
    mul_assign,
    mul_assign,
    "Perform `self *= rhs` as elementwise multiplication (in place)."
);
impl_assign_operator!(
    DivAssign,
    div_assign,
    div_assign,
    "Perform `self /= rhs` as elementwise division (in place)."
);

/// Perform an elementwise negation of reference `self` and return the
/// result as a new `Variable`.
///
/// ***Panics*** on dtype errors; see [`negate`] for the fallible form.
impl Neg for &Variable {
    type Output = Variable;
    fn neg(self) -> Variable {
        negate(self).unwrap_or_else(|e| panic!("{}", e))
    }
}
