// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Pointwise comparisons producing `bool` variables.

use crate::data::{Data, Element, NumericElement};
use crate::dimensions::Dimensions;
use crate::dtype::{DType, TimePoint};
use crate::error::{ArrayError, Result};
use crate::transform::kernels::{align_strides, map2};
use crate::transform::{self, CmpOp};
use crate::unit::Unit;
use crate::variable::Variable;

macro_rules! cmp_op {
    ($name:ident, $fn_name:expr, $op:tt) => {
        struct $name;

        impl CmpOp for $name {
            const NAME: &'static str = $fn_name;

            fn apply<T: NumericElement>(a: T, b: T) -> bool {
                a $op b
            }
        }
    };
}

cmp_op!(EqOp, "equal", ==);
cmp_op!(NeOp, "not_equal", !=);
cmp_op!(LtOp, "less", <);
cmp_op!(LeOp, "less_equal", <=);
cmp_op!(GtOp, "greater", >);
cmp_op!(GeOp, "greater_equal", >=);

/// A pointwise comparison over a non-numeric element type.
fn special_cmp<T: Element>(
    name: &str,
    a: &Variable,
    b: &Variable,
    f: impl Fn(&T, &T) -> bool,
) -> Result<Variable> {
    if a.unit() != b.unit() {
        return Err(ArrayError::unit(format!(
            "{} requires equal units, got {} and {}",
            name,
            a.unit(),
            b.unit()
        )));
    }
    let out_dims = Dimensions::union(&[a.dims(), b.dims()])?;
    let av = T::buffer(&a.values).expect("caller matched the dtype").as_slice();
    let bv = T::buffer(&b.values).expect("caller matched the dtype").as_slice();
    let sa = align_strides(a.dims(), a.strides(), &out_dims);
    let sb = align_strides(b.dims(), b.strides(), &out_dims);
    let values = map2(out_dims.shape(), av, a.offset, &sa, bv, b.offset, &sb, f);
    Ok(Variable::from_parts(out_dims, Unit::none(), Data::from(values), None))
}

/// Pointwise `a == b` (values only; variances are not compared and are
/// rejected on numeric dtypes like the other comparisons).
pub fn equal(a: &Variable, b: &Variable) -> Result<Variable> {
    match (a.dtype(), b.dtype()) {
        (DType::String, DType::String) => {
            special_cmp("equal", a, b, |x: &String, y: &String| x == y)
        }
        (DType::Bool, DType::Bool) => special_cmp("equal", a, b, |x: &bool, y: &bool| x == y),
        (DType::TimePoint, DType::TimePoint) => {
            special_cmp("equal", a, b, |x: &TimePoint, y: &TimePoint| x == y)
        }
        _ => transform::compare::<EqOp>(a, b),
    }
}

/// Pointwise `a != b`.
pub fn not_equal(a: &Variable, b: &Variable) -> Result<Variable> {
    match (a.dtype(), b.dtype()) {
        (DType::String, DType::String) => {
            special_cmp("not_equal", a, b, |x: &String, y: &String| x != y)
        }
        (DType::Bool, DType::Bool) => {
            special_cmp("not_equal", a, b, |x: &bool, y: &bool| x != y)
        }
        (DType::TimePoint, DType::TimePoint) => {
            special_cmp("not_equal", a, b, |x: &TimePoint, y: &TimePoint| x != y)
        }
        _ => transform::compare::<NeOp>(a, b),
    }
}

/// Pointwise `a < b`.
pub fn less(a: &Variable, b: &Variable) -> Result<Variable> {
    match (a.dtype(), b.dtype()) {
        (DType::TimePoint, DType::TimePoint) => {
            special_cmp("less", a, b, |x: &TimePoint, y: &TimePoint| x < y)
        }
        _ => transform::compare::<LtOp>(a, b),
    }
}

/// Pointwise `a <= b`.
pub fn less_equal(a: &Variable, b: &Variable) -> Result<Variable> {
    match (a.dtype(), b.dtype()) {
        (DType::TimePoint, DType::TimePoint) => {
            special_cmp("less_equal", a, b, |x: &TimePoint, y: &TimePoint| x <= y)
        }
        _ => transform::compare::<LeOp>(a, b),
    }
}

/// Pointwise `a > b`.
pub fn greater(a: &Variable, b: &Variable) -> Result<Variable> {
    match (a.dtype(), b.dtype()) {
        (DType::TimePoint, DType::TimePoint) => {
            special_cmp("greater", a, b, |x: &TimePoint, y: &TimePoint| x > y)
        }
        _ => transform::compare::<GtOp>(a, b),
    }
}

/// Pointwise `a >= b`.
pub fn greater_equal(a: &Variable, b: &Variable) -> Result<Variable> {
    match (a.dtype(), b.dtype()) {
        (DType::TimePoint, DType::TimePoint) => {
            special_cmp("greater_equal", a, b, |x: &TimePoint, y: &TimePoint| x >= y)
        }
        _ => transform::compare::<GeOp>(a, b),
    }
}

/// Pointwise approximate equality: `|a - b| <= atol + rtol * |b|`.
///
/// `rtol` is dimensionless; `atol` is interpreted in the shared unit of
/// `a` and `b`. Only values are compared; variances are ignored.
pub fn isclose(a: &Variable, b: &Variable, rtol: f64, atol: f64) -> Result<Variable> {
    if a.unit() != b.unit() {
        return Err(ArrayError::unit(format!(
            "isclose requires equal units, got {} and {}",
            a.unit(),
            b.unit()
        )));
    }
    if !a.dtype().is_numeric() || !b.dtype().is_numeric() {
        return Err(ArrayError::dtype(format!(
            "isclose does not support dtypes ({}, {})",
            a.dtype(),
            b.dtype()
        )));
    }
    let out_dims = Dimensions::union(&[a.dims(), b.dims()])?;
    let a = transform::convert_numeric(a, DType::Float64)?;
    let b = transform::convert_numeric(b, DType::Float64)?;
    let av = f64::buffer(&a.values).expect("converted above").as_slice();
    let bv = f64::buffer(&b.values).expect("converted above").as_slice();
    let sa = align_strides(a.dims(), a.strides(), &out_dims);
    let sb = align_strides(b.dims(), b.strides(), &out_dims);
    let values = map2(out_dims.shape(), av, a.offset, &sa, bv, b.offset, &sb, |x, y| {
        (x - y).abs() <= atol + rtol * y.abs()
    });
    Ok(Variable::from_parts(out_dims, Unit::none(), Data::from(values), None))
}
