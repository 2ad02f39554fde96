// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The generic element-wise kernel dispatcher.
//!
//! Every element-wise operation runs through the same pipeline: dtype
//! check, unit rule, shape resolution, variance policy, aliasing check,
//! binned descent, element loop. All validation happens before any
//! store is touched, so a failing call leaves every operand unchanged.

use num_traits::Zero;

use crate::data::{
    with_float_dtype, with_numeric_dtype, BinData, Data, Element, FloatElement, NumericElement,
};
use crate::dimensions::{Dimensions, Strides, MAX_NDIM};
use crate::dtype::{DType, IndexPair};
use crate::error::{ArrayError, Result};
use crate::unit::Unit;
use crate::variable::bins;
use crate::variable::Variable;

pub(crate) mod kernels;
pub(crate) mod variance;

use kernels::{align_strides, for_each_offsets, map2};
use variance::ValueAndVariance;

/// Variance-policy and scheduling flags of an element-wise op.
#[derive(Copy, Clone, Default)]
pub(crate) struct Flags {
    /// Per-argument requirement: `Some(true)` demands variances,
    /// `Some(false)` forbids them.
    pub expect_variance: [Option<bool>; 2],
    /// Strip variances from the output even when inputs carry them.
    pub no_out_variance: bool,
    /// Either all inputs have variances or none do.
    pub expect_all_or_none_have_variance: bool,
    /// For in-place: a variance-carrying output requires variances on
    /// every input.
    pub expect_in_variance_if_out_variance: bool,
    /// Permit broadcasting a variance-carrying operand. Off by default:
    /// broadcasting would duplicate variances and break the
    /// independence assumption of the propagation rules.
    pub force_variance_broadcast: bool,
    /// No shared mutation or side effects; the dense loop may be split
    /// across threads.
    pub parallel_safe: bool,
}

/// A binary element-wise operation over the numeric dtypes.
pub(crate) trait BinaryOp {
    const NAME: &'static str;

    fn flags() -> Flags {
        Flags::default()
    }

    /// The unit rule; invoked before any data access.
    fn unit(a: Unit, b: Unit) -> Result<Unit>;

    /// The dtype allow-list, queried with the promoted common dtype.
    fn supports(dtype: DType) -> bool {
        dtype.is_numeric()
    }

    fn apply<T: NumericElement>(a: T, b: T) -> T;

    fn apply_vv<T: FloatElement>(
        a: ValueAndVariance<T>,
        b: ValueAndVariance<T>,
    ) -> ValueAndVariance<T>;
}

/// A unary element-wise operation defined for all numeric dtypes.
pub(crate) trait NumericUnaryOp {
    const NAME: &'static str;

    fn flags() -> Flags {
        Flags::default()
    }

    fn unit(u: Unit) -> Result<Unit>;

    fn supports(dtype: DType) -> bool {
        dtype.is_numeric()
    }

    fn apply<T: NumericElement>(x: T) -> T;

    fn apply_vv<T: FloatElement>(x: ValueAndVariance<T>) -> ValueAndVariance<T>;
}

/// A unary element-wise operation defined for floating dtypes only.
pub(crate) trait FloatUnaryOp {
    const NAME: &'static str;

    fn flags() -> Flags {
        Flags::default()
    }

    fn unit(u: Unit) -> Result<Unit>;

    fn supports(dtype: DType) -> bool {
        dtype.is_float()
    }

    /// Exact factor applied to input values ahead of the op (used by the
    /// trig kernels to fold degrees into radians).
    fn input_scale(_u: Unit) -> f64 {
        1.0
    }

    fn apply<T: FloatElement>(x: T) -> T;

    fn apply_vv<T: FloatElement>(x: ValueAndVariance<T>) -> ValueAndVariance<T>;
}

/// An ordering comparison producing `bool`.
pub(crate) trait CmpOp {
    const NAME: &'static str;

    fn apply<T: NumericElement>(a: T, b: T) -> bool;
}

// ---------------------------------------------------------------------
// Shared validation helpers
// ---------------------------------------------------------------------

fn promoted_dtype(name: &str, a: DType, b: DType, supports: impl Fn(DType) -> bool) -> Result<DType> {
    match DType::promote(a, b) {
        Some(dtype) if supports(dtype) => Ok(dtype),
        _ => Err(ArrayError::dtype(format!(
            "{} does not support dtypes ({}, {})",
            name, a, b
        ))),
    }
}

fn check_variance_policy(name: &str, flags: &Flags, inputs: &[&Variable]) -> Result<()> {
    for (i, input) in inputs.iter().enumerate() {
        match flags.expect_variance[i] {
            Some(true) if !input.has_variances() => {
                return Err(ArrayError::variances(format!(
                    "{} requires variances on argument {}",
                    name, i
                )))
            }
            Some(false) if input.has_variances() => {
                return Err(ArrayError::variances(format!(
                    "{} does not accept variances on argument {}",
                    name, i
                )))
            }
            _ => {}
        }
    }
    if flags.expect_all_or_none_have_variance
        && inputs.len() == 2
        && inputs[0].has_variances() != inputs[1].has_variances()
    {
        return Err(ArrayError::variances(format!(
            "{} requires variances on all arguments or none",
            name
        )));
    }
    Ok(())
}

fn check_variance_broadcast(
    name: &str,
    flags: &Flags,
    out_dims: &Dimensions,
    inputs: &[&Variable],
) -> Result<()> {
    if flags.force_variance_broadcast {
        return Ok(());
    }
    // 0-d operands are exempt: a scalar uncertainty applies to every
    // element by construction.
    for input in inputs {
        if input.has_variances() && input.ndim() > 0 && input.dims() != out_dims {
            return Err(ArrayError::variances(format!(
                "{}: broadcasting variances of {} to {} would introduce correlations",
                name,
                input.dims(),
                out_dims
            )));
        }
    }
    Ok(())
}

/// Materialize `v` converted to the numeric dtype `target`, contiguous
/// and in canonical order. A same-dtype input is shared, not copied.
pub(crate) fn convert_numeric(v: &Variable, target: DType) -> Result<Variable> {
    if v.dtype() == target {
        return Ok(v.clone());
    }
    if !v.dtype().is_numeric() || !target.is_numeric() {
        return Err(ArrayError::dtype(format!(
            "cannot convert dtype {} to {}",
            v.dtype(),
            target
        )));
    }
    fn cast_values<TOut: NumericElement>(v: &Variable, data: &Data) -> Vec<TOut> {
        with_numeric_dtype!(data.dtype(), TIn => {
            let slice = <TIn as Element>::buffer(data).expect("dtype tag matches").as_slice();
            v.logical_offsets()
                .map(|o| num_traits::cast::<TIn, TOut>(slice[o]).unwrap_or_else(TOut::zero))
                .collect()
        }, _ => { unreachable!() })
    }
    with_numeric_dtype!(target, TOut => {
        let values: Vec<TOut> = cast_values(v, &v.values);
        let variances = match &v.variances {
            Some(var) if target.is_float() => Some(Data::from(cast_values::<TOut>(v, var))),
            Some(_) => {
                return Err(ArrayError::variances(format!(
                    "cannot convert variances to non-floating dtype {}",
                    target
                )))
            }
            None => None,
        };
        Ok(Variable::from_parts(*v.dims(), v.unit(), Data::from(values), variances))
    }, _ => { unreachable!() })
}

fn padded_strides(strides: &Strides, ndim: usize) -> [isize; MAX_NDIM] {
    let mut out = [0isize; MAX_NDIM];
    out[..ndim].copy_from_slice(strides.as_slice(ndim));
    out
}

// ---------------------------------------------------------------------
// Binary, out of place
// ---------------------------------------------------------------------

/// `transform(op, a, b)`: apply a binary op with broadcasting, unit and
/// variance propagation, returning a new variable.
pub(crate) fn binary<Op: BinaryOp>(a: &Variable, b: &Variable) -> Result<Variable> {
    if a.is_binned() || b.is_binned() {
        return binned_binary::<Op>(a, b);
    }
    let flags = Op::flags();
    let dtype = promoted_dtype(Op::NAME, a.dtype(), b.dtype(), Op::supports)?;
    let unit = Op::unit(a.unit(), b.unit())?;
    let out_dims = Dimensions::union(&[a.dims(), b.dims()])?;
    check_variance_policy(Op::NAME, &flags, &[a, b])?;
    let with_variances =
        (a.has_variances() || b.has_variances()) && !flags.no_out_variance && dtype.is_float();
    if with_variances {
        check_variance_broadcast(Op::NAME, &flags, &out_dims, &[a, b])?;
    }
    let a = convert_numeric(a, dtype)?;
    let b = convert_numeric(b, dtype)?;

    if with_variances {
        with_float_dtype!(dtype, T => {
            binary_dense_vv::<Op, T>(out_dims, unit, &a, &b)
        }, _ => { unreachable!() })
    } else {
        with_numeric_dtype!(dtype, T => {
            binary_dense::<Op, T>(out_dims, unit, &a, &b, flags.parallel_safe)
        }, _ => { unreachable!() })
    }
}

fn binary_dense<Op: BinaryOp, T: NumericElement>(
    out_dims: Dimensions,
    unit: Unit,
    a: &Variable,
    b: &Variable,
    parallel_safe: bool,
) -> Result<Variable> {
    let av = <T as Element>::buffer(&a.values).expect("converted above").as_slice();
    let bv = <T as Element>::buffer(&b.values).expect("converted above").as_slice();

    #[cfg(feature = "rayon")]
    {
        if parallel_safe
            && out_dims.volume() >= kernels::PARALLEL_THRESHOLD
            && a.is_contiguous()
            && b.is_contiguous()
            && *a.dims() == out_dims
            && *b.dims() == out_dims
        {
            let values = kernels::par_map2(av, bv, |&x, &y| Op::apply(x, y));
            return Ok(Variable::from_parts(out_dims, unit, Data::from(values), None));
        }
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel_safe;

    let sa = align_strides(a.dims(), a.strides(), &out_dims);
    let sb = align_strides(b.dims(), b.strides(), &out_dims);
    let values = map2(out_dims.shape(), av, a.offset, &sa, bv, b.offset, &sb, |&x, &y| {
        Op::apply(x, y)
    });
    Ok(Variable::from_parts(out_dims, unit, Data::from(values), None))
}

fn binary_dense_vv<Op: BinaryOp, T: FloatElement>(
    out_dims: Dimensions,
    unit: Unit,
    a: &Variable,
    b: &Variable,
) -> Result<Variable> {
    let av = <T as Element>::buffer(&a.values).expect("converted above").as_slice();
    let bv = <T as Element>::buffer(&b.values).expect("converted above").as_slice();
    let avar = a.variances.as_ref().map(|d| {
        <T as Element>::buffer(d).expect("variances share the value dtype").as_slice()
    });
    let bvar = b.variances.as_ref().map(|d| {
        <T as Element>::buffer(d).expect("variances share the value dtype").as_slice()
    });
    let sa = align_strides(a.dims(), a.strides(), &out_dims);
    let sb = align_strides(b.dims(), b.strides(), &out_dims);
    let volume = out_dims.volume();
    let mut values = Vec::with_capacity(volume);
    let mut variances = Vec::with_capacity(volume);
    for_each_offsets(
        out_dims.shape(),
        [a.offset, b.offset],
        [&sa, &sb],
        |[off_a, off_b]| {
            let lhs = ValueAndVariance::new(av[off_a], avar.map_or_else(T::zero, |v| v[off_a]));
            let rhs = ValueAndVariance::new(bv[off_b], bvar.map_or_else(T::zero, |v| v[off_b]));
            let out = Op::apply_vv(lhs, rhs);
            values.push(out.value);
            variances.push(out.variance);
        },
    );
    Ok(Variable::from_parts(
        out_dims,
        unit,
        Data::from(values),
        Some(Data::from(variances)),
    ))
}

// ---------------------------------------------------------------------
// Binary, in place
// ---------------------------------------------------------------------

/// `transform_in_place(op, out, rhs)`: apply a binary op writing into
/// `out`. The result dtype and unit must be those of `out`.
pub(crate) fn binary_in_place<Op: BinaryOp>(out: &mut Variable, rhs: &Variable) -> Result<()> {
    if out.is_binned() || rhs.is_binned() {
        return binned_binary_in_place::<Op>(out, rhs);
    }
    let flags = Op::flags();
    let dtype = promoted_dtype(Op::NAME, out.dtype(), rhs.dtype(), Op::supports)?;
    if dtype != out.dtype() {
        return Err(ArrayError::dtype(format!(
            "{} in place would promote {} to {}",
            Op::NAME,
            out.dtype(),
            dtype
        )));
    }
    let unit = Op::unit(out.unit(), rhs.unit())?;
    if unit != out.unit() {
        return Err(ArrayError::unit(format!(
            "{} in place would change unit {} to {}",
            Op::NAME,
            out.unit(),
            unit
        )));
    }
    if !out.dims().includes(rhs.dims()) {
        return Err(ArrayError::dimension(format!(
            "cannot apply {} of {} onto {} in place",
            Op::NAME,
            rhs.dims(),
            out.dims()
        )));
    }
    check_variance_policy(Op::NAME, &flags, &[out, rhs])?;
    if rhs.has_variances() && !out.has_variances() {
        return Err(ArrayError::variances(format!(
            "{} in place cannot store variances of the right-hand side",
            Op::NAME
        )));
    }
    if flags.expect_in_variance_if_out_variance && out.has_variances() && !rhs.has_variances() {
        return Err(ArrayError::variances(format!(
            "{} requires variances on the right-hand side",
            Op::NAME
        )));
    }
    if rhs.has_variances() {
        check_variance_broadcast(Op::NAME, &flags, out.dims(), &[rhs])?;
    }
    // Aliasing: sharing is broken by copy-on-write the moment `out` is
    // made unique, which leaves `rhs` reading the original data.
    let rhs = if out.shares_buffer_with(rhs) {
        rhs.copy()
    } else {
        rhs.clone()
    };
    let rhs = convert_numeric(&rhs, dtype)?;
    out.ensure_unique();

    let out_dims = *out.dims();
    let so = padded_strides(out.strides(), out_dims.ndim());
    let sr = align_strides(rhs.dims(), rhs.strides(), &out_dims);
    let out_offset = out.offset;
    if out.has_variances() {
        with_float_dtype!(dtype, T => {
            let rv = <T as Element>::buffer(&rhs.values).expect("converted above").as_slice();
            let rvar = rhs.variances.as_ref().map(|d| {
                <T as Element>::buffer(d).expect("variances share the value dtype").as_slice()
            });
            let variances = out.variances.as_mut().expect("checked above");
            let var_buf = <T as Element>::buffer_mut(variances)
                .expect("variances share the value dtype")
                .make_mut();
            let val_buf = <T as Element>::buffer_mut(&mut out.values)
                .expect("dtype checked above")
                .make_mut();
            for_each_offsets(
                out_dims.shape(),
                [out_offset, rhs.offset],
                [&so, &sr],
                |[off_o, off_r]| {
                    let lhs = ValueAndVariance::new(val_buf[off_o], var_buf[off_o]);
                    let r = ValueAndVariance::new(rv[off_r], rvar.map_or_else(T::zero, |v| v[off_r]));
                    let res = Op::apply_vv(lhs, r);
                    val_buf[off_o] = res.value;
                    var_buf[off_o] = res.variance;
                },
            );
            Ok(())
        }, _ => {
            Err(ArrayError::variances(format!(
                "{}: variances require a floating dtype, got {}",
                Op::NAME,
                dtype
            )))
        })
    } else {
        with_numeric_dtype!(dtype, T => {
            let rv = <T as Element>::buffer(&rhs.values).expect("converted above").as_slice();
            let val_buf = <T as Element>::buffer_mut(&mut out.values)
                .expect("dtype checked above")
                .make_mut();
            for_each_offsets(
                out_dims.shape(),
                [out_offset, rhs.offset],
                [&so, &sr],
                |[off_o, off_r]| {
                    val_buf[off_o] = Op::apply(val_buf[off_o], rv[off_r]);
                },
            );
            Ok(())
        }, _ => { unreachable!() })
    }
}

// ---------------------------------------------------------------------
// Unary
// ---------------------------------------------------------------------

macro_rules! unary_driver {
    ($fn_name:ident, $bound:ident, $dispatch:ident) => {
        pub(crate) fn $fn_name<Op: $bound>(a: &Variable) -> Result<Variable> {
            if a.is_binned() {
                return unary_binned(a, |buffer| $fn_name::<Op>(buffer));
            }
            let flags = Op::flags();
            if !Op::supports(a.dtype()) {
                return Err(ArrayError::dtype(format!(
                    "{} does not support dtype {}",
                    Op::NAME,
                    a.dtype()
                )));
            }
            let unit = Op::unit(a.unit())?;
            check_variance_policy(Op::NAME, &flags, &[a])?;
            let with_variances =
                a.has_variances() && !flags.no_out_variance && a.dtype().is_float();
            let out_dims = *a.dims();
            let sa = align_strides(a.dims(), a.strides(), &out_dims);
            $dispatch!(a.dtype(), T => {
                let av = <T as Element>::buffer(&a.values).expect("dtype checked").as_slice();
                unary_loop::<Op, T>(a, out_dims, unit, av, &sa, with_variances)
            }, _ => { unreachable!() })
        }
    };
}

unary_driver!(unary_numeric, NumericUnaryOp, with_numeric_dtype);

fn unary_loop<Op: NumericUnaryOp, T: NumericElement>(
    a: &Variable,
    out_dims: Dimensions,
    unit: Unit,
    av: &[T],
    sa: &[isize; MAX_NDIM],
    with_variances: bool,
) -> Result<Variable> {
    if !with_variances {
        let values = kernels::map1(out_dims.shape(), av, a.offset, sa, |&x| Op::apply(x));
        let variances = match &a.variances {
            // Variance magnitudes are preserved by sign-style unaries.
            Some(var) if !Op::flags().no_out_variance => Some(var.gather(a.logical_offsets())),
            _ => None,
        };
        return Ok(Variable::from_parts(out_dims, unit, Data::from(values), variances));
    }
    // with_variances implies a floating dtype; re-dispatch to bind Float.
    with_float_dtype!(a.dtype(), F => {
        let av = <F as Element>::buffer(&a.values).expect("dtype checked").as_slice();
        let avar = <F as Element>::buffer(a.variances.as_ref().expect("checked"))
            .expect("variances share the value dtype")
            .as_slice();
        let volume = out_dims.volume();
        let mut values = Vec::with_capacity(volume);
        let mut variances = Vec::with_capacity(volume);
        for_each_offsets(out_dims.shape(), [a.offset], [sa], |[off]| {
            let out = Op::apply_vv(ValueAndVariance::new(av[off], avar[off]));
            values.push(out.value);
            variances.push(out.variance);
        });
        Ok(Variable::from_parts(
            out_dims,
            unit,
            Data::from(values),
            Some(Data::from(variances)),
        ))
    }, _ => { unreachable!() })
}

/// Driver for float-only unaries (trig, sqrt, reciprocal and friends).
pub(crate) fn unary_float<Op: FloatUnaryOp>(a: &Variable) -> Result<Variable> {
    if a.is_binned() {
        return unary_binned(a, |buffer| unary_float::<Op>(buffer));
    }
    let flags = Op::flags();
    if !Op::supports(a.dtype()) {
        return Err(ArrayError::dtype(format!(
            "{} does not support dtype {}",
            Op::NAME,
            a.dtype()
        )));
    }
    let unit = Op::unit(a.unit())?;
    check_variance_policy(Op::NAME, &flags, &[a])?;
    let with_variances = a.has_variances() && !flags.no_out_variance;
    let scale = Op::input_scale(a.unit());
    let out_dims = *a.dims();
    let sa = align_strides(a.dims(), a.strides(), &out_dims);
    with_float_dtype!(a.dtype(), T => {
        let factor = num_traits::cast::<f64, T>(scale).expect("scale fits any float");
        let av = <T as Element>::buffer(&a.values).expect("dtype checked").as_slice();
        if !with_variances {
            let values =
                kernels::map1(out_dims.shape(), av, a.offset, &sa, |&x| Op::apply(x * factor));
            return Ok(Variable::from_parts(out_dims, unit, Data::from(values), None));
        }
        let avar = <T as Element>::buffer(a.variances.as_ref().expect("checked"))
            .expect("variances share the value dtype")
            .as_slice();
        let volume = out_dims.volume();
        let mut values = Vec::with_capacity(volume);
        let mut variances = Vec::with_capacity(volume);
        for_each_offsets(out_dims.shape(), [a.offset], [&sa], |[off]| {
            let out = Op::apply_vv(ValueAndVariance::new(av[off], avar[off]).scale(factor));
            values.push(out.value);
            variances.push(out.variance);
        });
        Ok(Variable::from_parts(
            out_dims,
            unit,
            Data::from(values),
            Some(Data::from(variances)),
        ))
    }, _ => { unreachable!() })
}

/// Unary descent into binned data: apply the op to the whole event
/// buffer, keeping indices.
fn unary_binned(
    a: &Variable,
    apply: impl Fn(&Variable) -> Result<Variable>,
) -> Result<Variable> {
    match &a.values {
        Data::VariableBins(bins) => {
            let buffer = apply(&bins.buffer)?;
            let indices = a.bin_indices()?;
            Variable::make_bins(&indices, bins.dim, buffer)
        }
        _ => Err(ArrayError::not_implemented(format!(
            "element-wise operations on dtype {}",
            a.dtype()
        ))),
    }
}

// ---------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------

/// Pointwise ordering comparison; output is `bool` with unit `none`.
pub(crate) fn compare<Op: CmpOp>(a: &Variable, b: &Variable) -> Result<Variable> {
    let dtype = promoted_dtype(Op::NAME, a.dtype(), b.dtype(), |d| d.is_numeric())?;
    if a.has_variances() || b.has_variances() {
        return Err(ArrayError::variances(format!(
            "{} does not accept variances",
            Op::NAME
        )));
    }
    if a.unit() != b.unit() {
        return Err(ArrayError::unit(format!(
            "{} requires equal units, got {} and {}",
            Op::NAME,
            a.unit(),
            b.unit()
        )));
    }
    let out_dims = Dimensions::union(&[a.dims(), b.dims()])?;
    let a = convert_numeric(a, dtype)?;
    let b = convert_numeric(b, dtype)?;
    with_numeric_dtype!(dtype, T => {
        let av = <T as Element>::buffer(&a.values).expect("converted above").as_slice();
        let bv = <T as Element>::buffer(&b.values).expect("converted above").as_slice();
        let sa = align_strides(a.dims(), a.strides(), &out_dims);
        let sb = align_strides(b.dims(), b.strides(), &out_dims);
        let values = map2(out_dims.shape(), av, a.offset, &sa, bv, b.offset, &sb, |&x, &y| {
            Op::apply(x, y)
        });
        Ok(Variable::from_parts(out_dims, Unit::none(), Data::from(values), None))
    }, _ => { unreachable!() })
}

// ---------------------------------------------------------------------
// Binned descent (binary)
// ---------------------------------------------------------------------

fn require_variable_bins<'a>(v: &'a Variable, name: &str) -> Result<&'a BinData<Variable>> {
    match &v.values {
        Data::VariableBins(bins) => Ok(bins),
        _ => Err(ArrayError::not_implemented(format!(
            "{} on binned dtype {}",
            name,
            v.dtype()
        ))),
    }
}

fn matching_indices(a: &Variable, b: &Variable) -> Result<()> {
    let ia = a.bin_indices()?;
    let ib = b.bin_indices()?;
    if ia != ib {
        return Err(ArrayError::binned_data(
            "binned operands have mismatching bin index arrays",
        ));
    }
    Ok(())
}

fn binned_binary<Op: BinaryOp>(a: &Variable, b: &Variable) -> Result<Variable> {
    match (a.is_binned(), b.is_binned()) {
        (true, true) => {
            let bins_a = require_variable_bins(a, Op::NAME)?;
            let bins_b = require_variable_bins(b, Op::NAME)?;
            if a.dims() != b.dims() {
                return Err(ArrayError::dimension(format!(
                    "binned operands have mismatching dims {} and {}",
                    a.dims(),
                    b.dims()
                )));
            }
            if bins_a.dim != bins_b.dim {
                return Err(ArrayError::binned_data(format!(
                    "mismatching bin dims {} and {}",
                    bins_a.dim, bins_b.dim
                )));
            }
            matching_indices(a, b)?;
            let buffer = binary::<Op>(&bins_a.buffer, &bins_b.buffer)?;
            let indices = a.bin_indices()?;
            Variable::make_bins(&indices, bins_a.dim, buffer)
        }
        (true, false) => binned_dense::<Op>(a, b, true),
        (false, true) => binned_dense::<Op>(b, a, false),
        (false, false) => unreachable!("dense pairs do not descend"),
    }
}

/// binned (x) dense: broadcast one dense value per bin across the bin's
/// events. `binned_first` records the original operand order.
fn binned_dense<Op: BinaryOp>(
    binned: &Variable,
    dense: &Variable,
    binned_first: bool,
) -> Result<Variable> {
    let flags = Op::flags();
    let bins = require_variable_bins(binned, Op::NAME)?;
    let buffer = &bins.buffer;
    let dtype = promoted_dtype(Op::NAME, buffer.dtype(), dense.dtype(), Op::supports)?;
    let unit = if binned_first {
        Op::unit(buffer.unit(), dense.unit())?
    } else {
        Op::unit(dense.unit(), buffer.unit())?
    };
    if !binned.dims().includes(dense.dims()) {
        return Err(ArrayError::dimension(format!(
            "cannot broadcast {} to the bins over {}",
            dense.dims(),
            binned.dims()
        )));
    }
    if dense.has_variances() && !flags.force_variance_broadcast {
        return Err(ArrayError::variances(format!(
            "{}: broadcasting a variance-carrying operand across bins would introduce correlations",
            Op::NAME
        )));
    }
    check_variance_policy(Op::NAME, &flags, &[buffer, dense])?;
    let with_variances =
        buffer.has_variances() && !flags.no_out_variance && dtype.is_float();

    let mut out_buffer = convert_numeric(&buffer.copy(), dtype)?;
    out_buffer.set_unit(unit);
    out_buffer.ensure_unique();
    let dense = convert_numeric(dense, dtype)?;

    let out_dims = *binned.dims();
    let si = padded_strides(binned.strides(), out_dims.ndim());
    let sd = align_strides(dense.dims(), dense.strides(), &out_dims);
    let index_slice: Vec<IndexPair> = {
        let bins = require_variable_bins(binned, Op::NAME)?;
        bins.indices.as_slice().to_vec()
    };

    if with_variances {
        with_float_dtype!(dtype, T => {
            let dv = <T as Element>::buffer(&dense.values)
                .expect("converted above")
                .as_slice()
                .to_vec();
            let dvar = dense.variances.as_ref().map(|d| {
                <T as Element>::buffer(d)
                    .expect("variances share the value dtype")
                    .as_slice()
                    .to_vec()
            });
            apply_per_bin_vv::<Op, T>(
                &mut out_buffer,
                &index_slice,
                out_dims.shape(),
                [binned.offset, dense.offset],
                [&si, &sd],
                &dv,
                dvar.as_deref(),
                binned_first,
            );
        }, _ => { unreachable!() })
    } else {
        out_buffer.variances = None;
        with_numeric_dtype!(dtype, T => {
            let dv = <T as Element>::buffer(&dense.values)
                .expect("converted above")
                .as_slice()
                .to_vec();
            apply_per_bin::<Op, T>(
                &mut out_buffer,
                &index_slice,
                out_dims.shape(),
                [binned.offset, dense.offset],
                [&si, &sd],
                &dv,
                binned_first,
            );
        }, _ => { unreachable!() })
    }

    let indices = binned.bin_indices()?;
    Variable::make_bins(&indices, bins.dim, out_buffer)
}

// The buffer was materialized contiguous along its bin dim, so the
// event range of a bin is a contiguous chunk of the value slice.
#[allow(clippy::too_many_arguments)]
fn apply_per_bin<Op: BinaryOp, T: NumericElement>(
    out_buffer: &mut Variable,
    index_slice: &[IndexPair],
    outer_shape: &[usize],
    bases: [usize; 2],
    strides: [&[isize; MAX_NDIM]; 2],
    dense_values: &[T],
    binned_first: bool,
) {
    let val_buf = <T as Element>::buffer_mut(&mut out_buffer.values)
        .expect("converted above")
        .make_mut();
    for_each_offsets(outer_shape, bases, strides, |[off_bin, off_dense]| {
        let d = dense_values[off_dense];
        for j in index_slice[off_bin].range() {
            val_buf[j] = if binned_first {
                Op::apply(val_buf[j], d)
            } else {
                Op::apply(d, val_buf[j])
            };
        }
    });
}

#[allow(clippy::too_many_arguments)]
fn apply_per_bin_vv<Op: BinaryOp, T: FloatElement>(
    out_buffer: &mut Variable,
    index_slice: &[IndexPair],
    outer_shape: &[usize],
    bases: [usize; 2],
    strides: [&[isize; MAX_NDIM]; 2],
    dense_values: &[T],
    dense_variances: Option<&[T]>,
    binned_first: bool,
) {
    let variances = out_buffer
        .variances
        .as_mut()
        .expect("caller ensured variances");
    let var_buf = <T as Element>::buffer_mut(variances)
        .expect("variances share the value dtype")
        .make_mut();
    let val_buf = <T as Element>::buffer_mut(&mut out_buffer.values)
        .expect("converted above")
        .make_mut();
    for_each_offsets(outer_shape, bases, strides, |[off_bin, off_dense]| {
        let d = ValueAndVariance::new(
            dense_values[off_dense],
            dense_variances.map_or_else(T::zero, |v| v[off_dense]),
        );
        for j in index_slice[off_bin].range() {
            let e = ValueAndVariance::new(val_buf[j], var_buf[j]);
            let res = if binned_first {
                Op::apply_vv(e, d)
            } else {
                Op::apply_vv(d, e)
            };
            val_buf[j] = res.value;
            var_buf[j] = res.variance;
        }
    });
}

fn binned_binary_in_place<Op: BinaryOp>(out: &mut Variable, rhs: &Variable) -> Result<()> {
    if !out.is_binned() {
        return Err(ArrayError::dtype(format!(
            "{}: cannot write binned data into dense dtype {}",
            Op::NAME,
            out.dtype()
        )));
    }
    if bins::has_overlapping_bins(out) {
        return Err(ArrayError::binned_data(format!(
            "{} in place rejects overlapping bins",
            Op::NAME
        )));
    }
    let result = binary::<Op>(out, rhs)?;
    // The unit and dtype of the event buffer must be unchanged; the
    // in-place contract forbids promotion.
    let out_bins = require_variable_bins(out, Op::NAME)?;
    let res_bins = require_variable_bins(&result, Op::NAME)?;
    if res_bins.buffer.dtype() != out_bins.buffer.dtype() {
        return Err(ArrayError::dtype(format!(
            "{} in place would promote {} to {}",
            Op::NAME,
            out_bins.buffer.dtype(),
            res_bins.buffer.dtype()
        )));
    }
    if res_bins.buffer.unit() != out_bins.buffer.unit() {
        return Err(ArrayError::unit(format!(
            "{} in place would change unit {} to {}",
            Op::NAME,
            out_bins.buffer.unit(),
            res_bins.buffer.unit()
        )));
    }
    *out = result;
    Ok(())
}

