// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Reductions over one dim or all dims, with mask handling, variance
//! propagation and per-bin forms for binned data.
//!
//! Masked elements are skipped. Empty or fully masked subsets yield the
//! operation's identity: 0 for `sum`, NaN for `mean` (0/0), the type
//! maximum for `min`, the type minimum for `max`, `true` for `all` and
//! `false` for `any`.

use num_traits::Zero;

use crate::data::{with_numeric_dtype, Data, Element, NumericElement};
use crate::dim::Dim;
use crate::dimensions::{Dimensions, Strides, MAX_NDIM};
use crate::dtype::{DType, IndexPair};
use crate::error::{ArrayError, Result};
use crate::transform::kernels::{align_strides, for_each_offsets};
use crate::transform::convert_numeric;
use crate::variable::Variable;

fn reduced_dims(v: &Variable, dim: Option<Dim>) -> Result<Dimensions> {
    match dim {
        Some(dim) => {
            let mut out = *v.dims();
            out.erase(dim)?;
            Ok(out)
        }
        None => Ok(Dimensions::new()),
    }
}

fn check_mask(v: &Variable, mask: &Variable) -> Result<()> {
    if mask.dtype() != DType::Bool {
        return Err(ArrayError::dtype(format!(
            "masks must have dtype bool, got {}",
            mask.dtype()
        )));
    }
    if !v.dims().includes(mask.dims()) {
        return Err(ArrayError::dimension(format!(
            "mask dims {} are not part of data dims {}",
            mask.dims(),
            v.dims()
        )));
    }
    Ok(())
}

fn reject_binned(name: &str, v: &Variable) -> Result<()> {
    if v.is_binned() {
        return Err(ArrayError::not_implemented(format!(
            "{} over the outer dims of binned data; reduce the bins instead",
            name
        )));
    }
    Ok(())
}

/// Strides that accumulate input positions into the canonical output:
/// the output's row-major strides, re-expressed against the input dims
/// with 0 for reduced dims.
fn accumulation_strides(v_dims: &Dimensions, out_dims: &Dimensions) -> [isize; MAX_NDIM] {
    align_strides(out_dims, &Strides::row_major(out_dims), v_dims)
}

struct MaskView<'a> {
    values: &'a [bool],
    offset: usize,
    strides: [isize; MAX_NDIM],
}

fn mask_view<'a>(v: &Variable, mask: Option<&'a Variable>) -> Result<Option<MaskView<'a>>> {
    let Some(mask) = mask else { return Ok(None) };
    check_mask(v, mask)?;
    Ok(Some(MaskView {
        values: bool::buffer(&mask.values).expect("dtype checked").as_slice(),
        offset: mask.offset,
        strides: align_strides(mask.dims(), mask.strides(), v.dims()),
    }))
}

/// The sum over `dim`, or over all dims when `dim` is `None`.
///
/// Variances add up; masked elements are skipped.
pub fn sum(v: &Variable, dim: impl Into<Option<Dim>>) -> Result<Variable> {
    sum_masked(v, dim.into(), None)
}

pub(crate) fn sum_masked(v: &Variable, dim: Option<Dim>, mask: Option<&Variable>) -> Result<Variable> {
    reject_binned("sum", v)?;
    let out_dims = reduced_dims(v, dim)?;
    let mask = mask_view(v, mask)?;
    with_numeric_dtype!(v.dtype(), T => {
        let values = <T as Element>::buffer(&v.values).expect("dtype matched").as_slice();
        let variances = v.variances.as_ref().map(|d| {
            <T as Element>::buffer(d).expect("variances share the value dtype").as_slice()
        });
        let mut acc = vec![T::zero(); out_dims.volume()];
        let mut acc_var = variances.map(|_| vec![T::zero(); out_dims.volume()]);
        walk(v, &out_dims, &mask, |off_in, off_out| {
            acc[off_out] = acc[off_out] + values[off_in];
            if let (Some(acc_var), Some(variances)) = (acc_var.as_mut(), variances) {
                acc_var[off_out] = acc_var[off_out] + variances[off_in];
            }
        });
        Ok(Variable::from_parts(
            out_dims,
            v.unit(),
            Data::from(acc),
            acc_var.map(Data::from),
        ))
    }, _ => {
        Err(ArrayError::dtype(format!("sum does not support dtype {}", v.dtype())))
    })
}

/// The mean over `dim`, or over all dims when `dim` is `None`.
///
/// Integer input is converted to `f64`. The divisor is the number of
/// unmasked contributions; summed variances divide by its square.
pub fn mean(v: &Variable, dim: impl Into<Option<Dim>>) -> Result<Variable> {
    mean_masked(v, dim.into(), None)
}

pub(crate) fn mean_masked(v: &Variable, dim: Option<Dim>, mask: Option<&Variable>) -> Result<Variable> {
    reject_binned("mean", v)?;
    if !v.dtype().is_numeric() {
        return Err(ArrayError::dtype(format!(
            "mean does not support dtype {}",
            v.dtype()
        )));
    }
    let v = if v.dtype().is_float() {
        v.clone()
    } else {
        convert_numeric(v, DType::Float64)?
    };
    let out_dims = reduced_dims(&v, dim)?;
    let mask_v = mask_view(&v, mask)?;
    let mut counts = vec![0usize; out_dims.volume()];
    walk(&v, &out_dims, &mask_v, |_, off_out| counts[off_out] += 1);
    let summed = sum_masked(&v, dim, mask)?;
    with_numeric_dtype!(summed.dtype(), T => {
        let mut values = summed.to_vec::<T>()?;
        for (x, &n) in values.iter_mut().zip(counts.iter()) {
            *x = *x / num_traits::cast::<f64, T>(n as f64).expect("count fits a float");
        }
        let variances = if summed.has_variances() {
            let mut variances = summed.variances_to_vec::<T>()?;
            for (x, &n) in variances.iter_mut().zip(counts.iter()) {
                let n = num_traits::cast::<f64, T>(n as f64).expect("count fits a float");
                *x = *x / (n * n);
            }
            Some(Data::from(variances))
        } else {
            None
        };
        Ok(Variable::from_parts(out_dims, v.unit(), Data::from(values), variances))
    }, _ => { unreachable!() })
}

/// The minimum over `dim`, or over all dims when `dim` is `None`.
///
/// The variance of the winning element is carried along.
pub fn min(v: &Variable, dim: impl Into<Option<Dim>>) -> Result<Variable> {
    extremum("min", v, dim.into(), None, false)
}

pub(crate) fn min_masked(v: &Variable, dim: Option<Dim>, mask: Option<&Variable>) -> Result<Variable> {
    extremum("min", v, dim, mask, false)
}

/// The maximum over `dim`, or over all dims when `dim` is `None`.
pub fn max(v: &Variable, dim: impl Into<Option<Dim>>) -> Result<Variable> {
    extremum("max", v, dim.into(), None, true)
}

pub(crate) fn max_masked(v: &Variable, dim: Option<Dim>, mask: Option<&Variable>) -> Result<Variable> {
    extremum("max", v, dim, mask, true)
}

fn extremum(
    name: &str,
    v: &Variable,
    dim: Option<Dim>,
    mask: Option<&Variable>,
    take_max: bool,
) -> Result<Variable> {
    reject_binned(name, v)?;
    let out_dims = reduced_dims(v, dim)?;
    let mask = mask_view(v, mask)?;
    with_numeric_dtype!(v.dtype(), T => {
        let values = <T as Element>::buffer(&v.values).expect("dtype matched").as_slice();
        let variances = v.variances.as_ref().map(|d| {
            <T as Element>::buffer(d).expect("variances share the value dtype").as_slice()
        });
        let init = if take_max { T::LOWEST } else { T::MAX };
        let mut acc = vec![init; out_dims.volume()];
        let mut acc_var = variances.map(|_| vec![T::zero(); out_dims.volume()]);
        walk(v, &out_dims, &mask, |off_in, off_out| {
            let x = values[off_in];
            let better = if take_max { x > acc[off_out] } else { x < acc[off_out] };
            if better {
                acc[off_out] = x;
                if let (Some(acc_var), Some(variances)) = (acc_var.as_mut(), variances) {
                    acc_var[off_out] = variances[off_in];
                }
            }
        });
        Ok(Variable::from_parts(
            out_dims,
            v.unit(),
            Data::from(acc),
            acc_var.map(Data::from),
        ))
    }, _ => {
        Err(ArrayError::dtype(format!("{} does not support dtype {}", name, v.dtype())))
    })
}

/// Whether all elements are `true`, over `dim` or over all dims.
pub fn all(v: &Variable, dim: impl Into<Option<Dim>>) -> Result<Variable> {
    logical("all", v, dim.into(), None, true)
}

pub(crate) fn all_masked(v: &Variable, dim: Option<Dim>, mask: Option<&Variable>) -> Result<Variable> {
    logical("all", v, dim, mask, true)
}

/// Whether any element is `true`, over `dim` or over all dims.
pub fn any(v: &Variable, dim: impl Into<Option<Dim>>) -> Result<Variable> {
    logical("any", v, dim.into(), None, false)
}

pub(crate) fn any_masked(v: &Variable, dim: Option<Dim>, mask: Option<&Variable>) -> Result<Variable> {
    logical("any", v, dim, mask, false)
}

fn logical(
    name: &str,
    v: &Variable,
    dim: Option<Dim>,
    mask: Option<&Variable>,
    conjunctive: bool,
) -> Result<Variable> {
    reject_binned(name, v)?;
    if v.dtype() != DType::Bool {
        return Err(ArrayError::dtype(format!(
            "{} requires dtype bool, got {}",
            name,
            v.dtype()
        )));
    }
    let out_dims = reduced_dims(v, dim)?;
    let mask = mask_view(v, mask)?;
    let values = bool::buffer(&v.values).expect("dtype checked").as_slice();
    let mut acc = vec![conjunctive; out_dims.volume()];
    walk(v, &out_dims, &mask, |off_in, off_out| {
        acc[off_out] = if conjunctive {
            acc[off_out] && values[off_in]
        } else {
            acc[off_out] || values[off_in]
        };
    });
    Ok(Variable::from_parts(out_dims, v.unit(), Data::from(acc), None))
}

/// Drive the accumulation loop: visit every unmasked input element with
/// its input offset and the offset of the output cell it reduces into.
fn walk(
    v: &Variable,
    out_dims: &Dimensions,
    mask: &Option<MaskView<'_>>,
    mut visit: impl FnMut(usize, usize),
) {
    let mut in_strides = [0isize; MAX_NDIM];
    in_strides[..v.ndim()].copy_from_slice(v.strides().as_slice(v.ndim()));
    let acc_strides = accumulation_strides(v.dims(), out_dims);
    match mask {
        Some(mask) => {
            let mask_values = mask.values;
            let mask_strides = mask.strides;
            for_each_offsets(
                v.dims().shape(),
                [v.offset, 0, mask.offset],
                [&in_strides, &acc_strides, &mask_strides],
                |[off_in, off_out, off_mask]| {
                    if !mask_values[off_mask] {
                        visit(off_in, off_out);
                    }
                },
            );
        }
        None => {
            for_each_offsets(
                v.dims().shape(),
                [v.offset, 0],
                [&in_strides, &acc_strides],
                |[off_in, off_out]| visit(off_in, off_out),
            );
        }
    }
}

// ---------------------------------------------------------------------
// Per-bin reductions
// ---------------------------------------------------------------------

enum BinReduce {
    Sum,
    Mean,
    Min,
    Max,
}

/// Sum the events of each bin, yielding a dense variable over the outer
/// dims.
pub fn bins_sum(v: &Variable) -> Result<Variable> {
    bins_reduce(v, BinReduce::Sum)
}

/// The mean of the events of each bin; empty bins yield NaN.
pub fn bins_mean(v: &Variable) -> Result<Variable> {
    bins_reduce(v, BinReduce::Mean)
}

/// The smallest event of each bin; empty bins yield the type maximum.
pub fn bins_min(v: &Variable) -> Result<Variable> {
    bins_reduce(v, BinReduce::Min)
}

/// The largest event of each bin; empty bins yield the type minimum.
pub fn bins_max(v: &Variable) -> Result<Variable> {
    bins_reduce(v, BinReduce::Max)
}

fn bins_reduce(v: &Variable, op: BinReduce) -> Result<Variable> {
    let (buffer, mask) = match &v.values {
        Data::VariableBins(bins) => ((*bins.buffer).clone(), None),
        Data::DataArrayBins(bins) => {
            let mask = bins.buffer.flat_mask()?;
            (bins.buffer.data().clone(), mask)
        }
        Data::DatasetBins(_) => {
            return Err(ArrayError::not_implemented(
                "bin reductions over dataset buffers",
            ))
        }
        _ => {
            return Err(ArrayError::dtype(format!(
                "expected binned data, got dtype {}",
                v.dtype()
            )))
        }
    };
    let bin_dim = v.bin_dim()?;
    if buffer.ndim() != 1 || !buffer.dims().contains(bin_dim) {
        return Err(ArrayError::not_implemented(format!(
            "bin reductions over multi-dimensional event buffers {}",
            buffer.dims()
        )));
    }
    let buffer = buffer.copy();
    let buffer = match op {
        BinReduce::Mean if !buffer.dtype().is_float() => convert_numeric(&buffer, DType::Float64)?,
        _ => buffer,
    };
    let mask_values: Option<Vec<bool>> = match &mask {
        Some(mask) => Some(mask.to_vec::<bool>()?),
        None => None,
    };
    let pairs: Vec<IndexPair> = v.bin_indices()?.to_vec()?;
    with_numeric_dtype!(buffer.dtype(), T => {
        let values = buffer.values::<T>()?;
        let variances = if buffer.has_variances() {
            Some(buffer.variances::<T>()?)
        } else {
            None
        };
        let keep_variances = matches!(op, BinReduce::Sum | BinReduce::Mean | BinReduce::Min | BinReduce::Max)
            && variances.is_some();
        let mut out = Vec::with_capacity(pairs.len());
        let mut out_var = if keep_variances { Some(Vec::with_capacity(pairs.len())) } else { None };
        for pair in &pairs {
            let mut acc = match op {
                BinReduce::Sum | BinReduce::Mean => T::zero(),
                BinReduce::Min => T::MAX,
                BinReduce::Max => T::LOWEST,
            };
            let mut acc_var = T::zero();
            let mut count = 0usize;
            for j in pair.range() {
                if mask_values.as_ref().map_or(false, |m| m[j]) {
                    continue;
                }
                let x = values[j];
                match op {
                    BinReduce::Sum | BinReduce::Mean => {
                        acc = acc + x;
                        if let Some(variances) = variances {
                            acc_var = acc_var + variances[j];
                        }
                    }
                    BinReduce::Min => {
                        if x < acc {
                            acc = x;
                            if let Some(variances) = variances {
                                acc_var = variances[j];
                            }
                        }
                    }
                    BinReduce::Max => {
                        if x > acc {
                            acc = x;
                            if let Some(variances) = variances {
                                acc_var = variances[j];
                            }
                        }
                    }
                }
                count += 1;
            }
            if let BinReduce::Mean = op {
                let n = num_traits::cast::<f64, T>(count as f64).expect("count fits a float");
                acc = acc / n;
                acc_var = acc_var / (n * n);
            }
            out.push(acc);
            if let Some(out_var) = out_var.as_mut() {
                out_var.push(acc_var);
            }
        }
        Ok(Variable::from_parts(
            *v.dims(),
            buffer.unit(),
            Data::from(out),
            out_var.map(Data::from),
        ))
    }, _ => {
        Err(ArrayError::dtype(format!(
            "bin reductions do not support event dtype {}",
            buffer.dtype()
        )))
    })
}
