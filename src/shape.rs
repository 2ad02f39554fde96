// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Shape operations on variables: `concat`, `rebin`, `resize`, `fold`,
//! `flatten`, `squeeze`, plus free-function forms of `transpose` and
//! `broadcast`.

use crate::data::Data;
use crate::dim::Dim;
use crate::dimensions::{Dimensions, Strides, MAX_NDIM};
use crate::dtype::DType;
use crate::error::{ArrayError, Result};
use crate::transform::convert_numeric;
use crate::unit::Unit;
use crate::variable::bins;
use crate::variable::Variable;

/// The dims of `concat(a, b, dim)`: everything but `dim` must agree; a
/// missing `dim` counts as extent 1.
pub(crate) fn concat_dims(a: &Dimensions, b: &Dimensions, dim: Dim) -> Result<Dimensions> {
    let ea = a.extent(dim).unwrap_or(1);
    let eb = b.extent(dim).unwrap_or(1);
    let mut rest_a = *a;
    if rest_a.contains(dim) {
        rest_a.erase(dim)?;
    }
    let mut rest_b = *b;
    if rest_b.contains(dim) {
        rest_b.erase(dim)?;
    }
    if rest_a != rest_b {
        return Err(ArrayError::dimension(format!(
            "cannot concatenate {} and {} along {}",
            a, b, dim
        )));
    }
    let template = if a.contains(dim) { a } else { b };
    let mut out = Dimensions::new();
    for (d, e) in template.iter() {
        out.push(d, if d == dim { ea + eb } else { e })?;
    }
    if !template.contains(dim) {
        out.insert(0, dim, ea + eb)?;
    }
    Ok(out)
}

/// Concatenate two variables along `dim`.
///
/// All other dims must match, as must units, dtypes and variance
/// presence. An operand without `dim` contributes a single layer. For
/// binned variables, concatenating along an outer dim joins the index
/// arrays; along the bin dim it joins corresponding bins event-wise.
pub fn concat(a: &Variable, b: &Variable, dim: Dim) -> Result<Variable> {
    if a.is_binned() || b.is_binned() {
        return bins::concat_binned(a, b, dim);
    }
    if a.dtype() != b.dtype() {
        return Err(ArrayError::dtype(format!(
            "cannot concatenate dtypes {} and {}",
            a.dtype(),
            b.dtype()
        )));
    }
    if a.unit() != b.unit() {
        return Err(ArrayError::unit(format!(
            "cannot concatenate units {} and {}",
            a.unit(),
            b.unit()
        )));
    }
    if a.has_variances() != b.has_variances() {
        return Err(ArrayError::variances(
            "cannot concatenate a variable with variances and one without",
        ));
    }
    let out_dims = concat_dims(a.dims(), b.dims(), dim)?;
    let axis = out_dims.index_of(dim).expect("concat dim is present");
    let ea = a.dims().extent(dim).unwrap_or(1);

    // Canonical copies let the pick loop run on row-major offsets.
    let a_can = a.copy();
    let b_can = b.copy();
    let sa = aligned_row_major(a_can.dims(), &out_dims);
    let sb = aligned_row_major(b_can.dims(), &out_dims);
    let sb_dim = b_can
        .dims()
        .index_of(dim)
        .map(|i| Strides::row_major(b_can.dims()).get(i))
        .unwrap_or(0);

    let picks = concat_picks(&out_dims, axis, ea, sa, sb, sb_dim);
    let values = a_can.values.gather_pair(&b_can.values, picks.iter().copied());
    let variances = match (&a_can.variances, &b_can.variances) {
        (Some(va), Some(vb)) => Some(va.gather_pair(vb, picks.iter().copied())),
        _ => None,
    };
    Ok(Variable::from_parts(out_dims, a.unit(), values, variances))
}

fn aligned_row_major(dims: &Dimensions, out: &Dimensions) -> [isize; MAX_NDIM] {
    crate::transform::kernels::align_strides(dims, &Strides::row_major(dims), out)
}

/// For every output position, which operand supplies it and at which
/// canonical offset.
fn concat_picks(
    out_dims: &Dimensions,
    axis: usize,
    ea: usize,
    sa: [isize; MAX_NDIM],
    sb: [isize; MAX_NDIM],
    sb_dim: isize,
) -> Vec<(bool, usize)> {
    let shape = out_dims.shape();
    let ndim = out_dims.ndim();
    let volume = out_dims.volume();
    let mut picks = Vec::with_capacity(volume);
    let mut index = [0usize; MAX_NDIM];
    let mut off_a = 0isize;
    let mut off_b = 0isize;
    for _ in 0..volume {
        if index[axis] < ea {
            picks.push((false, off_a as usize));
        } else {
            picks.push((true, (off_b - ea as isize * sb_dim) as usize));
        }
        for k in (0..ndim).rev() {
            index[k] += 1;
            off_a += sa[k];
            off_b += sb[k];
            if index[k] < shape[k] {
                break;
            }
            index[k] = 0;
            off_a -= sa[k] * shape[k] as isize;
            off_b -= sb[k] * shape[k] as isize;
        }
    }
    picks
}

/// Re-histogram counts from `old_edges` onto `new_edges` along `dim`.
///
/// The data unit must be `counts` (`bool` data rebins to the covered
/// fraction instead). Each edge grid must be sorted, ascending or
/// descending independently. The output is `f64`; every new bin
/// receives `overlap / old_width` of each overlapping old bin, and
/// variances are weighted by the square of that factor.
pub fn rebin(v: &Variable, dim: Dim, old_edges: &Variable, new_edges: &Variable) -> Result<Variable> {
    let is_bool = v.dtype() == DType::Bool;
    if !is_bool {
        if !v.dtype().is_numeric() {
            return Err(ArrayError::dtype(format!(
                "rebin does not support dtype {}",
                v.dtype()
            )));
        }
        if v.unit() != Unit::counts() {
            return Err(ArrayError::unit(format!(
                "rebin requires unit counts, got {}",
                v.unit()
            )));
        }
    }
    let n_old = v.dims().extent(dim)?;
    let old = edge_values(old_edges, dim, n_old + 1)?;
    let new = edge_values(new_edges, dim, 0)?;
    if new.len() < 2 {
        return Err(ArrayError::bin_edge(format!(
            "need at least two edges along {}, got {}",
            dim,
            new.len()
        )));
    }
    let n_new = new.len() - 1;

    let (old, flip_data) = ascending(old, dim)?;
    let (new, flip_out) = ascending(new, dim)?;

    // Work on a canonical f64 copy, reversed along `dim` if the old
    // grid was descending.
    let mut source = if is_bool {
        let flags = v.to_vec::<bool>()?;
        Variable::from_values(
            *v.dims(),
            v.unit(),
            flags.into_iter().map(|x| if x { 1.0 } else { 0.0 }).collect::<Vec<f64>>(),
        )?
    } else {
        convert_numeric(v, DType::Float64)?
    };
    if !source.is_contiguous() {
        source = source.copy();
    }
    if flip_data {
        source = reverse_along(&source, dim)?;
    }

    let mut out_dims = *source.dims();
    let axis = out_dims.index_of(dim).expect("extent was checked above");
    out_dims.set_extent_at(axis, n_new);

    let in_strides = Strides::row_major(source.dims());
    let in_dim_stride = in_strides.get(axis) as usize;
    let out_strides = Strides::row_major(&out_dims);
    let out_dim_stride = out_strides.get(axis) as usize;

    let values = source.values::<f64>()?.to_vec();
    let variances = if source.has_variances() {
        Some(source.variances::<f64>()?.to_vec())
    } else {
        None
    };
    let mut out = vec![0.0f64; out_dims.volume()];
    let mut out_var = variances.as_ref().map(|_| vec![0.0f64; out_dims.volume()]);

    // Visit each 1-d lane along `dim`; the lane bases enumerate the
    // positions of all other dims.
    let lane_bases = lane_base_offsets(source.dims(), axis);
    let out_bases = lane_base_offsets(&out_dims, axis);

    for (&base_in, &base_out) in lane_bases.iter().zip(out_bases.iter()) {
        if in_dim_stride == 1 && out_dim_stride == 1 {
            // Innermost-dim lanes are contiguous; index the slices
            // directly so the sweep runs without stride arithmetic.
            let src = &values[base_in..base_in + n_old];
            let dst = &mut out[base_out..base_out + n_new];
            match (out_var.as_mut(), variances.as_ref()) {
                (Some(out_var), Some(variances)) => {
                    let src_var = &variances[base_in..base_in + n_old];
                    let dst_var = &mut out_var[base_out..base_out + n_new];
                    overlap_sweep(&old, &new, &mut |inew, iold, weight| {
                        dst[inew] += weight * src[iold];
                        dst_var[inew] += weight * weight * src_var[iold];
                    });
                }
                _ => {
                    overlap_sweep(&old, &new, &mut |inew, iold, weight| {
                        dst[inew] += weight * src[iold];
                    });
                }
            }
        } else {
            overlap_sweep(&old, &new, &mut |inew, iold, weight| {
                let src = base_in + iold * in_dim_stride;
                let dst = base_out + inew * out_dim_stride;
                out[dst] += weight * values[src];
                if let (Some(out_var), Some(variances)) = (out_var.as_mut(), variances.as_ref()) {
                    out_var[dst] += weight * weight * variances[src];
                }
            });
        }
    }

    let mut result = Variable::from_parts(
        out_dims,
        v.unit(),
        Data::from(out),
        out_var.map(Data::from),
    );
    if flip_out {
        result = reverse_along(&result, dim)?;
    }
    Ok(result)
}

/// Two-pointer sweep over ascending grids, reporting every
/// `(new_bin, old_bin, overlap / old_width)` contribution.
fn overlap_sweep(old: &[f64], new: &[f64], accumulate: &mut impl FnMut(usize, usize, f64)) {
    let n_old = old.len() - 1;
    let n_new = new.len() - 1;
    let mut iold = 0usize;
    for inew in 0..n_new {
        let (new_lo, new_hi) = (new[inew], new[inew + 1]);
        // Back up in case the previous new bin ended inside this one.
        while iold > 0 && old[iold] > new_lo {
            iold -= 1;
        }
        let mut j = iold;
        while j < n_old && old[j] < new_hi {
            let lo = old[j].max(new_lo);
            let hi = old[j + 1].min(new_hi);
            if hi > lo {
                let width = old[j + 1] - old[j];
                accumulate(inew, j, (hi - lo) / width);
            }
            j += 1;
        }
        iold = j.saturating_sub(1);
    }
}

fn edge_values(edges: &Variable, dim: Dim, expected: usize) -> Result<Vec<f64>> {
    if edges.ndim() != 1 || !edges.dims().contains(dim) {
        return Err(ArrayError::bin_edge(format!(
            "edges must be one-dimensional along {}, got {}",
            dim,
            edges.dims()
        )));
    }
    if expected != 0 && edges.dims().extent(dim)? != expected {
        return Err(ArrayError::bin_edge(format!(
            "expected {} edges along {}, got {}",
            expected,
            dim,
            edges.dims().extent(dim)?
        )));
    }
    let edges = convert_numeric(edges, DType::Float64)?;
    edges.to_vec::<f64>()
}

/// Normalize a grid to ascending order, reporting whether it had to be
/// reversed. Unsorted grids are rejected.
fn ascending(edges: Vec<f64>, dim: Dim) -> Result<(Vec<f64>, bool)> {
    let increasing = edges.windows(2).all(|w| w[0] < w[1]);
    if increasing {
        return Ok((edges, false));
    }
    let decreasing = edges.windows(2).all(|w| w[0] > w[1]);
    if decreasing {
        let mut edges = edges;
        edges.reverse();
        return Ok((edges, true));
    }
    Err(ArrayError::bin_edge(format!(
        "edges along {} are not sorted",
        dim
    )))
}

/// A view of `v` with `dim` running backwards, materialized.
fn reverse_along(v: &Variable, dim: Dim) -> Result<Variable> {
    let axis = v
        .dims()
        .index_of(dim)
        .ok_or_else(|| ArrayError::dimension(format!("dimension {} not found in {}", dim, v.dims())))?;
    let extent = v.dims().shape()[axis];
    let mut flipped = v.clone();
    let stride = flipped.strides().get(axis);
    flipped.offset = (flipped.offset as isize + (extent as isize - 1) * stride) as usize;
    let mut strides = *flipped.strides();
    strides.set(axis, -stride);
    flipped.strides = strides;
    Ok(flipped.copy())
}

/// Base offsets of every 1-d lane along axis `axis`, for the canonical
/// layout of `dims`.
fn lane_base_offsets(dims: &Dimensions, axis: usize) -> Vec<usize> {
    let mut outer = *dims;
    outer.remove_at(axis);
    let mut outer_strides = Strides::row_major(dims);
    outer_strides.remove_at(axis, dims.ndim());
    crate::transform::kernels::LogicalOffsets::new(&outer, &outer_strides, 0).collect()
}

/// A zero-filled variable with `dim` resized to `size`; data is not
/// preserved.
pub fn resize(v: &Variable, dim: Dim, size: usize) -> Result<Variable> {
    let axis = v
        .dims()
        .index_of(dim)
        .ok_or_else(|| ArrayError::dimension(format!("dimension {} not found in {}", dim, v.dims())))?;
    let mut dims = *v.dims();
    dims.set_extent_at(axis, size);
    Variable::zeros(dims, v.unit(), v.dtype(), v.has_variances())
}

/// Replace `from` by the given `(dim, extent)` factors, whose product
/// must equal the extent of `from`. The data order is unchanged.
pub fn fold(v: &Variable, from: Dim, into: &[(Dim, usize)]) -> Result<Variable> {
    let extent = v.dims().extent(from)?;
    let product: usize = into.iter().map(|&(_, e)| e).product();
    if product != extent {
        return Err(ArrayError::dimension(format!(
            "cannot fold {} of extent {} into factors of volume {}",
            from, extent, product
        )));
    }
    let axis = v.dims().index_of(from).expect("extent was checked above");
    let source = v.copy();
    let mut dims = Dimensions::new();
    for (i, (d, e)) in source.dims().iter().enumerate() {
        if i == axis {
            for &(nd, ne) in into {
                dims.push(nd, ne)?;
            }
        } else {
            dims.push(d, e)?;
        }
    }
    let mut out = source;
    out.dims = dims;
    out.strides = Strides::row_major(&dims);
    Ok(out)
}

/// Merge the listed dims, which must be contiguous in storage order,
/// into a single dim `to`.
pub fn flatten(v: &Variable, dims_in_order: &[Dim], to: Dim) -> Result<Variable> {
    if dims_in_order.is_empty() {
        return Err(ArrayError::dimension("flatten needs at least one dim"));
    }
    let first = v.dims().index_of(dims_in_order[0]).ok_or_else(|| {
        ArrayError::dimension(format!(
            "dimension {} not found in {}",
            dims_in_order[0],
            v.dims()
        ))
    })?;
    for (k, &d) in dims_in_order.iter().enumerate() {
        if v.dims().index_of(d) != Some(first + k) {
            return Err(ArrayError::dimension(format!(
                "dims {:?} are not contiguous in storage order in {}",
                dims_in_order.iter().map(|d| d.name()).collect::<Vec<_>>(),
                v.dims()
            )));
        }
    }
    let merged: usize = dims_in_order
        .iter()
        .map(|&d| v.dims().extent(d).expect("membership checked above"))
        .product();
    let source = v.copy();
    let mut dims = Dimensions::new();
    for (i, (d, e)) in source.dims().iter().enumerate() {
        if i == first {
            dims.push(to, merged)?;
        } else if i > first && i < first + dims_in_order.len() {
            continue;
        } else {
            dims.push(d, e)?;
        }
    }
    let mut out = source;
    out.dims = dims;
    out.strides = Strides::row_major(&dims);
    Ok(out)
}

/// Drop the listed extent-1 dims, or all extent-1 dims when `dims` is
/// `None`. The result shares storage with `v`.
pub fn squeeze(v: &Variable, dims: Option<&[Dim]>) -> Result<Variable> {
    let targets: Vec<Dim> = match dims {
        Some(dims) => {
            for &d in dims {
                let extent = v.dims().extent(d)?;
                if extent != 1 {
                    return Err(ArrayError::dimension(format!(
                        "cannot squeeze {} of extent {}",
                        d, extent
                    )));
                }
            }
            dims.to_vec()
        }
        None => v
            .dims()
            .iter()
            .filter(|&(_, e)| e == 1)
            .map(|(d, _)| d)
            .collect(),
    };
    let mut out = v.clone();
    for d in targets {
        let axis = out.dims.index_of(d).expect("membership checked above");
        let ndim = out.dims.ndim();
        out.dims.remove_at(axis);
        out.strides.remove_at(axis, ndim);
    }
    Ok(out)
}

/// Free-function form of [`Variable::transpose`].
pub fn transpose(v: &Variable, order: &[Dim]) -> Result<Variable> {
    v.transpose(order)
}

/// Free-function form of [`Variable::broadcast`].
pub fn broadcast(v: &Variable, target: &Dimensions) -> Result<Variable> {
    v.broadcast(target)
}
