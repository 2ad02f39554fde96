// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Coordinate-driven grouping and per-group reductions.

use crate::dataset::{shape as dshape, Coords, DataArray};
use crate::dim::Dim;
use crate::dimensions::{Dimensions, Strides, MAX_NDIM};
use crate::dtype::DType;
use crate::error::{ArrayError, Result};
use crate::shape as vshape;
use crate::variable::Variable;

/// A grouping of a [`DataArray`]'s entries by the values of a 1-d
/// coord, ready for per-group reduction.
///
/// Created by [`groupby`] (one group per distinct coord value) or
/// [`groupby_bins`] (groups are half-open value bins); the reductions
/// re-stack the per-group results along the new group dim.
#[derive(Debug)]
pub struct GroupBy {
    array: DataArray,
    /// Label of the output dim, one entry (or bin) per group.
    group_dim: Dim,
    /// The dim being grouped away.
    grouped_dim: Dim,
    groups: Vec<Vec<usize>>,
    /// Output coord along `group_dim`: the distinct values, or the bin
    /// edges.
    key: Variable,
}

/// Group by the distinct values of the 1-d coord `key`, in order of
/// first appearance.
pub fn groupby(array: &DataArray, key: Dim) -> Result<GroupBy> {
    let coord = array.coords().get(key)?;
    if coord.ndim() != 1 {
        return Err(ArrayError::dimension(format!(
            "groupby needs a one-dimensional coord, got {}",
            coord.dims()
        )));
    }
    let grouped_dim = coord.dims().label(0);
    let extent = coord.dims().shape()[0];
    let coord_can = coord.copy();
    let mut representatives: Vec<usize> = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for i in 0..extent {
        let existing = representatives.iter().position(|&r| {
            coord_can
                .values
                .eq_elements([i].into_iter(), &coord_can.values, [r].into_iter())
        });
        match existing {
            Some(g) => groups[g].push(i),
            None => {
                representatives.push(i);
                groups.push(vec![i]);
            }
        }
    }
    let key_values = coord_can
        .values
        .gather(representatives.iter().copied());
    let key_dims = Dimensions::from_pairs(&[(key, groups.len())])?;
    let key_var = Variable::from_parts(key_dims, coord.unit(), key_values, None);
    Ok(GroupBy {
        array: array.clone(),
        group_dim: key,
        grouped_dim,
        groups,
        key: key_var,
    })
}

/// Group by classifying the coord `key` into the half-open bins
/// `[e_i, e_{i+1})` of `bins`; out-of-range entries are dropped. The
/// group dim is the dim of `bins`.
pub fn groupby_bins(array: &DataArray, key: Dim, bins: &Variable) -> Result<GroupBy> {
    let coord = array.coords().get(key)?;
    if coord.ndim() != 1 {
        return Err(ArrayError::dimension(format!(
            "groupby needs a one-dimensional coord, got {}",
            coord.dims()
        )));
    }
    if bins.ndim() != 1 {
        return Err(ArrayError::dimension(format!(
            "groupby bins must be one-dimensional, got {}",
            bins.dims()
        )));
    }
    if bins.unit() != coord.unit() {
        return Err(ArrayError::unit(format!(
            "bin edges unit {} does not match coord unit {}",
            bins.unit(),
            coord.unit()
        )));
    }
    let grouped_dim = coord.dims().label(0);
    let group_dim = bins.dims().label(0);
    let edges = crate::transform::convert_numeric(bins, DType::Float64)?.to_vec::<f64>()?;
    if !edges.windows(2).all(|w| w[0] < w[1]) {
        return Err(ArrayError::bin_edge(format!(
            "groupby bin edges along {} must be ascending",
            group_dim
        )));
    }
    let n_groups = edges.len().saturating_sub(1);
    let values = crate::transform::convert_numeric(coord, DType::Float64)?.to_vec::<f64>()?;
    let mut groups = vec![Vec::new(); n_groups];
    for (i, &v) in values.iter().enumerate() {
        if let Some(g) = edges.windows(2).position(|w| w[0] <= v && v < w[1]) {
            groups[g].push(i);
        }
    }
    let key_var = bins.copy();
    Ok(GroupBy {
        array: array.clone(),
        group_dim,
        grouped_dim,
        groups,
        key: key_var,
    })
}

/// Select `indices` (in order, repeats allowed) along `dim`.
fn take_variable(v: &Variable, dim: Dim, indices: &[usize]) -> Result<Variable> {
    let can = v.copy();
    let axis = can
        .dims()
        .index_of(dim)
        .ok_or_else(|| ArrayError::dimension(format!("dimension {} not found in {}", dim, can.dims())))?;
    let mut out_dims = *can.dims();
    out_dims.set_extent_at(axis, indices.len());
    let strides = Strides::row_major(can.dims());
    let shape = out_dims.shape();
    let ndim = out_dims.ndim();
    let volume = out_dims.volume();
    let mut offsets = Vec::with_capacity(volume);
    let mut index = [0usize; MAX_NDIM];
    for _ in 0..volume {
        let mut off = 0isize;
        for k in 0..ndim {
            let i = if k == axis { indices[index[k]] } else { index[k] };
            off += i as isize * strides.get(k);
        }
        offsets.push(off as usize);
        for k in (0..ndim).rev() {
            index[k] += 1;
            if index[k] < shape[k] {
                break;
            }
            index[k] = 0;
        }
    }
    if can.is_binned() {
        // Gathering index pairs keeps the shared event buffer alive.
        let values = can.values.gather(offsets.into_iter());
        return Ok(Variable::from_parts(out_dims, can.unit(), values, None));
    }
    let values = can.values.gather(offsets.iter().copied());
    let variances = can
        .variances
        .as_ref()
        .map(|d| d.gather(offsets.into_iter()));
    Ok(Variable::from_parts(out_dims, can.unit(), values, variances))
}

/// Select `indices` along `dim` across data, coords, masks and attrs.
fn take_data_array(da: &DataArray, dim: Dim, indices: &[usize]) -> Result<DataArray> {
    let data = take_variable(da.data(), dim, indices)?;
    let mut out = DataArray::new(data).with_name(da.name());
    let mut coords = Coords::new();
    for (d, coord) in da.coords().iter() {
        let taken = if coord.dims().contains(dim) {
            take_variable(coord, dim, indices)?
        } else {
            coord.clone()
        };
        let aligned = da.coords().is_aligned(d).unwrap_or(true);
        coords.insert_with_alignment(d, taken, aligned);
    }
    *out.coords_mut() = coords;
    for (name, mask) in da.masks().iter() {
        let taken = if mask.dims().contains(dim) {
            take_variable(mask, dim, indices)?
        } else {
            mask.clone()
        };
        out.masks_mut().insert(name, taken)?;
    }
    for (name, attr) in da.attrs().iter() {
        let taken = if attr.dims().contains(dim) {
            take_variable(attr, dim, indices)?
        } else {
            attr.clone()
        };
        out.attrs_mut().insert(name, taken);
    }
    Ok(out)
}

impl GroupBy {
    /// The number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn check_dim(&self, dim: Dim) -> Result<()> {
        if dim != self.grouped_dim {
            return Err(ArrayError::dimension(format!(
                "can only reduce over the grouped dimension {}, got {}",
                self.grouped_dim, dim
            )));
        }
        Ok(())
    }

    fn reduce(
        &self,
        dim: Dim,
        reduce: impl Fn(&DataArray, Dim) -> Result<DataArray>,
    ) -> Result<DataArray> {
        self.check_dim(dim)?;
        let mut stacked: Option<DataArray> = None;
        for group in &self.groups {
            // The coord being grouped is consumed; drop it so the
            // reduction does not stumble over per-group differences.
            let mut sub = take_data_array(&self.array, self.grouped_dim, group)?;
            let _ = sub.coords_mut().remove(self.group_dim);
            let piece = reduce(&sub, self.grouped_dim)?;
            stacked = Some(match stacked {
                None => piece,
                Some(acc) => dshape::concat(&acc, &piece, self.group_dim)?,
            });
        }
        let mut out = stacked.ok_or_else(|| {
            ArrayError::dimension("cannot reduce a grouping with no groups")
        })?;
        out.set_coord(self.group_dim, self.key.clone())?;
        Ok(out)
    }

    /// Per-group sum, stacked along the group dim.
    pub fn sum(&self, dim: Dim) -> Result<DataArray> {
        self.reduce(dim, |da, d| da.sum(d))
    }

    /// Per-group mean over unmasked elements.
    pub fn mean(&self, dim: Dim) -> Result<DataArray> {
        self.reduce(dim, |da, d| da.mean(d))
    }

    /// Per-group minimum.
    pub fn min(&self, dim: Dim) -> Result<DataArray> {
        self.reduce(dim, |da, d| da.min(d))
    }

    /// Per-group maximum.
    pub fn max(&self, dim: Dim) -> Result<DataArray> {
        self.reduce(dim, |da, d| da.max(d))
    }

    /// Per-group conjunction of boolean data.
    pub fn all(&self, dim: Dim) -> Result<DataArray> {
        self.reduce(dim, |da, d| da.all(d))
    }

    /// Per-group disjunction of boolean data.
    pub fn any(&self, dim: Dim) -> Result<DataArray> {
        self.reduce(dim, |da, d| da.any(d))
    }

    /// Per-group concatenation along the grouped dim.
    ///
    /// Binned data joins the bins of a group event-wise; dense data
    /// requires equally sized groups and keeps the grouped dim at the
    /// group size.
    pub fn concat(&self, dim: Dim) -> Result<DataArray> {
        self.check_dim(dim)?;
        for (name, mask) in self.array.masks().iter() {
            if mask.dims().contains(self.grouped_dim) {
                return Err(ArrayError::not_implemented(format!(
                    "groupby concat with mask {:?} along the grouped dim",
                    name
                )));
            }
        }
        let mut pieces: Vec<Variable> = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let rows = take_variable(self.array.data(), self.grouped_dim, group)?;
            if self.array.data().is_binned() {
                // Join the group's bins event-wise, leaving one row.
                let bin_dim = rows.bin_dim()?;
                let mut merged: Option<Variable> = None;
                for row in 0..group.len() {
                    let part = rows.slice_index(self.grouped_dim, row as isize)?;
                    merged = Some(match merged {
                        None => part.copy(),
                        Some(acc) => vshape::concat(&acc, &part, bin_dim)?,
                    });
                }
                pieces.push(merged.ok_or_else(|| {
                    ArrayError::dimension("cannot concatenate an empty group")
                })?);
            } else {
                pieces.push(rows);
            }
        }
        let mut stacked: Option<Variable> = None;
        for piece in &pieces {
            stacked = Some(match stacked {
                None => piece.clone(),
                Some(acc) => vshape::concat(&acc, piece, self.group_dim)?,
            });
        }
        let data = stacked.ok_or_else(|| {
            ArrayError::dimension("cannot concatenate a grouping with no groups")
        })?;
        let mut out = DataArray::new(data).with_name(self.array.name());
        for (d, coord) in self.array.coords().iter() {
            if d == self.group_dim || coord.dims().contains(self.grouped_dim) {
                continue;
            }
            out.set_coord(d, coord.clone())?;
        }
        for (name, mask) in self.array.masks().iter() {
            out.masks_mut().insert(name, mask.clone())?;
        }
        out.set_coord(self.group_dim, self.key.clone())?;
        Ok(out)
    }
}
