// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Shape operations on data arrays and datasets, with the coord
//! bookkeeping the plain [`Variable`](crate::Variable) forms cannot do:
//! bin-edge deduplication on concat, edge folding, join-checked
//! flatten.

use crate::dataset::{is_edges, Attrs, Coords, DataArray, Dataset, Masks};
use crate::dim::Dim;
use crate::dimensions::Dimensions;
use crate::error::{ArrayError, Result};
use crate::shape as vshape;
use crate::variable::Variable;

/// Concatenate two data arrays along `dim`.
///
/// Coords, masks and attrs without `dim` must agree. Bin-edge coords on
/// `dim` must meet exactly (`BinEdgeError` otherwise) and the shared
/// edge is deduplicated.
pub fn concat(a: &DataArray, b: &DataArray, dim: Dim) -> Result<DataArray> {
    let data = vshape::concat(a.data(), b.data(), dim)?;
    let mut coords = Coords::new();
    for (d, coord_a) in a.coords().iter() {
        let coord_b = match b.coords().get(d) {
            Ok(coord_b) => coord_b,
            Err(_) => {
                return Err(ArrayError::coord_mismatch(format!(
                    "coord for dimension {} is missing on one concatenation operand",
                    d
                )))
            }
        };
        if !coord_a.dims().contains(dim) && !coord_b.dims().contains(dim) {
            if coord_a != coord_b {
                return Err(ArrayError::coord_mismatch(format!(
                    "coords for dimension {} disagree",
                    d
                )));
            }
            coords.insert(d, coord_a.clone());
            continue;
        }
        let edges_a = is_edges(a.dims(), coord_a, dim);
        let edges_b = is_edges(b.dims(), coord_b, dim);
        let joined = match (edges_a, edges_b) {
            (true, true) => {
                let last = coord_a.dims().extent(dim)?;
                let meeting_a = coord_a.slice(dim, last - 1, last)?;
                let meeting_b = coord_b.slice(dim, 0, 1)?;
                if meeting_a.copy() != meeting_b.copy() {
                    return Err(ArrayError::bin_edge(format!(
                        "bin edges along {} do not meet between the concatenated parts",
                        dim
                    )));
                }
                let tail = coord_b.slice(dim, 1, coord_b.dims().extent(dim)?)?;
                vshape::concat(coord_a, &tail, dim)?
            }
            (false, false) => vshape::concat(coord_a, coord_b, dim)?,
            _ => {
                return Err(ArrayError::bin_edge(format!(
                    "coord for {} is bin edges on one operand only",
                    d
                )))
            }
        };
        coords.insert(d, joined);
    }
    for (d, _) in b.coords().iter() {
        if a.coords().get(d).is_err() {
            return Err(ArrayError::coord_mismatch(format!(
                "coord for dimension {} is missing on one concatenation operand",
                d
            )));
        }
    }

    let masks = concat_named(
        "mask",
        a.masks().iter(),
        |name| b.masks().get(name).ok().cloned(),
        b.masks().iter(),
        |name| a.masks().contains(name),
        dim,
    )?;
    let mut out_masks = Masks::new();
    for (name, var) in masks {
        out_masks.insert(name, var)?;
    }
    let attrs = concat_named(
        "attribute",
        a.attrs().iter(),
        |name| b.attrs().get(name).ok().cloned(),
        b.attrs().iter(),
        |name| a.attrs().contains(name),
        dim,
    )?;
    let mut out_attrs = Attrs::new();
    for (name, var) in attrs {
        out_attrs.insert(name, var);
    }

    let mut out = DataArray::new(data).with_name(a.name());
    *out.coords_mut() = coords;
    *out.masks_mut() = out_masks;
    *out.attrs_mut() = out_attrs;
    Ok(out)
}

/// Shared concat policy for masks and attrs: entries along `dim` are
/// concatenated, entries off `dim` must be equal, one-sided entries off
/// `dim` are carried.
fn concat_named<'a>(
    kind: &str,
    a_entries: impl Iterator<Item = (&'a str, &'a Variable)>,
    b_lookup: impl Fn(&str) -> Option<Variable>,
    b_entries: impl Iterator<Item = (&'a str, &'a Variable)>,
    a_contains: impl Fn(&str) -> bool,
    dim: Dim,
) -> Result<Vec<(String, Variable)>> {
    let mut out = Vec::new();
    for (name, var_a) in a_entries {
        match b_lookup(name) {
            Some(var_b) => {
                if var_a.dims().contains(dim) || var_b.dims().contains(dim) {
                    out.push((name.to_owned(), vshape::concat(var_a, &var_b, dim)?));
                } else if *var_a == var_b {
                    out.push((name.to_owned(), var_a.clone()));
                } else {
                    return Err(ArrayError::coord_mismatch(format!(
                        "{}s named {:?} disagree off the concatenation dim",
                        kind, name
                    )));
                }
            }
            None => {
                if var_a.dims().contains(dim) {
                    return Err(ArrayError::coord_mismatch(format!(
                        "{} named {:?} along {} is missing on one operand",
                        kind, name, dim
                    )));
                }
                out.push((name.to_owned(), var_a.clone()));
            }
        }
    }
    for (name, var_b) in b_entries {
        if a_contains(name) {
            continue;
        }
        if var_b.dims().contains(dim) {
            return Err(ArrayError::coord_mismatch(format!(
                "{} named {:?} along {} is missing on one operand",
                kind, name, dim
            )));
        }
        out.push((name.to_owned(), var_b.clone()));
    }
    Ok(out)
}

/// Concatenate two datasets item by item; both must hold the same item
/// names.
pub fn concat_dataset(a: &Dataset, b: &Dataset, dim: Dim) -> Result<Dataset> {
    let mut arrays = Vec::new();
    for name in a.names() {
        if !b.contains(name) {
            return Err(ArrayError::not_found(format!(
                "item {:?} is missing from the second dataset",
                name
            )));
        }
        arrays.push(concat(&a.get(name)?, &b.get(name)?, dim)?);
    }
    for name in b.names() {
        if !a.contains(name) {
            return Err(ArrayError::not_found(format!(
                "item {:?} is missing from the first dataset",
                name
            )));
        }
    }
    let mut out = Dataset::from_data_arrays(arrays)?;
    for (name, attr) in a.metadata().iter() {
        out.metadata_mut().insert(name, attr.clone());
    }
    Ok(out)
}

/// Fold `from` into the given factors, folding affected coords and
/// masks along.
///
/// A non-edge coord along `from` folds like the data. A bin-edge coord
/// becomes a per-row edge coord: the inner factor keeps its boundary
/// edge, repeating the value shared with the next row.
pub fn fold(da: &DataArray, from: Dim, into: &[(Dim, usize)]) -> Result<DataArray> {
    let data = vshape::fold(da.data(), from, into)?;
    let mut out = DataArray::new(data).with_name(da.name());
    for (d, coord) in da.coords().iter() {
        if !coord.dims().contains(from) {
            out.coords_mut().insert(d, coord.clone());
            continue;
        }
        if coord.ndim() != 1 {
            return Err(ArrayError::dimension(format!(
                "cannot fold multi-dimensional coord for {} over {}",
                d,
                coord.dims()
            )));
        }
        let folded = if is_edges(da.dims(), coord, from) {
            fold_edge_coord(coord, into)?
        } else {
            vshape::fold(coord, from, into)?
        };
        out.coords_mut().insert(d, folded);
    }
    for (name, mask) in da.masks().iter() {
        let folded = if mask.dims().contains(from) {
            vshape::fold(mask, from, into)?
        } else {
            mask.clone()
        };
        out.masks_mut().insert(name, folded)?;
    }
    for (name, attr) in da.attrs().iter() {
        let folded = if attr.dims().contains(from) && !is_edges(da.dims(), attr, from) {
            vshape::fold(attr, from, into)?
        } else {
            attr.clone()
        };
        out.attrs_mut().insert(name, folded);
    }
    Ok(out)
}

/// Fold an edge coord of extent `volume + 1`: every row of the inner
/// factor carries `inner + 1` edges, sharing its boundary with the
/// neighbouring row.
fn fold_edge_coord(coord: &Variable, into: &[(Dim, usize)]) -> Result<Variable> {
    let (inner_dim, inner) = *into.last().ok_or_else(|| {
        ArrayError::dimension("cannot fold into an empty factor list")
    })?;
    let coord_can = coord.copy();
    let mut dims = Dimensions::new();
    for &(d, e) in &into[..into.len() - 1] {
        dims.push(d, e)?;
    }
    dims.push(inner_dim, inner + 1)?;
    let rows: usize = into[..into.len() - 1].iter().map(|&(_, e)| e).product();
    let mut offsets = Vec::with_capacity(dims.volume());
    for row in 0..rows {
        for k in 0..=inner {
            offsets.push(row * inner + k);
        }
    }
    let values = coord_can.values.gather(offsets.into_iter());
    Ok(Variable::from_parts(dims, coord.unit(), values, None))
}

/// Flatten the listed dims into `to`, flattening affected coords and
/// masks. Bin-edge coords are dropped unless their rows meet at the
/// joins, in which case the shared edges are merged.
pub fn flatten(da: &DataArray, dims_in_order: &[Dim], to: Dim) -> Result<DataArray> {
    let data = vshape::flatten(da.data(), dims_in_order, to)?;
    let run: Vec<Dim> = dims_in_order.to_vec();
    let mut out = DataArray::new(data).with_name(da.name());
    for (d, coord) in da.coords().iter() {
        let involved: Vec<Dim> = run
            .iter()
            .copied()
            .filter(|&r| coord.dims().contains(r))
            .collect();
        if involved.is_empty() {
            out.coords_mut().insert(d, coord.clone());
            continue;
        }
        let last = *run.last().expect("flatten checked for dims");
        if is_edges(da.dims(), coord, last) {
            if let Some(merged) = merge_edge_rows(coord, last, to, run.len())? {
                out.coords_mut().insert(d, merged);
            }
            // Rows that do not meet: the coord is dropped.
            continue;
        }
        // Broadcast over the full run so every flattened element gets
        // its value, then flatten like the data.
        let mut target = Dimensions::new();
        for &r in &run {
            target.push(r, da.dims().extent(r)?)?;
        }
        for (cd, ce) in coord.dims().iter() {
            if !target.contains(cd) {
                target.push(cd, ce)?;
            }
        }
        let broadcast = coord.broadcast(&target)?.copy();
        out.coords_mut().insert(d, vshape::flatten(&broadcast, &run, to)?);
    }
    for (name, mask) in da.masks().iter() {
        let involved = run.iter().any(|&r| mask.dims().contains(r));
        let flattened = if involved {
            let mut target = Dimensions::new();
            for &r in &run {
                target.push(r, da.dims().extent(r)?)?;
            }
            for (md, me) in mask.dims().iter() {
                if !target.contains(md) {
                    target.push(md, me)?;
                }
            }
            vshape::flatten(&mask.broadcast(&target)?.copy(), &run, to)?
        } else {
            mask.clone()
        };
        out.masks_mut().insert(name, flattened)?;
    }
    for (name, attr) in da.attrs().iter() {
        out.attrs_mut().insert(name, attr.clone());
    }
    Ok(out)
}

/// Merge the rows of an edge coord over `edge_dim` into one edge array
/// along `to`, if every row's last edge equals the next row's first.
fn merge_edge_rows(
    coord: &Variable,
    edge_dim: Dim,
    to: Dim,
    run_len: usize,
) -> Result<Option<Variable>> {
    if coord.ndim() == 1 {
        if run_len > 1 {
            // One row of edges cannot describe several flattened rows.
            return Ok(None);
        }
        let mut out = coord.copy();
        let d = out.dims().label(0);
        if d != to {
            out.rename_dims(d, to)?;
        }
        return Ok(Some(out));
    }
    let coord_can = coord.copy();
    let edges = coord_can.dims().extent(edge_dim)?;
    let rows = coord_can.volume() / edges;
    let mut offsets: Vec<usize> = Vec::with_capacity(rows * (edges - 1) + 1);
    for row in 0..rows {
        // Boundary check: this row's first edge must repeat the
        // previous row's last.
        if row > 0 {
            let prev_last = (row - 1) * edges + edges - 1;
            let first = row * edges;
            if !coord_can.values.eq_elements(
                [prev_last].into_iter(),
                &coord_can.values,
                [first].into_iter(),
            ) {
                return Ok(None);
            }
        }
        let take = if row == rows - 1 { edges } else { edges - 1 };
        for k in 0..take {
            offsets.push(row * edges + k);
        }
    }
    let len = offsets.len();
    let values = coord_can.values.gather(offsets.into_iter());
    let dims = Dimensions::from_pairs(&[(to, len)])?;
    Ok(Some(Variable::from_parts(dims, coord.unit(), values, None)))
}

/// Squeeze extent-1 dims; coords on squeezed dims become unaligned 0-d
/// coords.
pub fn squeeze(da: &DataArray, dims: Option<&[Dim]>) -> Result<DataArray> {
    let data = vshape::squeeze(da.data(), dims)?;
    let squeezed: Vec<Dim> = match dims {
        Some(dims) => dims.to_vec(),
        None => da
            .dims()
            .iter()
            .filter(|&(_, e)| e == 1)
            .map(|(d, _)| d)
            .collect(),
    };
    let mut out = DataArray::new(data).with_name(da.name());
    for (d, coord) in da.coords().iter() {
        let mut var = coord.clone();
        let mut aligned = da.coords().is_aligned(d).unwrap_or(true);
        for &s in &squeezed {
            if var.dims().contains(s) {
                if var.dims().extent(s)? == 1 {
                    var = var.slice_index(s, 0)?;
                    aligned = false;
                } else {
                    // An edge coord of extent 2 over a squeezed dim
                    // stays as-is, demoted to unaligned.
                    aligned = false;
                }
            }
        }
        out.coords_mut().insert_with_alignment(d, var, aligned);
    }
    for (name, mask) in da.masks().iter() {
        let mut var = mask.clone();
        for &s in &squeezed {
            if var.dims().contains(s) {
                var = var.slice_index(s, 0)?;
            }
        }
        out.masks_mut().insert(name, var)?;
    }
    for (name, attr) in da.attrs().iter() {
        out.attrs_mut().insert(name, attr.clone());
    }
    Ok(out)
}
