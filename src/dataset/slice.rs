// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Value-based slicing: positions are looked up in a sorted coord
//! instead of being given as indices.

use crate::dataset::{DataArray, Dataset};
use crate::dim::Dim;
use crate::dtype::DType;
use crate::error::{ArrayError, Result};
use crate::variable::Variable;

enum SingleSelection {
    Point(usize),
    Bin(usize),
}

fn coord_as_f64(coord: &Variable) -> Result<Vec<f64>> {
    match coord.dtype() {
        DType::TimePoint => Ok(coord
            .to_vec::<crate::dtype::TimePoint>()?
            .into_iter()
            .map(|t| t.0 as f64)
            .collect()),
        dtype if dtype.is_numeric() => {
            let coord = crate::transform::convert_numeric(coord, DType::Float64)?;
            coord.to_vec::<f64>()
        }
        dtype => Err(ArrayError::dtype(format!(
            "cannot slice by value over a coord of dtype {}",
            dtype
        ))),
    }
}

fn bound_as_f64(name: &str, coord: &Variable, bound: &Variable) -> Result<f64> {
    if bound.ndim() != 0 {
        return Err(ArrayError::dimension(format!(
            "{} bound must be 0-d, got dims {}",
            name,
            bound.dims()
        )));
    }
    if bound.unit() != coord.unit() {
        return Err(ArrayError::unit(format!(
            "{} bound unit {} does not match coord unit {}",
            name,
            bound.unit(),
            coord.unit()
        )));
    }
    match bound.dtype() {
        DType::TimePoint => Ok(bound.value::<crate::dtype::TimePoint>()?.0 as f64),
        dtype if dtype.is_numeric() => {
            let bound = crate::transform::convert_numeric(bound, DType::Float64)?;
            bound.value::<f64>()
        }
        dtype => Err(ArrayError::dtype(format!(
            "cannot slice by a bound of dtype {}",
            dtype
        ))),
    }
}

enum Ordering {
    Ascending,
    Descending,
}

fn ordering(values: &[f64], dim: Dim) -> Result<Ordering> {
    if values.windows(2).all(|w| w[0] <= w[1]) {
        Ok(Ordering::Ascending)
    } else if values.windows(2).all(|w| w[0] >= w[1]) {
        Ok(Ordering::Descending)
    } else {
        Err(ArrayError::slice(format!(
            "coord along {} is not sorted",
            dim
        )))
    }
}

fn checked_coord<'a>(
    coord: Result<&'a Variable>,
    dim: Dim,
) -> Result<&'a Variable> {
    let coord = coord
        .map_err(|_| ArrayError::dimension(format!("no coord to slice along dimension {}", dim)))?;
    if coord.ndim() != 1 || !coord.dims().contains(dim) {
        return Err(ArrayError::dimension(format!(
            "slicing by value needs a one-dimensional coord along {}, got {}",
            dim,
            coord.dims()
        )));
    }
    Ok(coord)
}

/// Resolve a `[begin, end)` value range to index bounds over a sorted
/// coord. Point coords select matching points, edge coords select every
/// bin whose range intersects.
fn resolve_range(
    coord: &Variable,
    data_extent: usize,
    dim: Dim,
    begin: Option<&Variable>,
    end: Option<&Variable>,
) -> Result<(usize, usize)> {
    let values = coord_as_f64(coord)?;
    let order = ordering(&values, dim)?;
    let edges = values.len() == data_extent + 1;
    let begin = begin.map(|b| bound_as_f64("begin", coord, b)).transpose()?;
    let end = end.map(|e| bound_as_f64("end", coord, e)).transpose()?;
    let n = data_extent;
    let (lo, hi) = match order {
        Ordering::Ascending => {
            if edges {
                let lo = match begin {
                    Some(b) => values.iter().position(|&v| v > b).map(|i| i.saturating_sub(1)).unwrap_or(n),
                    None => 0,
                };
                let hi = match end {
                    Some(e) => values.iter().position(|&v| v >= e).unwrap_or(values.len()).min(n),
                    None => n,
                };
                (lo, hi)
            } else {
                let lo = match begin {
                    Some(b) => values.iter().position(|&v| v >= b).unwrap_or(n),
                    None => 0,
                };
                let hi = match end {
                    Some(e) => values.iter().position(|&v| v >= e).unwrap_or(n),
                    None => n,
                };
                (lo, hi)
            }
        }
        Ordering::Descending => {
            if edges {
                let lo = match begin {
                    Some(b) => values.iter().position(|&v| v < b).map(|i| i.saturating_sub(1)).unwrap_or(n),
                    None => 0,
                };
                let hi = match end {
                    Some(e) => values.iter().position(|&v| v <= e).unwrap_or(values.len()).min(n),
                    None => n,
                };
                (lo, hi)
            } else {
                let lo = match begin {
                    Some(b) => values.iter().position(|&v| v <= b).unwrap_or(n),
                    None => 0,
                };
                let hi = match end {
                    Some(e) => values.iter().position(|&v| v <= e).unwrap_or(n),
                    None => n,
                };
                (lo, hi)
            }
        }
    };
    Ok((lo.min(hi), hi))
}

/// Resolve one value to a position: the unique equal entry of a point
/// coord, or the containing bin of an edge coord.
fn resolve_single(
    coord: &Variable,
    data_extent: usize,
    dim: Dim,
    value: &Variable,
) -> Result<SingleSelection> {
    if value.ndim() != 0 {
        return Err(ArrayError::dimension(format!(
            "selection value must be 0-d, got dims {}",
            value.dims()
        )));
    }
    let coord_extent = coord.dims().extent(dim)?;
    let edges = coord_extent == data_extent + 1;
    if edges {
        let values = coord_as_f64(coord)?;
        let order = ordering(&values, dim)?;
        let v = bound_as_f64("selection", coord, value)?;
        let index = match order {
            Ordering::Ascending => values
                .windows(2)
                .position(|w| w[0] <= v && v < w[1]),
            Ordering::Descending => values
                .windows(2)
                .position(|w| w[0] >= v && v > w[1]),
        };
        return index.map(SingleSelection::Bin).ok_or_else(|| {
            ArrayError::slice(format!(
                "value {} along {} is outside the bin edges",
                v, dim
            ))
        });
    }
    // Point coord: exact, unique match; works for any comparable dtype.
    if value.unit() != coord.unit() {
        return Err(ArrayError::unit(format!(
            "selection unit {} does not match coord unit {}",
            value.unit(),
            coord.unit()
        )));
    }
    if value.dtype() != coord.dtype() {
        return Err(ArrayError::dtype(format!(
            "selection dtype {} does not match coord dtype {}",
            value.dtype(),
            coord.dtype()
        )));
    }
    let coord_can = coord.copy();
    let value_can = value.copy();
    let mut matches = (0..coord_extent).filter(|&i| {
        coord_can.values.eq_elements(
            [i].into_iter(),
            &value_can.values,
            [0].into_iter(),
        )
    });
    match (matches.next(), matches.next()) {
        (Some(index), None) => Ok(SingleSelection::Point(index)),
        (Some(_), Some(_)) => Err(ArrayError::slice(format!(
            "selection along {} matches more than one coord entry",
            dim
        ))),
        (None, _) => Err(ArrayError::slice(format!(
            "selection along {} matches no coord entry",
            dim
        ))),
    }
}

/// Slice `da` along `dim` by coord values: select `[begin, end)`; open
/// bounds extend to the respective end.
pub fn slice_by_value(
    da: &DataArray,
    dim: Dim,
    begin: Option<&Variable>,
    end: Option<&Variable>,
) -> Result<DataArray> {
    let coord = checked_coord(da.coords().get(dim), dim)?;
    let extent = da.dims().extent(dim)?;
    let (lo, hi) = resolve_range(coord, extent, dim, begin, end)?;
    da.slice(dim, lo, hi)
}

/// Select a single position along `dim` by coord value; the dim is
/// dropped for point coords and kept for bin selection of edge coords.
pub fn slice_by_single_value(da: &DataArray, dim: Dim, value: &Variable) -> Result<DataArray> {
    let coord = checked_coord(da.coords().get(dim), dim)?;
    let extent = da.dims().extent(dim)?;
    match resolve_single(coord, extent, dim, value)? {
        SingleSelection::Point(index) => da.slice_index(dim, index as isize),
        SingleSelection::Bin(index) => da.slice(dim, index, index + 1),
    }
}

/// Dataset counterpart of [`slice_by_value`].
pub fn slice_dataset_by_value(
    ds: &Dataset,
    dim: Dim,
    begin: Option<&Variable>,
    end: Option<&Variable>,
) -> Result<Dataset> {
    let coord = checked_coord(ds.coords().get(dim), dim)?;
    let extent = ds.dims().extent(dim)?;
    let (lo, hi) = resolve_range(coord, extent, dim, begin, end)?;
    ds.slice(dim, lo, hi)
}
