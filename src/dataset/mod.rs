// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The composition layer over [`Variable`]: named coordinates, masks and
//! attributes ([`DataArray`]), and ordered collections of data arrays
//! over a shared coordinate pool ([`Dataset`]).

use std::fmt;

use crate::data::{Data, Element};
use crate::dim::Dim;
use crate::dimensions::Dimensions;
use crate::dtype::DType;
use crate::error::{ArrayError, Result};
use crate::ops::{arithmetic, reduction};
use crate::transform::kernels::{align_strides, map2};
use crate::unit::Unit;
use crate::variable::Variable;

pub mod groupby;
pub mod shape;
pub mod slice;

/// Whether `coord` is a bin-edge coord for `dim` of data shaped `dims`:
/// its extent exceeds the data extent by one.
pub fn is_edges(dims: &Dimensions, coord: &Variable, dim: Dim) -> bool {
    match (coord.dims().extent(dim), dims.extent(dim)) {
        (Ok(coord_extent), Ok(data_extent)) => coord_extent == data_extent + 1,
        _ => false,
    }
}

/// Insertion-ordered map from [`Dim`] to coordinate [`Variable`].
///
/// Each entry carries an alignment flag; a coord turned unaligned by
/// single-index slicing stays attached until dropped explicitly, and
/// equality ignores the flag.
#[derive(Clone, Debug, Default)]
pub struct Coords {
    entries: Vec<CoordEntry>,
}

#[derive(Clone, Debug)]
struct CoordEntry {
    dim: Dim,
    var: Variable,
    aligned: bool,
}

impl Coords {
    pub fn new() -> Coords {
        Coords::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, dim: Dim) -> bool {
        self.entries.iter().any(|e| e.dim == dim)
    }

    /// The coord for `dim`; `NotFoundError` when absent.
    pub fn get(&self, dim: Dim) -> Result<&Variable> {
        self.entries
            .iter()
            .find(|e| e.dim == dim)
            .map(|e| &e.var)
            .ok_or_else(|| ArrayError::not_found(format!("no coord for dimension {}", dim)))
    }

    /// Insert or replace the coord for `dim` (aligned).
    pub fn insert(&mut self, dim: Dim, var: Variable) {
        self.insert_with_alignment(dim, var, true);
    }

    pub(crate) fn insert_with_alignment(&mut self, dim: Dim, var: Variable, aligned: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.dim == dim) {
            entry.var = var;
            entry.aligned = aligned;
        } else {
            self.entries.push(CoordEntry { dim, var, aligned });
        }
    }

    /// Remove and return the coord for `dim`; `NotFoundError` when
    /// absent.
    pub fn remove(&mut self, dim: Dim) -> Result<Variable> {
        let index = self
            .entries
            .iter()
            .position(|e| e.dim == dim)
            .ok_or_else(|| ArrayError::not_found(format!("no coord for dimension {}", dim)))?;
        Ok(self.entries.remove(index).var)
    }

    /// Whether the coord for `dim` is aligned with its dimension.
    pub fn is_aligned(&self, dim: Dim) -> Result<bool> {
        self.entries
            .iter()
            .find(|e| e.dim == dim)
            .map(|e| e.aligned)
            .ok_or_else(|| ArrayError::not_found(format!("no coord for dimension {}", dim)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dim, &Variable)> + '_ {
        self.entries.iter().map(|e| (e.dim, &e.var))
    }

    fn set_unaligned(&mut self, dim: Dim) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.dim == dim) {
            entry.aligned = false;
        }
    }
}

// Map equality by value: order and alignment flags do not matter.
impl PartialEq for Coords {
    fn eq(&self, other: &Coords) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|e| other.get(e.dim).map(|v| *v == e.var).unwrap_or(false))
    }
}

macro_rules! named_map {
    ($name:ident, $kind:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Debug, Default)]
        pub struct $name {
            entries: Vec<(String, Variable)>,
        }

        impl $name {
            pub fn new() -> $name {
                $name::default()
            }

            pub fn len(&self) -> usize {
                self.entries.len()
            }

            pub fn is_empty(&self) -> bool {
                self.entries.is_empty()
            }

            pub fn contains(&self, name: &str) -> bool {
                self.entries.iter().any(|(n, _)| n == name)
            }

            /// The entry called `name`; `NotFoundError` when absent.
            pub fn get(&self, name: &str) -> Result<&Variable> {
                self.entries
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| {
                        ArrayError::not_found(format!(concat!("no ", $kind, " named {:?}"), name))
                    })
            }

            /// Remove and return the entry called `name`;
            /// `NotFoundError` when absent.
            pub fn remove(&mut self, name: &str) -> Result<Variable> {
                let index = self
                    .entries
                    .iter()
                    .position(|(n, _)| n == name)
                    .ok_or_else(|| {
                        ArrayError::not_found(format!(concat!("no ", $kind, " named {:?}"), name))
                    })?;
                Ok(self.entries.remove(index).1)
            }

            pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> + '_ {
                self.entries.iter().map(|(n, v)| (n.as_str(), v))
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &$name) -> bool {
                self.entries.len() == other.entries.len()
                    && self
                        .entries
                        .iter()
                        .all(|(n, v)| other.get(n).map(|o| o == v).unwrap_or(false))
            }
        }
    };
}

named_map!(
    Masks,
    "mask",
    "Insertion-ordered map from name to boolean mask variable."
);
named_map!(
    Attrs,
    "attribute",
    "Insertion-ordered map from name to attribute variable."
);

impl Masks {
    /// Insert or replace the mask `name`.
    ///
    /// Fails with `TypeError` unless the mask dtype is `bool`.
    pub fn insert(&mut self, name: impl Into<String>, var: Variable) -> Result<()> {
        if var.dtype() != DType::Bool {
            return Err(ArrayError::dtype(format!(
                "masks must have dtype bool, got {}",
                var.dtype()
            )));
        }
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = var;
        } else {
            self.entries.push((name, var));
        }
        Ok(())
    }
}

impl Attrs {
    /// Insert or replace the attribute `name`.
    pub fn insert(&mut self, name: impl Into<String>, var: Variable) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = var;
        } else {
            self.entries.push((name, var));
        }
    }
}

/// The pointwise union (`or`) of two boolean mask variables.
pub(crate) fn mask_or(a: &Variable, b: &Variable) -> Result<Variable> {
    if a.dtype() != DType::Bool || b.dtype() != DType::Bool {
        return Err(ArrayError::dtype(format!(
            "mask union requires dtype bool, got {} and {}",
            a.dtype(),
            b.dtype()
        )));
    }
    let out_dims = Dimensions::union(&[a.dims(), b.dims()])?;
    let av = bool::buffer(&a.values).expect("dtype checked").as_slice();
    let bv = bool::buffer(&b.values).expect("dtype checked").as_slice();
    let sa = align_strides(a.dims(), a.strides(), &out_dims);
    let sb = align_strides(b.dims(), b.strides(), &out_dims);
    let values = map2(out_dims.shape(), av, a.offset, &sa, bv, b.offset, &sb, |x, y| *x || *y);
    Ok(Variable::from_parts(out_dims, Unit::none(), Data::from(values), None))
}

/// A [`Variable`] with named coordinates, masks and attributes.
///
/// Coordinates are aligned metadata checked for agreement in binary
/// operations; masks flag elements to skip in reductions; attributes
/// travel along without semantics.
#[derive(Clone, Debug)]
pub struct DataArray {
    name: String,
    data: Variable,
    coords: Coords,
    masks: Masks,
    attrs: Attrs,
}

impl DataArray {
    pub fn new(data: Variable) -> DataArray {
        DataArray {
            name: String::new(),
            data,
            coords: Coords::new(),
            masks: Masks::new(),
            attrs: Attrs::new(),
        }
    }

    /// Rename and return `self` (builder style).
    pub fn with_name(mut self, name: impl Into<String>) -> DataArray {
        self.name = name.into();
        self
    }

    /// Attach a coord and return `self` (builder style).
    ///
    /// The coord's dims must be dims of the data, with equal extent or
    /// the bin-edge extent (+1).
    pub fn with_coord(mut self, dim: Dim, coord: Variable) -> Result<DataArray> {
        self.set_coord(dim, coord)?;
        Ok(self)
    }

    /// Attach a mask and return `self` (builder style).
    pub fn with_mask(mut self, name: impl Into<String>, mask: Variable) -> Result<DataArray> {
        if !self.data.dims().includes(mask.dims()) {
            return Err(ArrayError::dimension(format!(
                "mask dims {} are not part of data dims {}",
                mask.dims(),
                self.data.dims()
            )));
        }
        self.masks.insert(name, mask)?;
        Ok(self)
    }

    /// Attach an attribute and return `self` (builder style).
    pub fn with_attr(mut self, name: impl Into<String>, attr: Variable) -> DataArray {
        self.attrs.insert(name, attr);
        self
    }

    /// Insert or replace the coord for `dim`, validating its dims.
    pub fn set_coord(&mut self, dim: Dim, coord: Variable) -> Result<()> {
        for (d, e) in coord.dims().iter() {
            let data_extent = self.data.dims().extent(d).map_err(|_| {
                ArrayError::dimension(format!(
                    "coord for {} has dim {} which the data {} lacks",
                    dim,
                    d,
                    self.data.dims()
                ))
            })?;
            if e != data_extent && e != data_extent + 1 {
                return Err(ArrayError::dimension(format!(
                    "coord extent {} for dim {} matches neither data extent {} nor its bin edges",
                    e, d, data_extent
                )));
            }
        }
        self.coords.insert(dim, coord);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn data(&self) -> &Variable {
        &self.data
    }

    /// Replace the data; the dims must stay the same so the coords and
    /// masks remain valid.
    pub fn set_data(&mut self, data: Variable) -> Result<()> {
        if data.dims() != self.data.dims() {
            return Err(ArrayError::dimension(format!(
                "replacement data dims {} do not match {}",
                data.dims(),
                self.data.dims()
            )));
        }
        self.data = data;
        Ok(())
    }

    pub fn coords(&self) -> &Coords {
        &self.coords
    }

    pub fn coords_mut(&mut self) -> &mut Coords {
        &mut self.coords
    }

    pub fn masks(&self) -> &Masks {
        &self.masks
    }

    pub fn masks_mut(&mut self) -> &mut Masks {
        &mut self.masks
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attrs {
        &mut self.attrs
    }

    pub fn dims(&self) -> &Dimensions {
        self.data.dims()
    }

    pub fn unit(&self) -> Unit {
        self.data.unit()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// An independent deep copy.
    pub fn copy(&self) -> DataArray {
        let mut out = self.clone();
        out.data = self.data.copy();
        for entry in &mut out.coords.entries {
            entry.var = entry.var.copy();
        }
        for (_, var) in &mut out.masks.entries {
            *var = var.copy();
        }
        for (_, var) in &mut out.attrs.entries {
            *var = var.copy();
        }
        out
    }

    /// The union of all masks, broadcast to the data dims, or `None`
    /// when no masks are present.
    pub fn flat_mask(&self) -> Result<Option<Variable>> {
        let mut combined: Option<Variable> = None;
        for (_, mask) in self.masks.iter() {
            combined = Some(match combined {
                None => mask.clone(),
                Some(acc) => mask_or(&acc, mask)?,
            });
        }
        Ok(combined)
    }

    /// Slice `[begin, end)` along `dim`; bin-edge coords keep the
    /// enclosing edge.
    pub fn slice(&self, dim: Dim, begin: usize, end: usize) -> Result<DataArray> {
        let data = self.data.slice(dim, begin, end)?;
        let mut coords = Coords::new();
        for entry in &self.coords.entries {
            let var = if entry.var.dims().contains(dim) {
                if is_edges(self.data.dims(), &entry.var, dim) {
                    entry.var.slice(dim, begin, end + 1)?
                } else {
                    entry.var.slice(dim, begin, end)?
                }
            } else {
                entry.var.clone()
            };
            coords.insert_with_alignment(entry.dim, var, entry.aligned);
        }
        let mut masks = Masks::new();
        for (name, mask) in self.masks.iter() {
            let sliced = if mask.dims().contains(dim) {
                mask.slice(dim, begin, end)?
            } else {
                mask.clone()
            };
            masks.insert(name, sliced)?;
        }
        let mut attrs = Attrs::new();
        for (name, attr) in self.attrs.iter() {
            let sliced = if attr.dims().contains(dim) {
                attr.slice(dim, begin, end)?
            } else {
                attr.clone()
            };
            attrs.insert(name, sliced);
        }
        Ok(DataArray {
            name: self.name.clone(),
            data,
            coords,
            masks,
            attrs,
        })
    }

    /// Select element `index` along `dim`, dropping the dim. Coords on
    /// `dim` stay attached but turn unaligned; a bin-edge coord keeps
    /// its two enclosing edges.
    pub fn slice_index(&self, dim: Dim, index: isize) -> Result<DataArray> {
        let data = self.data.slice_index(dim, index)?;
        let extent = self.data.dims().extent(dim)? as isize;
        let wrapped = if index < 0 { index + extent } else { index } as usize;
        let mut coords = Coords::new();
        for entry in &self.coords.entries {
            if entry.var.dims().contains(dim) {
                let (var, aligned) = if is_edges(self.data.dims(), &entry.var, dim) {
                    (entry.var.slice(dim, wrapped, wrapped + 2)?, false)
                } else {
                    (entry.var.slice_index(dim, wrapped as isize)?, false)
                };
                coords.insert_with_alignment(entry.dim, var, aligned);
            } else {
                coords.insert_with_alignment(entry.dim, entry.var.clone(), entry.aligned);
            }
        }
        let mut masks = Masks::new();
        for (name, mask) in self.masks.iter() {
            let sliced = if mask.dims().contains(dim) {
                mask.slice_index(dim, wrapped as isize)?
            } else {
                mask.clone()
            };
            masks.insert(name, sliced)?;
        }
        let mut attrs = Attrs::new();
        for (name, attr) in self.attrs.iter() {
            let sliced = if attr.dims().contains(dim) {
                attr.slice_index(dim, wrapped as isize)?
            } else {
                attr.clone()
            };
            attrs.insert(name, sliced);
        }
        Ok(DataArray {
            name: self.name.clone(),
            data,
            coords,
            masks,
            attrs,
        })
    }

    fn binary_op(
        &self,
        rhs: &DataArray,
        op: impl Fn(&Variable, &Variable) -> Result<Variable>,
    ) -> Result<DataArray> {
        // Aligned coords present on both sides must agree.
        for entry in &self.coords.entries {
            if !entry.aligned {
                continue;
            }
            if let Ok(other) = rhs.coords.get(entry.dim) {
                if rhs.coords.is_aligned(entry.dim).unwrap_or(false) && *other != entry.var {
                    return Err(ArrayError::coord_mismatch(format!(
                        "coords for dimension {} disagree",
                        entry.dim
                    )));
                }
            }
        }
        let data = op(&self.data, &rhs.data)?;
        let mut coords = self.coords.clone();
        for entry in &rhs.coords.entries {
            if !coords.contains(entry.dim) {
                coords.insert_with_alignment(entry.dim, entry.var.clone(), entry.aligned);
            }
        }
        let mut masks = Masks::new();
        for (name, mask) in self.masks.iter() {
            let merged = match rhs.masks.get(name) {
                Ok(other) => mask_or(mask, other)?,
                Err(_) => mask.clone(),
            };
            masks.insert(name, merged)?;
        }
        for (name, mask) in rhs.masks.iter() {
            if !masks.contains(name) {
                masks.insert(name, mask.clone())?;
            }
        }
        // Attributes survive only where both sides agree.
        let mut attrs = Attrs::new();
        for (name, attr) in self.attrs.iter() {
            if rhs.attrs.get(name).map(|other| other == attr).unwrap_or(false) {
                attrs.insert(name, attr.clone());
            }
        }
        Ok(DataArray {
            name: self.name.clone(),
            data,
            coords,
            masks,
            attrs,
        })
    }

    /// Element-wise `self + rhs` with coord agreement checks and mask
    /// union.
    pub fn add(&self, rhs: &DataArray) -> Result<DataArray> {
        self.binary_op(rhs, arithmetic::add)
    }

    /// Element-wise `self - rhs`.
    pub fn subtract(&self, rhs: &DataArray) -> Result<DataArray> {
        self.binary_op(rhs, arithmetic::subtract)
    }

    /// Element-wise `self * rhs`.
    pub fn multiply(&self, rhs: &DataArray) -> Result<DataArray> {
        self.binary_op(rhs, arithmetic::multiply)
    }

    /// Element-wise `self / rhs`.
    pub fn divide(&self, rhs: &DataArray) -> Result<DataArray> {
        self.binary_op(rhs, arithmetic::divide)
    }

    fn reduce(
        &self,
        dim: Option<Dim>,
        reduce: impl Fn(&Variable, Option<Dim>, Option<&Variable>) -> Result<Variable>,
    ) -> Result<DataArray> {
        // Masks involving the reduced dim participate in the reduction;
        // the others survive.
        let mut applied: Option<Variable> = None;
        let mut surviving = Masks::new();
        for (name, mask) in self.masks.iter() {
            let involved = match dim {
                Some(dim) => mask.dims().contains(dim),
                None => true,
            };
            if involved {
                applied = Some(match applied {
                    None => mask.clone(),
                    Some(acc) => mask_or(&acc, mask)?,
                });
            } else {
                surviving.insert(name, mask.clone())?;
            }
        }
        let data = reduce(&self.data, dim, applied.as_ref())?;
        let mut coords = Coords::new();
        for entry in &self.coords.entries {
            let keep = match dim {
                Some(dim) => !entry.var.dims().contains(dim),
                None => entry.var.ndim() == 0,
            };
            if keep {
                coords.insert_with_alignment(entry.dim, entry.var.clone(), entry.aligned);
            }
        }
        Ok(DataArray {
            name: self.name.clone(),
            data,
            coords,
            masks: surviving,
            attrs: self.attrs.clone(),
        })
    }

    /// Sum over `dim` (or everything), skipping masked elements.
    pub fn sum(&self, dim: impl Into<Option<Dim>>) -> Result<DataArray> {
        self.reduce(dim.into(), reduction::sum_masked)
    }

    /// Mean over `dim` (or everything); the divisor counts unmasked
    /// contributions only.
    pub fn mean(&self, dim: impl Into<Option<Dim>>) -> Result<DataArray> {
        self.reduce(dim.into(), reduction::mean_masked)
    }

    /// Minimum over `dim` (or everything), skipping masked elements.
    pub fn min(&self, dim: impl Into<Option<Dim>>) -> Result<DataArray> {
        self.reduce(dim.into(), reduction::min_masked)
    }

    /// Maximum over `dim` (or everything), skipping masked elements.
    pub fn max(&self, dim: impl Into<Option<Dim>>) -> Result<DataArray> {
        self.reduce(dim.into(), reduction::max_masked)
    }

    /// Whether all unmasked elements are `true`, over `dim`.
    pub fn all(&self, dim: impl Into<Option<Dim>>) -> Result<DataArray> {
        self.reduce(dim.into(), reduction::all_masked)
    }

    /// Whether any unmasked element is `true`, over `dim`.
    pub fn any(&self, dim: impl Into<Option<Dim>>) -> Result<DataArray> {
        self.reduce(dim.into(), reduction::any_masked)
    }
}

// Equality compares data, coords, masks and attrs by value; the name
// and coord alignment flags are display/bookkeeping state.
impl PartialEq for DataArray {
    fn eq(&self, other: &DataArray) -> bool {
        self.data == other.data
            && self.coords == other.coords
            && self.masks == other.masks
            && self.attrs == other.attrs
    }
}

/// An insertion-ordered collection of named data arrays sharing one
/// coordinate pool. Aligned coords propagate to every item they fit.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    coords: Coords,
    items: Vec<(String, DatasetItem)>,
    metadata: Attrs,
}

#[derive(Clone, Debug, PartialEq)]
struct DatasetItem {
    data: Variable,
    masks: Masks,
    attrs: Attrs,
}

impl Dataset {
    pub fn new() -> Dataset {
        Dataset::default()
    }

    /// Build from data arrays; coords are pooled and must agree.
    pub fn from_data_arrays(arrays: impl IntoIterator<Item = DataArray>) -> Result<Dataset> {
        let mut out = Dataset::new();
        for array in arrays {
            let name = array.name().to_owned();
            out.insert(name, array)?;
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.items.iter().map(|(n, _)| n.as_str())
    }

    /// The shared coordinate pool.
    pub fn coords(&self) -> &Coords {
        &self.coords
    }

    /// Dataset-level metadata; never merged into item attributes.
    pub fn metadata(&self) -> &Attrs {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Attrs {
        &mut self.metadata
    }

    /// The union of all item and coord dims.
    pub fn dims(&self) -> Dimensions {
        let mut out = Dimensions::new();
        for (_, item) in &self.items {
            for (d, e) in item.data.dims().iter() {
                if !out.contains(d) {
                    let _ = out.push(d, e);
                }
            }
        }
        for (_, coord) in self.coords.iter() {
            for (d, e) in coord.dims().iter() {
                if !out.contains(d) {
                    let _ = out.push(d, e);
                }
            }
        }
        out
    }

    /// Insert `array` as item `name`, pooling its coords.
    ///
    /// A coord that is already pooled must be equal
    /// (`CoordMismatchError` otherwise).
    pub fn insert(&mut self, name: impl Into<String>, array: DataArray) -> Result<()> {
        // Validate against the pool before touching it.
        for entry in &array.coords.entries {
            if let Ok(existing) = self.coords.get(entry.dim) {
                if *existing != entry.var {
                    return Err(ArrayError::coord_mismatch(format!(
                        "coords for dimension {} disagree between dataset and new item",
                        entry.dim
                    )));
                }
            }
        }
        for entry in &array.coords.entries {
            if !self.coords.contains(entry.dim) {
                self.coords
                    .insert_with_alignment(entry.dim, entry.var.clone(), entry.aligned);
            }
        }
        let name = name.into();
        let item = DatasetItem {
            data: array.data,
            masks: array.masks,
            attrs: array.attrs,
        };
        if let Some(existing) = self.items.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = item;
        } else {
            self.items.push((name, item));
        }
        Ok(())
    }

    /// The item called `name` as a [`DataArray`], with the aligned pool
    /// coords that fit its dims attached.
    pub fn get(&self, name: &str) -> Result<DataArray> {
        let (_, item) = self
            .items
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| ArrayError::not_found(format!("no item named {:?}", name)))?;
        let mut coords = Coords::new();
        for entry in &self.coords.entries {
            let fits = entry.var.dims().iter().all(|(d, e)| {
                item.data
                    .dims()
                    .extent(d)
                    .map(|data_extent| e == data_extent || e == data_extent + 1)
                    .unwrap_or(false)
            });
            if fits {
                coords.insert_with_alignment(entry.dim, entry.var.clone(), entry.aligned);
            }
        }
        Ok(DataArray {
            name: name.to_owned(),
            data: item.data.clone(),
            coords,
            masks: item.masks.clone(),
            attrs: item.attrs.clone(),
        })
    }

    /// Remove and return the item called `name`.
    pub fn extract(&mut self, name: &str) -> Result<DataArray> {
        let array = self.get(name)?;
        let index = self
            .items
            .iter()
            .position(|(n, _)| n == name)
            .expect("get found the item");
        self.items.remove(index);
        Ok(array)
    }

    /// Drop the item called `name`.
    pub fn drop_item(&mut self, name: &str) -> Result<()> {
        self.extract(name).map(|_| ())
    }

    /// All items as data arrays, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = DataArray> + '_ {
        self.items.iter().map(move |(name, _)| {
            self.get(name).expect("iterating over existing names")
        })
    }

    /// Slice every item and coord `[begin, end)` along `dim`; items
    /// without `dim` are carried unchanged.
    pub fn slice(&self, dim: Dim, begin: usize, end: usize) -> Result<Dataset> {
        let mut out = Dataset::new();
        out.metadata = self.metadata.clone();
        for entry in &self.coords.entries {
            let var = if entry.var.dims().contains(dim) {
                let edge = self
                    .items
                    .first()
                    .map(|(_, item)| is_edges(item.data.dims(), &entry.var, dim))
                    .unwrap_or(false);
                if edge {
                    entry.var.slice(dim, begin, end + 1)?
                } else {
                    entry.var.slice(dim, begin, end)?
                }
            } else {
                entry.var.clone()
            };
            out.coords.insert_with_alignment(entry.dim, var, entry.aligned);
        }
        for (name, item) in &self.items {
            let data = if item.data.dims().contains(dim) {
                item.data.slice(dim, begin, end)?
            } else {
                item.data.clone()
            };
            let mut masks = Masks::new();
            for (mask_name, mask) in item.masks.iter() {
                let sliced = if mask.dims().contains(dim) {
                    mask.slice(dim, begin, end)?
                } else {
                    mask.clone()
                };
                masks.insert(mask_name, sliced)?;
            }
            let mut attrs = Attrs::new();
            for (attr_name, attr) in item.attrs.iter() {
                let sliced = if attr.dims().contains(dim) {
                    attr.slice(dim, begin, end)?
                } else {
                    attr.clone()
                };
                attrs.insert(attr_name, sliced);
            }
            out.items.push((name.clone(), DatasetItem { data, masks, attrs }));
        }
        Ok(out)
    }

    /// Merge two datasets: pooled coords must agree, and items present
    /// in both must be equal.
    pub fn merge(a: &Dataset, b: &Dataset) -> Result<Dataset> {
        let mut out = a.clone();
        for entry in &b.coords.entries {
            match out.coords.get(entry.dim) {
                Ok(existing) => {
                    if *existing != entry.var {
                        return Err(ArrayError::coord_mismatch(format!(
                            "coords for dimension {} disagree between datasets",
                            entry.dim
                        )));
                    }
                }
                Err(_) => out
                    .coords
                    .insert_with_alignment(entry.dim, entry.var.clone(), entry.aligned),
            }
        }
        for (name, item) in &b.items {
            match out.items.iter().find(|(n, _)| n == name) {
                Some((_, existing)) if existing == item => {}
                Some(_) => {
                    return Err(ArrayError::coord_mismatch(format!(
                        "items named {:?} disagree between datasets",
                        name
                    )))
                }
                None => out.items.push((name.clone(), item.clone())),
            }
        }
        for (name, attr) in b.metadata.iter() {
            if !out.metadata.contains(name) {
                out.metadata.insert(name, attr.clone());
            }
        }
        Ok(out)
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Dataset) -> bool {
        self.coords == other.coords
            && self.items.len() == other.items.len()
            && self.items.iter().all(|(name, item)| {
                other
                    .items
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, o)| o == item)
                    .unwrap_or(false)
            })
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dataset({} items)", self.items.len())
    }
}
