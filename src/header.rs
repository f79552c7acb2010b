// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Record field layouts and column binding
//!
//! A record type describes its fields once with a [`Layout`]. For every
//! sheet, the layout and the header rows are resolved into a
//! [`BindingTable`]:
//!
//! 1. fields with an explicit column index take that column,
//! 2. fields with header names take the first unused column whose header
//!    text equals one of the names, tried in declaration order,
//! 3. remaining fields without names fill the unused columns in ascending
//!    order, sorted by their order key then declaration order.

use std::collections::{BTreeMap, HashMap};

use log::debug;
use serde::de::DeserializeOwned;

use crate::convert::{FieldType, FormatHint};
use crate::errors::Error;

/// Text of each header row, by column
pub type HeaderRows = [BTreeMap<u32, String>];

/// Column to field binding of one sheet, columns are unique
pub type BindingTable = BTreeMap<u32, FieldBinding>;

/// Declared metadata of a record field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field identifier, as known by serde
    pub name: &'static str,
    /// Target type
    pub field_type: FieldType,
    /// Explicit column (0 based)
    pub index: Option<u32>,
    /// Header text candidates, in priority order
    pub headers: Vec<String>,
    /// Relative order for positional binding, lower first
    pub order: Option<i32>,
    /// Conversion hint
    pub format: Option<FormatHint>,
}

impl FieldDescriptor {
    /// Field bound by position
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        FieldDescriptor {
            name,
            field_type,
            index: None,
            headers: Vec::new(),
            order: None,
            format: None,
        }
    }

    /// Binds to an explicit column
    pub fn index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// Adds a header name candidate
    pub fn header(mut self, name: &str) -> Self {
        self.headers.push(name.to_string());
        self
    }

    /// Adds header name candidates
    pub fn headers(mut self, names: &[&str]) -> Self {
        self.headers.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Sets the positional order key
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Sets the conversion hint
    pub fn format(mut self, format: FormatHint) -> Self {
        self.format = Some(format);
        self
    }
}

/// Ordered field descriptors of a record type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Layout {
    fields: Vec<FieldDescriptor>,
}

impl Layout {
    /// Fields in declaration order
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Layout { fields }
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

/// A record type that can be read from rows
pub trait Record: DeserializeOwned {
    /// Field layout, built once per read
    fn layout() -> Layout;
}

/// A field bound to a column
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    /// Field identifier
    pub name: &'static str,
    /// Target type
    pub field_type: FieldType,
    /// Conversion hint
    pub format: Option<FormatHint>,
    /// Position of the field in its [`Layout`]
    pub position: usize,
}

impl FieldBinding {
    fn new(position: usize, field: &FieldDescriptor) -> Self {
        FieldBinding {
            position,
            name: field.name,
            field_type: field.field_type,
            format: field.format.clone(),
        }
    }
}

/// Binds explicit indices (overrides first), rejecting duplicates.
///
/// Returns the table and which fields were bound.
fn bind_explicit(
    layout: &Layout,
    overrides: &HashMap<String, u32>,
) -> Result<(BindingTable, Vec<bool>), Error> {
    for name in overrides.keys() {
        if !layout.fields.iter().any(|f| f.name == name) {
            debug!("column override for unknown field '{name}'");
        }
    }
    let mut table = BindingTable::new();
    let mut bound = vec![false; layout.fields.len()];
    for (i, field) in layout.fields.iter().enumerate() {
        let Some(column) = overrides.get(field.name).copied().or(field.index) else {
            continue;
        };
        if let Some(first) = table.get(&column) {
            return Err(Error::HeaderBindingConflict {
                column,
                first: first.name,
                second: field.name,
            });
        }
        table.insert(column, FieldBinding::new(i, field));
        bound[i] = true;
    }
    Ok((table, bound))
}

/// Checks the layout alone, before any row is read
pub(crate) fn validate(layout: &Layout, overrides: &HashMap<String, u32>) -> Result<(), Error> {
    bind_explicit(layout, overrides).map(|_| ())
}

/// Builds the binding table of a sheet
pub fn resolve(
    layout: &Layout,
    headers: &HeaderRows,
    overrides: &HashMap<String, u32>,
) -> Result<BindingTable, Error> {
    let (mut table, mut bound) = bind_explicit(layout, overrides)?;

    if !headers.is_empty() {
        let header_columns = header_columns(headers);
        for (i, field) in layout.fields.iter().enumerate() {
            if bound[i] || field.headers.is_empty() {
                continue;
            }
            let column = field.headers.iter().find_map(|candidate| {
                header_columns
                    .iter()
                    .copied()
                    .filter(|c| !table.contains_key(c))
                    .find(|c| {
                        headers
                            .iter()
                            .any(|row| row.get(c).is_some_and(|t| t.trim() == candidate.trim()))
                    })
            });
            match column {
                Some(c) => {
                    table.insert(c, FieldBinding::new(i, field));
                    bound[i] = true;
                }
                None => debug!(
                    "no header matches field '{}' ({:?})",
                    field.name, field.headers
                ),
            }
        }
    }

    let mut positional: Vec<(usize, &FieldDescriptor)> = layout
        .fields
        .iter()
        .enumerate()
        .filter(|(i, f)| !bound[*i] && (headers.is_empty() || f.headers.is_empty()))
        .collect();
    positional.sort_by_key(|(i, f)| (f.order.is_none(), f.order, *i));
    let mut next = 0u32;
    for (i, field) in positional {
        while table.contains_key(&next) {
            next += 1;
        }
        table.insert(next, FieldBinding::new(i, field));
    }
    Ok(table)
}

/// Columns holding header text, ascending
fn header_columns(headers: &HeaderRows) -> Vec<u32> {
    let mut columns: Vec<u32> = headers.iter().flat_map(|row| row.keys().copied()).collect();
    columns.sort_unstable();
    columns.dedup();
    columns
}

/// One text per column: the last header row with non blank text wins
pub fn flatten(headers: &HeaderRows) -> BTreeMap<u32, String> {
    let mut flat = BTreeMap::new();
    for row in headers {
        for (c, t) in row {
            if !t.trim().is_empty() {
                flat.insert(*c, t.clone());
            }
        }
    }
    flat
}
