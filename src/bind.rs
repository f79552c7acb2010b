// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Row to record binding

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;

use crate::convert::{ConvertContext, ConverterRegistry};
use crate::datatype::{CellValue, RowBuffer};
use crate::de::from_fields;
use crate::errors::Error;
use crate::header::{flatten, resolve, validate, BindingTable, HeaderRows, Layout, Record};
use crate::utils::MAX_COLUMNS;

/// Generic row: cell text by column, blank cells as `None`
pub type ColumnMap = BTreeMap<u32, Option<String>>;

/// Which blank columns a [`ColumnMap`] holds
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TrailingColumns {
    /// Every column up to the last header column, or the last declared
    /// cell if further right. Padding stops at the last sheet column.
    #[default]
    PadToHeader,
    /// Columns up to the last declared cell only
    AsDeclared,
}

/// Turns decoded rows into output values
pub trait RowBinder {
    /// Bound value
    type Output;

    /// Forgets the previous sheet
    fn reset(&mut self);

    /// Called once per sheet with its header rows, possibly none
    fn prepare(&mut self, headers: &HeaderRows) -> Result<(), Error>;

    /// Binds a data row
    fn bind(&mut self, row: &RowBuffer, ctx: &ConvertContext) -> Result<Self::Output, Error>;
}

/// Binds rows to a [`Record`] type
pub struct RecordBinder<T> {
    layout: Layout,
    overrides: HashMap<String, u32>,
    converters: ConverterRegistry,
    table: Option<BindingTable>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> RecordBinder<T> {
    /// Creates a binder, failing on conflicting explicit column indices
    pub fn new(
        overrides: HashMap<String, u32>,
        converters: ConverterRegistry,
    ) -> Result<Self, Error> {
        let layout = T::layout();
        validate(&layout, &overrides)?;
        Ok(RecordBinder {
            layout,
            overrides,
            converters,
            table: None,
            _record: PhantomData,
        })
    }

    /// Binding table of the current sheet
    pub fn table(&self) -> Option<&BindingTable> {
        self.table.as_ref()
    }
}

impl<T: Record> RowBinder for RecordBinder<T> {
    type Output = T;

    fn reset(&mut self) {
        self.table = None;
    }

    fn prepare(&mut self, headers: &HeaderRows) -> Result<(), Error> {
        self.table = Some(resolve(&self.layout, headers, &self.overrides)?);
        Ok(())
    }

    fn bind(&mut self, row: &RowBuffer, ctx: &ConvertContext) -> Result<T, Error> {
        let table = self
            .table
            .as_ref()
            .ok_or(Error::Unexpected("rows bound before the header was resolved"))?;
        let empty = CellValue::Empty;
        let mut fields = Vec::with_capacity(table.len());
        for (&column, binding) in table {
            let cell = row.get(column).unwrap_or(&empty);
            let value = self
                .converters
                .convert(cell, binding.field_type, binding.format.as_ref(), ctx)
                .map_err(|source| Error::Conversion {
                    row: row.index(),
                    column,
                    field: binding.name,
                    source,
                })?;
            fields.push((binding.position, binding.name, value));
        }
        // tuple records take their fields positionally
        fields.sort_unstable_by_key(|(position, _, _)| *position);
        let fields: Vec<_> = fields.into_iter().map(|(_, n, v)| (n, v)).collect();
        from_fields(&fields).map_err(|source| Error::Deserialize {
            row: row.index(),
            source,
        })
    }
}

/// Binds rows to a [`ColumnMap`]
#[derive(Debug, Default, Clone)]
pub struct MapBinder {
    trailing: TrailingColumns,
    header_width: Option<u32>,
}

impl MapBinder {
    /// Creates a binder with a trailing column policy
    pub fn new(trailing: TrailingColumns) -> Self {
        MapBinder {
            trailing,
            header_width: None,
        }
    }
}

impl RowBinder for MapBinder {
    type Output = ColumnMap;

    fn reset(&mut self) {
        self.header_width = None;
    }

    fn prepare(&mut self, headers: &HeaderRows) -> Result<(), Error> {
        self.header_width = flatten(headers).keys().next_back().map(|c| c + 1);
        Ok(())
    }

    fn bind(&mut self, row: &RowBuffer, _ctx: &ConvertContext) -> Result<ColumnMap, Error> {
        let declared = row.last_column().map_or(0, |c| c + 1);
        let width = match self.trailing {
            TrailingColumns::PadToHeader => declared.max(self.header_width.unwrap_or(0)),
            TrailingColumns::AsDeclared => declared,
        }
        .min(MAX_COLUMNS);
        let mut map: ColumnMap = (0..width).map(|c| (c, None)).collect();
        for (c, v) in row.cells() {
            map.insert(c, v.as_text().map(|t| t.into_owned()));
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::FieldType;
    use crate::header::FieldDescriptor;
    use serde_derive::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: u8,
        email: Option<String>,
    }

    impl Record for Person {
        fn layout() -> Layout {
            Layout::new(vec![
                FieldDescriptor::new("name", FieldType::String).header("Name"),
                FieldDescriptor::new("age", FieldType::Integer).header("Age"),
                FieldDescriptor::new("email", FieldType::String).header("E-mail"),
            ])
        }
    }

    fn row(index: u32, cells: &[(u32, CellValue)]) -> RowBuffer {
        let mut row = RowBuffer::new(index);
        for (c, v) in cells {
            row.insert(*c, v.clone());
        }
        row
    }

    fn headers(texts: &[&str]) -> Vec<BTreeMap<u32, String>> {
        vec![texts
            .iter()
            .enumerate()
            .map(|(i, t)| (i as u32, t.to_string()))
            .collect()]
    }

    #[test]
    fn record() {
        let mut binder = RecordBinder::<Person>::new(HashMap::new(), ConverterRegistry::new()).unwrap();
        binder.prepare(&headers(&["Age", "Name", "E-mail"])).unwrap();
        let ctx = ConvertContext::default();
        let p = binder
            .bind(&row(1, &[(0, "42.0".into()), (1, "Ann".into())]), &ctx)
            .unwrap();
        assert_eq!(
            p,
            Person {
                name: "Ann".to_string(),
                age: 42,
                email: None,
            }
        );
        match binder.bind(&row(2, &[(0, "old".into()), (1, "Bob".into())]), &ctx) {
            Err(Error::Conversion {
                row: 2,
                column: 0,
                field: "age",
                ..
            }) => (),
            r => panic!("unexpected {r:?}"),
        }
        match binder.bind(&row(3, &[(0, 3.0.into())]), &ctx) {
            Err(Error::Deserialize { row: 3, .. }) => (),
            r => panic!("unexpected {r:?}"),
        }
    }

    #[test]
    fn unprepared() {
        let mut binder = RecordBinder::<Person>::new(HashMap::new(), ConverterRegistry::new()).unwrap();
        assert!(binder
            .bind(&row(0, &[]), &ConvertContext::default())
            .is_err());
    }

    #[test]
    fn trailing_columns() {
        let ctx = ConvertContext::default();
        let data = row(1, &[(0, "a".into()), (2, CellValue::Number(1.))]);

        let mut padded = MapBinder::new(TrailingColumns::PadToHeader);
        padded.prepare(&headers(&["h0", "h1", "h2", "h3", "h4"])).unwrap();
        let map = padded.bind(&data, &ctx).unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(map[&0].as_deref(), Some("a"));
        assert_eq!(map[&1], None);
        assert_eq!(map[&2].as_deref(), Some("1"));
        assert_eq!(map[&4], None);

        let mut declared = MapBinder::new(TrailingColumns::AsDeclared);
        declared.prepare(&headers(&["h0", "h1", "h2", "h3", "h4"])).unwrap();
        let map = declared.bind(&data, &ctx).unwrap();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[test]
    fn padding_stops_at_last_sheet_column() {
        let far = MAX_COLUMNS + 100;
        let data = row(1, &[(0, "a".into()), (far, "z".into())]);
        let mut binder = MapBinder::new(TrailingColumns::AsDeclared);
        binder.prepare(&headers(&["h0"])).unwrap();
        let map = binder.bind(&data, &ConvertContext::default()).unwrap();
        assert_eq!(map.len(), MAX_COLUMNS as usize + 1);
        assert_eq!(map[&far].as_deref(), Some("z"));
        assert_eq!(map[&(MAX_COLUMNS - 1)], None);
    }
}
