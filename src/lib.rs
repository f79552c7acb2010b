// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Streaming Excel reader
//!
//! **smithsonite** reads large xlsx workbooks row by row without loading the
//! whole document in memory. Rows are decoded from the worksheet xml with a
//! pull parser, bound to a record type through a header resolution step and a
//! type conversion registry, then handed to a caller supplied listener.
//!
//! # Examples
//! ```no_run
//! use serde_derive::Deserialize;
//! use smithsonite::{
//!     open_workbook, CollectListener, FieldDescriptor, FieldType, Layout, Record,
//! };
//!
//! #[derive(Debug, Deserialize)]
//! struct Temperature {
//!     label: String,
//!     value: f64,
//! }
//!
//! impl Record for Temperature {
//!     fn layout() -> Layout {
//!         Layout::new(vec![
//!             FieldDescriptor::new("label", FieldType::String).header("label"),
//!             FieldDescriptor::new("value", FieldType::Float).headers(&["value", "celsius"]),
//!         ])
//!     }
//! }
//!
//! # fn main() -> Result<(), smithsonite::Error> {
//! let mut workbook = open_workbook("temperature.xlsx")?;
//! let mut listener = CollectListener::new();
//! workbook.read::<Temperature, _>(&mut listener)?;
//! for t in listener.into_rows() {
//!     println!("{}: {}", t.label, t.value);
//! }
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]

#[macro_use]
mod utils;

mod bind;
mod cache;
mod convert;
mod csv;
mod datatype;
mod de;
pub mod errors;
mod header;
mod listener;
mod package;
mod reader;
mod sheet;
mod xml;

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

pub use crate::bind::{ColumnMap, MapBinder, RecordBinder, RowBinder, TrailingColumns};
pub use crate::cache::{
    select_cache, CacheKind, CacheMode, CacheOptions, DiskCache, MemoryCache, SharedStringCache,
};
pub use crate::convert::{
    ConvertContext, ConvertError, Converter, ConverterRegistry, FieldType, FieldValue, FormatHint,
};
pub use crate::csv::{read_csv, CsvSource};
pub use crate::datatype::{serial_to_datetime, CellValue, Formula, RowBuffer};
pub use crate::de::{DeError, FieldValueDeserializer};
pub use crate::errors::{BoxError, Error, SharedKind};
pub use crate::header::{BindingTable, FieldBinding, FieldDescriptor, HeaderRows, Layout, Record};
pub use crate::listener::{
    CollectListener, ExceptionAction, PageListener, ReadContext, ReadListener,
};
pub use crate::package::{Package, SheetDescriptor};
pub use crate::reader::{read_rows, ReadOptions, SheetSelector, Workbook};
pub use crate::sheet::{CellExtra, ExtraKind, ExtraKinds, RowSource, SheetDecoder};
pub use crate::xml::{Element, TagEvent, TagParser};

// https://msdn.microsoft.com/en-us/library/office/ff839168.aspx
/// An enum to represent all different errors that can appear as
/// a value in a worksheet cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellErrorType {
    /// Division by 0 error
    Div0,
    /// Unavailable value error
    NA,
    /// Invalid name error
    Name,
    /// Null value error
    Null,
    /// Number error
    Num,
    /// Invalid cell reference error
    Ref,
    /// Value error
    Value,
    /// Getting data
    GettingData,
}

impl fmt::Display for CellErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CellErrorType::Div0 => write!(f, "#DIV/0!"),
            CellErrorType::NA => write!(f, "#N/A"),
            CellErrorType::Name => write!(f, "#NAME?"),
            CellErrorType::Null => write!(f, "#NULL!"),
            CellErrorType::Num => write!(f, "#NUM!"),
            CellErrorType::Ref => write!(f, "#REF!"),
            CellErrorType::Value => write!(f, "#VALUE!"),
            CellErrorType::GettingData => write!(f, "#DATA!"),
        }
    }
}

impl FromStr for CellErrorType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "#DIV/0!" => Ok(CellErrorType::Div0),
            "#N/A" => Ok(CellErrorType::NA),
            "#NAME?" => Ok(CellErrorType::Name),
            "#NULL!" => Ok(CellErrorType::Null),
            "#NUM!" => Ok(CellErrorType::Num),
            "#REF!" => Ok(CellErrorType::Ref),
            "#VALUE!" => Ok(CellErrorType::Value),
            "#DATA!" | "#GETTING_DATA" => Ok(CellErrorType::GettingData),
            _ => Err(Error::Unexpected("unsupported cell error value")),
        }
    }
}

/// A rectangular area of a sheet, both corners inclusive, as (row, column) (0 based)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dimensions {
    /// start: (row, col)
    pub start: (u32, u32),
    /// end: (row, col)
    pub end: (u32, u32),
}

impl Dimensions {
    /// create dimensions info with start position and end position
    pub fn new(start: (u32, u32), end: (u32, u32)) -> Self {
        Self { start, end }
    }

    /// check if a position is in it
    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.start.0 && row <= self.end.0 && col >= self.start.1 && col <= self.end.1
    }

    /// len
    pub fn len(&self) -> u64 {
        (self.end.0.saturating_sub(self.start.0) as u64 + 1)
            * (self.end.1.saturating_sub(self.start.1) as u64 + 1)
    }

    /// A `Dimensions` always covers at least one cell
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Type of visible sheet.
///
/// The property is defined in the following specifications:
///
/// - ECMA-376 Part 1, 12.3.2 Chartsheet Part.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SheetVisible {
    /// Visible
    #[default]
    Visible,
    /// Hidden
    Hidden,
    /// The sheet is hidden and cannot be displayed using the user interface
    VeryHidden,
}

/// Opens a workbook from a file path, with default read options.
pub fn open_workbook<P: AsRef<Path>>(path: P) -> Result<Workbook<BufReader<File>>, Error> {
    let file = File::open(path)?;
    Workbook::new(BufReader::new(file))
}
