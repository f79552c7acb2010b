// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use crate::CellErrorType;

/// https://learn.microsoft.com/en-us/office/troubleshoot/excel/1900-and-1904-date-system
const EXCEL_1900_1904_DIFF: f64 = 1462.;

const MS_MULTIPLIER: f64 = 24f64 * 60f64 * 60f64 * 1e+3f64;

/// A decoded cell value
///
/// Shared string references are always resolved by the sheet decoder, so the
/// string variant holds the text whether the cell stored it inline or not.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// Empty cell
    #[default]
    Empty,
    /// String (inline or resolved shared string)
    String(String),
    /// Number
    Number(f64),
    /// Boolean
    Bool(bool),
    /// Date, Time or DateTime in ISO 8601 (`t="d"` cells)
    DateTimeIso(String),
    /// Formula with its last calculated value
    Formula(Formula),
    /// Error
    Error(CellErrorType),
}

/// A cell formula
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Formula {
    /// Formula text, without leading `=`.
    ///
    /// `None` when a shared formula member refers to a group whose base formula
    /// was never seen.
    pub text: Option<String>,
    /// Shared formula group (`si` attribute) this cell belongs to
    pub shared_group: Option<u32>,
    /// Last calculated value stored with the cell
    pub cached: Box<CellValue>,
}

impl CellValue {
    /// Assess if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Value used for conversions: the cached result for formula cells, self otherwise
    pub fn result(&self) -> &CellValue {
        match self {
            CellValue::Formula(f) => f.cached.result(),
            v => v,
        }
    }

    /// Formula of the cell, if any
    pub fn formula(&self) -> Option<&Formula> {
        match self {
            CellValue::Formula(f) => Some(f),
            _ => None,
        }
    }

    /// Textual representation of the (calculated) value, `None` for empty cells
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self.result() {
            CellValue::Empty => None,
            CellValue::String(s) | CellValue::DateTimeIso(s) => Some(Cow::Borrowed(s)),
            CellValue::Number(n) => Some(Cow::Owned(n.to_string())),
            CellValue::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            CellValue::Error(e) => Some(Cow::Owned(e.to_string())),
            CellValue::Formula(_) => None,
        }
    }

    /// Try converting the (calculated) value into a float
    pub fn as_f64(&self) -> Option<f64> {
        match self.result() {
            CellValue::Number(n) => Some(*n),
            CellValue::Bool(b) => Some(*b as i32 as f64),
            CellValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(t) => f.write_str(&t),
            None => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::String(v.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

/// The cells of one physical row, keyed by column index.
///
/// Columns absent from the map are blank.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowBuffer {
    index: u32,
    cells: BTreeMap<u32, CellValue>,
}

impl RowBuffer {
    /// Creates an empty row at `index` (0 based)
    pub fn new(index: u32) -> Self {
        RowBuffer {
            index,
            cells: BTreeMap::new(),
        }
    }

    /// Row index (0 based)
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Sets a cell, replacing any previous value at that column
    pub fn insert(&mut self, column: u32, value: CellValue) {
        self.cells.insert(column, value);
    }

    /// Cell at `column`, `None` when blank
    pub fn get(&self, column: u32) -> Option<&CellValue> {
        self.cells.get(&column)
    }

    /// Iterates over declared cells in column order
    pub fn cells(&self) -> impl Iterator<Item = (u32, &CellValue)> {
        self.cells.iter().map(|(c, v)| (*c, v))
    }

    /// Last declared column
    pub fn last_column(&self) -> Option<u32> {
        self.cells.keys().next_back().copied()
    }

    /// True when the row has no non-empty cell
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(CellValue::is_empty)
    }

    /// Number of declared cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when no cell was declared
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Converts an excel date serial into a datetime.
///
/// `is_1904` selects the 1904 date system, otherwise the 1900 one is used
/// (including the fictitious 1900-02-29).
pub fn serial_to_datetime(value: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !value.is_finite() {
        return None;
    }
    let excel_epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let f = if is_1904 {
        value + EXCEL_1900_1904_DIFF
    } else {
        value
    };
    let f = if f >= 60.0 { f } else { f + 1.0 };
    let ms = (f * MS_MULTIPLIER).round();
    if ms.abs() >= i64::MAX as f64 {
        return None;
    }
    let excel_duration = TimeDelta::try_milliseconds(ms as i64)?;
    excel_epoch.checked_add_signed(excel_duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dates() {
        let unix_epoch = serial_to_datetime(25569., false);
        assert_eq!(
            unix_epoch,
            Some(NaiveDateTime::new(
                NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
                NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            ))
        );

        let precision = serial_to_datetime(44484.7916666667, false);
        assert_eq!(
            precision,
            Some(NaiveDateTime::new(
                NaiveDate::from_ymd_opt(2021, 10, 15).unwrap(),
                NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            ))
        );

        // 1904 system: serial 0 is 1904-01-01
        assert_eq!(
            serial_to_datetime(0., true).map(|d| d.date()),
            NaiveDate::from_ymd_opt(1904, 1, 1)
        );

        assert_eq!(serial_to_datetime(1e20, false), None);
        assert_eq!(serial_to_datetime(f64::NAN, false), None);
    }

    #[test]
    fn test_formula_result() {
        let cell = CellValue::Formula(Formula {
            text: Some("A1+1".to_string()),
            shared_group: None,
            cached: Box::new(CellValue::Number(2.)),
        });
        assert_eq!(cell.result(), &CellValue::Number(2.));
        assert_eq!(cell.as_text().as_deref(), Some("2"));
        assert_eq!(cell.formula().and_then(|f| f.text.as_deref()), Some("A1+1"));
    }

    #[test]
    fn test_row_buffer() {
        let mut row = RowBuffer::new(3);
        assert!(row.is_blank());
        row.insert(0, CellValue::Empty);
        assert!(row.is_blank());
        row.insert(4, "x".into());
        assert!(!row.is_blank());
        assert_eq!(row.last_column(), Some(4));
        assert_eq!(row.get(2), None);
        assert_eq!(row.cells().map(|(c, _)| c).collect::<Vec<_>>(), [0, 4]);
    }
}
