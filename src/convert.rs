// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Cell value to field value conversions
//!
//! Every field type has a built-in conversion. A [`Converter`] registered for
//! a field type in a [`ConverterRegistry`] replaces the built-in one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::datatype::{serial_to_datetime, CellValue};

/// Target type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Text
    String,
    /// Signed integer, decimals are truncated
    Integer,
    /// Decimal number
    Float,
    /// Boolean
    Bool,
    /// Calendar date
    Date,
    /// Date and time
    DateTime,
    /// Formula text of the cell (not its value)
    Formula,
}

/// A converted field value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// Blank cell
    #[default]
    Empty,
    /// Text
    String(String),
    /// Integer
    Int(i64),
    /// Decimal
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Date
    Date(NaiveDate),
    /// Date and time
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// True for blank cells
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }
}

/// Per field format hint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatHint {
    /// A chrono strftime pattern, e.g. `%d/%m/%Y`
    Date(String),
    /// A number pattern made of `0`/`#` placeholders, optional `,` grouping
    /// and `%` suffix, e.g. `#,##0.00`
    Number(String),
}

/// Document level settings used by conversions
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConvertContext {
    /// Date serials count from 1904-01-01
    pub is_1904: bool,
}

/// A cell that cannot be converted to the field type
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertError {
    /// Requested type
    pub target: FieldType,
    /// Offending value, as text
    pub value: String,
    /// What went wrong
    pub reason: String,
}

impl ConvertError {
    /// Creates an error for `cell`
    pub fn new(target: FieldType, cell: &CellValue, reason: impl Into<String>) -> Self {
        ConvertError {
            target,
            value: cell.as_text().map(|t| t.into_owned()).unwrap_or_default(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot convert {:?} to {:?}: {}",
            self.value, self.target, self.reason
        )
    }
}

impl std::error::Error for ConvertError {}

/// Conversion of a cell to a field value
pub trait Converter {
    /// Converts `cell`, a formula cell is passed whole
    fn convert(
        &self,
        cell: &CellValue,
        hint: Option<&FormatHint>,
        ctx: &ConvertContext,
    ) -> Result<FieldValue, ConvertError>;
}

impl<F> Converter for F
where
    F: Fn(&CellValue, Option<&FormatHint>, &ConvertContext) -> Result<FieldValue, ConvertError>,
{
    fn convert(
        &self,
        cell: &CellValue,
        hint: Option<&FormatHint>,
        ctx: &ConvertContext,
    ) -> Result<FieldValue, ConvertError> {
        self(cell, hint, ctx)
    }
}

/// Built-in conversions plus caller supplied overrides, keyed by field type
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    custom: HashMap<FieldType, Arc<dyn Converter + Send + Sync>>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConverterRegistry {
    /// Registry with built-in conversions only
    pub fn new() -> Self {
        ConverterRegistry::default()
    }

    /// Replaces the conversion used for `typ`
    pub fn register<C>(&mut self, typ: FieldType, converter: C) -> &mut Self
    where
        C: Converter + Send + Sync + 'static,
    {
        self.custom.insert(typ, Arc::new(converter));
        self
    }

    /// Converts `cell` to `typ`
    pub fn convert(
        &self,
        cell: &CellValue,
        typ: FieldType,
        hint: Option<&FormatHint>,
        ctx: &ConvertContext,
    ) -> Result<FieldValue, ConvertError> {
        match self.custom.get(&typ) {
            Some(c) => c.convert(cell, hint, ctx),
            None => builtin(cell, typ, hint, ctx),
        }
    }
}

/// Built-in conversion of `cell` to `typ`
pub fn builtin(
    cell: &CellValue,
    typ: FieldType,
    hint: Option<&FormatHint>,
    ctx: &ConvertContext,
) -> Result<FieldValue, ConvertError> {
    if typ == FieldType::Formula {
        return Ok(cell
            .formula()
            .and_then(|f| f.text.clone())
            .map_or(FieldValue::Empty, FieldValue::String));
    }
    let value = cell.result();
    let fail = |reason: &str| Err(ConvertError::new(typ, value, reason));
    match (typ, value) {
        (_, CellValue::Empty) => Ok(FieldValue::Empty),
        (FieldType::String, v) => Ok(FieldValue::String(to_text(v, hint, ctx))),
        (_, CellValue::Error(e)) => fail(&format!("cell holds error {e}")),

        (FieldType::Integer, CellValue::Number(n)) => match truncate(*n) {
            Some(i) => Ok(FieldValue::Int(i)),
            None => fail("out of integer range"),
        },
        (FieldType::Integer, CellValue::Bool(b)) => Ok(FieldValue::Int(*b as i64)),
        (FieldType::Integer, CellValue::String(s)) => {
            let s = s.trim();
            if let Ok(i) = atoi_simd::parse::<i64>(s.as_bytes()) {
                return Ok(FieldValue::Int(i));
            }
            // "1.00" style decimals
            match parse_float(s).and_then(truncate) {
                Some(i) => Ok(FieldValue::Int(i)),
                None => fail("not an integer"),
            }
        }

        (FieldType::Float, CellValue::Number(n)) => Ok(FieldValue::Float(*n)),
        (FieldType::Float, CellValue::Bool(b)) => Ok(FieldValue::Float(*b as i32 as f64)),
        (FieldType::Float, CellValue::String(s)) => match parse_float(s.trim()) {
            Some(f) => Ok(FieldValue::Float(f)),
            None => fail("not a number"),
        },

        (FieldType::Bool, CellValue::Bool(b)) => Ok(FieldValue::Bool(*b)),
        (FieldType::Bool, CellValue::Number(n)) => Ok(FieldValue::Bool(*n != 0.)),
        (FieldType::Bool, CellValue::String(s)) => match s.trim() {
            t if t.eq_ignore_ascii_case("true") || t == "1" => Ok(FieldValue::Bool(true)),
            t if t.eq_ignore_ascii_case("false") || t == "0" => Ok(FieldValue::Bool(false)),
            _ => fail("not a boolean"),
        },

        (FieldType::Date | FieldType::DateTime, CellValue::Number(n)) => {
            match serial_to_datetime(*n, ctx.is_1904) {
                Some(dt) if typ == FieldType::Date => Ok(FieldValue::Date(dt.date())),
                Some(dt) => Ok(FieldValue::DateTime(dt)),
                None => fail("date serial out of range"),
            }
        }
        (FieldType::Date | FieldType::DateTime, CellValue::String(s) | CellValue::DateTimeIso(s)) => {
            let pattern = match hint {
                Some(FormatHint::Date(p)) => Some(p.as_str()),
                _ => None,
            };
            match parse_datetime(s.trim(), pattern) {
                Some(dt) if typ == FieldType::Date => Ok(FieldValue::Date(dt.date())),
                Some(dt) => Ok(FieldValue::DateTime(dt)),
                None => fail("not a date"),
            }
        }
        _ => fail("unsupported conversion"),
    }
}

fn parse_float(s: &str) -> Option<f64> {
    fast_float2::parse::<f64, _>(s.as_bytes()).ok()
}

fn truncate(n: f64) -> Option<i64> {
    let t = n.trunc();
    if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}

fn parse_datetime(s: &str, pattern: Option<&str>) -> Option<NaiveDateTime> {
    if let Some(p) = pattern {
        return NaiveDateTime::parse_from_str(s, p)
            .ok()
            .or_else(|| NaiveDate::parse_from_str(s, p).ok().map(midnight));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|p| NaiveDateTime::parse_from_str(s, p).ok())
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(midnight))
}

fn midnight(d: NaiveDate) -> NaiveDateTime {
    d.and_time(NaiveTime::MIN)
}

fn to_text(v: &CellValue, hint: Option<&FormatHint>, ctx: &ConvertContext) -> String {
    match (v, hint) {
        (CellValue::Number(n), Some(FormatHint::Number(p))) => format_number(*n, p),
        (CellValue::Number(n), Some(FormatHint::Date(p))) => {
            match serial_to_datetime(*n, ctx.is_1904) {
                Some(dt) => dt.format(p).to_string(),
                None => number_to_string(*n),
            }
        }
        (CellValue::Number(n), None) => number_to_string(*n),
        (v, _) => v.as_text().map(|t| t.into_owned()).unwrap_or_default(),
    }
}

/// Integral values lose their `.0`
fn number_to_string(n: f64) -> String {
    if n.fract() == 0. && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Renders `n` with a `0`/`#` number pattern
pub(crate) fn format_number(n: f64, pattern: &str) -> String {
    let (pattern, percent) = match pattern.trim().strip_suffix('%') {
        Some(p) => (p, true),
        None => (pattern.trim(), false),
    };
    let n = if percent { n * 100. } else { n };
    let (int_pattern, frac_pattern) = pattern.split_once('.').unwrap_or((pattern, ""));
    let min_decimals = frac_pattern.chars().filter(|c| *c == '0').count();
    let max_decimals = frac_pattern
        .chars()
        .filter(|c| matches!(c, '0' | '#'))
        .count();

    let digits = format!("{:.*}", max_decimals, n.abs());
    let (int_digits, frac_digits) = digits.split_once('.').unwrap_or((&digits, ""));
    let mut frac_digits = frac_digits.to_string();
    while frac_digits.len() > min_decimals && frac_digits.ends_with('0') {
        frac_digits.pop();
    }

    let mut out = String::with_capacity(digits.len() + 8);
    if n < 0. && digits.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        out.push('-');
    }
    if int_pattern.contains(',') {
        let len = int_digits.len();
        for (i, c) in int_digits.chars().enumerate() {
            if i > 0 && (len - i) % 3 == 0 {
                out.push(',');
            }
            out.push(c);
        }
    } else {
        out.push_str(int_digits);
    }
    if !frac_digits.is_empty() {
        out.push('.');
        out.push_str(&frac_digits);
    }
    if percent {
        out.push('%');
    }
    out
}
