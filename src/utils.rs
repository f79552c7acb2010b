// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Internal module providing handy function

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::BytesRef;

use crate::errors::Error;
use crate::Dimensions;

macro_rules! from_err {
    ($from:ty, $to:tt, $var:tt) => {
        impl From<$from> for $to {
            fn from(e: $from) -> $to {
                $to::$var(e)
            }
        }
    };
}

/// Maximum number of rows allowed in an xlsx file
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns allowed in an xlsx file
pub const MAX_COLUMNS: u32 = 16_384;

/// Pushes the text of a general entity reference (`&amp;`, `&#x41;`, ...) into `buf`.
///
/// Unknown named entities are kept verbatim.
pub(crate) fn push_entity(e: &BytesRef<'_>, buf: &mut String) -> Result<(), Error> {
    if let Some(ch) = e.resolve_char_ref()? {
        buf.push(ch);
        return Ok(());
    }
    let name = e.decode()?;
    match resolve_predefined_entity(&name) {
        Some(s) => buf.push_str(s),
        None => {
            buf.push('&');
            buf.push_str(&name);
            buf.push(';');
        }
    }
    Ok(())
}

/// converts a text representation (e.g. "A6:G67") of a dimension into integers
/// - top left (row, column),
/// - bottom right (row, column)
pub(crate) fn get_dimension(dimension: &[u8]) -> Result<Dimensions, Error> {
    let parts: Vec<_> = dimension
        .split(|c| *c == b':')
        .map(get_row_column)
        .collect::<Result<Vec<_>, Error>>()?;

    match parts.len() {
        1 => Ok(Dimensions {
            start: parts[0],
            end: parts[0],
        }),
        2 => Ok(Dimensions {
            start: parts[0],
            end: parts[1],
        }),
        _ => Err(Error::CellReference(
            String::from_utf8_lossy(dimension).into_owned(),
        )),
    }
}

/// Converts a text range name into its position (row, column) (0 based index).
pub(crate) fn get_row_column(range: &[u8]) -> Result<(u32, u32), Error> {
    match get_row_and_optional_column(range)? {
        (row, Some(col)) => Ok((row, col)),
        _ => Err(Error::CellReference(
            String::from_utf8_lossy(range).into_owned(),
        )),
    }
}

/// Converts a text row name into its position (0 based index).
/// If the text row name also contains a column component, it is ignored.
pub(crate) fn get_row(range: &[u8]) -> Result<u32, Error> {
    get_row_and_optional_column(range).map(|(row, _)| row)
}

/// Converts a text range name into its position (row, column) (0 based index).
/// If the row component in the range is missing, or the reference is past
/// the last sheet row or column, an Error is returned.
/// If the column component in the range is missing, an None is returned for the column.
fn get_row_and_optional_column(range: &[u8]) -> Result<(u32, Option<u32>), Error> {
    let invalid = || Error::CellReference(String::from_utf8_lossy(range).into_owned());
    let (mut row, mut col) = (0u32, 0u32);
    let mut pow = 1u32;
    let mut readrow = true;
    for c in range.iter().rev() {
        match *c {
            c @ b'0'..=b'9' => {
                if !readrow {
                    return Err(invalid());
                }
                row = ((c - b'0') as u32)
                    .checked_mul(pow)
                    .and_then(|d| row.checked_add(d))
                    .ok_or_else(invalid)?;
                pow = pow.saturating_mul(10);
            }
            c @ (b'A'..=b'Z' | b'a'..=b'z') => {
                if readrow {
                    if row == 0 {
                        return Err(invalid());
                    }
                    pow = 1;
                    readrow = false;
                }
                let digit = (c.to_ascii_uppercase() - b'A') as u32 + 1;
                col = digit
                    .checked_mul(pow)
                    .and_then(|d| col.checked_add(d))
                    .ok_or_else(invalid)?;
                pow = pow.saturating_mul(26);
            }
            b'$' => (),
            _ => return Err(invalid()),
        }
    }
    if row == 0 || row > MAX_ROWS || col > MAX_COLUMNS {
        return Err(invalid());
    }
    Ok((row - 1, col.checked_sub(1)))
}

/// Convert the integer to Excelsheet column title.
pub(crate) fn column_number_to_name(num: u32) -> String {
    let mut col = Vec::new();
    let mut num = num as u64 + 1;
    while num > 0 {
        col.push(((num - 1) % 26) as u8 + b'A');
        num = (num - 1) / 26;
    }
    col.reverse();
    String::from_utf8_lossy(&col).into_owned()
}

/// Convert a cell coordinate to Excelsheet cell name.
pub(crate) fn coordinate_to_name(cell: (u32, u32)) -> String {
    format!("{}{}", column_number_to_name(cell.1), cell.0 as u64 + 1)
}
