// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Delimited text input

use std::io::Read;

use crate::convert::ConvertContext;
use crate::datatype::{CellValue, RowBuffer};
use crate::errors::Error;
use crate::header::Record;
use crate::listener::ReadListener;
use crate::package::SheetDescriptor;
use crate::reader::{read_rows, ReadOptions};
use crate::sheet::RowSource;
use crate::SheetVisible;

/// Rows of a delimited text stream.
///
/// Cells are read positionally as text; empty fields are blank cells and
/// records may have different lengths.
pub struct CsvSource<R> {
    reader: ::csv::Reader<R>,
    record: ::csv::StringRecord,
    index: u32,
}

impl<R: Read> CsvSource<R> {
    /// Comma separated rows
    pub fn new(reader: R) -> Self {
        Self::with_delimiter(reader, b',')
    }

    /// Rows separated by `delimiter`
    pub fn with_delimiter(reader: R, delimiter: u8) -> Self {
        let reader = ::csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .has_headers(false)
            .from_reader(reader);
        CsvSource {
            reader,
            record: ::csv::StringRecord::new(),
            index: 0,
        }
    }
}

impl<R: Read> RowSource for CsvSource<R> {
    fn next_row(&mut self) -> Result<Option<RowBuffer>, Error> {
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }
        let mut row = RowBuffer::new(self.index);
        for (c, field) in self.record.iter().enumerate() {
            if !field.is_empty() {
                row.insert(c as u32, CellValue::String(field.to_string()));
            }
        }
        self.index += 1;
        Ok(Some(row))
    }
}

/// Reads comma separated text into `T` records
pub fn read_csv<T, R, L>(reader: R, options: &ReadOptions, listener: &mut L) -> Result<(), Error>
where
    T: Record,
    R: Read,
    L: ReadListener<T> + ?Sized,
{
    let sheet = SheetDescriptor {
        index: 0,
        name: "csv".to_string(),
        visible: SheetVisible::Visible,
        relationship_id: String::new(),
        path: String::new(),
    };
    let mut binder = options.record_binder::<T>()?;
    read_rows(
        &mut CsvSource::new(reader),
        &mut binder,
        listener,
        &sheet,
        options,
        &ConvertContext::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows() {
        let data = "a;b;c\n1;;3\n4\n";
        let mut source = CsvSource::with_delimiter(data.as_bytes(), b';');
        let header = source.next_row().unwrap().unwrap();
        assert_eq!(header.len(), 3);
        let row = source.next_row().unwrap().unwrap();
        assert_eq!(row.index(), 1);
        assert_eq!(row.get(1), None);
        assert_eq!(row.get(2), Some(&CellValue::from("3")));
        let row = source.next_row().unwrap().unwrap();
        assert_eq!(row.last_column(), Some(0));
        assert!(source.next_row().unwrap().is_none());
    }
}
