// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Callbacks invoked while a sheet is read

use std::collections::BTreeMap;

use log::warn;

use crate::errors::{BoxError, Error};
use crate::package::SheetDescriptor;
use crate::sheet::CellExtra;

/// Where the reader currently is
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
    /// Sheet being read
    pub sheet: &'a SheetDescriptor,
    /// Row being handled (0 based), `None` outside of rows
    pub row: Option<u32>,
}

/// What to do with a row level error
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionAction {
    /// Log it and carry on with the next row
    #[default]
    Suppress,
    /// Abort the read with this error
    Rethrow,
}

/// Receives the content of the sheets being read.
///
/// Only [`on_row`](ReadListener::on_row) is mandatory. For every sheet the
/// calls are, in order: `on_extra` for comments, `on_header` once the
/// header rows are consumed, `on_row` per data row, `on_extra` for merged
/// regions and hyperlinks, and `on_sheet_complete` exactly once.
pub trait ReadListener<T> {
    /// Header text by column, called once per sheet when header rows are expected
    fn on_header(
        &mut self,
        _header: &BTreeMap<u32, String>,
        _ctx: &ReadContext<'_>,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// A bound data row
    fn on_row(&mut self, row: T, ctx: &ReadContext<'_>) -> Result<(), BoxError>;

    /// Requested extra metadata
    fn on_extra(&mut self, _extra: CellExtra, _ctx: &ReadContext<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    /// The sheet is done, possibly stopped early
    fn on_sheet_complete(&mut self, _ctx: &ReadContext<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    /// A row failed to bind, or a callback failed
    fn on_exception(&mut self, error: &Error, ctx: &ReadContext<'_>) -> ExceptionAction {
        warn!("sheet '{}': {error}", ctx.sheet.name);
        ExceptionAction::Suppress
    }

    /// Polled before each row, `false` stops the current sheet
    fn continue_reading(&mut self, _ctx: &ReadContext<'_>) -> bool {
        true
    }
}

/// Collects every row in memory
#[derive(Debug)]
pub struct CollectListener<T> {
    rows: Vec<T>,
}

impl<T> Default for CollectListener<T> {
    fn default() -> Self {
        CollectListener { rows: Vec::new() }
    }
}

impl<T> CollectListener<T> {
    /// Creates an empty listener
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows received so far
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    /// Takes the received rows
    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }
}

impl<T> ReadListener<T> for CollectListener<T> {
    fn on_row(&mut self, row: T, _ctx: &ReadContext<'_>) -> Result<(), BoxError> {
        self.rows.push(row);
        Ok(())
    }
}

/// Hands rows over in pages of a fixed size
pub struct PageListener<T, F> {
    size: usize,
    page: Vec<T>,
    consumer: F,
}

impl<T, F: FnMut(Vec<T>)> PageListener<T, F> {
    /// Pages of 100 rows
    pub fn new(consumer: F) -> Self {
        Self::with_page_size(100, consumer)
    }

    /// Pages of `size` rows, at least one
    pub fn with_page_size(size: usize, consumer: F) -> Self {
        let size = size.max(1);
        PageListener {
            size,
            page: Vec::with_capacity(size),
            consumer,
        }
    }

    fn flush(&mut self) {
        if !self.page.is_empty() {
            let page = std::mem::replace(&mut self.page, Vec::with_capacity(self.size));
            (self.consumer)(page);
        }
    }
}

impl<T, F: FnMut(Vec<T>)> ReadListener<T> for PageListener<T, F> {
    fn on_row(&mut self, row: T, _ctx: &ReadContext<'_>) -> Result<(), BoxError> {
        self.page.push(row);
        if self.page.len() >= self.size {
            self.flush();
        }
        Ok(())
    }

    fn on_sheet_complete(&mut self, _ctx: &ReadContext<'_>) -> Result<(), BoxError> {
        self.flush();
        Ok(())
    }
}
