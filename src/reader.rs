// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Read orchestration: options, the workbook handle and the row driver

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Seek};

use log::debug;

use crate::bind::{ColumnMap, MapBinder, RecordBinder, RowBinder, TrailingColumns};
use crate::cache::{
    load_shared_strings, new_cache, select_cache, CacheOptions, MemoryCache, SharedStringCache,
};
use crate::convert::{ConvertContext, Converter, ConverterRegistry, FieldType};
use crate::datatype::RowBuffer;
use crate::errors::Error;
use crate::header::Record;
use crate::listener::{CollectListener, ExceptionAction, ReadContext, ReadListener};
use crate::package::{Package, SheetDescriptor};
use crate::sheet::{read_comments, CellExtra, ExtraKind, ExtraKinds, RowSource, SheetDecoder};

/// Which sheets a read covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    /// Sheet at this position (0 based)
    Index(usize),
    /// Sheet with this name
    Name(String),
    /// Every sheet, in workbook order
    All,
}

impl Default for SheetSelector {
    fn default() -> Self {
        SheetSelector::Index(0)
    }
}

/// Read configuration
#[derive(Debug, Clone)]
pub struct ReadOptions {
    header_rows: u32,
    skip_empty_rows: bool,
    columns: HashMap<String, u32>,
    extras: ExtraKinds,
    converters: ConverterRegistry,
    cache: CacheOptions,
    sheets: SheetSelector,
    trailing: TrailingColumns,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            header_rows: 1,
            skip_empty_rows: true,
            columns: HashMap::new(),
            extras: ExtraKinds::none(),
            converters: ConverterRegistry::new(),
            cache: CacheOptions::default(),
            sheets: SheetSelector::default(),
            trailing: TrailingColumns::default(),
        }
    }
}

impl ReadOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leading rows holding headers (default 1)
    pub fn header_rows(&mut self, count: u32) -> &mut Self {
        self.header_rows = count;
        self
    }

    /// Whether data rows without any value are skipped (default true)
    pub fn skip_empty_rows(&mut self, skip: bool) -> &mut Self {
        self.skip_empty_rows = skip;
        self
    }

    /// Binds `field` to column `index` whatever its declaration says
    pub fn column(&mut self, field: &str, index: u32) -> &mut Self {
        self.columns.insert(field.to_string(), index);
        self
    }

    /// Requests an extra metadata category
    pub fn extra(&mut self, kind: ExtraKind) -> &mut Self {
        self.extras.insert(kind);
        self
    }

    /// Overrides the conversion to a field type
    pub fn converter<C>(&mut self, typ: FieldType, converter: C) -> &mut Self
    where
        C: Converter + Send + Sync + 'static,
    {
        self.converters.register(typ, converter);
        self
    }

    /// Shared strings cache selection
    pub fn cache(&mut self, cache: CacheOptions) -> &mut Self {
        self.cache = cache;
        self
    }

    /// Sheets to read (default: the first one)
    pub fn sheets(&mut self, sheets: SheetSelector) -> &mut Self {
        self.sheets = sheets;
        self
    }

    /// Blank columns kept in generic rows
    pub fn trailing_columns(&mut self, trailing: TrailingColumns) -> &mut Self {
        self.trailing = trailing;
        self
    }

    /// Number of header rows
    pub fn header_row_count(&self) -> u32 {
        self.header_rows
    }

    /// Requested extras
    pub fn extra_kinds(&self) -> ExtraKinds {
        self.extras
    }

    /// Cache selection
    pub fn cache_options(&self) -> &CacheOptions {
        &self.cache
    }

    pub(crate) fn record_binder<T: Record>(&self) -> Result<RecordBinder<T>, Error> {
        RecordBinder::new(self.columns.clone(), self.converters.clone())
    }
}

/// An open xlsx document.
///
/// Owns the container, the workbook manifest and the shared strings cache.
/// The cache is loaded on the first read and kept for the following ones;
/// a disk backed cache removes its temporary file when the workbook is
/// dropped.
pub struct Workbook<RS> {
    package: Package<RS>,
    sheets: Vec<SheetDescriptor>,
    is_1904: bool,
    shared_strings: Option<String>,
    strings: Option<Box<dyn SharedStringCache>>,
    options: ReadOptions,
}

impl<RS: Read + Seek> Workbook<RS> {
    /// Opens a workbook with default options
    pub fn new(reader: RS) -> Result<Self, Error> {
        Self::with_options(reader, ReadOptions::default())
    }

    /// Opens a workbook
    pub fn with_options(reader: RS, options: ReadOptions) -> Result<Self, Error> {
        let mut package = Package::open(reader)?;
        let manifest = package.manifest()?;
        debug!(
            "workbook with {} sheets, 1904: {}",
            manifest.sheets.len(),
            manifest.is_1904
        );
        Ok(Workbook {
            package,
            sheets: manifest.sheets,
            is_1904: manifest.is_1904,
            shared_strings: manifest.shared_strings,
            strings: None,
            options,
        })
    }

    /// Read options, applied by the next read
    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Mutable read options
    pub fn options_mut(&mut self) -> &mut ReadOptions {
        &mut self.options
    }

    /// Sheets in workbook order
    pub fn sheets(&self) -> &[SheetDescriptor] {
        &self.sheets
    }

    /// Sheet names in workbook order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Whether dates use the 1904 epoch
    pub fn is_1904(&self) -> bool {
        self.is_1904
    }

    /// Reads the selected sheets into `T` records
    pub fn read<T, L>(&mut self, listener: &mut L) -> Result<(), Error>
    where
        T: Record,
        L: ReadListener<T> + ?Sized,
    {
        let sheets = self.select(&self.options.sheets)?;
        let mut binder = self.options.record_binder::<T>()?;
        self.drive(&sheets, &mut binder, listener)
    }

    /// Reads the sheet named `name` into `T` records
    pub fn read_sheet<T, L>(&mut self, name: &str, listener: &mut L) -> Result<(), Error>
    where
        T: Record,
        L: ReadListener<T> + ?Sized,
    {
        let sheets = self.select(&SheetSelector::Name(name.to_string()))?;
        let mut binder = self.options.record_binder::<T>()?;
        self.drive(&sheets, &mut binder, listener)
    }

    /// Reads the selected sheets as generic column maps
    pub fn read_maps<L>(&mut self, listener: &mut L) -> Result<(), Error>
    where
        L: ReadListener<ColumnMap> + ?Sized,
    {
        let sheets = self.select(&self.options.sheets)?;
        let mut binder = MapBinder::new(self.options.trailing);
        self.drive(&sheets, &mut binder, listener)
    }

    /// Reads the selected sheets, collecting every record
    pub fn read_all<T: Record>(&mut self) -> Result<Vec<T>, Error> {
        let mut listener = CollectListener::new();
        self.read::<T, _>(&mut listener)?;
        Ok(listener.into_rows())
    }

    /// Ends the session, releasing the shared strings cache
    pub fn close(mut self) {
        if let Some(mut strings) = self.strings.take() {
            strings.clear();
        }
    }

    fn select(&self, selector: &SheetSelector) -> Result<Vec<usize>, Error> {
        match selector {
            SheetSelector::Index(i) if *i < self.sheets.len() => Ok(vec![*i]),
            SheetSelector::Index(i) => Err(Error::SheetIndex(*i)),
            SheetSelector::Name(name) => self
                .sheets
                .iter()
                .position(|s| s.name == *name)
                .map(|i| vec![i])
                .ok_or_else(|| Error::SheetNotFound(name.clone())),
            SheetSelector::All => Ok((0..self.sheets.len()).collect()),
        }
    }

    fn load_strings(&mut self) -> Result<(), Error> {
        if self.strings.is_some() {
            return Ok(());
        }
        let size = match self.shared_strings.as_deref() {
            Some(path) => self.package.part_size(path)?,
            None => None,
        };
        let cache = match (self.shared_strings.as_deref(), size) {
            (Some(path), Some(size)) => {
                let kind = select_cache(size, &self.options.cache);
                let mut cache = new_cache(kind, &self.options.cache)?;
                let mut xml = self.package.part(path)?;
                let count = load_shared_strings(&mut xml, cache.as_mut())?;
                debug!("loaded {count} shared strings ({size} bytes)");
                cache
            }
            _ => Box::new(MemoryCache::new()) as Box<dyn SharedStringCache>,
        };
        self.strings = Some(cache);
        Ok(())
    }

    fn drive<B, L>(&mut self, sheets: &[usize], binder: &mut B, listener: &mut L) -> Result<(), Error>
    where
        B: RowBinder,
        L: ReadListener<B::Output> + ?Sized,
    {
        self.load_strings()?;
        for &i in sheets {
            self.read_one(i, binder, listener)?;
        }
        Ok(())
    }

    fn read_one<B, L>(&mut self, index: usize, binder: &mut B, listener: &mut L) -> Result<(), Error>
    where
        B: RowBinder,
        L: ReadListener<B::Output> + ?Sized,
    {
        let Workbook {
            package,
            sheets,
            is_1904,
            strings,
            options,
            ..
        } = self;
        let sheet = sheets.get(index).ok_or(Error::SheetIndex(index))?;
        let strings = strings
            .as_deref_mut()
            .ok_or(Error::Unexpected("shared strings not loaded"))?;
        let ctx = ConvertContext { is_1904: *is_1904 };
        debug!("reading sheet '{}' ({})", sheet.name, sheet.path);

        let kinds = options.extras;
        let relationships = if kinds == ExtraKinds::none() {
            Vec::new()
        } else {
            package.relationships(&sheet.path)?
        };

        // comments live in their own part, delivered before the rows
        if kinds.contains(ExtraKind::Comment) {
            if let Some(rel) = relationships.iter().find(|r| r.is("comments") && !r.external) {
                let comments = match package.part(&rel.target) {
                    Ok(mut xml) => read_comments(&mut xml)?,
                    Err(Error::MissingPart(p)) => {
                        debug!("comments part '{p}' not found");
                        Vec::new()
                    }
                    Err(e) => return Err(e),
                };
                let context = ReadContext { sheet, row: None };
                for extra in comments {
                    deliver_extra(listener, extra, &context)?;
                }
            }
        }

        let xml = package.part(&sheet.path)?;
        let mut decoder = SheetDecoder::new(xml, strings).with_extras(kinds, relationships);
        binder.reset();
        read_rows(&mut decoder, binder, listener, sheet, options, &ctx)
    }
}

/// Drives one sheet from a row source to a listener.
///
/// Rows with an index below the header row count are header rows. The
/// binder is prepared with them when the first data row arrives (or at the
/// end of the sheet) and the listener gets their flattened text. Row level
/// failures are routed to [`ReadListener::on_exception`]; everything else
/// aborts the read. `on_sheet_complete` is called exactly once, including
/// when the listener stops the sheet early.
pub fn read_rows<S, B, L>(
    source: &mut S,
    binder: &mut B,
    listener: &mut L,
    sheet: &SheetDescriptor,
    options: &ReadOptions,
    ctx: &ConvertContext,
) -> Result<(), Error>
where
    S: RowSource + ?Sized,
    B: RowBinder + ?Sized,
    L: ReadListener<B::Output> + ?Sized,
{
    let mut context = ReadContext { sheet, row: None };
    let mut headers: Vec<BTreeMap<u32, String>> = Vec::new();
    let mut prepared = false;
    let mut stopped = false;

    loop {
        if !listener.continue_reading(&context) {
            debug!("sheet '{}' stopped by listener", sheet.name);
            stopped = true;
            break;
        }
        let Some(row) = source.next_row()? else {
            break;
        };
        context.row = Some(row.index());
        if row.index() < options.header_rows {
            headers.push(header_text(&row));
            continue;
        }
        if !prepared {
            prepare(binder, listener, &headers, options, &context)?;
            prepared = true;
        }
        if options.skip_empty_rows && row.is_blank() {
            continue;
        }
        let result = binder.bind(&row, ctx).and_then(|record| {
            listener
                .on_row(record, &context)
                .map_err(|source| Error::Listener {
                    row: Some(row.index()),
                    source,
                })
        });
        if let Err(e) = result {
            recover(listener, e, &context)?;
        }
    }

    context.row = None;
    if !prepared && !stopped {
        prepare(binder, listener, &headers, options, &context)?;
    }
    for extra in source.take_extras() {
        deliver_extra(listener, extra, &context)?;
    }
    listener
        .on_sheet_complete(&context)
        .map_err(|source| Error::Listener { row: None, source })
}

fn header_text(row: &RowBuffer) -> BTreeMap<u32, String> {
    row.cells()
        .filter_map(|(c, v)| v.as_text().map(|t| (c, t.into_owned())))
        .collect()
}

fn prepare<B, L>(
    binder: &mut B,
    listener: &mut L,
    headers: &[BTreeMap<u32, String>],
    options: &ReadOptions,
    context: &ReadContext<'_>,
) -> Result<(), Error>
where
    B: RowBinder + ?Sized,
    L: ReadListener<B::Output> + ?Sized,
{
    binder.prepare(headers)?;
    if options.header_rows > 0 {
        let flat = crate::header::flatten(headers);
        if let Err(source) = listener.on_header(&flat, context) {
            recover(listener, Error::Listener { row: None, source }, context)?;
        }
    }
    Ok(())
}

fn deliver_extra<T, L>(listener: &mut L, extra: CellExtra, context: &ReadContext<'_>) -> Result<(), Error>
where
    L: ReadListener<T> + ?Sized,
{
    match listener.on_extra(extra, context) {
        Ok(()) => Ok(()),
        Err(source) => recover(listener, Error::Listener { row: None, source }, context),
    }
}

/// Asks the listener what to do with a row level error
fn recover<T, L>(listener: &mut L, error: Error, context: &ReadContext<'_>) -> Result<(), Error>
where
    L: ReadListener<T> + ?Sized,
{
    if error.is_fatal() {
        return Err(error);
    }
    match listener.on_exception(&error, context) {
        ExceptionAction::Suppress => Ok(()),
        ExceptionAction::Rethrow => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::CellValue;
    use crate::errors::BoxError;
    use crate::SheetVisible;

    struct Rows(std::vec::IntoIter<RowBuffer>);

    impl RowSource for Rows {
        fn next_row(&mut self) -> Result<Option<RowBuffer>, Error> {
            Ok(self.0.next())
        }
    }

    fn source(texts: &[&[&str]]) -> Rows {
        let rows: Vec<RowBuffer> = texts
            .iter()
            .enumerate()
            .map(|(r, cells)| {
                let mut row = RowBuffer::new(r as u32);
                for (c, t) in cells.iter().enumerate() {
                    if !t.is_empty() {
                        row.insert(c as u32, CellValue::from(*t));
                    }
                }
                row
            })
            .collect();
        Rows(rows.into_iter())
    }

    fn sheet() -> SheetDescriptor {
        SheetDescriptor {
            index: 0,
            name: "data".to_string(),
            visible: SheetVisible::Visible,
            relationship_id: "rId1".to_string(),
            path: "xl/worksheets/sheet1.xml".to_string(),
        }
    }

    #[derive(Default)]
    struct Recorder {
        header: Option<BTreeMap<u32, String>>,
        rows: Vec<ColumnMap>,
        completed: usize,
        fail_at: Option<usize>,
        calls: usize,
        exceptions: usize,
        rethrow: bool,
    }

    impl ReadListener<ColumnMap> for Recorder {
        fn on_header(
            &mut self,
            header: &BTreeMap<u32, String>,
            _ctx: &ReadContext<'_>,
        ) -> Result<(), BoxError> {
            self.header = Some(header.clone());
            Ok(())
        }

        fn on_row(&mut self, row: ColumnMap, _ctx: &ReadContext<'_>) -> Result<(), BoxError> {
            self.calls += 1;
            if Some(self.calls) == self.fail_at {
                return Err("refused".into());
            }
            self.rows.push(row);
            Ok(())
        }

        fn on_sheet_complete(&mut self, _ctx: &ReadContext<'_>) -> Result<(), BoxError> {
            self.completed += 1;
            Ok(())
        }

        fn on_exception(&mut self, error: &Error, ctx: &ReadContext<'_>) -> ExceptionAction {
            assert_eq!(error.row(), ctx.row);
            self.exceptions += 1;
            if self.rethrow {
                ExceptionAction::Rethrow
            } else {
                ExceptionAction::Suppress
            }
        }
    }

    fn run(rows: &[&[&str]], listener: &mut Recorder, options: &ReadOptions) -> Result<(), Error> {
        let sheet = sheet();
        let mut binder = MapBinder::new(TrailingColumns::PadToHeader);
        read_rows(
            &mut source(rows),
            &mut binder,
            listener,
            &sheet,
            options,
            &ConvertContext::default(),
        )
    }

    #[test]
    fn header_then_rows() {
        let mut listener = Recorder::default();
        run(
            &[&["a", "b", "c"], &["1", "", "3"], &[], &["4"]],
            &mut listener,
            &ReadOptions::default(),
        )
        .unwrap();
        assert_eq!(listener.header.unwrap().len(), 3);
        assert_eq!(listener.rows.len(), 2);
        assert_eq!(listener.rows[1].len(), 3);
        assert_eq!(listener.completed, 1);
    }

    #[test]
    fn keep_empty_rows_without_header() {
        let mut listener = Recorder::default();
        let mut options = ReadOptions::new();
        options.header_rows(0).skip_empty_rows(false);
        run(&[&["1"], &[], &["2"]], &mut listener, &options).unwrap();
        assert!(listener.header.is_none());
        assert_eq!(listener.rows.len(), 3);
    }

    #[test]
    fn suppressed_failure() {
        let mut listener = Recorder {
            fail_at: Some(2),
            ..Default::default()
        };
        run(&[&["h"], &["1"], &["2"], &["3"]], &mut listener, &ReadOptions::default()).unwrap();
        assert_eq!(listener.rows.len(), 2);
        assert_eq!(listener.exceptions, 1);
        assert_eq!(listener.completed, 1);
    }

    #[test]
    fn rethrown_failure() {
        let mut listener = Recorder {
            fail_at: Some(1),
            rethrow: true,
            ..Default::default()
        };
        match run(&[&["h"], &["1"], &["2"]], &mut listener, &ReadOptions::default()) {
            Err(Error::Listener { row: Some(1), .. }) => (),
            r => panic!("unexpected {r:?}"),
        }
        assert_eq!(listener.completed, 0);
    }
}
