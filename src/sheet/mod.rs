// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Worksheet decoding: tag events in, rows out

mod extra;

use std::collections::HashMap;
use std::io::BufRead;

use log::{debug, warn};

pub use self::extra::{CellExtra, ExtraKind, ExtraKinds};
pub(crate) use self::extra::{hyperlink, merge, read_comments};
use crate::cache::SharedStringCache;
use crate::datatype::{CellValue, Formula, RowBuffer};
use crate::errors::Error;
use crate::package::Relationship;
use crate::utils::{coordinate_to_name, get_row, get_row_column};
use crate::xml::{Element, TagEvent, TagParser};
use crate::CellErrorType;

/// Deepest element nesting accepted in a worksheet
const MAX_DEPTH: usize = 64;

/// Anything producing decoded rows in ascending row order
pub trait RowSource {
    /// Next physical row, `None` once the data is exhausted
    fn next_row(&mut self) -> Result<Option<RowBuffer>, Error>;

    /// Extra metadata found so far, drained
    fn take_extras(&mut self) -> Vec<CellExtra> {
        Vec::new()
    }
}

/// Decoder position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Idle,
    InRow,
    InCell,
    InCellValue,
    InFormula,
    InInlineString,
    Done,
}

/// Open elements the decoder cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    SheetData,
    Row,
    Cell,
    Value,
    Formula,
    InlineString,
    Text,
    Phonetic,
    Other,
}

#[derive(Debug, Default)]
struct FormulaScratch {
    text: String,
    shared_group: Option<u32>,
}

/// Accumulation buffers of the open cell
#[derive(Debug, Default)]
struct CellScratch {
    column: u32,
    typ: Option<String>,
    value: String,
    has_value: bool,
    inline: Option<String>,
    formula: Option<FormulaScratch>,
    resolved_formula: Option<(Option<String>, Option<u32>)>,
}

/// Streams the rows of one worksheet part.
///
/// Shared strings are resolved through the document cache as cells complete.
/// Shared formula members adopt the text stored by the first cell of their
/// group.
pub struct SheetDecoder<'c, R: BufRead> {
    xml: TagParser<R>,
    strings: &'c mut dyn SharedStringCache,
    state: DecodeState,
    stack: Vec<ElementKind>,
    row: Option<RowBuffer>,
    cell: CellScratch,
    formulas: HashMap<u32, String>,
    row_index: u32,
    col_index: u32,
    extra_kinds: ExtraKinds,
    relationships: Vec<Relationship>,
    extras: Vec<CellExtra>,
}

impl<'c, R: BufRead> SheetDecoder<'c, R> {
    /// Creates a decoder over a worksheet part
    pub fn new(xml: TagParser<R>, strings: &'c mut dyn SharedStringCache) -> Self {
        SheetDecoder {
            xml,
            strings,
            state: DecodeState::Idle,
            stack: Vec::with_capacity(16),
            row: None,
            cell: CellScratch::default(),
            formulas: HashMap::new(),
            row_index: 0,
            col_index: 0,
            extra_kinds: ExtraKinds::none(),
            relationships: Vec::new(),
            extras: Vec::new(),
        }
    }

    /// Requests hyperlinks and/or merged regions found after the cell data
    pub(crate) fn with_extras(mut self, kinds: ExtraKinds, relationships: Vec<Relationship>) -> Self {
        self.extra_kinds = kinds;
        self.relationships = relationships;
        self
    }

    /// Formula text stored for a shared group
    pub fn shared_formula(&self, group: u32) -> Option<&str> {
        self.formulas.get(&group).map(String::as_str)
    }

    fn kind_of(&self, name: &str) -> ElementKind {
        let top = self.stack.last().copied();
        match (name, top, self.state) {
            ("sheetData", _, DecodeState::Idle) => ElementKind::SheetData,
            ("row", Some(ElementKind::SheetData), _) => ElementKind::Row,
            ("c", Some(ElementKind::Row), _) => ElementKind::Cell,
            ("v", Some(ElementKind::Cell), _) => ElementKind::Value,
            ("f", Some(ElementKind::Cell), _) => ElementKind::Formula,
            ("is", Some(ElementKind::Cell), _) => ElementKind::InlineString,
            ("t", _, DecodeState::InInlineString) => ElementKind::Text,
            ("rPh", _, DecodeState::InInlineString) => ElementKind::Phonetic,
            _ => ElementKind::Other,
        }
    }

    fn push(&mut self, kind: ElementKind) -> Result<(), Error> {
        if self.stack.len() >= MAX_DEPTH {
            return Err(Error::Unexpected("worksheet nesting is too deep"));
        }
        self.stack.push(kind);
        self.state = match kind {
            ElementKind::Row => DecodeState::InRow,
            ElementKind::Cell => DecodeState::InCell,
            ElementKind::Value => DecodeState::InCellValue,
            ElementKind::Formula => DecodeState::InFormula,
            ElementKind::InlineString => DecodeState::InInlineString,
            _ => self.state,
        };
        Ok(())
    }

    fn pop(&mut self) -> Option<ElementKind> {
        let kind = self.stack.pop()?;
        self.state = match kind {
            ElementKind::Row => DecodeState::Idle,
            ElementKind::Cell => DecodeState::InRow,
            ElementKind::Value | ElementKind::Formula | ElementKind::InlineString => {
                DecodeState::InCell
            }
            _ => self.state,
        };
        Some(kind)
    }

    fn start_row(&mut self, e: &Element) {
        if let Some(r) = e.attr("r") {
            match get_row(r.as_bytes()) {
                Ok(row) => self.row_index = row,
                Err(_) => debug!("invalid row reference '{r}', counting rows"),
            }
        }
        self.col_index = 0;
        self.row = Some(RowBuffer::new(self.row_index));
    }

    fn start_cell(&mut self, e: &Element) {
        let column = match e.attr("r").map(|r| (r, get_row_column(r.as_bytes()))) {
            Some((_, Ok((_, col)))) => col,
            Some((r, Err(_))) => {
                debug!("invalid cell reference '{r}', using column {}", self.col_index);
                self.col_index
            }
            None => self.col_index,
        };
        self.cell = CellScratch {
            column,
            typ: e.attr("t").map(str::to_owned),
            ..CellScratch::default()
        };
    }

    fn start_formula(&mut self, e: &Element) {
        let shared_group = match e.attr("t") {
            Some("shared") => match e.attr("si").map(|si| atoi_simd::parse::<u32>(si.as_bytes())) {
                Some(Ok(si)) => Some(si),
                _ => {
                    warn!("shared formula without a valid group index");
                    None
                }
            },
            _ => None,
        };
        self.cell.formula = Some(FormulaScratch {
            text: String::new(),
            shared_group,
        });
    }

    fn end_formula(&mut self) {
        let Some(f) = self.cell.formula.take() else {
            return;
        };
        let text = match f.shared_group {
            Some(group) => match self.formulas.get(&group) {
                Some(stored) => Some(stored.clone()),
                None if !f.text.is_empty() => {
                    self.formulas.insert(group, f.text.clone());
                    Some(f.text)
                }
                None => {
                    warn!(
                        "shared formula group {group} referenced at {} before definition",
                        coordinate_to_name((self.row_index, self.cell.column))
                    );
                    None
                }
            },
            None => Some(f.text),
        };
        self.cell.resolved_formula = Some((text, f.shared_group));
    }

    fn characters(&mut self, text: &str) {
        match self.state {
            DecodeState::InCellValue => {
                self.cell.value.push_str(text);
            }
            DecodeState::InFormula => {
                if let Some(f) = self.cell.formula.as_mut() {
                    f.text.push_str(text);
                }
            }
            DecodeState::InInlineString
                if self.stack.last() == Some(&ElementKind::Text)
                    && !self.stack.contains(&ElementKind::Phonetic) =>
            {
                self.cell
                    .inline
                    .get_or_insert_with(String::new)
                    .push_str(text);
            }
            _ => (),
        }
    }

    /// Value of the open cell from its type attribute and accumulated text
    fn cell_value(&mut self) -> Result<CellValue, Error> {
        let cell = &mut self.cell;
        if cell.typ.as_deref() == Some("inlineStr") {
            if let Some(s) = cell.inline.take() {
                return Ok(CellValue::String(s));
            }
        }
        if !cell.has_value {
            return Ok(cell.inline.take().map_or(CellValue::Empty, CellValue::String));
        }
        let v = std::mem::take(&mut cell.value);
        let at = || coordinate_to_name((self.row_index, cell.column));
        Ok(match cell.typ.as_deref() {
            Some("s") => {
                if v.is_empty() {
                    return Ok(CellValue::Empty);
                }
                // Cell value is an index into the shared string table.
                let Ok(idx) = atoi_simd::parse::<usize>(v.trim().as_bytes()) else {
                    warn!("invalid shared string index '{v}' at {}", at());
                    return Ok(CellValue::Empty);
                };
                match self.strings.get(idx) {
                    Ok(s) => CellValue::String(s.to_owned()),
                    Err(Error::UnresolvedSharedReference { .. }) => {
                        warn!("shared string {idx} not found, {} left empty", at());
                        CellValue::Empty
                    }
                    Err(e) => return Err(e),
                }
            }
            Some("b") => CellValue::Bool(!matches!(v.trim(), "0" | "false" | "")),
            Some("e") => match v.parse::<CellErrorType>() {
                Ok(e) => CellValue::Error(e),
                Err(_) => {
                    warn!("unknown error value '{v}' at {}", at());
                    CellValue::String(v)
                }
            },
            Some("d") => CellValue::DateTimeIso(v),
            Some("str" | "inlineStr") => CellValue::String(v),
            typ => {
                if let Some(t) = typ.filter(|t| *t != "n") {
                    warn!("unknown cell type '{t}' at {}, inferring", at());
                }
                // If type is not known, we try to parse as Float for utility, but fall back to
                // String if this fails.
                if v.is_empty() {
                    CellValue::Empty
                } else {
                    match fast_float2::parse::<f64, _>(v.trim().as_bytes()) {
                        Ok(n) => CellValue::Number(n),
                        Err(_) => CellValue::String(v),
                    }
                }
            }
        })
    }

    fn end_cell(&mut self) -> Result<(), Error> {
        let value = self.cell_value()?;
        let value = match self.cell.resolved_formula.take() {
            Some((text, shared_group)) => CellValue::Formula(Formula {
                text,
                shared_group,
                cached: Box::new(value),
            }),
            None => value,
        };
        let column = self.cell.column;
        if let Some(row) = self.row.as_mut() {
            row.insert(column, value);
        }
        self.col_index = column.saturating_add(1);
        Ok(())
    }

    /// Reads what follows the cell data, keeping the requested extras
    fn read_trailer(&mut self) -> Result<(), Error> {
        if !self.extra_kinds.after_rows() {
            return Ok(());
        }
        while let Some(ev) = self.xml.next_event()? {
            let TagEvent::Start(e) = ev else {
                continue;
            };
            let extra = match e.name.as_str() {
                "mergeCell" if self.extra_kinds.contains(ExtraKind::Merge) => merge(&e),
                "hyperlink" if self.extra_kinds.contains(ExtraKind::Hyperlink) => {
                    hyperlink(&e, &self.relationships)
                }
                _ => continue,
            };
            match extra {
                Ok(Some(extra)) => self.extras.push(extra),
                Ok(None) => (),
                Err(err) => warn!("ignoring {}: {err}", e.name),
            }
        }
        Ok(())
    }
}

impl<R: BufRead> RowSource for SheetDecoder<'_, R> {
    fn next_row(&mut self) -> Result<Option<RowBuffer>, Error> {
        if self.state == DecodeState::Done {
            return Ok(None);
        }
        while let Some(ev) = self.xml.next_event()? {
            match ev {
                TagEvent::Start(e) => {
                    let kind = self.kind_of(&e.name);
                    self.push(kind)?;
                    match kind {
                        ElementKind::Row => self.start_row(&e),
                        ElementKind::Cell => self.start_cell(&e),
                        ElementKind::Value => self.cell.has_value = true,
                        ElementKind::Formula => self.start_formula(&e),
                        ElementKind::InlineString => {
                            self.cell.inline.get_or_insert_with(String::new);
                        }
                        _ => (),
                    }
                }
                TagEvent::Characters(t) => self.characters(&t),
                TagEvent::End(_) => match self.pop() {
                    Some(ElementKind::Formula) => self.end_formula(),
                    Some(ElementKind::Cell) => self.end_cell()?,
                    Some(ElementKind::Row) => {
                        self.row_index = self.row_index.saturating_add(1);
                        self.col_index = 0;
                        if let Some(row) = self.row.take() {
                            return Ok(Some(row));
                        }
                    }
                    Some(ElementKind::SheetData) => {
                        let pending = self.row.take();
                        self.read_trailer()?;
                        self.state = DecodeState::Done;
                        return Ok(pending);
                    }
                    _ => (),
                },
            }
        }
        self.state = DecodeState::Done;
        Ok(self.row.take())
    }

    fn take_extras(&mut self) -> Vec<CellExtra> {
        std::mem::take(&mut self.extras)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn sheet(data: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{data}</sheetData>
<mergeCells count="1"><mergeCell ref="A1:B2"/></mergeCells></worksheet>"#
        )
    }

    fn rows(data: &str, strings: &mut MemoryCache) -> Vec<RowBuffer> {
        let xml = sheet(data);
        let mut decoder = SheetDecoder::new(TagParser::new(xml.as_bytes()), strings);
        let mut rows = Vec::new();
        while let Some(row) = decoder.next_row().unwrap() {
            rows.push(row);
        }
        rows
    }

    #[test]
    fn value_types() {
        let mut strings = MemoryCache::new();
        strings.put(0, "shared".to_string()).unwrap();
        let rows = rows(
            r#"<row r="1">
                <c r="A1" t="s"><v>0</v></c>
                <c r="B1"><v>1.5</v></c>
                <c r="C1" t="b"><v>1</v></c>
                <c r="D1" t="e"><v>#DIV/0!</v></c>
                <c r="E1" t="inlineStr"><is><r><t>in</t></r><r><t>line</t></r><rPh><t>x</t></rPh></is></c>
                <c r="F1" t="str"><f>"a"&amp;"b"</f><v>ab</v></c>
                <c r="G1" t="d"><v>2021-01-02T00:00:00</v></c>
                <c r="H1" t="s"><v>9</v></c>
                <c r="I1" t="zz"><v>abc</v></c>
                <c r="J1" s="2"/>
            </row>"#,
            &mut strings,
        );
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.get(0), Some(&CellValue::String("shared".to_string())));
        assert_eq!(r.get(1), Some(&CellValue::Number(1.5)));
        assert_eq!(r.get(2), Some(&CellValue::Bool(true)));
        assert_eq!(r.get(3), Some(&CellValue::Error(CellErrorType::Div0)));
        assert_eq!(r.get(4), Some(&CellValue::String("inline".to_string())));
        let f = r.get(5).and_then(CellValue::formula).unwrap();
        assert_eq!(f.text.as_deref(), Some(r#""a"&"b""#));
        assert_eq!(*f.cached, CellValue::String("ab".to_string()));
        assert_eq!(
            r.get(6),
            Some(&CellValue::DateTimeIso("2021-01-02T00:00:00".to_string()))
        );
        assert_eq!(r.get(7), Some(&CellValue::Empty));
        assert_eq!(r.get(8), Some(&CellValue::String("abc".to_string())));
        assert_eq!(r.get(9), Some(&CellValue::Empty));
    }

    #[test]
    fn shared_formulas() {
        let mut strings = MemoryCache::new();
        let rows = rows(
            r#"<row r="2"><c r="B2"><f t="shared" ref="B2:B3" si="0">B2+C2</f><v>3</v></c></row>
               <row r="3"><c r="B3"><f t="shared" si="0"/><v>5</v></c></row>
               <row r="4"><c r="B4"><f t="shared" si="7"/><v>1</v></c></row>"#,
            &mut strings,
        );
        let formula = |r: &RowBuffer| r.get(1).and_then(CellValue::formula).cloned().unwrap();
        assert_eq!(rows[0].index(), 1);
        assert_eq!(formula(&rows[0]).text.as_deref(), Some("B2+C2"));
        assert_eq!(formula(&rows[1]).text.as_deref(), Some("B2+C2"));
        assert_eq!(formula(&rows[1]).shared_group, Some(0));
        assert_eq!(rows[1].get(1).map(CellValue::result), Some(&CellValue::Number(5.)));
        assert_eq!(formula(&rows[2]).text, None);
        assert_eq!(*formula(&rows[2]).cached, CellValue::Number(1.));
    }

    #[test]
    fn sparse_and_positional() {
        let mut strings = MemoryCache::new();
        let rows = rows(
            r#"<row r="1"><c r="A1"><v>1</v></c><c r="D1"><v>4</v></c></row>
               <row><c><v>1</v></c><c><v>2</v></c><c r="??"><v>3</v></c></row>
               <row r="7"/>"#,
            &mut strings,
        );
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].cells().map(|(c, _)| c).collect::<Vec<_>>(), [0, 3]);
        assert_eq!(rows[0].get(1), None);
        assert_eq!(rows[1].index(), 1);
        assert_eq!(rows[1].get(2), Some(&CellValue::Number(3.)));
        assert_eq!(rows[2].index(), 6);
        assert!(rows[2].is_empty());
    }

    #[test]
    fn merges_only_when_requested() {
        let mut strings = MemoryCache::new();
        let xml = sheet(r#"<row r="1"><c r="A1"><v>1</v></c></row>"#);
        {
            let mut decoder = SheetDecoder::new(TagParser::new(xml.as_bytes()), &mut strings);
            while decoder.next_row().unwrap().is_some() {}
            assert!(decoder.take_extras().is_empty());
        }
        let mut decoder = SheetDecoder::new(TagParser::new(xml.as_bytes()), &mut strings)
            .with_extras(ExtraKinds::none().with(ExtraKind::Merge), Vec::new());
        while decoder.next_row().unwrap().is_some() {}
        assert_eq!(
            decoder.take_extras(),
            vec![CellExtra::Merge(crate::Dimensions::new((0, 0), (1, 1)))]
        );
    }

    #[test]
    fn nesting_is_bounded() {
        let mut strings = MemoryCache::new();
        let deep = format!("{}{}", "<a>".repeat(100), "</a>".repeat(100));
        let xml = sheet(&deep);
        let mut decoder = SheetDecoder::new(TagParser::new(xml.as_bytes()), &mut strings);
        assert!(matches!(decoder.next_row(), Err(Error::Unexpected(_))));
    }
}
