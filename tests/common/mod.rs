// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Zips `parts` as is
pub fn zip_parts(parts: &[(&str, &str)]) -> Cursor<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in parts {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    let mut cursor = zip.finish().unwrap();
    cursor.set_position(0);
    cursor
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#;

const RELS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// A package with one sheet per `(name, sheetData and trailer xml)` entry
pub struct Fixture<'a> {
    sheets: Vec<(&'a str, &'a str)>,
    shared_strings: Option<String>,
    extra_parts: Vec<(&'a str, &'a str)>,
    sheet_rels: Vec<(usize, &'a str)>,
}

impl<'a> Fixture<'a> {
    pub fn new() -> Self {
        Fixture {
            sheets: Vec::new(),
            shared_strings: None,
            extra_parts: Vec::new(),
            sheet_rels: Vec::new(),
        }
    }

    pub fn sheet(mut self, name: &'a str, body: &'a str) -> Self {
        self.sheets.push((name, body));
        self
    }

    pub fn shared_strings(mut self, strings: &[&str]) -> Self {
        let items: String = strings
            .iter()
            .map(|s| format!("<si><t>{s}</t></si>"))
            .collect();
        self.shared_strings = Some(format!(
            r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">{items}</sst>"#,
            strings.len()
        ));
        self
    }

    /// Relationships of sheet `index` (0 based), `<Relationship>` elements
    pub fn sheet_rels(mut self, index: usize, rels: &'a str) -> Self {
        self.sheet_rels.push((index, rels));
        self
    }

    pub fn part(mut self, name: &'a str, data: &'a str) -> Self {
        self.extra_parts.push((name, data));
        self
    }

    pub fn build(self) -> Cursor<Vec<u8>> {
        let mut sheets = String::new();
        let mut rels = String::new();
        let mut parts: Vec<(String, String)> = Vec::new();
        for (i, (name, body)) in self.sheets.iter().enumerate() {
            let n = i + 1;
            sheets.push_str(&format!(
                r#"<sheet name="{name}" sheetId="{n}" r:id="rId{n}"/>"#
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="{RELS}/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            ));
            parts.push((
                format!("xl/worksheets/sheet{n}.xml"),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{RELS}">{body}</worksheet>"#
                ),
            ));
        }
        if let Some(sst) = self.shared_strings {
            rels.push_str(&format!(
                r#"<Relationship Id="rIdSst" Type="{RELS}/sharedStrings" Target="sharedStrings.xml"/>"#
            ));
            parts.push(("xl/sharedStrings.xml".to_string(), sst));
        }
        for (i, r) in self.sheet_rels {
            parts.push((
                format!("xl/worksheets/_rels/sheet{}.xml.rels", i + 1),
                format!(
                    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{r}</Relationships>"#
                ),
            ));
        }
        parts.push((
            "xl/workbook.xml".to_string(),
            format!(
                r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{RELS}"><sheets>{sheets}</sheets></workbook>"#
            ),
        ));
        parts.push((
            "xl/_rels/workbook.xml.rels".to_string(),
            format!(
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
            ),
        ));
        let mut all: Vec<(&str, &str)> = vec![("[Content_Types].xml", CONTENT_TYPES)];
        all.extend(parts.iter().map(|(n, d)| (n.as_str(), d.as_str())));
        all.extend(self.extra_parts.iter().copied());
        zip_parts(&all)
    }
}

/// `<sheetData>` with one row per entry, cells as `(reference, value)` numbers
pub fn numeric_rows(rows: usize) -> String {
    let mut data = String::from("<sheetData>");
    data.push_str(r#"<row r="1"><c r="A1" t="inlineStr"><is><t>id</t></is></c></row>"#);
    for r in 2..=rows + 1 {
        data.push_str(&format!(r#"<row r="{r}"><c r="A{r}"><v>{}</v></c></row>"#, r - 1));
    }
    data.push_str("</sheetData>");
    data
}
