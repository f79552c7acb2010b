// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Zip container access and workbook manifest

use std::io::{BufReader, Read, Seek, SeekFrom};

use log::debug;
use zip::read::{ZipArchive, ZipFile};
use zip::result::ZipError;

use crate::errors::Error;
use crate::xml::{TagEvent, TagParser};
use crate::SheetVisible;

/// Tag parser over a part of the container
pub type PartParser<'a, RS> = TagParser<BufReader<ZipFile<'a, RS>>>;

const CONTENT_TYPES: &str = "[Content_Types].xml";
const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";

/// Compound File Binary signature (legacy xls, or an encrypted ooxml package)
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// A sheet as enumerated from the workbook manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetDescriptor {
    /// Position in the workbook (0 based)
    pub index: usize,
    /// Sheet name
    pub name: String,
    /// Visibility
    pub visible: SheetVisible,
    /// Relationship id pointing to the sheet part
    pub relationship_id: String,
    /// Resolved part path, e.g. `xl/worksheets/sheet1.xml`
    pub path: String,
}

/// A `<Relationship>` of a `.rels` part
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub typ: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    pub fn is(&self, kind: &str) -> bool {
        self.typ.rsplit('/').next() == Some(kind)
    }
}

/// What the workbook part declares
#[derive(Debug, Clone, Default)]
pub(crate) struct Manifest {
    pub sheets: Vec<SheetDescriptor>,
    pub is_1904: bool,
    pub shared_strings: Option<String>,
}

/// An opened spreadsheet package
pub struct Package<RS> {
    zip: ZipArchive<RS>,
}

impl<RS: Read + Seek> Package<RS> {
    /// Opens and validates a zip spreadsheet package
    pub fn open(mut reader: RS) -> Result<Self, Error> {
        let mut magic = Vec::with_capacity(OLE_MAGIC.len());
        (&mut reader)
            .take(OLE_MAGIC.len() as u64)
            .read_to_end(&mut magic)?;
        reader.seek(SeekFrom::Start(0))?;
        if magic == OLE_MAGIC {
            return Err(Error::InvalidContainerFormat {
                reason: "legacy binary or encrypted package".to_string(),
                source: None,
            });
        }
        let zip = ZipArchive::new(reader)
            .map_err(|e| Error::invalid_container("cannot read zip directory", e))?;
        let package = Package { zip };
        for mandatory in [CONTENT_TYPES, WORKBOOK] {
            if package.find(mandatory).is_none() {
                return Err(Error::InvalidContainerFormat {
                    reason: format!("mandatory part '{mandatory}' is missing"),
                    source: None,
                });
            }
        }
        Ok(package)
    }

    /// Actual name of a part, looked up ignoring ascii case and a leading `/`.
    /// Names relative to `xl/` are found too.
    pub fn find(&self, name: &str) -> Option<&str> {
        let name = name.trim_start_matches('/');
        self.lookup(name).or_else(|| self.lookup(&format!("xl/{name}")))
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        self.zip.file_names().find(|n| n.eq_ignore_ascii_case(name))
    }

    /// All part names
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.zip.file_names()
    }

    /// Opens a part as a stream of tag events
    pub fn part(&mut self, name: &str) -> Result<PartParser<'_, RS>, Error> {
        let actual = self
            .find(name)
            .ok_or_else(|| Error::MissingPart(name.to_string()))?
            .to_owned();
        match self.zip.by_name(&actual) {
            Ok(f) => Ok(TagParser::new(BufReader::new(f)).with_part(actual)),
            Err(ZipError::FileNotFound) => Err(Error::MissingPart(name.to_string())),
            Err(ZipError::Io(e)) => Err(Error::Part {
                part: actual,
                source: Box::new(Error::Io(e)),
            }),
            Err(e) => Err(Error::invalid_container(
                format!("cannot open part '{actual}'"),
                e,
            )),
        }
    }

    /// Uncompressed byte size of a part, falling back to its stored size
    /// when the directory does not report it
    pub fn part_size(&mut self, name: &str) -> Result<Option<u64>, Error> {
        let Some(actual) = self.find(name).map(str::to_owned) else {
            return Ok(None);
        };
        let f = self
            .zip
            .by_name(&actual)
            .map_err(|e| Error::invalid_container(format!("cannot open part '{actual}'"), e))?;
        let size = match f.size() {
            0 => f.compressed_size(),
            s => s,
        };
        Ok(Some(size))
    }

    /// Relationships of `part`, empty when it has no `.rels` part
    pub(crate) fn relationships(&mut self, part: &str) -> Result<Vec<Relationship>, Error> {
        let rels = rels_path(part);
        if self.find(&rels).is_none() {
            return Ok(Vec::new());
        }
        let base = parent(part).to_owned();
        let mut xml = self.part(&rels)?;
        let mut relationships = Vec::new();
        while let Some(ev) = xml.next_event()? {
            match ev {
                TagEvent::Start(e) if e.name == "Relationship" => {
                    let external = e.attr("TargetMode") == Some("External");
                    let target = e.attr("Target").unwrap_or_default();
                    let target = if external {
                        target.to_string()
                    } else {
                        resolve_target(&base, target)
                    };
                    relationships.push(Relationship {
                        id: e.attr("Id").unwrap_or_default().to_string(),
                        typ: e.attr("Type").unwrap_or_default().to_string(),
                        target,
                        external,
                    });
                }
                TagEvent::End(n) if n == "Relationships" => break,
                _ => (),
            }
        }
        Ok(relationships)
    }

    /// Reads the workbook part: sheets, date system and shared strings location
    pub(crate) fn manifest(&mut self) -> Result<Manifest, Error> {
        if self.find(WORKBOOK_RELS).is_none() {
            return Err(Error::MissingPart(WORKBOOK_RELS.to_string()));
        }
        let relationships = self.relationships(WORKBOOK)?;
        let mut manifest = Manifest {
            shared_strings: relationships
                .iter()
                .find(|r| r.is("sharedStrings"))
                .map(|r| r.target.clone())
                .or_else(|| self.find(SHARED_STRINGS).map(str::to_owned)),
            ..Manifest::default()
        };

        let mut xml = self.part(WORKBOOK)?;
        while let Some(ev) = xml.next_event()? {
            match ev {
                TagEvent::Start(e) if e.name == "sheet" => {
                    let name = e.attr("name").unwrap_or_default().to_string();
                    let visible = match e.attr("state") {
                        Some("hidden") => SheetVisible::Hidden,
                        Some("veryHidden") => SheetVisible::VeryHidden,
                        _ => SheetVisible::Visible,
                    };
                    let relationship_id = e
                        .attr("r:id")
                        .or_else(|| e.attr("relationships:id"))
                        .or_else(|| e.attr_local("id"))
                        .unwrap_or_default()
                        .to_string();
                    let Some(rel) = relationships.iter().find(|r| r.id == relationship_id) else {
                        debug!("sheet '{name}' has no relationship '{relationship_id}', skipping");
                        continue;
                    };
                    manifest.sheets.push(SheetDescriptor {
                        index: manifest.sheets.len(),
                        name,
                        visible,
                        relationship_id,
                        path: rel.target.clone(),
                    });
                }
                TagEvent::Start(e) if e.name == "workbookPr" => {
                    manifest.is_1904 = matches!(e.attr("date1904"), Some("1" | "true"));
                }
                TagEvent::End(n) if n == "workbook" => break,
                _ => (),
            }
        }
        Ok(manifest)
    }
}

/// `xl/worksheets/sheet1.xml` -> `xl/worksheets/_rels/sheet1.xml.rels`
fn rels_path(part: &str) -> String {
    let part = part.trim_start_matches('/');
    match part.rfind('/') {
        Some(i) => format!("{}/_rels/{}.rels", &part[..i], &part[i + 1..]),
        None => format!("_rels/{part}.rels"),
    }
}

fn parent(part: &str) -> &str {
    let part = part.trim_start_matches('/');
    part.rfind('/').map_or("", |i| &part[..i])
}

/// Resolves a relationship target against the folder of its source part
fn resolve_target(base: &str, target: &str) -> String {
    // target may have pre-prended "/xl/" or "xl/" path
    if let Some(t) = target.strip_prefix('/') {
        return t.to_string();
    }
    if !base.is_empty() && target.starts_with(&format!("{base}/")) {
        return target.to_string();
    }
    let mut parts: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for seg in target.split('/') {
        match seg {
            "" | "." => (),
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn package(parts: &[(&str, &str)]) -> Cursor<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in parts {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    const WORKBOOK_XML: &str = r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
        <workbookPr date1904="1"/>
        <sheets>
            <sheet name="First" sheetId="1" r:id="rId1"/>
            <sheet name="Second" sheetId="2" state="veryHidden" r:id="rId2"/>
        </sheets>
    </workbook>"#;

    const RELS_XML: &str = r#"<Relationships>
        <Relationship Id="rId1" Type="http://x/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
        <Relationship Id="rId2" Type="http://x/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/>
        <Relationship Id="rId3" Type="http://x/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
    </Relationships>"#;

    #[test]
    fn manifest() {
        let mut p = Package::open(package(&[
            ("[Content_Types].xml", "<Types/>"),
            ("xl/workbook.xml", WORKBOOK_XML),
            ("xl/_rels/workbook.xml.rels", RELS_XML),
        ]))
        .unwrap();
        let m = p.manifest().unwrap();
        assert!(m.is_1904);
        assert_eq!(m.shared_strings.as_deref(), Some("xl/sharedStrings.xml"));
        assert_eq!(m.sheets.len(), 2);
        assert_eq!(m.sheets[0].path, "xl/worksheets/sheet1.xml");
        assert_eq!(m.sheets[1].path, "xl/worksheets/sheet2.xml");
        assert_eq!(m.sheets[1].visible, SheetVisible::VeryHidden);
        assert_eq!(m.sheets[1].relationship_id, "rId2");
    }

    #[test]
    fn not_a_zip() {
        let err = Package::open(Cursor::new(b"hello world".to_vec()))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::InvalidContainerFormat {
                source: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn ole_container() {
        let mut data = OLE_MAGIC.to_vec();
        data.extend_from_slice(&[0; 504]);
        let err = Package::open(Cursor::new(data)).err().unwrap();
        assert!(err.to_string().contains("legacy binary"));
    }

    #[test]
    fn missing_workbook() {
        let err = Package::open(package(&[("[Content_Types].xml", "<Types/>")]))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidContainerFormat { .. }));
    }

    #[test]
    fn case_insensitive_parts() {
        let mut p = Package::open(package(&[
            ("[Content_Types].xml", "<Types/>"),
            ("XL/Workbook.xml", WORKBOOK_XML),
        ]))
        .unwrap();
        assert_eq!(p.find("/xl/workbook.xml"), Some("XL/Workbook.xml"));
        assert_eq!(p.find("workbook.xml"), Some("XL/Workbook.xml"));
        assert_eq!(p.find("/Workbook.XML"), Some("XL/Workbook.xml"));
        assert_eq!(p.find("xl/xl/workbook.xml"), None);
        assert!(p.part("xl/workbook.xml").is_ok());
        assert!(matches!(
            p.part("xl/styles.xml").err().unwrap(),
            Error::MissingPart(_)
        ));
        assert!(matches!(p.manifest().err().unwrap(), Error::MissingPart(_)));
    }

    #[test]
    fn targets() {
        assert_eq!(
            rels_path("xl/worksheets/sheet1.xml"),
            "xl/worksheets/_rels/sheet1.xml.rels"
        );
        assert_eq!(
            resolve_target("xl/worksheets", "../comments1.xml"),
            "xl/comments1.xml"
        );
        assert_eq!(
            resolve_target("xl", "xl/worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
    }
}
