// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Non value cell metadata: comments, hyperlinks and merged regions

use std::io::BufRead;

use log::debug;

use crate::cache::read_string;
use crate::errors::Error;
use crate::package::Relationship;
use crate::utils::{get_dimension, get_row_column};
use crate::xml::{Element, TagEvent, TagParser};
use crate::Dimensions;

/// Metadata attached to a coordinate of a sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellExtra {
    /// A note attached to a cell
    Comment {
        /// Row (0 based)
        row: u32,
        /// Column (0 based)
        column: u32,
        /// Author name, if declared
        author: Option<String>,
        /// Comment text
        text: String,
    },
    /// A hyperlink over a range
    Hyperlink {
        /// Covered cells
        range: Dimensions,
        /// External url, or internal location such as `Sheet2!A1`
        target: String,
    },
    /// A merged region
    Merge(Dimensions),
}

impl CellExtra {
    /// Category of this extra
    pub fn kind(&self) -> ExtraKind {
        match self {
            CellExtra::Comment { .. } => ExtraKind::Comment,
            CellExtra::Hyperlink { .. } => ExtraKind::Hyperlink,
            CellExtra::Merge(_) => ExtraKind::Merge,
        }
    }
}

/// Category of [`CellExtra`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtraKind {
    /// [`CellExtra::Comment`]
    Comment,
    /// [`CellExtra::Hyperlink`]
    Hyperlink,
    /// [`CellExtra::Merge`]
    Merge,
}

/// Set of requested extra categories, empty by default
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtraKinds {
    comments: bool,
    hyperlinks: bool,
    merges: bool,
}

impl ExtraKinds {
    /// No category
    pub fn none() -> Self {
        ExtraKinds::default()
    }

    /// Every category
    pub fn all() -> Self {
        ExtraKinds {
            comments: true,
            hyperlinks: true,
            merges: true,
        }
    }

    /// Adds a category
    pub fn insert(&mut self, kind: ExtraKind) {
        match kind {
            ExtraKind::Comment => self.comments = true,
            ExtraKind::Hyperlink => self.hyperlinks = true,
            ExtraKind::Merge => self.merges = true,
        }
    }

    /// Adds a category, builder style
    pub fn with(mut self, kind: ExtraKind) -> Self {
        self.insert(kind);
        self
    }

    /// Whether `kind` was requested
    pub fn contains(&self, kind: ExtraKind) -> bool {
        match kind {
            ExtraKind::Comment => self.comments,
            ExtraKind::Hyperlink => self.hyperlinks,
            ExtraKind::Merge => self.merges,
        }
    }

    /// Whether anything found after the cell data is requested
    pub(crate) fn after_rows(&self) -> bool {
        self.hyperlinks || self.merges
    }
}

/// Reads a legacy comments part
pub(crate) fn read_comments<R: BufRead>(xml: &mut TagParser<R>) -> Result<Vec<CellExtra>, Error> {
    let mut authors = Vec::new();
    let mut comments = Vec::new();
    while let Some(ev) = xml.next_event()? {
        match ev {
            TagEvent::Start(e) if e.name == "author" => authors.push(xml.read_text()?),
            TagEvent::Start(e) if e.name == "comment" => {
                let text = read_string(xml, "comment")?;
                let Some((row, column)) = e
                    .attr("ref")
                    .and_then(|r| get_row_column(r.as_bytes()).ok())
                else {
                    debug!("skipping comment with invalid reference {:?}", e.attr("ref"));
                    continue;
                };
                let author = e.attr("authorId").map(|id| {
                    id.parse::<usize>()
                        .ok()
                        .and_then(|i| authors.get(i).cloned())
                        .unwrap_or_else(|| id.to_string())
                });
                comments.push(CellExtra::Comment {
                    row,
                    column,
                    author,
                    text,
                });
            }
            TagEvent::End(n) if n == "comments" => break,
            _ => (),
        }
    }
    Ok(comments)
}

/// `<hyperlink>` element, target resolved through the sheet relationships
pub(crate) fn hyperlink(
    e: &Element,
    relationships: &[Relationship],
) -> Result<Option<CellExtra>, Error> {
    let Some(r) = e.attr("ref") else {
        return Ok(None);
    };
    let range = get_dimension(r.as_bytes())?;
    let external = e
        .attr_local("id")
        .and_then(|id| relationships.iter().find(|rel| rel.id == id))
        .map(|rel| rel.target.clone());
    let target = match (external, e.attr("location")) {
        (Some(url), Some(loc)) => format!("{url}#{loc}"),
        (Some(url), None) => url,
        (None, Some(loc)) => loc.to_string(),
        (None, None) => {
            debug!("hyperlink {r} has no target");
            return Ok(None);
        }
    };
    Ok(Some(CellExtra::Hyperlink { range, target }))
}

/// `<mergeCell>` element
pub(crate) fn merge(e: &Element) -> Result<Option<CellExtra>, Error> {
    e.attr("ref")
        .map(|r| get_dimension(r.as_bytes()).map(CellExtra::Merge))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_with_authors() {
        let data = r#"<comments>
            <authors><author>Ann</author><author>Bob</author></authors>
            <commentList>
                <comment ref="B2" authorId="1"><text><r><t>Bob:</t></r><r><t xml:space="preserve"> check</t></r></text></comment>
                <comment ref="??" authorId="0"><text><t>lost</t></text></comment>
                <comment ref="A1" authorId="7"><text><t>plain</t></text></comment>
            </commentList>
        </comments>"#;
        let comments = read_comments(&mut TagParser::new(data.as_bytes())).unwrap();
        assert_eq!(
            comments,
            vec![
                CellExtra::Comment {
                    row: 1,
                    column: 1,
                    author: Some("Bob".to_string()),
                    text: "Bob: check".to_string(),
                },
                CellExtra::Comment {
                    row: 0,
                    column: 0,
                    author: Some("7".to_string()),
                    text: "plain".to_string(),
                },
            ]
        );
    }

    #[test]
    fn hyperlink_targets() {
        let rels = vec![Relationship {
            id: "rId1".to_string(),
            typ: "http://x/relationships/hyperlink".to_string(),
            target: "https://example.com".to_string(),
            external: true,
        }];
        let element = |attrs: &[(&str, &str)]| Element {
            name: "hyperlink".to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        let link = hyperlink(&element(&[("ref", "A1:B1"), ("r:id", "rId1")]), &rels).unwrap();
        assert_eq!(
            link,
            Some(CellExtra::Hyperlink {
                range: Dimensions::new((0, 0), (0, 1)),
                target: "https://example.com".to_string(),
            })
        );
        let link = hyperlink(&element(&[("ref", "C3"), ("location", "Other!A1")]), &rels)
            .unwrap()
            .unwrap();
        assert_eq!(link.kind(), ExtraKind::Hyperlink);
        assert!(hyperlink(&element(&[("ref", "C3")]), &rels)
            .unwrap()
            .is_none());
    }

    #[test]
    fn kinds() {
        let kinds = ExtraKinds::none().with(ExtraKind::Merge);
        assert!(kinds.contains(ExtraKind::Merge));
        assert!(!kinds.contains(ExtraKind::Comment));
        assert!(kinds.after_rows());
        assert!(!ExtraKinds::none().with(ExtraKind::Comment).after_rows());
    }
}
