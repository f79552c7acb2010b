// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! `Error` management module
//!
//! Provides all errors raised while opening a container, decoding a sheet
//! and binding rows. Also provides a boxed error alias for listener callbacks.

use std::fmt;

use crate::convert::ConvertError;
use crate::de::DeError;
use crate::utils::column_number_to_name;

/// Boxed error returned by listener callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which shared table an unresolved reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedKind {
    /// Shared string table (`xl/sharedStrings.xml`)
    String,
    /// Shared formula group of the current sheet
    Formula,
}

/// A struct to handle smithsonite specific errors
#[derive(Debug)]
pub enum Error {
    /// Io error
    Io(std::io::Error),
    /// The input is not a recognized zip/xml spreadsheet package
    InvalidContainerFormat {
        /// What failed
        reason: String,
        /// Original low level cause, if any
        source: Option<BoxError>,
    },
    /// A required named part cannot be located in the container
    MissingPart(String),
    /// A container part cannot be read or parsed
    Part {
        /// Part name
        part: String,
        /// Underlying error
        source: Box<Error>,
    },
    /// Xml error
    Xml(quick_xml::Error),
    /// Xml attribute error
    XmlAttr(quick_xml::events::attributes::AttrError),
    /// XML Encoding error
    Encoding(quick_xml::encoding::EncodingError),
    /// Delimited text error
    Csv(csv::Error),
    /// Invalid A1 style cell reference
    CellReference(String),
    /// A shared string or shared formula index without stored entry
    UnresolvedSharedReference {
        /// Table the index points into
        kind: SharedKind,
        /// Missing index
        index: usize,
    },
    /// A cell cannot be converted to the field type
    Conversion {
        /// Row index (0 based)
        row: u32,
        /// Column index (0 based)
        column: u32,
        /// Target field
        field: &'static str,
        /// Converter error
        source: ConvertError,
    },
    /// Two fields claim the same column, or an explicit index is used twice
    HeaderBindingConflict {
        /// Contested column (0 based)
        column: u32,
        /// Field already bound to the column
        first: &'static str,
        /// Field claiming the column again
        second: &'static str,
    },
    /// Converted values cannot build the record
    Deserialize {
        /// Row index (0 based)
        row: u32,
        /// Serde error
        source: DeError,
    },
    /// A listener callback failed
    Listener {
        /// Row index (0 based) if raised while handling a row
        row: Option<u32>,
        /// Listener error
        source: BoxError,
    },
    /// Worksheet not found
    SheetNotFound(String),
    /// Worksheet index out of range
    SheetIndex(usize),
    /// Unexpected structure
    Unexpected(&'static str),
}

from_err!(std::io::Error, Error, Io);
from_err!(quick_xml::Error, Error, Xml);
from_err!(quick_xml::events::attributes::AttrError, Error, XmlAttr);
from_err!(quick_xml::encoding::EncodingError, Error, Encoding);
from_err!(csv::Error, Error, Csv);

impl Error {
    pub(crate) fn invalid_container<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::InvalidContainerFormat {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Row (0 based) the error relates to, if any
    pub fn row(&self) -> Option<u32> {
        match self {
            Error::Conversion { row, .. } | Error::Deserialize { row, .. } => Some(*row),
            Error::Listener { row, .. } => *row,
            _ => None,
        }
    }

    /// True for errors that abort the whole read session regardless of listener policy
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Conversion { .. } | Error::Deserialize { .. } | Error::Listener { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::InvalidContainerFormat { reason, .. } => {
                write!(f, "container: not a valid spreadsheet package: {reason}")
            }
            Error::MissingPart(p) => write!(f, "container: part '{p}' not found"),
            Error::Part { part, source } => write!(f, "part '{part}': {source}"),
            Error::Xml(e) => write!(f, "Xml error: {e}"),
            Error::XmlAttr(e) => write!(f, "Xml attribute error: {e}"),
            Error::Encoding(e) => write!(f, "XML encoding error: {e}"),
            Error::Csv(e) => write!(f, "Csv error: {e}"),
            Error::CellReference(r) => write!(f, "Invalid cell reference '{r}'"),
            Error::UnresolvedSharedReference { kind, index } => {
                let kind = match kind {
                    SharedKind::String => "shared string",
                    SharedKind::Formula => "shared formula group",
                };
                write!(f, "{kind} {index} has no stored entry")
            }
            Error::Conversion {
                row,
                column,
                field,
                source,
            } => write!(
                f,
                "row {}, column {}: field '{field}': {source}",
                *row as u64 + 1,
                column_number_to_name(*column)
            ),
            Error::HeaderBindingConflict {
                column,
                first,
                second,
            } => write!(
                f,
                "header binding: fields '{first}' and '{second}' both claim column {}",
                column_number_to_name(*column)
            ),
            Error::Deserialize { row, source } => {
                write!(f, "row {}: {source}", *row as u64 + 1)
            }
            Error::Listener {
                row: Some(row),
                source,
            } => write!(f, "row {}: listener error: {source}", *row as u64 + 1),
            Error::Listener { row: None, source } => write!(f, "listener error: {source}"),
            Error::SheetNotFound(n) => write!(f, "Worksheet '{n}' not found"),
            Error::SheetIndex(i) => write!(f, "invalid worksheet index: {i}"),
            Error::Unexpected(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::InvalidContainerFormat {
                source: Some(e), ..
            } => Some(e.as_ref()),
            Error::Part { source, .. } => Some(source.as_ref()),
            Error::Xml(e) => Some(e),
            Error::XmlAttr(e) => Some(e),
            Error::Encoding(e) => Some(e),
            Error::Csv(e) => Some(e),
            Error::Conversion { source, .. } => Some(source),
            Error::Deserialize { source, .. } => Some(source),
            Error::Listener { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
