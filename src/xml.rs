// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Forward only tag event parser over an xml part

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;

use crate::errors::Error;
use crate::utils::push_entity;

/// A start element with its decoded attributes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Local name (namespace prefix removed)
    pub name: String,
    /// Attributes as (qualified name, unescaped value), in document order
    pub attributes: Vec<(String, String)>,
}

impl Element {
    /// Value of the attribute with this exact qualified name
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of the first attribute whose local name (after any `prefix:`) matches
    pub fn attr_local(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.rsplit(':').next() == Some(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Events produced by [`TagParser`]
#[derive(Debug, Clone, PartialEq)]
pub enum TagEvent {
    /// Element start (self closing elements produce a start and an end)
    Start(Element),
    /// Text content, entities resolved. Adjacent text is merged.
    Characters(String),
    /// Element end, local name
    End(String),
}

/// Streams [`TagEvent`]s from an xml document.
///
/// Only the event under the cursor is held in memory, plus reusable buffers.
pub struct TagParser<R: BufRead> {
    xml: XmlReader<R>,
    buf: Vec<u8>,
    text: String,
    pending: Option<TagEvent>,
    done: bool,
    part: Option<String>,
}

impl<R: BufRead> TagParser<R> {
    /// Wraps a buffered reader
    pub fn new(reader: R) -> Self {
        let mut xml = XmlReader::from_reader(reader);
        let config = xml.config_mut();
        config.check_end_names = false;
        config.trim_text(false);
        config.check_comments = false;
        config.expand_empty_elements = true;
        TagParser {
            xml,
            buf: Vec::with_capacity(1024),
            text: String::new(),
            pending: None,
            done: false,
            part: None,
        }
    }

    /// Names the container part being parsed in errors
    pub fn with_part(mut self, part: impl Into<String>) -> Self {
        self.part = Some(part.into());
        self
    }

    /// Next event, `None` at end of document
    pub fn next_event(&mut self) -> Result<Option<TagEvent>, Error> {
        match (self.read_event(), &self.part) {
            (Err(e), Some(part)) => Err(Error::Part {
                part: part.clone(),
                source: Box::new(e),
            }),
            (r, _) => r,
        }
    }

    fn read_event(&mut self) -> Result<Option<TagEvent>, Error> {
        if let Some(ev) = self.pending.take() {
            return Ok(Some(ev));
        }
        if self.done {
            return Ok(None);
        }
        self.text.clear();
        loop {
            self.buf.clear();
            let next = match self.xml.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => Some(TagEvent::Start(element(&self.xml, e)?)),
                Event::End(ref e) => Some(TagEvent::End(
                    String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                )),
                Event::Text(t) => {
                    self.text.push_str(&t.xml10_content()?);
                    None
                }
                Event::CData(t) => {
                    self.text.push_str(&t.decode()?);
                    None
                }
                Event::GeneralRef(e) => {
                    push_entity(&e, &mut self.text)?;
                    None
                }
                Event::Eof => {
                    self.done = true;
                    if self.text.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(TagEvent::Characters(std::mem::take(&mut self.text))));
                }
                _ => None,
            };
            if let Some(ev) = next {
                if self.text.is_empty() {
                    return Ok(Some(ev));
                }
                self.pending = Some(ev);
                return Ok(Some(TagEvent::Characters(std::mem::take(&mut self.text))));
            }
        }
    }

    /// Skips events up to and including the end of the element just started
    pub fn skip_element(&mut self) -> Result<(), Error> {
        let mut depth = 1usize;
        while let Some(ev) = self.next_event()? {
            match ev {
                TagEvent::Start(_) => depth += 1,
                TagEvent::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                TagEvent::Characters(_) => (),
            }
        }
        Ok(())
    }

    /// Concatenated text up to the end of the element just started
    pub fn read_text(&mut self) -> Result<String, Error> {
        let mut value = String::new();
        let mut depth = 1usize;
        while let Some(ev) = self.next_event()? {
            match ev {
                TagEvent::Start(_) => depth += 1,
                TagEvent::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                TagEvent::Characters(t) => value.push_str(&t),
            }
        }
        Ok(value)
    }
}

impl<R: BufRead> Iterator for TagParser<R> {
    type Item = Result<TagEvent, Error>;
    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(ev) => ev.map(Ok),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn element<R>(xml: &XmlReader<R>, e: &BytesStart<'_>) -> Result<Element, Error> {
    let mut attributes = Vec::new();
    for a in e.attributes() {
        let a = a?;
        let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
        let value = a.decode_and_unescape_value(xml.decoder())?.into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(xml: &str) -> Vec<TagEvent> {
        TagParser::new(xml.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn empty_elements_are_expanded() {
        let ev = events(r#"<x:c r="A1" t="s"/>"#);
        assert_eq!(ev.len(), 2);
        match &ev[0] {
            TagEvent::Start(e) => {
                assert_eq!(e.name, "c");
                assert_eq!(e.attr("r"), Some("A1"));
                assert_eq!(e.attr("t"), Some("s"));
            }
            e => panic!("unexpected {e:?}"),
        }
        assert_eq!(ev[1], TagEvent::End("c".to_string()));
    }

    #[test]
    fn text_with_entities_is_merged() {
        let ev = events("<t>a &amp; b &#x41;&lt;</t>");
        assert_eq!(ev[1], TagEvent::Characters("a & b A<".to_string()));
        assert_eq!(ev.len(), 3);
    }

    #[test]
    fn namespaced_attributes() {
        let ev = events(r#"<sheet name="S" r:id="rId3"/>"#);
        let TagEvent::Start(e) = &ev[0] else {
            panic!("expected start");
        };
        assert_eq!(e.attr_local("id"), Some("rId3"));
        assert_eq!(e.attr("id"), None);
    }

    #[test]
    fn errors_name_the_part() {
        let mut p = TagParser::new(r#"<row><c r="A2 t="s"></c></row>"#.as_bytes())
            .with_part("xl/worksheets/sheet1.xml");
        assert!(matches!(p.next_event(), Ok(Some(TagEvent::Start(_)))));
        match p.next_event() {
            Err(e @ Error::Part { .. }) => {
                assert!(e
                    .to_string()
                    .starts_with("part 'xl/worksheets/sheet1.xml': Xml"));
            }
            r => panic!("unexpected {r:?}"),
        }
    }

    #[test]
    fn read_text_concatenates_runs() {
        let mut p = TagParser::new("<si><r><t>ab</t></r><r><t>cd</t></r></si><x/>".as_bytes());
        assert!(matches!(p.next_event().unwrap(), Some(TagEvent::Start(_))));
        assert_eq!(p.read_text().unwrap(), "abcd");
        assert!(matches!(p.next_event().unwrap(), Some(TagEvent::Start(e)) if e.name == "x"));
    }
}
