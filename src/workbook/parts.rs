//! Parsers for the workbook index parts: sheet listing, relationships and the
//! shared string table.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, SheetIndexError};

/// A `<sheet>` element of `xl/workbook.xml`.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct DeclaredSheet {
    pub name: String,
    pub rel_id: Option<String>,
}

#[derive(Debug, Default)]
pub(super) struct WorkbookListing {
    pub sheets: Vec<DeclaredSheet>,
    pub date1904: bool,
}

pub(super) fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Attribute matched on its local name, ignoring any namespace prefix.
fn attr_local(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> SheetIndexError {
    SheetIndexError::Workbook(format!("malformed {}: {}", part, e))
}

pub(super) fn parse_workbook(xml: &[u8]) -> Result<WorkbookListing> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut listing = WorkbookListing::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"sheet" => {
                    if let Some(name) = attr(&e, b"name") {
                        listing.sheets.push(DeclaredSheet {
                            name,
                            rel_id: attr_local(&e, b"id"),
                        });
                    }
                }
                b"workbookPr" => {
                    listing.date1904 = matches!(
                        attr(&e, b"date1904").as_deref(),
                        Some("1") | Some("true")
                    );
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("xl/workbook.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(listing)
}

/// Relationship id to target, from `xl/_rels/workbook.xml.rels`.
pub(super) fn parse_relationships(xml: &[u8]) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rels = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    rels.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("xl/_rels/workbook.xml.rels", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// Resolve a relationship target against the directory of its source part.
pub(super) fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{}/{}", base_dir, target),
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Shared string table. Rich-text runs are concatenated; phonetic hints are
/// dropped.
pub(super) fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => in_t = current.is_some(),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(t)) if in_t => {
                let text = t
                    .unescape()
                    .map_err(|e| xml_error("xl/sharedStrings.xml", e))?;
                if let Some(s) = current.as_mut() {
                    s.push_str(&text);
                }
            }
            Ok(Event::CData(t)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                b"si" => {
                    if let Some(s) = current.take() {
                        strings.push(s);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("xl/sharedStrings.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}
