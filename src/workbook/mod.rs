//! Minimal SpreadsheetML (`.xlsx`) reader.
//!
//! A workbook is a ZIP container. Opening one reads only the small index parts
//! (`xl/workbook.xml`, its relationships, the shared string table and the
//! styles); sheet parts are streamed on demand and parsing stops as soon as
//! the requested number of rows has been seen.

mod parts;
mod sheet;
mod styles;

#[cfg(test)]
pub(crate) mod fixtures;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::{Result, SheetIndexError};
use crate::value::{CellValue, Row};

pub use styles::serial_to_iso;

/// Upper bound on decompressed bytes read from a single part (zip-bomb guard).
const MAX_PART_BYTES: u64 = 256 * 1024 * 1024;

/// A sheet as listed in the workbook, with the archive part holding its cells.
#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    part: String,
}

/// Header-mapped contents of one sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetData {
    /// Column labels, stringified and de-duplicated.
    pub columns: Vec<String>,
    /// Data rows below the header, at most the requested limit.
    pub rows: Vec<Row>,
    /// More data rows exist beyond the requested limit.
    pub truncated: bool,
}

/// An opened workbook.
pub struct Workbook {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
    sheets: Vec<SheetEntry>,
    shared_strings: Vec<String>,
    date_styles: styles::DateStyles,
    date1904: bool,
}

impl Workbook {
    /// Open a workbook and read its sheet listing.
    ///
    /// Fails when the file is not a ZIP container or has no workbook part.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let workbook_xml = read_part(&mut archive, "xl/workbook.xml")?.ok_or_else(|| {
            SheetIndexError::Workbook(format!("{} has no xl/workbook.xml", path.display()))
        })?;
        let listing = parts::parse_workbook(&workbook_xml)?;

        let rels = match read_part(&mut archive, "xl/_rels/workbook.xml.rels")? {
            Some(xml) => parts::parse_relationships(&xml)?,
            None => Default::default(),
        };

        let sheets = listing
            .sheets
            .into_iter()
            .enumerate()
            .map(|(idx, declared)| {
                let part = declared
                    .rel_id
                    .as_deref()
                    .and_then(|id| rels.get(id))
                    .map(|target| parts::resolve_target("xl", target))
                    .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", idx + 1));
                SheetEntry {
                    name: declared.name,
                    part,
                }
            })
            .collect();

        let shared_strings = match read_part(&mut archive, "xl/sharedStrings.xml")? {
            Some(xml) => parts::parse_shared_strings(&xml)?,
            None => Vec::new(),
        };

        let date_styles = match read_part(&mut archive, "xl/styles.xml")? {
            Some(xml) => styles::DateStyles::parse(&xml).unwrap_or_else(|e| {
                log::warn!(
                    "Ignoring unreadable styles in {}: {}; dates will stay numeric",
                    path.display(),
                    e
                );
                styles::DateStyles::default()
            }),
            None => styles::DateStyles::default(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            sheets,
            shared_strings,
            date_styles,
            date1904: listing.date1904,
        })
    }

    /// Sheet names in workbook order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Read the header and up to `max_rows` data rows of `sheet`.
    pub fn read_sheet(&mut self, sheet: &str, max_rows: usize) -> Result<SheetData> {
        let entry = self
            .sheets
            .iter()
            .find(|s| s.name == sheet)
            .cloned()
            .ok_or_else(|| SheetIndexError::SheetNotFound {
                file: self.display_name(),
                sheet: sheet.to_string(),
            })?;

        let part = match self.archive.by_name(&entry.part) {
            Ok(part) => part,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(SheetIndexError::Workbook(format!(
                    "sheet '{}' points at missing part {}",
                    entry.name, entry.part
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let ctx = sheet::CellContext {
            shared_strings: &self.shared_strings,
            date_styles: &self.date_styles,
            date1904: self.date1904,
        };
        // Header row plus one probe row past the limit.
        let limit = max_rows.saturating_add(2);
        let raw = sheet::parse_rows(BufReader::new(part.take(MAX_PART_BYTES)), &ctx, limit)?;

        Ok(build_sheet_data(raw, max_rows))
    }

    fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Read a whole (small) part, `None` when the archive lacks it.
fn read_part(archive: &mut ZipArchive<BufReader<File>>, name: &str) -> Result<Option<Vec<u8>>> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    entry.take(MAX_PART_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_PART_BYTES {
        return Err(SheetIndexError::Workbook(format!(
            "part {} exceeds size limit ({} bytes)",
            name, MAX_PART_BYTES
        )));
    }
    Ok(Some(out))
}

/// Map raw rows (first one is the header) onto labelled records.
fn build_sheet_data(raw: Vec<Vec<CellValue>>, max_rows: usize) -> SheetData {
    let mut raw = raw.into_iter();
    let header = match raw.next() {
        Some(header) => header,
        None => return SheetData::default(),
    };
    let mut body: Vec<Vec<CellValue>> = raw.collect();
    let truncated = body.len() > max_rows;
    body.truncate(max_rows);

    let width = body
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);
    let columns = header_labels(&header, width);

    let rows = body
        .into_iter()
        .map(|cells| {
            let mut cells = cells.into_iter();
            let mut row = Row::with_capacity(columns.len());
            for column in &columns {
                row.insert(column.clone(), cells.next().unwrap_or(CellValue::Null));
            }
            row
        })
        .collect();

    SheetData {
        columns,
        rows,
        truncated,
    }
}

/// Stringify header cells; blanks become `Unnamed: <idx>` and repeats get a
/// `.N` suffix.
fn header_labels(header: &[CellValue], width: usize) -> Vec<String> {
    let mut labels: Vec<String> = Vec::with_capacity(width);
    let mut seen: HashSet<String> = HashSet::with_capacity(width);
    for idx in 0..width {
        let base = match header.get(idx) {
            Some(value) if !value.to_string().trim().is_empty() => value.to_string(),
            _ => format!("Unnamed: {}", idx),
        };
        let mut label = base.clone();
        let mut n = 1;
        while seen.contains(&label) {
            label = format!("{}.{}", base, n);
            n += 1;
        }
        seen.insert(label.clone());
        labels.push(label);
    }
    labels
}
