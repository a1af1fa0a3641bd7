//! Containment search over column names and preview cells.

use serde::Serialize;
use std::collections::BTreeMap;

use super::record::FileRecord;
use crate::value::CellValue;

/// One hit inside a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Match {
    ColumnMatch {
        sheet: String,
        #[serde(rename = "matchingColumns")]
        matching_columns: Vec<String>,
    },
    DataMatch {
        sheet: String,
        /// Zero-based index into the sheet preview.
        row: usize,
        column: String,
        value: CellValue,
    },
}

impl Match {
    pub fn sheet(&self) -> &str {
        match self {
            Match::ColumnMatch { sheet, .. } | Match::DataMatch { sheet, .. } => sheet,
        }
    }
}

/// Filename to its hits; files without hits are absent.
pub type SearchResults = BTreeMap<String, Vec<Match>>;

/// Case-insensitive substring hits in one record: column matches for every
/// sheet first, then preview cell matches, sheets in workbook order.
pub fn search_record(record: &FileRecord, needle_lower: &str) -> Vec<Match> {
    let mut matches = Vec::new();

    for sheet in &record.sheets {
        let matching_columns: Vec<String> = record
            .column_names
            .get(sheet)
            .map(|columns| {
                columns
                    .iter()
                    .filter(|c| c.to_lowercase().contains(needle_lower))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if !matching_columns.is_empty() {
            matches.push(Match::ColumnMatch {
                sheet: sheet.clone(),
                matching_columns,
            });
        }
    }

    for sheet in &record.sheets {
        let rows = match record.preview.get(sheet) {
            Some(rows) => rows,
            None => continue,
        };
        for (idx, row) in rows.iter().enumerate() {
            for (column, value) in row.iter() {
                if value.to_string().to_lowercase().contains(needle_lower) {
                    matches.push(Match::DataMatch {
                        sheet: sheet.clone(),
                        row: idx,
                        column: column.to_string(),
                        value: value.clone(),
                    });
                }
            }
        }
    }

    matches
}

/// Search every record. A blank query matches nothing.
pub fn search_records<'a, I>(records: I, query: &str) -> SearchResults
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return SearchResults::new();
    }
    records
        .into_iter()
        .filter_map(|record| {
            let hits = search_record(record, &needle);
            (!hits.is_empty()).then(|| (record.filename.clone(), hits))
        })
        .collect()
}
