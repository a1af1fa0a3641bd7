//! Plain-text rendering of index results for tool callers.
//!
//! Every function here is total: any input shape produces a finite string.

use std::collections::BTreeMap;

use crate::index::{ChangeSet, FileListing, Match, SearchResults};
use crate::mcp::tools::SHEET_DATA_TOOL;
use crate::value::{CellValue, Row};

/// Longest cell rendered in a table before truncation.
const MAX_CELL_CHARS: usize = 50;
const LISTED_COLUMNS: usize = 5;
const EXAMPLE_VALUES: usize = 5;
const SUGGESTED_ROWS: usize = 50;

fn read_hint(filename: &str, sheet: &str) -> String {
    format!(
        "    To view this sheet, use: {}(filename='{}', sheet_name='{}', max_rows={})",
        SHEET_DATA_TOOL, filename, sheet, SUGGESTED_ROWS
    )
}

pub fn format_file_listing(listing: &FileListing) -> String {
    let mut out = vec![format!("Found {} Excel files:", listing.files.len())];

    let changes = &listing.changes;
    if !changes.is_empty() {
        out.push("\n## Recent Changes".to_string());
        if !changes.added.is_empty() {
            out.push(format!("  - Newly added files: {}", changes.added.join(", ")));
        }
        if !changes.updated.is_empty() {
            out.push(format!("  - Updated files: {}", changes.updated.join(", ")));
        }
        if !changes.removed.is_empty() {
            out.push(format!("  - Removed files: {}", changes.removed.join(", ")));
        }
    }

    for (filename, info) in &listing.files {
        out.push(format!("\n## {}", filename));
        for sheet in &info.sheets {
            out.push(format!("  - Sheet: {}", sheet));
            let rows = info.row_count.get(sheet).copied().unwrap_or(0);
            if info.capped_sheets.contains(sheet) {
                out.push(format!("    - Rows: at least {}", rows));
            } else {
                out.push(format!("    - Rows: {}", rows));
            }
            let columns = info.column_names.get(sheet).map(Vec::as_slice).unwrap_or(&[]);
            let shown: Vec<&str> = columns
                .iter()
                .take(LISTED_COLUMNS)
                .map(String::as_str)
                .collect();
            out.push(format!("    - Columns: {}", shown.join(", ")));
            if columns.len() > LISTED_COLUMNS {
                out.push(format!(
                    "      and {} more columns...",
                    columns.len() - LISTED_COLUMNS
                ));
            }
        }
    }

    out.join("\n")
}

/// Matched values for one column, in first-seen order.
#[derive(Default)]
struct ColumnHits {
    distinct: Vec<String>,
    total: usize,
}

pub fn format_search_results(query: &str, results: &SearchResults) -> String {
    if results.is_empty() {
        return format!("No matches found for '{}' in any Excel file.", query);
    }

    let mut out = vec![format!(
        "Found matches for '{}' in {} Excel files:",
        query,
        results.len()
    )];

    for (filename, matches) in results {
        out.push(format!("\n## {}", filename));

        // Sheets in first-match order.
        let mut column_matches: Vec<(&str, Vec<&str>)> = Vec::new();
        let mut data_matches: Vec<(&str, usize, Vec<(&str, ColumnHits)>)> = Vec::new();

        for m in matches {
            match m {
                Match::ColumnMatch {
                    sheet,
                    matching_columns,
                } => {
                    let idx = match column_matches.iter().position(|(s, _)| *s == sheet.as_str()) {
                        Some(idx) => idx,
                        None => {
                            column_matches.push((sheet.as_str(), Vec::new()));
                            column_matches.len() - 1
                        }
                    };
                    column_matches[idx]
                        .1
                        .extend(matching_columns.iter().map(String::as_str));
                }
                Match::DataMatch {
                    sheet,
                    column,
                    value,
                    ..
                } => {
                    let idx = match data_matches.iter().position(|(s, _, _)| *s == sheet.as_str()) {
                        Some(idx) => idx,
                        None => {
                            data_matches.push((sheet.as_str(), 0, Vec::new()));
                            data_matches.len() - 1
                        }
                    };
                    let entry = &mut data_matches[idx];
                    entry.1 += 1;
                    let col_idx = match entry.2.iter().position(|(c, _)| *c == column.as_str()) {
                        Some(col_idx) => col_idx,
                        None => {
                            entry.2.push((column.as_str(), ColumnHits::default()));
                            entry.2.len() - 1
                        }
                    };
                    let hits = &mut entry.2[col_idx].1;
                    hits.total += 1;
                    let quoted = format!("'{}'", value);
                    if !hits.distinct.contains(&quoted) {
                        hits.distinct.push(quoted);
                    }
                }
            }
        }

        if !column_matches.is_empty() {
            out.push("  Column matches:".to_string());
            for (sheet, mut columns) in column_matches {
                columns.sort_unstable();
                columns.dedup();
                out.push(format!(
                    "  - Sheet '{}' has matching columns: {}",
                    sheet,
                    columns.join(", ")
                ));
                out.push(read_hint(filename, sheet));
            }
        }

        if !data_matches.is_empty() {
            out.push("  Data matches:".to_string());
            for (sheet, count, columns) in data_matches {
                out.push(format!(
                    "  - Sheet '{}' has {} matching data points:",
                    sheet, count
                ));
                for (column, hits) in columns {
                    let shown: Vec<&str> = hits
                        .distinct
                        .iter()
                        .take(EXAMPLE_VALUES)
                        .map(String::as_str)
                        .collect();
                    let mut line = format!("    - Column '{}': {}", column, shown.join(", "));
                    if shown.len() < hits.total {
                        line.push_str(&format!(" (+{} more)", hits.total - shown.len()));
                    }
                    out.push(line);
                }
                out.push(read_hint(filename, sheet));
            }
        }
    }

    out.join("\n")
}

/// Table cell text: numbers verbatim, everything else pipe-escaped and cut
/// to 50 characters.
fn table_cell(value: Option<&CellValue>) -> String {
    let value = match value {
        Some(value) => value,
        None => return String::new(),
    };
    if value.is_number() {
        return value.to_string();
    }
    let escaped = value.to_string().replace('|', "\\|");
    if escaped.chars().count() > MAX_CELL_CHARS {
        let cut: String = escaped.chars().take(MAX_CELL_CHARS - 3).collect();
        format!("{}...", cut)
    } else {
        escaped
    }
}

/// Markdown table with one column per key of the first row.
fn render_table(rows: &[Row]) -> Vec<String> {
    let columns: Vec<&str> = match rows.first() {
        Some(first) => first.columns().collect(),
        None => return Vec::new(),
    };
    let header: Vec<String> = columns.iter().map(|c| c.replace('|', "\\|")).collect();

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(format!("| {} |", header.join(" | ")));
    out.push(format!("| {} |", vec!["---"; columns.len()].join(" | ")));
    for row in rows {
        let cells: Vec<String> = columns.iter().map(|c| table_cell(row.get(c))).collect();
        out.push(format!("| {} |", cells.join(" | ")));
    }
    out
}

pub fn format_sheet_table(filename: &str, sheet: &str, rows: &[Row]) -> String {
    if rows.is_empty() {
        return format!(
            "No data found or unable to read sheet '{}' in file '{}'.",
            sheet, filename
        );
    }
    let mut out = vec![format!(
        "Data from sheet '{}' in file '{}' (showing {} rows):",
        sheet,
        filename,
        rows.len()
    )];
    out.push(String::new());
    out.extend(render_table(rows));
    out.join("\n")
}

/// Preview rows of every sheet, one table per sheet.
pub fn format_preview(filename: &str, preview: &BTreeMap<String, Vec<Row>>) -> String {
    let mut out = vec![format!("Preview of '{}':", filename)];
    for (sheet, rows) in preview {
        out.push(format!("\n## {}", sheet));
        if rows.is_empty() {
            out.push("(no rows)".to_string());
        } else {
            out.extend(render_table(rows));
        }
    }
    out.join("\n")
}

pub fn format_changes(changes: &ChangeSet, total_files: usize) -> String {
    let mut out = vec!["Excel file index has been refreshed.".to_string()];

    let sections = [
        ("Newly indexed files", &changes.added),
        ("Updated files", &changes.updated),
        ("Files no longer available", &changes.removed),
    ];
    for (title, files) in sections {
        if files.is_empty() {
            continue;
        }
        out.push(format!("\n{} ({}):", title, files.len()));
        out.extend(files.iter().map(|f| format!("- {}", f)));
    }

    if changes.is_empty() {
        out.push("\nNo changes detected. Index is up to date.".to_string());
    }
    out.push(format!("\nIndexed files: {}", total_files));
    out.join("\n")
}
