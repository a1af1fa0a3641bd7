//! Turns one workbook on disk into a [`FileRecord`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::hasher;
use super::record::FileRecord;
use crate::config::IndexConfig;
use crate::error::{Result, SheetIndexError};
use crate::workbook::Workbook;

/// Limits applied while extracting a workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Maximum data rows read per sheet.
    pub row_cap: usize,
    pub preview_rows: usize,
    pub hash_prefix_bytes: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            row_cap: 1000,
            preview_rows: 5,
            hash_prefix_bytes: 8192,
        }
    }
}

impl From<&IndexConfig> for ExtractOptions {
    fn from(config: &IndexConfig) -> Self {
        Self {
            row_cap: config.row_cap,
            preview_rows: config.preview_rows,
            hash_prefix_bytes: config.hash_prefix_bytes,
        }
    }
}

/// Extract sheet names, row counts, column names and a preview sample.
///
/// A sheet that cannot be read is recorded with no rows and no columns; only
/// a workbook that cannot be opened at all fails the whole file.
pub fn extract(path: &Path, opts: &ExtractOptions) -> Result<FileRecord> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SheetIndexError::InvalidInput(format!("not a file: {}", path.display())))?;

    let mut workbook = Workbook::open(path)?;
    let sheets = workbook.sheet_names();

    let mut row_count = BTreeMap::new();
    let mut column_names = BTreeMap::new();
    let mut preview = BTreeMap::new();
    let mut capped_sheets = Vec::new();

    for sheet in &sheets {
        match workbook.read_sheet(sheet, opts.row_cap) {
            Ok(data) => {
                if data.truncated {
                    capped_sheets.push(sheet.clone());
                }
                row_count.insert(sheet.clone(), data.rows.len());
                preview.insert(
                    sheet.clone(),
                    data.rows.into_iter().take(opts.preview_rows).collect(),
                );
                column_names.insert(sheet.clone(), data.columns);
            }
            Err(e) => {
                log::warn!("Error processing sheet '{}' in {}: {}", sheet, filename, e);
                row_count.insert(sheet.clone(), 0);
                column_names.insert(sheet.clone(), Vec::new());
                preview.insert(sheet.clone(), Vec::new());
            }
        }
    }

    Ok(FileRecord {
        filename,
        filepath: path.display().to_string(),
        sheets,
        row_count,
        column_names,
        preview,
        modified_time: hasher::modified_secs(path).unwrap_or(0.0),
        file_hash: hasher::fingerprint(path, opts.hash_prefix_bytes),
        capped_sheets,
    })
}

/// [`extract`] on a worker thread, giving up after `budget`.
///
/// A timed-out worker is left to finish on its own; its result is dropped.
/// A zero budget runs the extraction inline.
pub fn extract_with_budget(
    path: &Path,
    opts: &ExtractOptions,
    budget: Duration,
) -> Result<FileRecord> {
    if budget.is_zero() {
        return extract(path, opts);
    }

    let (tx, rx) = mpsc::channel();
    let owned: PathBuf = path.to_path_buf();
    let opts = *opts;
    thread::Builder::new()
        .name("sheetindex-extract".to_string())
        .spawn(move || {
            let _ = tx.send(extract(&owned, &opts));
        })?;

    match rx.recv_timeout(budget) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SheetIndexError::Timeout(format!(
            "extracting {} took longer than {}s",
            path.display(),
            budget.as_secs_f64()
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(SheetIndexError::Task(format!(
            "extraction worker for {} exited without a result",
            path.display()
        ))),
    }
}
