use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::value::Row;

/// Indexed metadata and preview sample for one workbook.
///
/// Field names match the on-disk snapshot; the snake_case aliases accept
/// snapshots written by earlier versions of the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub filepath: String,
    pub sheets: Vec<String>,
    #[serde(rename = "rowCount", alias = "row_count")]
    pub row_count: BTreeMap<String, usize>,
    #[serde(rename = "columnNames", alias = "column_names")]
    pub column_names: BTreeMap<String, Vec<String>>,
    pub preview: BTreeMap<String, Vec<Row>>,
    #[serde(rename = "modifiedTime", alias = "modified_time", default)]
    pub modified_time: f64,
    #[serde(rename = "fileHash", alias = "file_hash", default)]
    pub file_hash: String,
    /// Sheets whose row count stopped at the extraction cap.
    #[serde(
        rename = "cappedSheets",
        alias = "capped_sheets",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub capped_sheets: Vec<String>,
}

impl FileRecord {
    /// Every sheet appears in `sheets`, `rowCount`, `columnNames` and
    /// `preview`, and each preview is no longer than its row count.
    pub fn is_consistent(&self) -> bool {
        let sheets: BTreeSet<&String> = self.sheets.iter().collect();
        if sheets.len() != self.sheets.len() {
            return false;
        }
        let same_keys = |keys: Vec<&String>| keys.into_iter().collect::<BTreeSet<_>>() == sheets;
        same_keys(self.row_count.keys().collect())
            && same_keys(self.column_names.keys().collect())
            && same_keys(self.preview.keys().collect())
            && self
                .preview
                .iter()
                .all(|(sheet, rows)| rows.len() <= self.row_count.get(sheet).copied().unwrap_or(0))
    }

    pub fn is_capped(&self, sheet: &str) -> bool {
        self.capped_sheets.iter().any(|s| s == sheet)
    }
}

/// The aggregate index: every indexed file plus the time of the last scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Index {
    #[serde(rename = "lastRefreshTime", alias = "last_refresh_time", default)]
    pub last_refresh_time: f64,
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
}

/// Result of a refresh pass. Unchanged files appear in none of the lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Structure of one file as reported by `list_files`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub sheets: Vec<String>,
    #[serde(rename = "rowCount")]
    pub row_count: BTreeMap<String, usize>,
    #[serde(rename = "columnNames")]
    pub column_names: BTreeMap<String, Vec<String>>,
    #[serde(rename = "cappedSheets", skip_serializing_if = "Vec::is_empty")]
    pub capped_sheets: Vec<String>,
}

impl From<&FileRecord> for FileSummary {
    fn from(record: &FileRecord) -> Self {
        Self {
            sheets: record.sheets.clone(),
            row_count: record.row_count.clone(),
            column_names: record.column_names.clone(),
            capped_sheets: record.capped_sheets.clone(),
        }
    }
}

/// Every indexed file plus the change report of the refresh that preceded it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileListing {
    pub files: BTreeMap<String, FileSummary>,
    pub changes: ChangeSet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::CellValue;
    use serde_json::json;

    fn record() -> FileRecord {
        let row: Row = vec![("Submarket", CellValue::text("Midtown"))]
            .into_iter()
            .collect();
        FileRecord {
            filename: "comps.xlsx".to_string(),
            filepath: "/data/comps.xlsx".to_string(),
            sheets: vec!["Sales".to_string()],
            row_count: BTreeMap::from([("Sales".to_string(), 1)]),
            column_names: BTreeMap::from([("Sales".to_string(), vec!["Submarket".to_string()])]),
            preview: BTreeMap::from([("Sales".to_string(), vec![row])]),
            modified_time: 1_700_000_000.25,
            file_hash: "abc".to_string(),
            capped_sheets: Vec::new(),
        }
    }

    #[test]
    fn test_record_serializes_with_snapshot_field_names() {
        let value = serde_json::to_value(record()).unwrap();
        assert_eq!(
            value,
            json!({
                "filename": "comps.xlsx",
                "filepath": "/data/comps.xlsx",
                "sheets": ["Sales"],
                "rowCount": {"Sales": 1},
                "columnNames": {"Sales": ["Submarket"]},
                "preview": {"Sales": [{"Submarket": "Midtown"}]},
                "modifiedTime": 1_700_000_000.25,
                "fileHash": "abc"
            })
        );
    }

    #[test]
    fn test_record_accepts_legacy_snake_case() {
        let legacy = json!({
            "filename": "comps.xlsx",
            "filepath": "/data/comps.xlsx",
            "sheets": ["Sales"],
            "row_count": {"Sales": 1},
            "column_names": {"Sales": ["Submarket"]},
            "preview": {"Sales": [{"Submarket": "Midtown"}]}
        });
        let parsed: FileRecord = serde_json::from_value(legacy).unwrap();
        assert_eq!(parsed.modified_time, 0.0);
        assert_eq!(parsed.file_hash, "");
        assert!(parsed.is_consistent());
    }

    #[test]
    fn test_inconsistent_key_sets_are_detected() {
        let mut bad = record();
        bad.column_names.clear();
        assert!(!bad.is_consistent());

        let mut too_long = record();
        too_long.row_count.insert("Sales".to_string(), 0);
        assert!(!too_long.is_consistent());
    }

    #[test]
    fn test_change_set_is_empty() {
        assert!(ChangeSet::default().is_empty());
        let changes = ChangeSet {
            removed: vec!["old.xlsx".to_string()],
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }
}
