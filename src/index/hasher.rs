//! Change detection: a cheap modification-time gate followed by a content
//! fingerprint over the head of the file.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use super::record::FileRecord;

/// SHA-256 hex digest of the first `prefix_bytes` of the file.
///
/// Returns the empty string when the file cannot be read; callers treat that
/// as a fingerprint that matches nothing.
pub fn fingerprint(path: &Path, prefix_bytes: usize) -> String {
    match read_prefix(path, prefix_bytes) {
        Ok(prefix) => {
            let mut hasher = Sha256::new();
            hasher.update(&prefix);
            format!("{:x}", hasher.finalize())
        }
        Err(e) => {
            log::warn!("Failed to fingerprint {}: {}", path.display(), e);
            String::new()
        }
    }
}

fn read_prefix(path: &Path, prefix_bytes: usize) -> std::io::Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(prefix_bytes);
    File::open(path)?
        .take(prefix_bytes as u64)
        .read_to_end(&mut prefix)?;
    Ok(prefix)
}

/// Modification time in fractional epoch seconds.
pub fn modified_secs(path: &Path) -> Option<f64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let secs = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    };
    Some(secs)
}

/// Whether `path` needs (re-)extraction relative to its indexed record.
///
/// The fingerprint is only computed when the file is newer than the record,
/// so touching a file costs one hash and rewriting it with an older mtime is
/// not noticed.
pub fn has_changed(path: &Path, record: Option<&FileRecord>, prefix_bytes: usize) -> bool {
    let record = match record {
        Some(record) => record,
        None => return true,
    };
    let mtime = match modified_secs(path) {
        Some(mtime) => mtime,
        None => return false,
    };
    if mtime <= record.modified_time {
        return false;
    }
    let current = fingerprint(path, prefix_bytes);
    current.is_empty() || record.file_hash.is_empty() || current != record.file_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn record_for(path: &Path, prefix_bytes: usize) -> FileRecord {
        FileRecord {
            filename: "a.xlsx".to_string(),
            filepath: path.display().to_string(),
            sheets: Vec::new(),
            row_count: BTreeMap::new(),
            column_names: BTreeMap::new(),
            preview: BTreeMap::new(),
            modified_time: modified_secs(path).unwrap(),
            file_hash: fingerprint(path, prefix_bytes),
            capped_sheets: Vec::new(),
        }
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_fingerprint_covers_only_prefix() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let mut head = vec![7u8; 8192];
        std::fs::write(&a, [head.clone(), b"tail one".to_vec()].concat()).unwrap();
        std::fs::write(&b, [head.clone(), b"tail two".to_vec()].concat()).unwrap();
        assert_eq!(fingerprint(&a, 8192), fingerprint(&b, 8192));
        assert_ne!(fingerprint(&a, 8200), fingerprint(&b, 8200));

        head[0] = 8;
        std::fs::write(&b, head).unwrap();
        assert_ne!(fingerprint(&a, 8192), fingerprint(&b, 8192));
        assert_eq!(fingerprint(&a, 8192).len(), 64);
    }

    #[test]
    fn test_fingerprint_of_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(fingerprint(&dir.path().join("gone.xlsx"), 8192), "");
    }

    #[test]
    fn test_unknown_file_has_changed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xlsx");
        std::fs::write(&path, b"content").unwrap();
        assert!(has_changed(&path, None, 8192));
    }

    #[test]
    fn test_touch_without_content_change_is_not_a_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xlsx");
        std::fs::write(&path, b"content").unwrap();
        let record = record_for(&path, 8192);

        set_mtime(&path, SystemTime::now() + Duration::from_secs(60));
        assert!(!has_changed(&path, Some(&record), 8192));
    }

    #[test]
    fn test_content_change_with_older_mtime_is_not_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xlsx");
        std::fs::write(&path, b"content").unwrap();
        let record = record_for(&path, 8192);

        std::fs::write(&path, b"different content").unwrap();
        set_mtime(&path, SystemTime::now() - Duration::from_secs(3600));
        assert!(!has_changed(&path, Some(&record), 8192));

        set_mtime(&path, SystemTime::now() + Duration::from_secs(60));
        assert!(has_changed(&path, Some(&record), 8192));
    }

    #[test]
    fn test_missing_file_is_not_a_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xlsx");
        std::fs::write(&path, b"content").unwrap();
        let record = record_for(&path, 8192);
        std::fs::remove_file(&path).unwrap();
        assert!(!has_changed(&path, Some(&record), 8192));
    }

    #[test]
    fn test_empty_stored_hash_never_matches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xlsx");
        std::fs::write(&path, b"content").unwrap();
        let mut record = record_for(&path, 8192);
        record.file_hash.clear();
        record.modified_time -= 10.0;
        assert!(has_changed(&path, Some(&record), 8192));
    }
}
