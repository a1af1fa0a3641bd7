//! JSON snapshot of the index on disk.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::record::Index;
use crate::error::Result;

/// What `load` found at the snapshot path.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Index),
    Missing,
    /// The snapshot could not be parsed. It was moved aside to `backup`
    /// unless the rename itself failed.
    Corrupt { backup: Option<PathBuf> },
}

/// Reads and writes the index snapshot.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> LoadOutcome {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LoadOutcome::Missing,
            Err(e) => {
                log::error!("Failed to read index snapshot {}: {}", self.path.display(), e);
                return LoadOutcome::Missing;
            }
        };

        match serde_json::from_slice::<Index>(&bytes) {
            Ok(mut index) => {
                index.files.retain(|name, record| {
                    let keep = record.is_consistent() && record.filename == *name;
                    if !keep {
                        log::warn!("Dropping inconsistent snapshot entry for {}", name);
                    }
                    keep
                });
                log::info!(
                    "Loaded index snapshot with {} files from {}",
                    index.files.len(),
                    self.path.display()
                );
                LoadOutcome::Loaded(index)
            }
            Err(e) => {
                log::error!("Index snapshot {} is corrupt: {}", self.path.display(), e);
                LoadOutcome::Corrupt {
                    backup: self.back_up(),
                }
            }
        }
    }

    /// Move the current snapshot to `<path>.bak.<unix-seconds>`.
    fn back_up(&self) -> Option<PathBuf> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".bak.{}", stamp));
        let backup = PathBuf::from(name);

        match std::fs::rename(&self.path, &backup) {
            Ok(()) => {
                log::warn!("Backed up corrupt index snapshot to {}", backup.display());
                Some(backup)
            }
            Err(e) => {
                log::error!(
                    "Failed to back up corrupt index snapshot {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Write the whole snapshot, replacing the previous one atomically.
    pub fn save(&self, index: &Index) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp_name = self.path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let json = serde_json::to_vec_pretty(index)?;
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        log::debug!("Saved index snapshot to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::record::FileRecord;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_index() -> Index {
        let record = FileRecord {
            filename: "a.xlsx".to_string(),
            filepath: "/tmp/a.xlsx".to_string(),
            sheets: vec!["S".to_string()],
            row_count: BTreeMap::from([("S".to_string(), 0)]),
            column_names: BTreeMap::from([("S".to_string(), Vec::new())]),
            preview: BTreeMap::from([("S".to_string(), Vec::new())]),
            modified_time: 12.5,
            file_hash: "hash".to_string(),
            capped_sheets: Vec::new(),
        };
        Index {
            last_refresh_time: 100.0,
            files: BTreeMap::from([("a.xlsx".to_string(), record)]),
        }
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("index.json"));
        assert!(matches!(store.load(), LoadOutcome::Missing));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("nested/index.json"));
        let index = sample_index();
        store.save(&index).unwrap();
        assert!(!dir.path().join("nested/index.json.tmp").exists());

        match store.load() {
            LoadOutcome::Loaded(loaded) => assert_eq!(loaded, index),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_snapshot_is_backed_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = IndexStore::new(&path);

        let backup = match store.load() {
            LoadOutcome::Corrupt { backup: Some(backup) } => backup,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert!(!path.exists());
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("index.json.bak."));
        assert_eq!(std::fs::read(&backup).unwrap(), b"{ not json");
    }

    #[test]
    fn test_inconsistent_entries_are_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        let mut index = sample_index();
        let mut broken = index.files["a.xlsx"].clone();
        broken.filename = "b.xlsx".to_string();
        broken.preview.clear();
        index.files.insert("b.xlsx".to_string(), broken);
        std::fs::write(&path, serde_json::to_vec(&index).unwrap()).unwrap();

        match IndexStore::new(&path).load() {
            LoadOutcome::Loaded(loaded) => {
                assert_eq!(loaded.files.keys().collect::<Vec<_>>(), vec!["a.xlsx"]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_loads_legacy_field_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(
            &path,
            br#"{"last_refresh_time": 5.0, "files": {"a.xlsx": {
                "filename": "a.xlsx", "filepath": "/x/a.xlsx", "sheets": ["S"],
                "row_count": {"S": 1}, "column_names": {"S": ["Rent"]},
                "preview": {"S": [{"Rent": 1200}]},
                "modified_time": 3.0, "file_hash": "abc"}}}"#,
        )
        .unwrap();

        match IndexStore::new(&path).load() {
            LoadOutcome::Loaded(index) => {
                assert_eq!(index.last_refresh_time, 5.0);
                assert_eq!(index.files["a.xlsx"].file_hash, "abc");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
