//! The index manager owns the in-memory index and coordinates refresh,
//! search and sheet reads.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use walkdir::WalkDir;

use super::extractor::{self, ExtractOptions};
use super::hasher;
use super::record::{ChangeSet, FileListing, FileRecord, FileSummary, Index};
use super::search::{self, SearchResults};
use super::store::{IndexStore, LoadOutcome};
use crate::config::{Config, IndexConfig, ReadConfig};
use crate::error::{Result, SheetIndexError};
use crate::value::Row;
use crate::workbook::Workbook;

/// Outcome of a direct sheet read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Rows(Vec<Row>),
    FileNotFound,
    SheetNotFound,
    Failed(String),
}

impl ReadOutcome {
    /// Rows read, empty for every other outcome.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            ReadOutcome::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }
}

/// Work decided for one file during a refresh scan.
enum Pending {
    Add(PathBuf),
    Update(PathBuf),
}

/// Modification time and fingerprint of a file as last seen on disk.
#[derive(Debug, Clone, PartialEq)]
struct FileIdentity {
    modified: Option<f64>,
    hash: String,
}

pub struct IndexManager {
    config: IndexConfig,
    read: ReadConfig,
    extract: ExtractOptions,
    extract_budget: Duration,
    store: IndexStore,
    index: RwLock<Index>,
    /// Serializes refreshes and lazy indexing.
    mutation: Mutex<()>,
    /// Files whose extraction ran out of time. They are not retried until
    /// their identity changes, so abandoned workers cannot pile up.
    timed_out: Mutex<HashMap<PathBuf, FileIdentity>>,
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A bare file name; anything that could leave the watched directory is
/// rejected.
fn is_plain_filename(filename: &str) -> bool {
    !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(['/', '\\'])
        && !filename.contains("..")
}

impl IndexManager {
    /// Load the snapshot (or build a fresh index when there is none) and
    /// make sure the watched directory exists.
    pub fn open(config: &Config) -> Result<Self> {
        let index_config = config.index.clone();
        std::fs::create_dir_all(&index_config.watch_dir)?;

        let store = IndexStore::new(&index_config.snapshot_path);
        let (index, needs_refresh) = match store.load() {
            LoadOutcome::Loaded(index) => (index, false),
            LoadOutcome::Missing => {
                log::info!(
                    "No index snapshot at {}; building a new index",
                    store.path().display()
                );
                (Index::default(), true)
            }
            LoadOutcome::Corrupt { .. } => (Index::default(), true),
        };

        let manager = Self {
            extract: ExtractOptions::from(&index_config),
            extract_budget: Duration::from_secs(index_config.extract_timeout_secs),
            config: index_config,
            read: config.read.clone(),
            store,
            index: RwLock::new(index),
            mutation: Mutex::new(()),
            timed_out: Mutex::new(HashMap::new()),
        };

        if needs_refresh {
            let changes = manager.refresh()?;
            log::info!("Initial index build: {} files indexed", changes.added.len());
        }

        Ok(manager)
    }

    /// Persist the index one last time.
    pub fn shutdown(&self) -> Result<()> {
        let snapshot = self.read_index().clone();
        self.store.save(&snapshot)?;
        log::info!("Index manager shut down ({} files)", snapshot.files.len());
        Ok(())
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn read_config(&self) -> &ReadConfig {
        &self.read
    }

    fn read_index(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_mutation(&self) -> MutexGuard<'_, ()> {
        self.mutation.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Files in the watched directory with the configured extension, keyed
    /// by file name. Hidden files and office lock files (`~$...`) are skipped.
    fn scan(&self) -> Result<BTreeMap<String, PathBuf>> {
        let extension = self.config.normalized_extension();
        let mut files = BTreeMap::new();

        for entry in WalkDir::new(&self.config.watch_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name.starts_with("~$") {
                continue;
            }
            let matches_extension = entry
                .path()
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase() == extension)
                .unwrap_or(false);
            if matches_extension {
                files.insert(name, entry.into_path());
            }
        }

        Ok(files)
    }

    fn lock_timed_out(&self) -> MutexGuard<'_, HashMap<PathBuf, FileIdentity>> {
        self.timed_out.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn identity(&self, path: &Path) -> FileIdentity {
        FileIdentity {
            modified: hasher::modified_secs(path),
            hash: hasher::fingerprint(path, self.config.hash_prefix_bytes),
        }
    }

    /// Whether `path` timed out before and is still the same file.
    fn timed_out_unchanged(&self, path: &Path) -> bool {
        match self.lock_timed_out().get(path) {
            Some(seen) => *seen == self.identity(path),
            None => false,
        }
    }

    fn extract_file(&self, path: &Path) -> Result<FileRecord> {
        if self.timed_out_unchanged(path) {
            return Err(SheetIndexError::Timeout(format!(
                "{} timed out earlier and has not changed since",
                path.display()
            )));
        }
        let identity = self.identity(path);
        match extractor::extract_with_budget(path, &self.extract, self.extract_budget) {
            Err(SheetIndexError::Timeout(reason)) => {
                self.lock_timed_out().insert(path.to_path_buf(), identity);
                Err(SheetIndexError::Timeout(reason))
            }
            result => {
                if result.is_ok() {
                    self.lock_timed_out().remove(path);
                }
                result
            }
        }
    }

    fn save(&self) {
        let snapshot = self.read_index().clone();
        if let Err(e) = self.store.save(&snapshot) {
            log::error!(
                "Failed to save index snapshot {}: {}",
                self.store.path().display(),
                e
            );
        }
    }

    /// Rescan the directory and bring the index up to date.
    ///
    /// Files that fail extraction are logged and left out of the report;
    /// a failed update keeps the previous record.
    pub fn refresh(&self) -> Result<ChangeSet> {
        let _guard = self.lock_mutation();
        std::fs::create_dir_all(&self.config.watch_dir)?;
        let on_disk = self.scan()?;

        let (pending, removed) = {
            let index = self.read_index();
            let pending: Vec<(String, Pending)> = on_disk
                .iter()
                .filter_map(|(name, path)| {
                    let current = index.files.get(name);
                    if !hasher::has_changed(path, current, self.config.hash_prefix_bytes) {
                        return None;
                    }
                    if self.timed_out_unchanged(path) {
                        log::debug!("Skipping {}: timed out earlier, unchanged", name);
                        return None;
                    }
                    let work = match current {
                        Some(_) => Pending::Update(path.clone()),
                        None => Pending::Add(path.clone()),
                    };
                    Some((name.clone(), work))
                })
                .collect();
            let removed: Vec<String> = index
                .files
                .keys()
                .filter(|name| !on_disk.contains_key(*name))
                .cloned()
                .collect();
            (pending, removed)
        };

        let mut changes = ChangeSet::default();
        let mut extracted = Vec::with_capacity(pending.len());
        for (name, work) in pending {
            let (path, is_update) = match &work {
                Pending::Add(path) => (path, false),
                Pending::Update(path) => (path, true),
            };
            match self.extract_file(path) {
                Ok(record) => {
                    log::info!(
                        "Indexed {} ({} sheets)",
                        record.filename,
                        record.sheets.len()
                    );
                    if is_update {
                        changes.updated.push(name.clone());
                    } else {
                        changes.added.push(name.clone());
                    }
                    extracted.push((name, record));
                }
                Err(e) => log::error!("Error indexing {}: {}", path.display(), e),
            }
        }
        changes.removed = removed;
        self.lock_timed_out().retain(|path, _| path.is_file());

        {
            let mut index = self.write_index();
            for name in &changes.removed {
                index.files.remove(name);
            }
            for (name, record) in extracted {
                index.files.insert(name, record);
            }
            index.last_refresh_time = now_secs();
        }
        self.save();

        if !changes.is_empty() {
            log::info!(
                "Index refreshed: {} added, {} updated, {} removed",
                changes.added.len(),
                changes.updated.len(),
                changes.removed.len()
            );
        }
        Ok(changes)
    }

    fn is_stale(&self) -> bool {
        let last = self.read_index().last_refresh_time;
        now_secs() - last > self.config.staleness_secs as f64
    }

    /// Case-insensitive search over column names and preview cells,
    /// refreshing first when the index is stale.
    pub fn search(&self, query: &str) -> SearchResults {
        if self.is_stale() {
            log::info!("Index is stale; refreshing before search");
            if let Err(e) = self.refresh() {
                log::error!("Auto-refresh before search failed: {}", e);
            }
        }
        let index = self.read_index();
        search::search_records(index.files.values(), query)
    }

    /// Rows of `sheet` read directly from disk, or an empty list when the
    /// file or sheet does not exist or cannot be read.
    pub fn read_sheet(&self, filename: &str, sheet: &str, max_rows: usize) -> Vec<Row> {
        self.read_sheet_outcome(filename, sheet, max_rows).into_rows()
    }

    /// Clamp a requested row count to `1..=read.max_rows`.
    pub fn clamp_rows(&self, max_rows: usize) -> usize {
        max_rows.clamp(1, self.read.max_rows)
    }

    pub fn read_sheet_outcome(&self, filename: &str, sheet: &str, max_rows: usize) -> ReadOutcome {
        if !is_plain_filename(filename) {
            log::warn!("Rejected sheet read for invalid filename {:?}", filename);
            return ReadOutcome::FileNotFound;
        }
        let path = self.config.watch_dir.join(filename);

        if !self.read_index().files.contains_key(filename) {
            if !path.is_file() {
                return ReadOutcome::FileNotFound;
            }
            if let Err(e) = self.index_single(filename, &path) {
                log::error!("Error indexing new file {}: {}", filename, e);
                return ReadOutcome::Failed(e.to_string());
            }
        }

        let max_rows = self.clamp_rows(max_rows);
        let result = Workbook::open(&path).and_then(|mut workbook| workbook.read_sheet(sheet, max_rows));
        match result {
            Ok(data) => ReadOutcome::Rows(data.rows),
            Err(SheetIndexError::SheetNotFound { .. }) => ReadOutcome::SheetNotFound,
            Err(SheetIndexError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                ReadOutcome::FileNotFound
            }
            Err(e) => {
                log::error!("Error reading sheet {} from {}: {}", sheet, filename, e);
                ReadOutcome::Failed(e.to_string())
            }
        }
    }

    /// Index one file outside a full refresh and persist the result.
    fn index_single(&self, filename: &str, path: &Path) -> Result<()> {
        let _guard = self.lock_mutation();
        if self.read_index().files.contains_key(filename) {
            return Ok(());
        }
        let record = self.extract_file(path)?;
        log::info!("Indexed {} on first read", filename);
        self.write_index().files.insert(filename.to_string(), record);
        self.save();
        Ok(())
    }

    /// Refresh, then summarize every indexed file.
    pub fn list_files(&self) -> Result<FileListing> {
        let changes = self.refresh()?;
        let index = self.read_index();
        let files = index
            .files
            .iter()
            .map(|(name, record)| (name.clone(), FileSummary::from(record)))
            .collect();
        Ok(FileListing { files, changes })
    }

    /// Preview rows of every sheet of `filename`. An unknown file triggers a
    /// refresh before giving up.
    pub fn file_preview(&self, filename: &str) -> Option<BTreeMap<String, Vec<Row>>> {
        if let Some(record) = self.read_index().files.get(filename) {
            return Some(record.preview.clone());
        }
        if let Err(e) = self.refresh() {
            log::error!("Refresh for preview of {} failed: {}", filename, e);
            return None;
        }
        self.read_index()
            .files
            .get(filename)
            .map(|record| record.preview.clone())
    }

    pub fn file_info(&self, filename: &str) -> Option<FileRecord> {
        self.read_index().files.get(filename).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.read_index().files.keys().cloned().collect()
    }

    pub fn file_count(&self) -> usize {
        self.read_index().files.len()
    }

    pub fn last_refresh_time(&self) -> f64 {
        self.read_index().last_refresh_time
    }
}
