//! Directory watcher: refresh the index when workbooks in the watched
//! directory are created, modified or removed.
//!
//! Uses the notify crate on a dedicated thread, debounces events per path,
//! and coalesces every settled path into a single refresh.

mod watcher;

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::error::{Result, SheetIndexError};
use crate::index::IndexService;

/// Whether an event path can affect the index: a direct child of `root`
/// with the indexed extension that is neither hidden nor an office lock file.
/// The file itself may no longer exist.
pub fn is_relevant(path: &Path, root: &Path, extension: &str) -> bool {
    if path.parent() != Some(root) {
        return false;
    }
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy(),
        None => return false,
    };
    if name.starts_with('.') || name.starts_with("~$") {
        return false;
    }
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Run the watcher until its thread exits. Each batch of relevant changes
/// triggers one refresh through `service`.
pub async fn run_watcher(service: IndexService, debounce_ms: u64) -> Result<()> {
    let config = service.manager().config().clone();
    let root = config.watch_dir.canonicalize().unwrap_or_else(|_| config.watch_dir.clone());
    let extension = config.normalized_extension();

    let (tx, rx) = mpsc::channel::<PathBuf>();
    let rx = Arc::new(Mutex::new(rx));

    let thread_root = root.clone();
    std::thread::spawn(move || {
        if let Err(e) = watcher::run_watcher_thread(&thread_root, debounce_ms, tx) {
            log::error!("watcher thread error: {}", e);
        }
    });

    log::info!("Watching {} for .{} changes", root.display(), extension);

    loop {
        let rx_batch = Arc::clone(&rx);
        let batch = tokio::task::spawn_blocking(move || {
            let rx = rx_batch.lock().unwrap_or_else(|e| e.into_inner());
            let first = rx.recv().ok()?;
            let mut batch = vec![first];
            batch.extend(rx.try_iter());
            Some(batch)
        })
        .await
        .map_err(|e| SheetIndexError::Task(format!("watcher task join: {}", e)))?;

        let batch = match batch {
            Some(batch) => batch,
            None => break,
        };

        let relevant: Vec<&PathBuf> = batch
            .iter()
            .filter(|p| is_relevant(p, &root, &extension))
            .collect();
        if relevant.is_empty() {
            continue;
        }
        for p in &relevant {
            log::debug!("watch: change at {}", p.display());
        }

        match service.call(|m| m.refresh()).await {
            Ok(changes) if changes.is_empty() => {
                log::info!("watch: {} events, index already current", relevant.len())
            }
            Ok(changes) => log::info!(
                "watch: {} added, {} updated, {} removed",
                changes.added.len(),
                changes.updated.len(),
                changes.removed.len()
            ),
            Err(e) => log::error!("watch: refresh failed: {}", e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_direct_child_with_extension_is_relevant() {
        let root = TempDir::new().unwrap();
        assert!(is_relevant(&root.path().join("comps.xlsx"), root.path(), "xlsx"));
        assert!(is_relevant(&root.path().join("COMPS.XLSX"), root.path(), "xlsx"));
    }

    #[test]
    fn test_other_paths_are_ignored() {
        let root = TempDir::new().unwrap();
        let r = root.path();
        assert!(!is_relevant(&r.join("notes.txt"), r, "xlsx"));
        assert!(!is_relevant(&r.join("sub").join("comps.xlsx"), r, "xlsx"));
        assert!(!is_relevant(&r.join("~$comps.xlsx"), r, "xlsx"));
        assert!(!is_relevant(&r.join(".hidden.xlsx"), r, "xlsx"));
        assert!(!is_relevant(r, r, "xlsx"));
    }
}
