//! Watcher thread: notify + debounce, send settled paths to the refresh loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};

use crate::error::{Result, SheetIndexError};

/// Watch `root` (non-recursively) and send each changed path over `tx` once
/// no further event for it has arrived within `debounce_ms`.
///
/// Returns when the receiver is dropped or the event source disconnects.
pub fn run_watcher_thread(root: &Path, debounce_ms: u64, tx: mpsc::Sender<PathBuf>) -> Result<()> {
    let debounce = Duration::from_millis(debounce_ms.max(1));
    let (event_tx, event_rx) = mpsc::channel::<Vec<PathBuf>>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(ev) => {
            let _ = event_tx.send(ev.paths);
        }
        Err(e) => log::warn!("watch event error: {}", e),
    })
    .map_err(|e| SheetIndexError::Config(format!("cannot create watcher: {}", e)))?;

    watcher
        .watch(root, RecursiveMode::NonRecursive)
        .map_err(|e| SheetIndexError::Config(format!("cannot watch {}: {}", root.display(), e)))?;

    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        match event_rx.recv_timeout(debounce) {
            Ok(paths) => {
                let now = Instant::now();
                for p in paths {
                    pending.insert(p, now);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                let ready: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, t)| now.duration_since(**t) >= debounce)
                    .map(|(p, _)| p.clone())
                    .collect();
                for p in ready {
                    pending.remove(&p);
                    if tx.send(p).is_err() {
                        return Ok(());
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}
