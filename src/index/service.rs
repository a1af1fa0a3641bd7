//! Async access to the index manager for the tokio-based hosts.

use std::sync::Arc;

use tokio::task;

use super::manager::IndexManager;
use crate::error::{Result, SheetIndexError};

/// Shared handle that runs manager operations on the blocking pool.
#[derive(Clone)]
pub struct IndexService {
    manager: Arc<IndexManager>,
}

impl IndexService {
    pub fn new(manager: Arc<IndexManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    /// Execute a closure with the manager in a blocking task
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&IndexManager) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        task::spawn_blocking(move || f(&manager))
            .await
            .map_err(|e| SheetIndexError::Task(format!("index task failed: {}", e)))?
    }
}
