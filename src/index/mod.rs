//! Change-aware index over a directory of workbooks.

pub mod extractor;
pub mod hasher;
pub mod manager;
pub mod record;
pub mod search;
pub mod service;
pub mod store;

pub use extractor::{extract, ExtractOptions};
pub use manager::{IndexManager, ReadOutcome};
pub use record::{ChangeSet, FileListing, FileRecord, FileSummary, Index};
pub use search::{Match, SearchResults};
pub use service::IndexService;
pub use store::{IndexStore, LoadOutcome};
