pub mod config;
pub mod error;
pub mod format;
pub mod http;
pub mod index;
pub mod mcp;
pub mod value;
pub mod watch;
pub mod workbook;

pub use config::Config;
pub use error::{Result, SheetIndexError};
pub use index::{ChangeSet, FileRecord, IndexManager, IndexService, Match, ReadOutcome, SearchResults};
pub use value::{CellValue, Row};
