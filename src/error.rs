use thiserror::Error;

/// Main error type for sheetindex
#[derive(Error, Debug)]
pub enum SheetIndexError {
    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot or payload (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workbook container could not be opened or parsed
    #[error("Workbook error: {0}")]
    Workbook(String),

    /// Sheet missing from an otherwise readable workbook
    #[error("Sheet '{sheet}' not found in {file}")]
    SheetNotFound { file: String, sheet: String },

    /// File not present on disk or in the index
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Extraction exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    /// Blocking task failed to complete
    #[error("Task error: {0}")]
    Task(String),
}

impl From<zip::result::ZipError> for SheetIndexError {
    fn from(err: zip::result::ZipError) -> Self {
        SheetIndexError::Workbook(err.to_string())
    }
}

impl From<quick_xml::Error> for SheetIndexError {
    fn from(err: quick_xml::Error) -> Self {
        SheetIndexError::Workbook(format!("malformed XML: {}", err))
    }
}

/// Convenient Result type using SheetIndexError
pub type Result<T> = std::result::Result<T, SheetIndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SheetIndexError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_sheet_not_found_display() {
        let err = SheetIndexError::SheetNotFound {
            file: "rent_roll.xlsx".to_string(),
            sheet: "Q3".to_string(),
        };
        assert_eq!(err.to_string(), "Sheet 'Q3' not found in rent_roll.xlsx");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SheetIndexError = io_err.into();
        assert!(matches!(err, SheetIndexError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SheetIndexError = json_err.into();
        assert!(matches!(err, SheetIndexError::Json(_)));
    }
}
