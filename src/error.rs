//! Custom error types for rustmonograph.
//!
//! This module defines all error types used throughout the pipeline.
//! All functions return `Result<T, MonographError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for rustmonograph operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum MonographError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Text, PDF or LLM output parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// LLM endpoint returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message from the endpoint
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// PDF loading or text extraction error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Spreadsheet (xlsx/xls/ods) error
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error (missing columns, malformed input tables)
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `MonographError`
pub type Result<T> = std::result::Result<T, MonographError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| MonographError::Parse(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_or_parse() {
        let missing: Option<u32> = None;
        let err = missing.ok_or_parse("no taxon line").unwrap_err();
        assert_eq!(err.to_string(), "Parse error: no taxon line");
        assert_eq!(Some(3).ok_or_parse("unused").unwrap(), 3);
    }
}
