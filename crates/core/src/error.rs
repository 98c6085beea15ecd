//! Error types for certificate generation.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading inputs, composing documents, or
/// converting them.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open, read, or write a file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The template document is structurally unusable.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// The workbook is structurally unusable.
    #[error("Workbook error: {0}")]
    WorkbookError(String),

    /// ZIP archive error (PPTX and XLSX are both ZIP containers).
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing or writing error.
    #[error("XML error: {0}")]
    XmlError(String),

    /// Writing a filled document failed.
    #[error("Failed to compose '{path}': {reason}")]
    CompositionError { path: String, reason: String },

    /// The external converter failed.
    #[error("Conversion error: {0}")]
    ConversionError(String),
}
