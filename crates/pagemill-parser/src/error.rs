//! Error types for parser backends.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by a parser backend.
#[derive(Error, Debug)]
pub enum ParserError {
    /// The document file does not exist.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// The document could not be opened (unreadable, truncated, wrong type).
    #[error("cannot open document: {0}")]
    CannotOpen(String),

    /// The document requires a password that was missing or wrong.
    #[error("document is password protected")]
    PasswordProtected,

    /// The document structure is damaged beyond recovery.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A page index outside the document was requested.
    #[error("page {index} out of range (document has {count} pages)")]
    PageOutOfRange { index: u32, count: u32 },

    /// A page failed to load.
    #[error("failed to load page {index}: {reason}")]
    PageLoad { index: u32, reason: String },

    /// Rendering into a bitmap failed.
    #[error("render failed: {0}")]
    Render(String),

    /// The text layer for a page could not be built.
    #[error("text extraction failed: {0}")]
    Text(String),

    /// A page object carries no raw stream data.
    #[error("page object has no raw data")]
    NoRawData,

    /// Any other backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error while reading document data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for parser operations.
pub type Result<T> = std::result::Result<T, ParserError>;
