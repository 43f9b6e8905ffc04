//! Error types for the pagemill engine.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Parser backend error.
    #[error("parser error: {0}")]
    Parser(#[from] pagemill_parser::ParserError),

    /// Rendering error.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Text extraction error.
    #[error("text error: {0}")]
    Text(#[from] TextError),

    /// Worker pool error.
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    /// Multi-process coordination error.
    #[error("coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Page range error.
    #[error("page range error: {0}")]
    Range(#[from] RangeError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Image encoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while rendering pages.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A page failed to render; the batch continues past it.
    #[error("page {index} failed to render")]
    PageFailed { index: u32 },

    /// The DPI-derived pixel dimensions left the representable range.
    #[error("page {index} dimensions overflow at the requested scale")]
    DimensionsOverflow { index: u32 },

    /// The pixel buffer for a page could not be allocated.
    #[error("out of memory allocating a {width}x{height} bitmap")]
    OutOfMemory { width: u32, height: u32 },

    /// One or more pages in a batch failed.
    #[error("{failed} of {total} pages failed")]
    PagesFailed { failed: usize, total: usize },
}

/// Errors raised while extracting text.
#[derive(Error, Debug)]
pub enum TextError {
    /// A page's text layer could not be built.
    #[error("text extraction failed for page {index}")]
    PageFailed { index: u32 },

    /// One or more pages in a batch failed.
    #[error("{failed} of {total} pages failed")]
    PagesFailed { failed: usize, total: usize },
}

/// Errors raised by the worker pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// An OS worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
}

/// Errors raised by the multi-process coordinator.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// A worker subprocess could not be spawned.
    #[error("failed to spawn worker {worker_id}: {source}")]
    Spawn {
        worker_id: usize,
        source: std::io::Error,
    },

    /// A worker subprocess exited with a failure status.
    #[error("worker {worker_id} (pages {start}-{end}) exited with {status}")]
    WorkerFailed {
        worker_id: usize,
        start: u32,
        end: u32,
        status: String,
    },

    /// A worker temp file could not be created or read back.
    #[error("worker temp file error: {0}")]
    TempFile(std::io::Error),

    /// Merging worker outputs into the final file failed.
    #[error("failed to merge worker outputs: {0}")]
    Merge(std::io::Error),
}

/// Errors raised while parsing page ranges.
#[derive(Error, Debug)]
pub enum RangeError {
    /// The range expression could not be parsed.
    #[error("invalid page range {0:?} (expected N or A-B)")]
    Invalid(String),

    /// A-B with A greater than B.
    #[error("reversed page range: {start}-{end}")]
    Reversed { start: u32, end: u32 },

    /// The range starts past the last page.
    #[error("page {start} out of range (document has {count} pages)")]
    OutOfBounds { start: u32, count: u32 },
}

/// Errors in caller-supplied configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The output directory's parent does not exist.
    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// The output directory could not be created.
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Process worker count outside 1..=16.
    #[error("invalid worker count {0} (expected 1-16)")]
    WorkerCount(usize),

    /// Render thread count outside 1..=32.
    #[error("invalid thread count {0} (expected 1-32)")]
    ThreadCount(usize),

    /// A feature this build does not support was requested.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Any other invalid argument combination.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
