//! Parser backend selection for this build.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use pagemill_core::Document;

/// Open a document with the compiled-in parser backend.
#[cfg(feature = "mupdf")]
pub fn open_document(path: &Path, password: Option<&str>) -> Result<Arc<Document>> {
    let backend = pagemill_parser::MupdfBackend::new();
    Ok(Document::open(&backend, path, password)?)
}

/// Without a parser backend compiled in, document operations cannot run.
#[cfg(not(feature = "mupdf"))]
pub fn open_document(path: &Path, _password: Option<&str>) -> Result<Arc<Document>> {
    let _ = path;
    Err(pagemill_core::EngineError::Config(pagemill_core::ConfigError::Unsupported(
        "this binary was built without a parser backend".to_string(),
    ))
    .into())
}
