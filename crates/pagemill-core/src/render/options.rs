//! Caller-facing render configuration.

use std::path::PathBuf;

use pagemill_parser::{PixelFormat, RenderFlags};

use crate::output::OutputEncoding;

/// Options for a parallel render invocation.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Render threads inside this process; zero selects adaptively from the
    /// document shape.
    pub thread_count: usize,
    /// When positive and width/height are zero, pixel dimensions derive
    /// per page from the page size at this resolution.
    pub dpi: f64,
    /// Bound on outstanding tasks during enqueue. Zero auto-enables a bound
    /// of 256 for documents beyond 256 pages and is otherwise unlimited.
    pub max_queue_depth: usize,
    /// Pixel format of the bitmaps handed to callbacks.
    pub output_format: PixelFormat,
    /// Extra render flags for every page.
    pub flags: RenderFlags,
    /// Issue form events and draw form overlays when the document has an
    /// interactive form.
    pub use_form: bool,
    /// Measure rendering only: the scanned-page fast path is disabled so
    /// every page takes the full pipeline.
    pub benchmark: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            thread_count: 0,
            dpi: 0.0,
            max_queue_depth: 0,
            output_format: PixelFormat::Bgrx,
            flags: RenderFlags::NONE,
            use_form: true,
            benchmark: false,
        }
    }
}

/// Where and how rendered pages land on disk.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub encoding: OutputEncoding,
    /// JPEG quality in 0..=100.
    pub jpeg_quality: u8,
    /// Emit an alpha channel in PNG output even for opaque pages.
    pub force_alpha: bool,
}

impl OutputConfig {
    pub fn new(dir: impl Into<PathBuf>, encoding: OutputEncoding) -> Self {
        OutputConfig {
            dir: dir.into(),
            encoding,
            jpeg_quality: 85,
            force_alpha: false,
        }
    }
}
