//! Core engine for high-throughput PDF page rendering and text extraction.
//!
//! This crate provides:
//! - a persistent worker pool with lock-free task queues and per-thread
//!   bitmap pools
//! - the parallel render controller: adaptive thread selection, sequential
//!   pre-warm, the scanned-page JPEG fast path, contiguous-range batching
//! - document-scoped caches (indirect objects, glyph/face caches) built on
//!   ref-counted cells with observer handles
//! - Unicode text extraction (UTF-8, UTF-32LE, JSONL character records)
//! - page output encoders (PNG/JPEG/PPM/raw) and a bounded I/O writer pool
//! - the multi-process coordinator and worker subprocess protocol pieces

pub mod coordinator;
pub mod document;
pub mod error;
pub mod glyph;
pub mod obj;
pub mod output;
pub mod pool;
pub mod range;
pub mod render;
pub mod text;

pub use coordinator::{
    capped_thread_count, extract_text_multiprocess, render_multiprocess, RenderWorkerParams,
};
pub use document::{Document, PageHandleCollection, PageMetrics};
pub use error::{
    ConfigError, CoordinatorError, EngineError, PoolError, RangeError, RenderError, Result,
    TextError,
};
pub use glyph::{FaceClass, GlyphCache, GlyphCacheRegistry};
pub use obj::{IndirectObject, IndirectObjectCache, ObjCell, ObjObserver};
pub use output::{encode_bitmap, page_file_name, OutputEncoding, WritePool};
pub use pool::{destroy_render_pool, render_pool, WorkerPool};
pub use range::PageRange;
pub use render::{
    render_pages_parallel, render_pages_parallel_v2, render_to_directory, OutputConfig,
    RenderJob, RenderOptions, RenderSummary,
};
pub use text::{
    extract_document, extract_jsonl_range, extract_plain_range, ExtractSummary, TextEncoding,
};
