//! Parser-backend abstraction for the pagemill engine.
//!
//! This crate defines the contract a document library must satisfy for the
//! engine to render pages and extract text through it:
//! - the [`Backend`] family of traits for documents, pages, text layers,
//!   page objects, and interactive forms
//! - the shared [`Bitmap`] buffer and raster value types
//! - a deterministic [`FixtureBackend`] for tests and benchmarks
//! - an optional `mupdf`-backed implementation (feature `mupdf`)

mod backend;
mod bitmap;
mod error;
mod fixture;
mod types;

pub use backend::{Backend, DocumentOps, FormOps, PageObjectOps, PageOps, TextPageOps};
pub use bitmap::Bitmap;
pub use error::{ParserError, Result};
pub use fixture::{
    FixtureBackend, FixtureChar, FixtureDocument, FixtureObject, FixturePage, FormEvent,
};
pub use types::{
    FontInfo, PageAction, PageObjectKind, PixelFormat, Rect, RenderFlags, Rotation,
};

#[cfg(feature = "mupdf")]
pub use backend::mupdf_backend::MupdfBackend;
