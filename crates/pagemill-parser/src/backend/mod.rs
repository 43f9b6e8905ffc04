//! Parser backend contract.
//!
//! The engine never parses PDF data itself; everything goes through these
//! traits, so the same controller and worker-pool machinery runs unchanged
//! over any conforming document library.

#[cfg(feature = "mupdf")]
pub mod mupdf_backend;

use std::path::Path;

use crate::bitmap::Bitmap;
use crate::error::Result;
use crate::types::{FontInfo, PageAction, PageObjectKind, Rect, RenderFlags, Rotation};

/// Entry point of a parser library: opens documents.
pub trait Backend: Send + Sync {
    /// Open a document from disk, optionally with a password.
    fn load_document(&self, path: &Path, password: Option<&str>) -> Result<Box<dyn DocumentOps>>;
}

/// An open document.
///
/// Shared read-only across rendering threads; implementations must tolerate
/// concurrent calls, though the engine serializes the whole page lifecycle
/// (load through close) under a per-document mutex.
pub trait DocumentOps: Send + Sync + std::fmt::Debug {
    /// Number of pages in the document.
    fn page_count(&self) -> u32;

    /// Size in bytes of the backing file, used for content-type heuristics.
    fn file_size(&self) -> u64;

    /// Load one page. The returned handle closes the page when dropped.
    fn load_page(&self, index: u32) -> Result<Box<dyn PageOps>>;

    /// Initialize the interactive-form environment, when the document has one.
    fn form_env(&self) -> Result<Option<Box<dyn FormOps>>>;
}

/// A loaded page.
pub trait PageOps: Send {
    /// Indirect object number of the page inside the document.
    fn object_number(&self) -> u32;

    /// Page size in points (1/72 inch).
    fn size_points(&self) -> (f64, f64);

    /// Whether the page declares transparency and needs a clear backdrop.
    fn has_transparency(&self) -> bool;

    /// Rasterize the page into `bitmap` at the given placement.
    #[allow(clippy::too_many_arguments)]
    fn render(
        &self,
        bitmap: &mut Bitmap,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        rotation: Rotation,
        flags: RenderFlags,
    ) -> Result<()>;

    /// Number of content objects on the page.
    fn object_count(&self) -> u32;

    /// Content object at `index`, if present.
    fn object(&self, index: u32) -> Option<Box<dyn PageObjectOps + '_>>;

    /// Build the text layer for this page.
    fn text(&self) -> Result<Box<dyn TextPageOps + '_>>;
}

/// One content object on a page.
pub trait PageObjectOps {
    fn kind(&self) -> PageObjectKind;

    /// Bounding box in page space.
    fn bounds(&self) -> Result<Rect>;

    /// Number of stream filters on an image object (zero for non-images).
    fn image_filter_count(&self) -> u32;

    /// Name of stream filter `index` (e.g. `DCTDecode`, `FlateDecode`).
    fn image_filter(&self, index: u32) -> Option<String>;

    /// Raw, still-encoded stream bytes of an image object.
    fn image_raw_data(&self) -> Result<Vec<u8>>;
}

/// Per-character access to a page's text layer.
///
/// Indices address UTF-16 code units the way the underlying engine stores
/// them; surrogate halves of one scalar occupy two indices.
pub trait TextPageOps {
    fn char_count(&self) -> u32;

    /// UTF-16 code unit at `index`.
    fn unicode_unit(&self, index: u32) -> u32;

    /// Character box as (left, bottom, right, top) in page space.
    fn char_box(&self, index: u32) -> Rect;

    /// Baseline origin of the character.
    fn origin(&self, index: u32) -> (f64, f64);

    /// Rotation of the character in degrees.
    fn angle(&self, index: u32) -> f64;

    fn font_size(&self, index: u32) -> f64;

    fn font_info(&self, index: u32) -> FontInfo;

    /// Fill color as RGBA components in 0..=255.
    fn fill_color(&self, index: u32) -> [u32; 4];

    /// Stroke color as RGBA components in 0..=255.
    fn stroke_color(&self, index: u32) -> [u32; 4];

    /// Text transform matrix (a, b, c, d, e, f).
    fn matrix(&self, index: u32) -> [f64; 6];

    /// Whether the character was synthesized (e.g. inserted spaces).
    fn is_generated(&self, index: u32) -> bool;

    /// Whether the character is a soft hyphen from dehyphenation.
    fn is_hyphen(&self, index: u32) -> bool;

    /// Whether the engine could not map the glyph to Unicode.
    fn has_unicode_error(&self, index: u32) -> bool;
}

/// Interactive-form event surface.
///
/// The engine issues these in a fixed order around every page it touches so
/// scripted documents observe the same lifecycle as a sequential viewer.
pub trait FormOps: Send + Sync {
    /// Document-level open action, issued once before any page work.
    fn document_open_action(&self);

    /// Document-level will-close action, issued once after all page work.
    fn document_will_close(&self);

    fn on_after_load(&self, page: &dyn PageOps);

    fn page_action(&self, page: &dyn PageOps, action: PageAction);

    fn on_before_close(&self, page: &dyn PageOps);

    /// Draw form-field overlays on top of rendered page content.
    #[allow(clippy::too_many_arguments)]
    fn draw_overlay(
        &self,
        bitmap: &mut Bitmap,
        page: &dyn PageOps,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        rotation: Rotation,
        flags: RenderFlags,
    );
}
