//! MuPDF-backed implementation of the parser contract.
//!
//! MuPDF contexts are not thread-safe, so this adapter never holds live
//! engine objects across calls: each operation opens a fresh document under
//! a serialization lock, does its work, and drops everything before
//! returning. Page handles carry only the path, index, and metadata cached
//! at load time. The engine's own page-load mutex already serializes the
//! page lifecycle, so the extra lock here only covers backend-internal
//! reopening.
//!
//! Limitations of the binding surface: page content objects are not
//! enumerable, so the scanned-page fast path never triggers on this
//! backend, and there is no interactive-form event surface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mupdf::{Colorspace, Document, Matrix, TextPageOptions};
use parking_lot::Mutex;
use tracing::debug;

use crate::backend::{Backend, DocumentOps, FormOps, PageObjectOps, PageOps, TextPageOps};
use crate::bitmap::Bitmap;
use crate::error::{ParserError, Result};
use crate::types::{FontInfo, PixelFormat, Rect, RenderFlags, Rotation};

/// Parser backend over libmupdf.
#[derive(Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        MupdfBackend
    }
}

impl Backend for MupdfBackend {
    fn load_document(&self, path: &Path, password: Option<&str>) -> Result<Box<dyn DocumentOps>> {
        if !path.exists() {
            return Err(ParserError::NotFound(path.to_path_buf()));
        }
        let file_size = std::fs::metadata(path)?.len();
        let shared = Arc::new(SharedDoc {
            path: path.to_path_buf(),
            password: password.map(str::to_string),
            lock: Mutex::new(()),
        });

        // Validate once up front so open failures surface at load time.
        let page_count = shared.with_doc(|doc| {
            doc.page_count()
                .map_err(|e| ParserError::InvalidDocument(e.to_string()))
        })?;
        debug!(path = %path.display(), page_count, "opened mupdf document");

        Ok(Box::new(MupdfDocument {
            shared,
            page_count: page_count.max(0) as u32,
            file_size,
        }))
    }
}

struct SharedDoc {
    path: PathBuf,
    password: Option<String>,
    lock: Mutex<()>,
}

impl SharedDoc {
    /// Open a fresh document, authenticate, and run `f` under the lock.
    fn with_doc<T>(&self, f: impl FnOnce(&Document) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        let path = self.path.to_string_lossy();
        #[allow(unused_mut)]
        let mut doc =
            Document::open(&path).map_err(|e| ParserError::CannotOpen(e.to_string()))?;
        let needs_password = doc
            .needs_password()
            .map_err(|e| ParserError::InvalidDocument(e.to_string()))?;
        if needs_password {
            let Some(password) = &self.password else {
                return Err(ParserError::PasswordProtected);
            };
            let ok = doc
                .authenticate(password)
                .map_err(|e| ParserError::InvalidDocument(e.to_string()))?;
            if !ok {
                return Err(ParserError::PasswordProtected);
            }
        }
        f(&doc)
    }
}

#[derive(Debug)]
struct MupdfDocument {
    shared: Arc<SharedDoc>,
    page_count: u32,
    file_size: u64,
}

impl DocumentOps for MupdfDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn file_size(&self) -> u64 {
        self.file_size
    }

    fn load_page(&self, index: u32) -> Result<Box<dyn PageOps>> {
        if index >= self.page_count {
            return Err(ParserError::PageOutOfRange {
                index,
                count: self.page_count,
            });
        }
        let (width, height) = self.shared.with_doc(|doc| {
            let page = doc.load_page(index as i32).map_err(|e| ParserError::PageLoad {
                index,
                reason: e.to_string(),
            })?;
            let bounds = page
                .bounds()
                .map_err(|e| ParserError::Backend(e.to_string()))?;
            Ok((
                (bounds.x1 - bounds.x0) as f64,
                (bounds.y1 - bounds.y0) as f64,
            ))
        })?;
        Ok(Box::new(MupdfPage {
            shared: Arc::clone(&self.shared),
            index,
            width,
            height,
        }))
    }

    fn form_env(&self) -> Result<Option<Box<dyn FormOps>>> {
        // The binding exposes no AcroForm event surface.
        Ok(None)
    }
}

struct MupdfPage {
    shared: Arc<SharedDoc>,
    index: u32,
    width: f64,
    height: f64,
}

impl PageOps for MupdfPage {
    fn object_number(&self) -> u32 {
        self.index + 1
    }

    fn size_points(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn has_transparency(&self) -> bool {
        false
    }

    fn render(
        &self,
        bitmap: &mut Bitmap,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        rotation: Rotation,
        _flags: RenderFlags,
    ) -> Result<()> {
        let scale_x = width as f32 / self.width.max(1.0) as f32;
        let scale_y = height as f32 / self.height.max(1.0) as f32;
        let index = self.index;

        let (pixels, pix_w, pix_h, n) = self.shared.with_doc(|doc| {
            let page = doc.load_page(index as i32).map_err(|e| ParserError::PageLoad {
                index,
                reason: e.to_string(),
            })?;
            let mut matrix = Matrix::new_scale(scale_x, scale_y);
            if rotation != Rotation::None {
                let rotation_matrix = Matrix::new_rotate(rotation.degrees());
                matrix.concat(rotation_matrix);
            }
            let colorspace = Colorspace::device_rgb();
            let pixmap = page
                .to_pixmap(&matrix, &colorspace, false, true)
                .map_err(|e| ParserError::Render(e.to_string()))?;
            Ok((
                pixmap.samples().to_vec(),
                pixmap.width() as usize,
                pixmap.height() as usize,
                pixmap.n() as usize,
            ))
        })?;

        blit_rgb(bitmap, &pixels, pix_w, pix_h, n, x, y);
        Ok(())
    }

    fn object_count(&self) -> u32 {
        0
    }

    fn object(&self, _index: u32) -> Option<Box<dyn PageObjectOps + '_>> {
        None
    }

    fn text(&self) -> Result<Box<dyn TextPageOps + '_>> {
        let index = self.index;
        let chars = self.shared.with_doc(|doc| {
            let page = doc.load_page(index as i32).map_err(|e| ParserError::PageLoad {
                index,
                reason: e.to_string(),
            })?;
            let text_page = page
                .to_text_page(TextPageOptions::empty())
                .map_err(|e| ParserError::Text(e.to_string()))?;

            let mut chars: Vec<ExtractedChar> = Vec::new();
            for block in text_page.blocks() {
                for line in block.lines() {
                    for ch in line.chars() {
                        let Some(c) = ch.char() else { continue };
                        let quad = ch.quad();
                        let x0 = quad.ul.x.min(quad.ll.x) as f64;
                        let y0 = quad.ll.y.min(quad.lr.y) as f64;
                        let x1 = quad.ur.x.max(quad.lr.x) as f64;
                        let y1 = quad.ul.y.max(quad.ur.y) as f64;
                        let size = ch.size() as f64;
                        // The binding hands back scalar values; re-encode to
                        // UTF-16 so indices match the engine's unit-based
                        // addressing.
                        let mut units = [0u16; 2];
                        for unit in c.encode_utf16(&mut units) {
                            chars.push(ExtractedChar {
                                unit: *unit as u32,
                                bbox: Rect::new(x0, y0, x1, y1),
                                origin: (x0, y0),
                                font_size: size,
                            });
                        }
                    }
                }
            }
            Ok(chars)
        })?;
        Ok(Box::new(MupdfTextPage { chars }))
    }
}

struct ExtractedChar {
    unit: u32,
    bbox: Rect,
    origin: (f64, f64),
    font_size: f64,
}

struct MupdfTextPage {
    chars: Vec<ExtractedChar>,
}

impl TextPageOps for MupdfTextPage {
    fn char_count(&self) -> u32 {
        self.chars.len() as u32
    }

    fn unicode_unit(&self, index: u32) -> u32 {
        self.chars.get(index as usize).map(|c| c.unit).unwrap_or(0)
    }

    fn char_box(&self, index: u32) -> Rect {
        self.chars
            .get(index as usize)
            .map(|c| c.bbox)
            .unwrap_or_default()
    }

    fn origin(&self, index: u32) -> (f64, f64) {
        self.chars
            .get(index as usize)
            .map(|c| c.origin)
            .unwrap_or_default()
    }

    fn angle(&self, _index: u32) -> f64 {
        0.0
    }

    fn font_size(&self, index: u32) -> f64 {
        self.chars
            .get(index as usize)
            .map(|c| c.font_size)
            .unwrap_or_default()
    }

    fn font_info(&self, _index: u32) -> FontInfo {
        FontInfo::default()
    }

    fn fill_color(&self, _index: u32) -> [u32; 4] {
        [0, 0, 0, 255]
    }

    fn stroke_color(&self, _index: u32) -> [u32; 4] {
        [0, 0, 0, 255]
    }

    fn matrix(&self, _index: u32) -> [f64; 6] {
        [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]
    }

    fn is_generated(&self, _index: u32) -> bool {
        false
    }

    fn is_hyphen(&self, _index: u32) -> bool {
        false
    }

    fn has_unicode_error(&self, _index: u32) -> bool {
        false
    }
}

/// Copy an RGB(A) sample buffer into the target bitmap at (x, y), swapping
/// channels into the bitmap's B, G, R order and honoring both strides.
fn blit_rgb(bitmap: &mut Bitmap, samples: &[u8], pix_w: usize, pix_h: usize, n: usize, x: i32, y: i32) {
    let format = bitmap.format();
    let bpp = format.bytes_per_pixel();
    let stride = bitmap.stride();
    let bmp_w = bitmap.width() as i64;
    let bmp_h = bitmap.height() as i64;
    let buffer = bitmap.buffer_mut();

    for sy in 0..pix_h {
        let ty = y as i64 + sy as i64;
        if ty < 0 || ty >= bmp_h {
            continue;
        }
        let src_row = sy * pix_w * n;
        let dst_row = ty as usize * stride;
        for sx in 0..pix_w {
            let tx = x as i64 + sx as i64;
            if tx < 0 || tx >= bmp_w {
                continue;
            }
            let src = src_row + sx * n;
            let (r, g, b) = (
                samples.get(src).copied().unwrap_or(0),
                samples.get(src + 1).copied().unwrap_or(0),
                samples.get(src + 2).copied().unwrap_or(0),
            );
            let dst = dst_row + tx as usize * bpp;
            match format {
                PixelFormat::Gray => {
                    // Integer luma, matching the renderer's grayscale weights.
                    buffer[dst] = ((r as u32 * 77 + g as u32 * 151 + b as u32 * 28) >> 8) as u8;
                }
                PixelFormat::Bgr => {
                    buffer[dst] = b;
                    buffer[dst + 1] = g;
                    buffer[dst + 2] = r;
                }
                PixelFormat::Bgrx => {
                    buffer[dst] = b;
                    buffer[dst + 1] = g;
                    buffer[dst + 2] = r;
                    buffer[dst + 3] = 0xFF;
                }
            }
        }
    }
}
