//! Deterministic in-memory backend.
//!
//! Stands in for a real parser in tests and benchmarks: documents are
//! described as plain data, rendering paints a checkerboard pattern that is
//! a pure function of the page and pixel position, and failure modes
//! (missing files, passwords, broken pages) can be injected per fixture.
//!
//! The pattern only covers alternating pixels, so the backdrop fill chosen
//! by the caller stays visible in the output and participates in
//! byte-comparison tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, DocumentOps, FormOps, PageObjectOps, PageOps, TextPageOps};
use crate::bitmap::Bitmap;
use crate::error::{ParserError, Result};
use crate::types::{FontInfo, PageAction, PageObjectKind, PixelFormat, Rect, RenderFlags, Rotation};

/// A form lifecycle event observed by a fixture document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    DocumentOpen,
    DocumentWillClose,
    AfterLoad(u32),
    PageOpen(u32),
    PageClose(u32),
    BeforeClose(u32),
    Overlay(u32),
}

/// One content object on a fixture page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureObject {
    pub kind: PageObjectKind,
    pub bounds: Rect,
    pub filters: Vec<String>,
    pub raw_data: Vec<u8>,
}

impl FixtureObject {
    /// An image object with a `DCTDecode` stream covering the whole page.
    pub fn full_page_jpeg(width_pts: f64, height_pts: f64, payload: &[u8]) -> Self {
        let mut raw_data = vec![0xFF, 0xD8, 0xFF];
        raw_data.extend_from_slice(payload);
        FixtureObject {
            kind: PageObjectKind::Image,
            bounds: Rect::new(0.0, 0.0, width_pts, height_pts),
            filters: vec!["DCTDecode".to_string()],
            raw_data,
        }
    }
}

/// One character on a fixture page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureChar {
    /// UTF-16 code unit, exactly as a real engine would store it.
    pub unit: u32,
    pub bbox: Rect,
    pub origin: (f64, f64),
    pub angle: f64,
    pub font_size: f64,
    pub font: FontInfo,
    pub fill: [u32; 4],
    pub stroke: [u32; 4],
    pub matrix: [f64; 6],
    pub generated: bool,
    pub hyphen: bool,
    pub unicode_error: bool,
}

impl FixtureChar {
    pub fn new(unit: u32) -> Self {
        FixtureChar {
            unit,
            bbox: Rect::new(0.0, 0.0, 6.0, 10.0),
            origin: (0.0, 0.0),
            angle: 0.0,
            font_size: 10.0,
            font: FontInfo {
                face_id: 1,
                name: "Helvetica".to_string(),
                flags: 0,
                weight: 400,
            },
            fill: [0, 0, 0, 255],
            stroke: [0, 0, 0, 255],
            matrix: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            generated: false,
            hyphen: false,
            unicode_error: false,
        }
    }
}

/// One page of a fixture document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturePage {
    pub width_pts: f64,
    pub height_pts: f64,
    pub transparent: bool,
    /// When set, `load_page` fails for this page.
    pub fail_load: bool,
    /// When set, rendering this page fails after a successful load.
    pub fail_render: bool,
    /// Indirect object number; zero means "assign from the page index".
    pub object_number: u32,
    pub objects: Vec<FixtureObject>,
    pub chars: Vec<FixtureChar>,
}

impl FixturePage {
    pub fn new(width_pts: f64, height_pts: f64) -> Self {
        FixturePage {
            width_pts,
            height_pts,
            transparent: false,
            fail_load: false,
            fail_render: false,
            object_number: 0,
            objects: Vec::new(),
            chars: Vec::new(),
        }
    }

    /// US Letter at 72 dpi points.
    pub fn letter() -> Self {
        FixturePage::new(612.0, 792.0)
    }

    pub fn transparent(mut self) -> Self {
        self.transparent = true;
        self
    }

    pub fn broken(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn with_object(mut self, object: FixtureObject) -> Self {
        self.objects.push(object);
        self
    }

    /// Append the UTF-16 encoding of `text` as character records.
    pub fn with_text(mut self, text: &str) -> Self {
        for (i, unit) in text.encode_utf16().enumerate() {
            let mut ch = FixtureChar::new(unit as u32);
            let x = 10.0 + i as f64 * 6.0;
            ch.bbox = Rect::new(x, 20.0, x + 6.0, 30.0);
            ch.origin = (x, 20.0);
            self.chars.push(ch);
        }
        self
    }

    /// Append a raw UTF-16 code unit, for surrogate edge cases.
    pub fn with_unit(mut self, unit: u32) -> Self {
        self.chars.push(FixtureChar::new(unit));
        self
    }
}

/// A complete in-memory document description.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FixtureDocument {
    pub file_size: u64,
    pub password: Option<String>,
    pub has_form: bool,
    pub pages: Vec<FixturePage>,
    #[serde(skip)]
    events: Arc<Mutex<Vec<FormEvent>>>,
}

impl FixtureDocument {
    pub fn new() -> Self {
        FixtureDocument::default()
    }

    pub fn with_file_size(mut self, bytes: u64) -> Self {
        self.file_size = bytes;
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_form(mut self) -> Self {
        self.has_form = true;
        self
    }

    pub fn page(mut self, page: FixturePage) -> Self {
        self.pages.push(page);
        self
    }

    /// `count` copies of the same page.
    pub fn pages(mut self, count: usize, page: FixturePage) -> Self {
        for _ in 0..count {
            self.pages.push(page.clone());
        }
        self
    }

    /// Form events recorded so far, in issue order.
    pub fn events(&self) -> Vec<FormEvent> {
        self.events.lock().clone()
    }

    fn record(&self, event: FormEvent) {
        self.events.lock().push(event);
    }
}

/// Registry-backed [`Backend`] serving fixture documents by path.
#[derive(Default)]
pub struct FixtureBackend {
    documents: Mutex<HashMap<PathBuf, Arc<FixtureDocument>>>,
}

impl FixtureBackend {
    pub fn new() -> Self {
        FixtureBackend::default()
    }

    /// Register a document under a virtual path and return a handle to it.
    pub fn register(&self, path: impl Into<PathBuf>, doc: FixtureDocument) -> Arc<FixtureDocument> {
        let doc = Arc::new(doc);
        self.documents.lock().insert(path.into(), Arc::clone(&doc));
        doc
    }
}

impl Backend for FixtureBackend {
    fn load_document(&self, path: &Path, password: Option<&str>) -> Result<Box<dyn DocumentOps>> {
        let doc = self
            .documents
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| ParserError::NotFound(path.to_path_buf()))?;
        if let Some(expected) = &doc.password {
            if password != Some(expected.as_str()) {
                return Err(ParserError::PasswordProtected);
            }
        }
        Ok(Box::new(FixtureDocumentHandle { doc }))
    }
}

#[derive(Debug)]
struct FixtureDocumentHandle {
    doc: Arc<FixtureDocument>,
}

impl DocumentOps for FixtureDocumentHandle {
    fn page_count(&self) -> u32 {
        self.doc.pages.len() as u32
    }

    fn file_size(&self) -> u64 {
        self.doc.file_size
    }

    fn load_page(&self, index: u32) -> Result<Box<dyn PageOps>> {
        let count = self.page_count();
        let page = self
            .doc
            .pages
            .get(index as usize)
            .ok_or(ParserError::PageOutOfRange { index, count })?;
        if page.fail_load {
            return Err(ParserError::PageLoad {
                index,
                reason: "fixture page marked broken".to_string(),
            });
        }
        Ok(Box::new(FixturePageHandle {
            doc: Arc::clone(&self.doc),
            index,
        }))
    }

    fn form_env(&self) -> Result<Option<Box<dyn FormOps>>> {
        if !self.doc.has_form {
            return Ok(None);
        }
        Ok(Some(Box::new(FixtureForm {
            doc: Arc::clone(&self.doc),
        })))
    }
}

struct FixturePageHandle {
    doc: Arc<FixtureDocument>,
    index: u32,
}

impl FixturePageHandle {
    fn page(&self) -> &FixturePage {
        &self.doc.pages[self.index as usize]
    }
}

/// Pattern byte for one pixel; pure in its inputs so output bytes cannot
/// depend on scheduling.
fn pattern(page_index: u32, x: u32, y: u32) -> u8 {
    (x.wrapping_mul(31) ^ y.wrapping_mul(17) ^ page_index.wrapping_mul(97)) as u8
}

impl PageOps for FixturePageHandle {
    fn object_number(&self) -> u32 {
        let declared = self.page().object_number;
        if declared != 0 {
            declared
        } else {
            self.index + 1
        }
    }

    fn size_points(&self) -> (f64, f64) {
        let page = self.page();
        (page.width_pts, page.height_pts)
    }

    fn has_transparency(&self) -> bool {
        self.page().transparent
    }

    fn render(
        &self,
        bitmap: &mut Bitmap,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        _rotation: Rotation,
        flags: RenderFlags,
    ) -> Result<()> {
        if self.page().fail_render {
            return Err(ParserError::Render("fixture render failure".to_string()));
        }
        let gray = flags.contains(RenderFlags::GRAYSCALE);
        let format = bitmap.format();
        let bpp = format.bytes_per_pixel();
        let stride = bitmap.stride();
        let bmp_w = bitmap.width() as i32;
        let bmp_h = bitmap.height() as i32;
        let x1 = x.max(0).min(bmp_w);
        let y1 = y.max(0).min(bmp_h);
        let x2 = x.saturating_add(width).max(0).min(bmp_w);
        let y2 = y.saturating_add(height).max(0).min(bmp_h);
        let buffer = bitmap.buffer_mut();

        for py in y1..y2 {
            let row = py as usize * stride;
            for px in x1..x2 {
                // Checkerboard: leave every other pixel at the backdrop fill.
                if (px + py) % 2 != 0 {
                    continue;
                }
                let v = pattern(self.index, px as u32, py as u32);
                let off = row + px as usize * bpp;
                match format {
                    PixelFormat::Gray => buffer[off] = v,
                    PixelFormat::Bgr | PixelFormat::Bgrx => {
                        if gray {
                            buffer[off] = v;
                            buffer[off + 1] = v;
                            buffer[off + 2] = v;
                        } else {
                            buffer[off] = v;
                            buffer[off + 1] = v ^ 0x55;
                            buffer[off + 2] = v ^ 0xAA;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn object_count(&self) -> u32 {
        self.page().objects.len() as u32
    }

    fn object(&self, index: u32) -> Option<Box<dyn PageObjectOps + '_>> {
        let object = self.page().objects.get(index as usize)?;
        Some(Box::new(FixtureObjectHandle { object }))
    }

    fn text(&self) -> Result<Box<dyn TextPageOps + '_>> {
        Ok(Box::new(FixtureTextPage {
            chars: &self.page().chars,
        }))
    }
}

struct FixtureObjectHandle<'a> {
    object: &'a FixtureObject,
}

impl PageObjectOps for FixtureObjectHandle<'_> {
    fn kind(&self) -> PageObjectKind {
        self.object.kind
    }

    fn bounds(&self) -> Result<Rect> {
        Ok(self.object.bounds)
    }

    fn image_filter_count(&self) -> u32 {
        self.object.filters.len() as u32
    }

    fn image_filter(&self, index: u32) -> Option<String> {
        self.object.filters.get(index as usize).cloned()
    }

    fn image_raw_data(&self) -> Result<Vec<u8>> {
        if self.object.raw_data.is_empty() {
            return Err(ParserError::NoRawData);
        }
        Ok(self.object.raw_data.clone())
    }
}

struct FixtureTextPage<'a> {
    chars: &'a [FixtureChar],
}

impl FixtureTextPage<'_> {
    fn get(&self, index: u32) -> Option<&FixtureChar> {
        self.chars.get(index as usize)
    }
}

impl TextPageOps for FixtureTextPage<'_> {
    fn char_count(&self) -> u32 {
        self.chars.len() as u32
    }

    fn unicode_unit(&self, index: u32) -> u32 {
        self.get(index).map(|c| c.unit).unwrap_or(0)
    }

    fn char_box(&self, index: u32) -> Rect {
        self.get(index).map(|c| c.bbox).unwrap_or_default()
    }

    fn origin(&self, index: u32) -> (f64, f64) {
        self.get(index).map(|c| c.origin).unwrap_or_default()
    }

    fn angle(&self, index: u32) -> f64 {
        self.get(index).map(|c| c.angle).unwrap_or_default()
    }

    fn font_size(&self, index: u32) -> f64 {
        self.get(index).map(|c| c.font_size).unwrap_or_default()
    }

    fn font_info(&self, index: u32) -> FontInfo {
        self.get(index).map(|c| c.font.clone()).unwrap_or_default()
    }

    fn fill_color(&self, index: u32) -> [u32; 4] {
        self.get(index).map(|c| c.fill).unwrap_or([0, 0, 0, 255])
    }

    fn stroke_color(&self, index: u32) -> [u32; 4] {
        self.get(index).map(|c| c.stroke).unwrap_or([0, 0, 0, 255])
    }

    fn matrix(&self, index: u32) -> [f64; 6] {
        self.get(index)
            .map(|c| c.matrix)
            .unwrap_or([1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
    }

    fn is_generated(&self, index: u32) -> bool {
        self.get(index).map(|c| c.generated).unwrap_or(false)
    }

    fn is_hyphen(&self, index: u32) -> bool {
        self.get(index).map(|c| c.hyphen).unwrap_or(false)
    }

    fn has_unicode_error(&self, index: u32) -> bool {
        self.get(index).map(|c| c.unicode_error).unwrap_or(false)
    }
}

struct FixtureForm {
    doc: Arc<FixtureDocument>,
}

impl FormOps for FixtureForm {
    fn document_open_action(&self) {
        self.doc.record(FormEvent::DocumentOpen);
    }

    fn document_will_close(&self) {
        self.doc.record(FormEvent::DocumentWillClose);
    }

    fn on_after_load(&self, page: &dyn PageOps) {
        self.doc.record(FormEvent::AfterLoad(page.object_number()));
    }

    fn page_action(&self, page: &dyn PageOps, action: PageAction) {
        let event = match action {
            PageAction::Open => FormEvent::PageOpen(page.object_number()),
            PageAction::Close => FormEvent::PageClose(page.object_number()),
        };
        self.doc.record(event);
    }

    fn on_before_close(&self, page: &dyn PageOps) {
        self.doc.record(FormEvent::BeforeClose(page.object_number()));
    }

    fn draw_overlay(
        &self,
        bitmap: &mut Bitmap,
        page: &dyn PageOps,
        x: i32,
        _y: i32,
        _width: i32,
        _height: i32,
        _rotation: Rotation,
        _flags: RenderFlags,
    ) {
        self.doc.record(FormEvent::Overlay(page.object_number()));
        // Touch one pixel so overlay drawing is observable in output bytes.
        if bitmap.width() > 0 && bitmap.height() > 0 && x == 0 {
            bitmap.fill_rect(0, 0, 1, 1, 0xFF336699);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with(doc: FixtureDocument) -> (FixtureBackend, PathBuf) {
        let backend = FixtureBackend::new();
        backend.register("doc.pdf", doc);
        (backend, PathBuf::from("doc.pdf"))
    }

    #[test]
    fn missing_document_is_not_found() {
        let backend = FixtureBackend::new();
        let err = backend
            .load_document(Path::new("nope.pdf"), None)
            .unwrap_err();
        assert!(matches!(err, ParserError::NotFound(_)));
    }

    #[test]
    fn password_is_checked() {
        let (backend, path) =
            backend_with(FixtureDocument::new().with_password("s3cret").page(FixturePage::letter()));
        assert!(matches!(
            backend.load_document(&path, None),
            Err(ParserError::PasswordProtected)
        ));
        assert!(backend.load_document(&path, Some("s3cret")).is_ok());
    }

    #[test]
    fn broken_page_fails_to_load() {
        let (backend, path) =
            backend_with(FixtureDocument::new().page(FixturePage::letter().broken()));
        let doc = backend.load_document(&path, None).unwrap();
        assert!(matches!(
            doc.load_page(0),
            Err(ParserError::PageLoad { index: 0, .. })
        ));
    }

    #[test]
    fn render_is_deterministic() {
        let (backend, path) = backend_with(FixtureDocument::new().page(FixturePage::letter()));
        let doc = backend.load_document(&path, None).unwrap();
        let page = doc.load_page(0).unwrap();

        let mut a = Bitmap::new(32, 32, PixelFormat::Bgrx).unwrap();
        let mut b = Bitmap::new(32, 32, PixelFormat::Bgrx).unwrap();
        for bmp in [&mut a, &mut b] {
            bmp.fill_rect(0, 0, 32, 32, 0xFFFFFFFF);
            page.render(bmp, 0, 0, 32, 32, Rotation::None, RenderFlags::NONE)
                .unwrap();
        }
        assert_eq!(a.buffer(), b.buffer());
    }

    #[test]
    fn text_units_round_trip() {
        let (backend, path) =
            backend_with(FixtureDocument::new().page(FixturePage::letter().with_text("héllo")));
        let doc = backend.load_document(&path, None).unwrap();
        let page = doc.load_page(0).unwrap();
        let text = page.text().unwrap();
        assert_eq!(text.char_count(), 5);
        assert_eq!(text.unicode_unit(1), 'é' as u32);
    }

    #[test]
    fn full_page_jpeg_object_shape() {
        let object = FixtureObject::full_page_jpeg(612.0, 792.0, b"payload");
        assert_eq!(object.kind, PageObjectKind::Image);
        assert_eq!(&object.raw_data[..3], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(object.filters, vec!["DCTDecode".to_string()]);
    }

    #[test]
    fn documents_round_trip_through_json() {
        let doc = FixtureDocument::new()
            .with_file_size(1000)
            .page(FixturePage::letter().with_text("hi").transparent());
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: FixtureDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.file_size, 1000);
        assert_eq!(parsed.pages.len(), 1);
        assert!(parsed.pages[0].transparent);
        assert_eq!(parsed.pages[0].chars.len(), 2);
    }

    #[test]
    fn form_events_recorded_in_order() {
        let (backend, path) = backend_with(
            FixtureDocument::new()
                .with_form()
                .page(FixturePage::letter()),
        );
        let handle = {
            let docs = backend.documents.lock();
            Arc::clone(docs.get(&path).unwrap())
        };
        let doc = backend.load_document(&path, None).unwrap();
        let form = doc.form_env().unwrap().unwrap();
        let page = doc.load_page(0).unwrap();
        form.document_open_action();
        form.on_after_load(page.as_ref());
        form.page_action(page.as_ref(), PageAction::Open);
        form.page_action(page.as_ref(), PageAction::Close);
        form.on_before_close(page.as_ref());
        assert_eq!(
            handle.events(),
            vec![
                FormEvent::DocumentOpen,
                FormEvent::AfterLoad(1),
                FormEvent::PageOpen(1),
                FormEvent::PageClose(1),
                FormEvent::BeforeClose(1),
            ]
        );
    }
}
