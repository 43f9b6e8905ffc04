//! Engine-side document handle and page bookkeeping.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use pagemill_parser::{Backend, DocumentOps, FormOps, PageAction, PageOps, ParserError};
use tracing::{debug, warn};

use crate::error::Result;
use crate::glyph::GlyphCacheRegistry;
use crate::obj::{IndirectObject, IndirectObjectCache, ObjCell};

/// Per-page facts resolved once and shared through the object cache.
#[derive(Debug, Clone, PartialEq)]
pub struct PageMetrics {
    pub width_pts: f64,
    pub height_pts: f64,
    pub transparent: bool,
    pub object_count: u32,
}

/// An open document, shared read-only across rendering threads.
///
/// All mutation lives behind the document's own locks: the page-load mutex
/// serializes every page's load-through-close span, and the caches guard
/// themselves.
pub struct Document {
    ops: Box<dyn DocumentOps>,
    form: Option<Box<dyn FormOps>>,
    page_count: u32,
    file_size: u64,
    page_lock: Mutex<()>,
    metrics: IndirectObjectCache<PageMetrics>,
    glyphs: GlyphCacheRegistry,
}

impl Document {
    /// Open a document through a backend.
    pub fn open(backend: &dyn Backend, path: &Path, password: Option<&str>) -> Result<Arc<Document>> {
        let ops = backend.load_document(path, password)?;
        let form = ops.form_env()?;
        let page_count = ops.page_count();
        let file_size = ops.file_size();
        if let Some(form) = &form {
            form.document_open_action();
        }
        debug!(path = %path.display(), page_count, file_size, "document opened");
        Ok(Arc::new(Document {
            ops,
            form,
            page_count,
            file_size,
            page_lock: Mutex::new(()),
            metrics: IndirectObjectCache::new(),
            glyphs: GlyphCacheRegistry::new(),
        }))
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Acquire the page-load mutex.
    ///
    /// Callers must hold this for the whole load..close span of any page;
    /// load-only or render-only serialization is not enough, because shared
    /// resources are freed during page close.
    pub fn lock_pages(&self) -> MutexGuard<'_, ()> {
        self.page_lock.lock()
    }

    /// Load a page. The page-load mutex must already be held.
    pub fn load_page(&self, index: u32) -> std::result::Result<Box<dyn PageOps>, ParserError> {
        self.ops.load_page(index)
    }

    pub fn form(&self) -> Option<&dyn FormOps> {
        self.form.as_deref()
    }

    pub fn glyphs(&self) -> &GlyphCacheRegistry {
        &self.glyphs
    }

    /// Per-page metrics, resolved through the indirect-object cache so the
    /// fetch happens once per page no matter how many passes ask for it.
    pub fn page_metrics(&self, page: &dyn PageOps) -> Option<ObjCell<IndirectObject<PageMetrics>>> {
        let objnum = page.object_number();
        let (width_pts, height_pts) = page.size_points();
        let parsed = self.metrics.get_or_parse(objnum, || {
            Ok(PageMetrics {
                width_pts,
                height_pts,
                transparent: page.has_transparency(),
                object_count: page.object_count(),
            })
        });
        match parsed {
            Ok(cell) => cell,
            Err(err) => {
                warn!(objnum, %err, "failed to cache page metrics");
                None
            }
        }
    }

    /// Sequentially load and close one page, issuing the full form
    /// lifecycle, to populate document-wide caches before any parallelism.
    pub fn warm_page(&self, index: u32) -> std::result::Result<(), ParserError> {
        let _guard = self.lock_pages();
        let page = self.load_page(index)?;
        if let Some(form) = self.form() {
            form.on_after_load(page.as_ref());
            form.page_action(page.as_ref(), PageAction::Open);
        }
        self.page_metrics(page.as_ref());
        if let Some(form) = self.form() {
            form.page_action(page.as_ref(), PageAction::Close);
            form.on_before_close(page.as_ref());
        }
        Ok(())
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        if let Some(form) = &self.form {
            form.document_will_close();
        }
    }
}

/// Ordered store for pages whose destruction is deferred until after the
/// parallel join.
///
/// Workers register loaded pages here instead of closing them; the
/// controller closes everything in reverse order under the document mutex,
/// which minimizes shared-resource lifetime conflicts inside the parser.
#[derive(Default)]
pub struct PageHandleCollection {
    pages: Mutex<Vec<Box<dyn PageOps>>>,
}

impl PageHandleCollection {
    pub fn new() -> Self {
        PageHandleCollection::default()
    }

    pub fn add(&self, page: Box<dyn PageOps>) {
        self.pages.lock().push(page);
    }

    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }

    /// Close every held page, newest first, under the document mutex.
    pub fn close_all(&self, document: &Document) {
        let _doc_guard = document.lock_pages();
        let mut pages = self.pages.lock();
        while let Some(page) = pages.pop() {
            drop(page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagemill_parser::{FixtureBackend, FixtureDocument, FixturePage, FormEvent};

    fn open_fixture(doc: FixtureDocument) -> (Arc<Document>, Arc<FixtureDocument>) {
        let backend = FixtureBackend::new();
        let handle = backend.register("doc.pdf", doc);
        let document = Document::open(&backend, Path::new("doc.pdf"), None).unwrap();
        (document, handle)
    }

    #[test]
    fn open_reports_counts() {
        let (doc, _) = open_fixture(
            FixtureDocument::new()
                .with_file_size(1234)
                .pages(3, FixturePage::letter()),
        );
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.file_size(), 1234);
    }

    #[test]
    fn metrics_are_cached_per_page() {
        let (doc, _) = open_fixture(FixtureDocument::new().page(FixturePage::letter()));
        let _guard = doc.lock_pages();
        let page = doc.load_page(0).unwrap();
        let first = doc.page_metrics(page.as_ref()).unwrap();
        let second = doc.page_metrics(page.as_ref()).unwrap();
        assert_eq!(first.payload(), second.payload());
        assert_eq!(first.payload().width_pts, 612.0);
    }

    #[test]
    fn warm_page_issues_full_form_lifecycle() {
        let (doc, fixture) = open_fixture(
            FixtureDocument::new()
                .with_form()
                .page(FixturePage::letter()),
        );
        doc.warm_page(0).unwrap();
        let events = fixture.events();
        assert_eq!(
            events,
            vec![
                FormEvent::DocumentOpen,
                FormEvent::AfterLoad(1),
                FormEvent::PageOpen(1),
                FormEvent::PageClose(1),
                FormEvent::BeforeClose(1),
            ]
        );
    }

    #[test]
    fn document_close_fires_will_close() {
        let (doc, fixture) = open_fixture(
            FixtureDocument::new()
                .with_form()
                .page(FixturePage::letter()),
        );
        drop(doc);
        assert_eq!(
            fixture.events().last(),
            Some(&FormEvent::DocumentWillClose)
        );
    }

    #[test]
    fn collection_closes_in_reverse_order() {
        let (doc, _) = open_fixture(FixtureDocument::new().pages(3, FixturePage::letter()));
        let collection = PageHandleCollection::new();
        {
            let _guard = doc.lock_pages();
            for i in 0..3 {
                collection.add(doc.load_page(i).unwrap());
            }
        }
        assert_eq!(collection.len(), 3);
        collection.close_all(&doc);
        assert!(collection.is_empty());
    }
}
