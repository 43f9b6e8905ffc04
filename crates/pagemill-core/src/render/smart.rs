//! Scanned-page detection and raw JPEG passthrough.
//!
//! A scanned page is one content object: a DCTDecode image covering at
//! least 95% of the page. For such pages the renderer adds nothing — the
//! raw JPEG bytes, written verbatim, are byte-identical to the source scan
//! and skip decode, rasterization, and re-encode entirely.
//!
//! Detection is a predicate, not a heuristic: every condition must hold
//! exactly, and any miss falls through to the normal rendering path.

use pagemill_parser::{PageObjectKind, PageOps};
use tracing::trace;

/// Leading bytes of every JPEG stream.
const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Minimum share of the page area the image must cover.
const COVERAGE_RATIO: f64 = 0.95;

/// Raw JPEG bytes for a page that is a single full-bleed DCTDecode image,
/// or `None` when the page needs real rendering.
pub fn scanned_page_jpeg(page: &dyn PageOps) -> Option<Vec<u8>> {
    if page.object_count() != 1 {
        return None;
    }
    let object = page.object(0)?;
    if object.kind() != PageObjectKind::Image {
        return None;
    }
    if object.image_filter_count() != 1 || object.image_filter(0).as_deref() != Some("DCTDecode") {
        return None;
    }

    let bounds = object.bounds().ok()?;
    let (width_pts, height_pts) = page.size_points();
    let page_area = width_pts * height_pts;
    if page_area <= 0.0 || bounds.area() < COVERAGE_RATIO * page_area {
        return None;
    }

    let data = object.image_raw_data().ok()?;
    if data.len() < JPEG_SIGNATURE.len() || data[..3] != JPEG_SIGNATURE {
        trace!("single-image page without a JPEG signature, rendering normally");
        return None;
    }
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagemill_parser::{
        Backend, FixtureBackend, FixtureDocument, FixtureObject, FixturePage, Rect,
    };
    use std::path::Path;

    fn first_page(doc: FixtureDocument) -> Box<dyn PageOps> {
        let backend = FixtureBackend::new();
        backend.register("doc.pdf", doc);
        let doc = backend.load_document(Path::new("doc.pdf"), None).unwrap();
        doc.load_page(0).unwrap()
    }

    #[test]
    fn full_bleed_jpeg_is_detected() {
        let page = first_page(FixtureDocument::new().page(
            FixturePage::letter().with_object(FixtureObject::full_page_jpeg(612.0, 792.0, b"x")),
        ));
        let data = scanned_page_jpeg(page.as_ref()).unwrap();
        assert_eq!(&data[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn extra_objects_disqualify() {
        let page = first_page(
            FixtureDocument::new().page(
                FixturePage::letter()
                    .with_object(FixtureObject::full_page_jpeg(612.0, 792.0, b"x"))
                    .with_object(FixtureObject {
                        kind: PageObjectKind::Text,
                        bounds: Rect::new(0.0, 0.0, 10.0, 10.0),
                        filters: vec![],
                        raw_data: vec![],
                    }),
            ),
        );
        assert!(scanned_page_jpeg(page.as_ref()).is_none());
    }

    #[test]
    fn non_jpeg_filter_disqualifies() {
        let mut object = FixtureObject::full_page_jpeg(612.0, 792.0, b"x");
        object.filters = vec!["CCITTFaxDecode".to_string()];
        let page = first_page(FixtureDocument::new().page(FixturePage::letter().with_object(object)));
        assert!(scanned_page_jpeg(page.as_ref()).is_none());
    }

    #[test]
    fn partial_coverage_disqualifies() {
        let mut object = FixtureObject::full_page_jpeg(612.0, 792.0, b"x");
        // Half the page.
        object.bounds = Rect::new(0.0, 0.0, 612.0, 396.0);
        let page = first_page(FixtureDocument::new().page(FixturePage::letter().with_object(object)));
        assert!(scanned_page_jpeg(page.as_ref()).is_none());
    }

    #[test]
    fn bad_signature_disqualifies() {
        let mut object = FixtureObject::full_page_jpeg(612.0, 792.0, b"x");
        object.raw_data = vec![0x89, 0x50, 0x4E, 0x47];
        let page = first_page(FixtureDocument::new().page(FixturePage::letter().with_object(object)));
        assert!(scanned_page_jpeg(page.as_ref()).is_none());
    }

    #[test]
    fn empty_data_disqualifies() {
        let mut object = FixtureObject::full_page_jpeg(612.0, 792.0, b"x");
        object.raw_data.clear();
        let page = first_page(FixtureDocument::new().page(FixturePage::letter().with_object(object)));
        assert!(scanned_page_jpeg(page.as_ref()).is_none());
    }
}
