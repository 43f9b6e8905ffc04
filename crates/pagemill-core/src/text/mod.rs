//! Unicode text extraction.
//!
//! The backend hands text out as UTF-16 code units; this module decodes
//! surrogate pairs into scalars (lone or invalid surrogates become U+FFFD),
//! encodes into the selected output encoding, and drives whole page ranges
//! with the same per-page buffer-reuse discipline the render path uses for
//! bitmaps.

mod encoding;
mod jsonl;

pub use encoding::TextEncoding;
pub use jsonl::CharRecord;

use std::io::Write;

use pagemill_parser::TextPageOps;
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::Result;
use crate::glyph::FaceClass;

/// Initial capacity of the reusable per-page byte buffer.
const PAGE_BUFFER_CAPACITY: usize = 256 * 1024;

/// What a finished extraction did.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractSummary {
    /// Pages successfully extracted.
    pub pages: usize,
    /// Pages whose load or text layer failed.
    pub failed: usize,
}

impl ExtractSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// One decoded scalar with its source position.
struct DecodedChar {
    ch: char,
    /// Code-unit index the scalar started at.
    index: u32,
    /// Whether U+FFFD stands in for an invalid sequence.
    replaced: bool,
}

fn is_high_surrogate(unit: u32) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

fn is_low_surrogate(unit: u32) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

/// Decode a page's code units into scalars.
fn decode_page_chars(text: &dyn TextPageOps) -> Vec<DecodedChar> {
    let count = text.char_count();
    let mut chars = Vec::with_capacity(count as usize);
    let mut i = 0;
    while i < count {
        let unit = text.unicode_unit(i);
        if is_high_surrogate(unit) {
            if i + 1 < count {
                let low = text.unicode_unit(i + 1);
                if is_low_surrogate(low) {
                    let scalar = ((unit - 0xD800) << 10) + (low - 0xDC00) + 0x10000;
                    chars.push(DecodedChar {
                        // Both halves are in range, so the scalar is valid.
                        ch: char::from_u32(scalar).unwrap_or(char::REPLACEMENT_CHARACTER),
                        index: i,
                        replaced: false,
                    });
                    i += 2;
                    continue;
                }
            }
            chars.push(DecodedChar {
                ch: char::REPLACEMENT_CHARACTER,
                index: i,
                replaced: true,
            });
            i += 1;
        } else if is_low_surrogate(unit) {
            chars.push(DecodedChar {
                ch: char::REPLACEMENT_CHARACTER,
                index: i,
                replaced: true,
            });
            i += 1;
        } else {
            let (ch, replaced) = match char::from_u32(unit) {
                Some(ch) => (ch, false),
                None => (char::REPLACEMENT_CHARACTER, true),
            };
            chars.push(DecodedChar {
                ch,
                index: i,
                replaced,
            });
            i += 1;
        }
    }
    chars
}

/// Extract a page range as an encoded character stream, without the
/// file-level byte-order mark.
///
/// In UTF-32LE every successful page after the first is preceded by a
/// fresh byte-order mark; `bom_on_first_page` extends that to the first
/// page too, which subrange workers need so a later merge reads as one
/// consistent stream. UTF-8 output has no separators.
pub fn extract_plain_range(
    document: &Document,
    out: &mut dyn Write,
    start: u32,
    count: u32,
    encoding: TextEncoding,
    bom_on_first_page: bool,
) -> Result<ExtractSummary> {
    let mut summary = ExtractSummary::default();
    let mut page_buffer: Vec<u8> = Vec::with_capacity(PAGE_BUFFER_CAPACITY);

    for page_index in start..start + count {
        let _guard = document.lock_pages();
        let page = match document.load_page(page_index) {
            Ok(page) => page,
            Err(err) => {
                warn!(page = page_index, %err, "page load failed");
                summary.failed += 1;
                continue;
            }
        };
        let text = match page.text() {
            Ok(text) => text,
            Err(err) => {
                warn!(page = page_index, %err, "text layer failed");
                summary.failed += 1;
                continue;
            }
        };

        page_buffer.clear();
        if encoding.separates_pages_with_bom() && (summary.pages > 0 || bom_on_first_page) {
            page_buffer.extend_from_slice(encoding.bom());
        }
        for decoded in decode_page_chars(text.as_ref()) {
            encoding.encode_char(decoded.ch, &mut page_buffer);
        }
        drop(text);
        drop(page);
        drop(_guard);

        out.write_all(&page_buffer)?;
        summary.pages += 1;
    }
    debug!(pages = summary.pages, failed = summary.failed, "text range extracted");
    Ok(summary)
}

/// Extract a page range as a standalone stream: file-level byte-order mark
/// first, then the pages.
///
/// An empty document yields only the byte-order mark.
pub fn extract_document(
    document: &Document,
    out: &mut dyn Write,
    start: u32,
    count: u32,
    encoding: TextEncoding,
) -> Result<ExtractSummary> {
    out.write_all(encoding.bom())?;
    extract_plain_range(document, out, start, count, encoding, false)
}

/// Extract a page range as JSONL character records.
pub fn extract_jsonl_range(
    document: &Document,
    out: &mut dyn Write,
    start: u32,
    count: u32,
) -> Result<ExtractSummary> {
    let mut summary = ExtractSummary::default();
    let mut page_buffer: Vec<u8> = Vec::with_capacity(PAGE_BUFFER_CAPACITY);

    for page_index in start..start + count {
        let _guard = document.lock_pages();
        let page = match document.load_page(page_index) {
            Ok(page) => page,
            Err(err) => {
                warn!(page = page_index, %err, "page load failed");
                summary.failed += 1;
                continue;
            }
        };
        let text = match page.text() {
            Ok(text) => text,
            Err(err) => {
                warn!(page = page_index, %err, "text layer failed");
                summary.failed += 1;
                continue;
            }
        };

        page_buffer.clear();
        for decoded in decode_page_chars(text.as_ref()) {
            let i = decoded.index;
            let font = text.font_info(i);
            // Font records resolve through the glyph registry so repeated
            // runs in the same face reuse one entry.
            let face = document
                .glyphs()
                .get_or_insert(FaceClass::External, font.face_id, font);
            let bbox = text.char_box(i);
            let origin = text.origin(i);
            let record = CharRecord {
                ch: decoded.ch,
                unicode: decoded.ch as u32,
                bbox: [bbox.x0, bbox.y0, bbox.x1, bbox.y1],
                origin: [origin.0, origin.1],
                font_size: text.font_size(i),
                font_name: face.font().name.clone(),
                font_flags: face.font().flags,
                font_weight: face.font().weight,
                fill_color: text.fill_color(i),
                stroke_color: text.stroke_color(i),
                angle: text.angle(i),
                matrix: text.matrix(i),
                is_generated: text.is_generated(i),
                is_hyphen: text.is_hyphen(i),
                has_unicode_error: text.has_unicode_error(i) || decoded.replaced,
            };
            record.write_line(&mut page_buffer)?;
        }
        drop(text);
        drop(page);
        drop(_guard);

        out.write_all(&page_buffer)?;
        summary.pages += 1;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagemill_parser::{FixtureBackend, FixtureDocument, FixturePage};
    use std::path::Path;
    use std::sync::Arc;

    fn open(doc: FixtureDocument) -> Arc<Document> {
        let backend = FixtureBackend::new();
        backend.register("doc.pdf", doc);
        Document::open(&backend, Path::new("doc.pdf"), None).unwrap()
    }

    fn pages_with_text(texts: &[&str]) -> Arc<Document> {
        let mut doc = FixtureDocument::new();
        for text in texts {
            doc = doc.page(FixturePage::letter().with_text(text));
        }
        open(doc)
    }

    #[test]
    fn utf8_stream_has_single_bom_and_no_separators() {
        let document = pages_with_text(&["abc", "def", "ghi"]);
        let mut out = Vec::new();
        let summary =
            extract_document(&document, &mut out, 0, 3, TextEncoding::Utf8).unwrap();
        assert!(summary.is_clean());
        assert_eq!(summary.pages, 3);
        assert_eq!(&out[..3], &[0xEF, 0xBB, 0xBF]);
        assert_eq!(&out[3..], b"abcdefghi");
    }

    #[test]
    fn utf32le_separates_pages_with_boms() {
        let document = pages_with_text(&["ab", "c"]);
        let mut out = Vec::new();
        extract_document(&document, &mut out, 0, 2, TextEncoding::Utf32Le).unwrap();

        let mut expected = vec![0xFF, 0xFE, 0x00, 0x00];
        for c in "ab".chars() {
            expected.extend_from_slice(&(c as u32).to_le_bytes());
        }
        expected.extend_from_slice(&[0xFF, 0xFE, 0x00, 0x00]);
        expected.extend_from_slice(&('c' as u32).to_le_bytes());
        assert_eq!(out, expected);
    }

    #[test]
    fn empty_document_is_bom_only() {
        let document = open(FixtureDocument::new());
        for encoding in [TextEncoding::Utf8, TextEncoding::Utf32Le] {
            let mut out = Vec::new();
            let summary = extract_document(&document, &mut out, 0, 0, encoding).unwrap();
            assert!(summary.is_clean());
            assert_eq!(out, encoding.bom());
        }
    }

    #[test]
    fn surrogate_pair_decodes_to_one_scalar() {
        let document = open(
            FixtureDocument::new().page(
                FixturePage::letter()
                    .with_unit(0xD834)
                    .with_unit(0xDD1E),
            ),
        );
        let mut out = Vec::new();
        extract_document(&document, &mut out, 0, 1, TextEncoding::Utf32Le).unwrap();
        assert_eq!(&out[4..], 0x1D11E_u32.to_le_bytes());
    }

    #[test]
    fn lone_and_inverted_surrogates_become_replacement() {
        let document = open(
            FixtureDocument::new().page(
                FixturePage::letter()
                    .with_unit(0xD800)
                    .with_unit('x' as u32)
                    .with_unit(0xDC00),
            ),
        );
        let mut out = Vec::new();
        extract_document(&document, &mut out, 0, 1, TextEncoding::Utf8).unwrap();
        let text = std::str::from_utf8(&out[3..]).unwrap();
        assert_eq!(text, "\u{FFFD}x\u{FFFD}");
    }

    #[test]
    fn utf8_and_utf32_agree_modulo_separators() {
        let document = pages_with_text(&["héllo", "wörld"]);

        let mut utf8 = Vec::new();
        extract_document(&document, &mut utf8, 0, 2, TextEncoding::Utf8).unwrap();
        let decoded: Vec<char> = std::str::from_utf8(&utf8[3..]).unwrap().chars().collect();

        let mut utf32 = Vec::new();
        extract_document(&document, &mut utf32, 0, 2, TextEncoding::Utf32Le).unwrap();
        let mut scalars = Vec::new();
        for chunk in utf32[4..].chunks_exact(4) {
            let value = u32::from_le_bytes(chunk.try_into().unwrap());
            // Page-separator marks re-encode the BOM scalar; skip them.
            if value == 0xFEFF {
                continue;
            }
            scalars.push(char::from_u32(value).unwrap());
        }
        assert_eq!(decoded, scalars);
    }

    #[test]
    fn failed_page_is_counted_and_skipped() {
        let document = open(
            FixtureDocument::new()
                .page(FixturePage::letter().with_text("a"))
                .page(FixturePage::letter().broken())
                .page(FixturePage::letter().with_text("b")),
        );
        let mut out = Vec::new();
        let summary =
            extract_document(&document, &mut out, 0, 3, TextEncoding::Utf8).unwrap();
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(&out[3..], b"ab");
    }

    #[test]
    fn subrange_worker_emits_boms_on_every_page() {
        let document = pages_with_text(&["a", "b"]);
        let mut out = Vec::new();
        extract_plain_range(&document, &mut out, 0, 2, TextEncoding::Utf32Le, true).unwrap();
        // Both pages carry a separator mark: this stream is merged after
        // another worker's output.
        assert_eq!(&out[..4], &[0xFF, 0xFE, 0x00, 0x00]);
        assert_eq!(&out[8..12], &[0xFF, 0xFE, 0x00, 0x00]);
    }

    #[test]
    fn jsonl_records_carry_metadata_and_error_flags() {
        let document = open(
            FixtureDocument::new().page(
                FixturePage::letter()
                    .with_text("A")
                    .with_unit(0xD800),
            ),
        );
        let mut out = Vec::new();
        let summary = extract_jsonl_range(&document, &mut out, 0, 1).unwrap();
        assert!(summary.is_clean());

        let lines: Vec<&str> = std::str::from_utf8(&out)
            .unwrap()
            .lines()
            .collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["char"], "A");
        assert_eq!(first["font_name"], "Helvetica");
        assert_eq!(first["has_unicode_error"], false);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["unicode"], 0xFFFD);
        assert_eq!(second["has_unicode_error"], true);
    }
}
