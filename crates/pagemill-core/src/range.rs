//! Page-range expressions.
//!
//! Two accepted forms: a single 0-based index `N`, or a closed range `A-B`
//! with `A <= B`. Resolution clamps the end to the document and yields the
//! `(start, count)` pair the controllers work in.

use std::str::FromStr;

use crate::error::RangeError;

/// A parsed page-range expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRange {
    Single(u32),
    Span { start: u32, end: u32 },
}

impl PageRange {
    /// Resolve against a document, clamping to the available pages.
    ///
    /// An empty document resolves to `(0, 0)` — an empty but successful
    /// run. A start past the last page of a non-empty document is an
    /// error.
    pub fn resolve(&self, page_count: u32) -> Result<(u32, u32), RangeError> {
        if page_count == 0 {
            return Ok((0, 0));
        }
        let (start, end) = match *self {
            PageRange::Single(page) => (page, page),
            PageRange::Span { start, end } => (start, end),
        };
        if start >= page_count {
            return Err(RangeError::OutOfBounds {
                start,
                count: page_count,
            });
        }
        let end = end.min(page_count - 1);
        Ok((start, end - start + 1))
    }

    /// Resolve an optional range; `None` means the whole document.
    pub fn resolve_or_all(
        range: Option<&PageRange>,
        page_count: u32,
    ) -> Result<(u32, u32), RangeError> {
        match range {
            Some(range) => range.resolve(page_count),
            None => Ok((0, page_count)),
        }
    }
}

impl FromStr for PageRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, RangeError> {
        let s = s.trim();
        if let Some((a, b)) = s.split_once('-') {
            let start: u32 = a
                .trim()
                .parse()
                .map_err(|_| RangeError::Invalid(s.to_string()))?;
            let end: u32 = b
                .trim()
                .parse()
                .map_err(|_| RangeError::Invalid(s.to_string()))?;
            if start > end {
                return Err(RangeError::Reversed { start, end });
            }
            Ok(PageRange::Span { start, end })
        } else {
            let page: u32 = s.parse().map_err(|_| RangeError::Invalid(s.to_string()))?;
            Ok(PageRange::Single(page))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_span() {
        assert_eq!("7".parse::<PageRange>().unwrap(), PageRange::Single(7));
        assert_eq!(
            "5-7".parse::<PageRange>().unwrap(),
            PageRange::Span { start: 5, end: 7 }
        );
        assert_eq!(
            " 0 - 2 ".parse::<PageRange>().unwrap(),
            PageRange::Span { start: 0, end: 2 }
        );
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(matches!(
            "x".parse::<PageRange>(),
            Err(RangeError::Invalid(_))
        ));
        assert!(matches!(
            "1-".parse::<PageRange>(),
            Err(RangeError::Invalid(_))
        ));
        assert!(matches!(
            "-3".parse::<PageRange>(),
            Err(RangeError::Invalid(_))
        ));
        assert!(matches!(
            "9-3".parse::<PageRange>(),
            Err(RangeError::Reversed { start: 9, end: 3 })
        ));
    }

    #[test]
    fn resolve_clamps_to_document() {
        let range = PageRange::Span { start: 5, end: 7 };
        assert_eq!(range.resolve(10).unwrap(), (5, 3));
        assert_eq!(range.resolve(7).unwrap(), (5, 2));
        assert!(matches!(
            range.resolve(5),
            Err(RangeError::OutOfBounds { start: 5, count: 5 })
        ));
    }

    #[test]
    fn empty_document_resolves_empty() {
        assert_eq!(PageRange::Single(3).resolve(0).unwrap(), (0, 0));
        assert_eq!(PageRange::resolve_or_all(None, 0).unwrap(), (0, 0));
    }

    #[test]
    fn missing_range_means_whole_document() {
        assert_eq!(PageRange::resolve_or_all(None, 12).unwrap(), (0, 12));
    }
}
