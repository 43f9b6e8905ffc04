//! Thread-count selection and pixel-dimension arithmetic.

/// Hardware thread count, with a fixed fallback when detection fails.
pub fn hardware_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// The dpi-to-pixel scale, truncated to six decimals.
///
/// The truncation pins pixel dimensions across platforms and code paths:
/// 300 dpi is exactly 4.166666, not 4.1666666666…, so a letter page is
/// 2550x3300 everywhere.
pub fn scale_for_dpi(dpi: f64) -> f64 {
    ((dpi / 72.0) * 1_000_000.0).floor() / 1_000_000.0
}

/// One pixel dimension from a point size and scale.
///
/// `None` when the result would collapse below one pixel or overflow the
/// renderer's signed 32-bit coordinate space.
pub fn pixel_dimension(points: f64, scale: f64) -> Option<u32> {
    let value = (points * scale).floor();
    if value < 1.0 || value > i32::MAX as f64 {
        return None;
    }
    Some(value as u32)
}

/// Pick a render thread count from document shape.
///
/// Content type matters more than page count, and file size per page is a
/// usable proxy for it: text-heavy documents pack under 15 KB per page,
/// scanned and photo-heavy ones run past 100 KB. The bands come from
/// per-class throughput measurements; the cap never exceeds the page count
/// or the hardware.
pub fn select_thread_count(page_count: u32, file_size: u64, hardware: usize) -> usize {
    let pages = page_count as usize;
    // Tiny documents: pool overhead exceeds the benefit.
    if page_count < 4 {
        return 1;
    }

    let bytes_per_page = if page_count > 0 && file_size > 0 {
        file_size / page_count as u64
    } else {
        0
    };

    // Text-heavy: scales very well until memory pressure kicks in.
    if bytes_per_page > 0 && bytes_per_page < 15_000 {
        return if page_count < 400 {
            pages.min(16).min(hardware)
        } else {
            pages.min(4).min(hardware)
        };
    }

    // Image-heavy: decompression has little shared state.
    if bytes_per_page >= 100_000 {
        return if page_count < 150 {
            pages.min(4).min(hardware)
        } else if page_count < 300 {
            pages.min(16).min(hardware)
        } else {
            pages.min(8).min(hardware)
        };
    }

    // Mixed content, and the fallback when the size is unknown.
    if page_count < 150 {
        pages.min(4).min(hardware)
    } else if page_count < 300 {
        pages.min(8).min(hardware)
    } else {
        pages.min(4).min(hardware)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_floor_is_exact_for_300_dpi() {
        let scale = scale_for_dpi(300.0);
        assert_eq!(scale, 4.166666);
        assert_eq!(pixel_dimension(612.0, scale), Some(2550));
        assert_eq!(pixel_dimension(792.0, scale), Some(3300));
    }

    #[test]
    fn scale_floor_is_deterministic_across_the_dpi_range() {
        for dpi in 72..=600 {
            let scale = scale_for_dpi(dpi as f64);
            assert_eq!(scale, ((dpi as f64 / 72.0) * 1e6).floor() / 1e6);
            assert!(pixel_dimension(612.0, scale).is_some());
        }
    }

    #[test]
    fn dimension_limits() {
        assert_eq!(pixel_dimension(0.1, 1.0), None);
        assert_eq!(pixel_dimension(1e12, 4.166666), None);
        assert_eq!(pixel_dimension(100.0, 1.0), Some(100));
    }

    #[test]
    fn small_documents_stay_single_threaded() {
        assert_eq!(select_thread_count(3, 1_000_000, 16), 1);
        assert_eq!(select_thread_count(1, 0, 16), 1);
    }

    #[test]
    fn text_heavy_bands() {
        // 10 KB/page.
        assert_eq!(select_thread_count(100, 1_000_000, 32), 16);
        assert_eq!(select_thread_count(800, 8_000_000, 32), 4);
    }

    #[test]
    fn image_heavy_bands() {
        // 200 KB/page.
        assert_eq!(select_thread_count(100, 20_000_000, 32), 4);
        assert_eq!(select_thread_count(200, 40_000_000, 32), 16);
        assert_eq!(select_thread_count(400, 80_000_000, 32), 8);
    }

    #[test]
    fn mixed_bands_and_unknown_size() {
        // 50 KB/page.
        assert_eq!(select_thread_count(100, 5_000_000, 32), 4);
        assert_eq!(select_thread_count(200, 10_000_000, 32), 8);
        assert_eq!(select_thread_count(500, 25_000_000, 32), 4);
        // Unknown size falls into the mixed bands.
        assert_eq!(select_thread_count(200, 0, 32), 8);
    }

    #[test]
    fn never_more_threads_than_pages_or_hardware() {
        // Text-heavy but only 5 pages: capped by the page count.
        assert_eq!(select_thread_count(5, 50_000, 32), 5);
        // Text-heavy on a 2-thread machine: capped by hardware.
        assert_eq!(select_thread_count(100, 1_000_000, 2), 2);
        // Mixed, 6 pages: the band cap of 4 wins.
        assert_eq!(select_thread_count(6, 300_000, 32), 4);
    }
}
