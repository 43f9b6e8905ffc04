//! Page output encoders and file naming.

mod writer;

pub use writer::{WritePool, WriteSubmitter};

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use pagemill_parser::{Bitmap, PixelFormat};

use crate::error::Result;

/// On-disk encoding of rendered pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    Png,
    Jpeg,
    Ppm,
    RawBgra,
}

impl OutputEncoding {
    pub fn extension(self) -> &'static str {
        match self {
            OutputEncoding::Png => "png",
            OutputEncoding::Jpeg => "jpg",
            OutputEncoding::Ppm => "ppm",
            OutputEncoding::RawBgra => "bgra",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "png" => Some(OutputEncoding::Png),
            "jpg" | "jpeg" => Some(OutputEncoding::Jpeg),
            "ppm" => Some(OutputEncoding::Ppm),
            "bgra" => Some(OutputEncoding::RawBgra),
            _ => None,
        }
    }

    /// Whether scanned pages may bypass rendering as raw JPEG files.
    ///
    /// PPM and raw outputs promise pixel data, so they always render.
    pub fn supports_scanned_passthrough(self) -> bool {
        matches!(self, OutputEncoding::Png | OutputEncoding::Jpeg)
    }
}

/// Output file name for a page: zero-padded to five digits, widening
/// naturally past 100 000 so names never collide.
pub fn page_file_name(index: u32, extension: &str) -> String {
    format!("page_{index:05}.{extension}")
}

/// RGB bytes of a bitmap, row by row, honoring the stride.
fn to_rgb(bitmap: &Bitmap) -> Vec<u8> {
    let width = bitmap.width() as usize;
    let height = bitmap.height();
    let mut rgb = Vec::with_capacity(width * height as usize * 3);
    match bitmap.format() {
        PixelFormat::Bgrx | PixelFormat::Bgr => {
            let bpp = bitmap.format().bytes_per_pixel();
            for y in 0..height {
                let row = bitmap.row(y);
                for x in 0..width {
                    let off = x * bpp;
                    rgb.push(row[off + 2]);
                    rgb.push(row[off + 1]);
                    rgb.push(row[off]);
                }
            }
        }
        PixelFormat::Gray => {
            for y in 0..height {
                for &v in bitmap.row(y) {
                    rgb.extend_from_slice(&[v, v, v]);
                }
            }
        }
    }
    rgb
}

/// RGBA bytes with an opaque alpha channel.
fn to_rgba(bitmap: &Bitmap) -> Vec<u8> {
    let width = bitmap.width() as usize;
    let height = bitmap.height();
    let mut rgba = Vec::with_capacity(width * height as usize * 4);
    match bitmap.format() {
        PixelFormat::Bgrx | PixelFormat::Bgr => {
            let bpp = bitmap.format().bytes_per_pixel();
            for y in 0..height {
                let row = bitmap.row(y);
                for x in 0..width {
                    let off = x * bpp;
                    rgba.extend_from_slice(&[row[off + 2], row[off + 1], row[off], 0xFF]);
                }
            }
        }
        PixelFormat::Gray => {
            for y in 0..height {
                for &v in bitmap.row(y) {
                    rgba.extend_from_slice(&[v, v, v, 0xFF]);
                }
            }
        }
    }
    rgba
}

/// Grayscale bytes; only meaningful for bitmaps rendered as `Gray`.
fn to_gray(bitmap: &Bitmap) -> Vec<u8> {
    let height = bitmap.height();
    let mut gray = Vec::with_capacity(bitmap.width() as usize * height as usize);
    for y in 0..height {
        gray.extend_from_slice(bitmap.row(y));
    }
    gray
}

/// Encode a bitmap into the final output bytes for one page file.
pub fn encode_bitmap(
    bitmap: &Bitmap,
    encoding: OutputEncoding,
    jpeg_quality: u8,
    force_alpha: bool,
) -> Result<Vec<u8>> {
    let width = bitmap.width();
    let height = bitmap.height();
    match encoding {
        OutputEncoding::Ppm => {
            // ASCII header, then packed RGB. Alpha is discarded.
            let rgb = to_rgb(bitmap);
            let mut out = Vec::with_capacity(rgb.len() + 32);
            out.extend_from_slice(format!("P6\n{width} {height}\n255\n").as_bytes());
            out.extend_from_slice(&rgb);
            Ok(out)
        }
        OutputEncoding::Jpeg => {
            let mut out = Cursor::new(Vec::new());
            let encoder = JpegEncoder::new_with_quality(&mut out, jpeg_quality.min(100));
            if bitmap.format() == PixelFormat::Gray {
                encoder.write_image(&to_gray(bitmap), width, height, ExtendedColorType::L8)?;
            } else {
                encoder.write_image(&to_rgb(bitmap), width, height, ExtendedColorType::Rgb8)?;
            }
            Ok(out.into_inner())
        }
        OutputEncoding::Png => {
            // No filtering and fast compression: these files feed pipelines,
            // so encode throughput beats size.
            let mut out = Cursor::new(Vec::new());
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::NoFilter);
            if bitmap.format() == PixelFormat::Gray {
                encoder.write_image(&to_gray(bitmap), width, height, ExtendedColorType::L8)?;
            } else if force_alpha {
                encoder.write_image(&to_rgba(bitmap), width, height, ExtendedColorType::Rgba8)?;
            } else {
                encoder.write_image(&to_rgb(bitmap), width, height, ExtendedColorType::Rgb8)?;
            }
            Ok(out.into_inner())
        }
        OutputEncoding::RawBgra => {
            // Rows without stride padding, channels exactly as rendered.
            let mut out =
                Vec::with_capacity(width as usize * height as usize * bitmap.format().bytes_per_pixel());
            for y in 0..height {
                out.extend_from_slice(bitmap.row(y));
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_with_pattern(format: PixelFormat) -> Bitmap {
        let mut bmp = Bitmap::new(3, 2, format).unwrap();
        bmp.fill_rect(0, 0, 3, 2, 0xFFFFFFFF);
        bmp.fill_rect(0, 0, 1, 1, 0x00102030);
        bmp
    }

    #[test]
    fn file_names_are_zero_padded_and_widen() {
        assert_eq!(page_file_name(5, "jpg"), "page_00005.jpg");
        assert_eq!(page_file_name(99_999, "png"), "page_99999.png");
        assert_eq!(page_file_name(123_456, "ppm"), "page_123456.ppm");
    }

    #[test]
    fn encoding_names_round_trip() {
        for encoding in [
            OutputEncoding::Png,
            OutputEncoding::Ppm,
            OutputEncoding::RawBgra,
        ] {
            assert_eq!(OutputEncoding::parse(encoding.extension()), Some(encoding));
        }
        assert_eq!(OutputEncoding::parse("jpg"), Some(OutputEncoding::Jpeg));
        assert_eq!(OutputEncoding::parse("tiff"), None);
    }

    #[test]
    fn ppm_header_and_channel_swap() {
        let bmp = bitmap_with_pattern(PixelFormat::Bgrx);
        let out = encode_bitmap(&bmp, OutputEncoding::Ppm, 85, false).unwrap();
        assert!(out.starts_with(b"P6\n3 2\n255\n"));
        let pixels = &out[b"P6\n3 2\n255\n".len()..];
        assert_eq!(pixels.len(), 3 * 2 * 3);
        // First pixel was 0xRRGGBB = 10 20 30, stored BGR, emitted RGB.
        assert_eq!(&pixels[..3], &[0x10, 0x20, 0x30]);
        assert_eq!(&pixels[3..6], &[0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn jpeg_output_has_signature() {
        let bmp = bitmap_with_pattern(PixelFormat::Bgr);
        let out = encode_bitmap(&bmp, OutputEncoding::Jpeg, 85, false).unwrap();
        assert_eq!(&out[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn png_output_has_signature() {
        let bmp = bitmap_with_pattern(PixelFormat::Gray);
        let out = encode_bitmap(&bmp, OutputEncoding::Png, 85, false).unwrap();
        assert_eq!(&out[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn raw_output_strips_stride_padding() {
        // 3 px * 4 bytes = 12, already aligned; use BGR (9 -> stride 12) to
        // see trimming.
        let bmp = bitmap_with_pattern(PixelFormat::Bgr);
        let out = encode_bitmap(&bmp, OutputEncoding::RawBgra, 85, false).unwrap();
        assert_eq!(out.len(), 3 * 2 * 3);
    }

    #[test]
    fn passthrough_capability_by_encoding() {
        assert!(OutputEncoding::Jpeg.supports_scanned_passthrough());
        assert!(OutputEncoding::Png.supports_scanned_passthrough());
        assert!(!OutputEncoding::Ppm.supports_scanned_passthrough());
        assert!(!OutputEncoding::RawBgra.supports_scanned_passthrough());
    }
}
