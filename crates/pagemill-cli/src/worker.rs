//! Worker subprocess protocol.
//!
//! Child processes are re-executions of this binary with a positional
//! argument form:
//!
//! ```text
//! --worker <pdf> <output> <start> <end> <worker_id> <utf8|utf32le>
//! --worker <pdf> <outdir> <start> <end> <worker_id> <dpi> <png|jpg|ppm|bgra>
//!          <render_quality> <force_alpha> <thread_count> [jpeg_quality [benchmark]]
//! ```
//!
//! Exit codes: 0 success, 1 generic fatal, 2 document-open or read
//! failure. Per-page failures inside a worker are logged and do not fail
//! the process; the coordinator treats any non-zero exit as fatal for the
//! whole batch.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use pagemill_core::{
    extract_plain_range, render_to_directory, OutputConfig, OutputEncoding, RenderJob,
    RenderOptions, TextEncoding,
};
use pagemill_parser::RenderFlags;
use tracing::warn;

use crate::backend;

/// Entry point for `--worker` invocations; returns the process exit code.
pub fn worker_main(args: &[String]) -> i32 {
    match args.len() {
        6 => text_worker(args),
        10..=12 => render_worker(args),
        _ => {
            eprintln!(
                "worker usage:\n  --worker <pdf> <output> <start> <end> <worker_id> <utf8|utf32le>\n  \
                 --worker <pdf> <outdir> <start> <end> <worker_id> <dpi> <format> \
                 <render_quality> <force_alpha> <thread_count> [jpeg_quality [benchmark]]"
            );
            1
        }
    }
}

struct TextWorkerArgs {
    pdf: PathBuf,
    output: PathBuf,
    start: u32,
    end: u32,
    worker_id: usize,
    encoding: TextEncoding,
}

fn parse_text_args(args: &[String]) -> Option<TextWorkerArgs> {
    Some(TextWorkerArgs {
        pdf: PathBuf::from(&args[0]),
        output: PathBuf::from(&args[1]),
        start: args[2].parse().ok()?,
        end: args[3].parse().ok()?,
        worker_id: args[4].parse().ok()?,
        encoding: TextEncoding::parse(&args[5])?,
    })
}

fn text_worker(args: &[String]) -> i32 {
    let Some(args) = parse_text_args(args) else {
        eprintln!("worker: malformed text-extract arguments");
        return 1;
    };
    if args.end < args.start {
        eprintln!("worker: reversed page range {}..{}", args.start, args.end);
        return 1;
    }

    let document = match backend::open_document(&args.pdf, None) {
        Ok(document) => document,
        Err(err) => {
            eprintln!("worker: failed to open {}: {err:#}", args.pdf.display());
            return 2;
        }
    };

    let file = match File::create(&args.output) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("worker: failed to create {}: {err}", args.output.display());
            return 1;
        }
    };
    let mut out = BufWriter::new(file);

    // Worker 0's first page skips the separator mark: the coordinator
    // writes the file-level one when merging.
    let result = extract_plain_range(
        &document,
        &mut out,
        args.start,
        args.end - args.start,
        args.encoding,
        args.worker_id != 0,
    );
    match result.and_then(|summary| {
        out.flush()?;
        Ok(summary)
    }) {
        Ok(summary) => {
            if summary.failed > 0 {
                warn!(
                    worker_id = args.worker_id,
                    failed = summary.failed,
                    "pages failed during extraction"
                );
            }
            0
        }
        Err(err) => {
            eprintln!("worker: extraction failed: {err}");
            1
        }
    }
}

struct RenderWorkerArgs {
    pdf: PathBuf,
    output_dir: PathBuf,
    start: u32,
    end: u32,
    worker_id: usize,
    dpi: f64,
    format: OutputEncoding,
    render_quality: u32,
    force_alpha: bool,
    thread_count: usize,
    jpeg_quality: u8,
    benchmark: bool,
}

fn parse_render_args(args: &[String]) -> Option<RenderWorkerArgs> {
    Some(RenderWorkerArgs {
        pdf: PathBuf::from(&args[0]),
        output_dir: PathBuf::from(&args[1]),
        start: args[2].parse().ok()?,
        end: args[3].parse().ok()?,
        worker_id: args[4].parse().ok()?,
        dpi: args[5].parse().ok()?,
        format: OutputEncoding::parse(&args[6])?,
        render_quality: args[7].parse().ok()?,
        force_alpha: match args[8].as_str() {
            "1" => true,
            "0" => false,
            _ => return None,
        },
        thread_count: args[9].parse().ok()?,
        jpeg_quality: args.get(10).map_or(Some(85), |s| s.parse().ok())?,
        benchmark: match args.get(11).map(String::as_str) {
            Some("1") => true,
            Some("0") | None => false,
            _ => return None,
        },
    })
}

fn render_worker(args: &[String]) -> i32 {
    let Some(args) = parse_render_args(args) else {
        eprintln!("worker: malformed render arguments");
        return 1;
    };
    if args.end < args.start {
        eprintln!("worker: reversed page range {}..{}", args.start, args.end);
        return 1;
    }

    let document = match backend::open_document(&args.pdf, None) {
        Ok(document) => document,
        Err(err) => {
            eprintln!("worker: failed to open {}: {err:#}", args.pdf.display());
            return 2;
        }
    };

    let mut flags = RenderFlags::ANNOTATIONS;
    if args.render_quality > 0 {
        flags = flags | RenderFlags::HIGH_QUALITY;
    }
    let result = render_to_directory(RenderJob {
        document: &document,
        start: args.start,
        count: args.end - args.start,
        options: RenderOptions {
            thread_count: args.thread_count.max(1),
            dpi: args.dpi,
            flags,
            benchmark: args.benchmark,
            ..Default::default()
        },
        output: OutputConfig {
            dir: args.output_dir,
            encoding: args.format,
            jpeg_quality: args.jpeg_quality,
            force_alpha: args.force_alpha,
        },
    });
    match result {
        Ok(summary) => {
            if summary.failed > 0 {
                warn!(
                    worker_id = args.worker_id,
                    failed = summary.failed,
                    "pages failed during rendering"
                );
            }
            0
        }
        Err(err) => {
            eprintln!("worker: render failed: {err}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn text_args_parse() {
        let args = strings(&["a.pdf", "out.bin", "5", "9", "1", "utf32le"]);
        let parsed = parse_text_args(&args).unwrap();
        assert_eq!(parsed.start, 5);
        assert_eq!(parsed.end, 9);
        assert_eq!(parsed.worker_id, 1);
        assert_eq!(parsed.encoding, TextEncoding::Utf32Le);
    }

    #[test]
    fn text_args_reject_bad_encoding() {
        let args = strings(&["a.pdf", "out.bin", "0", "1", "0", "latin1"]);
        assert!(parse_text_args(&args).is_none());
    }

    #[test]
    fn render_args_parse_with_optionals() {
        let args = strings(&[
            "a.pdf", "out", "0", "10", "2", "300", "jpg", "1", "0", "4", "90", "1",
        ]);
        let parsed = parse_render_args(&args).unwrap();
        assert_eq!(parsed.dpi, 300.0);
        assert_eq!(parsed.format, OutputEncoding::Jpeg);
        assert_eq!(parsed.thread_count, 4);
        assert_eq!(parsed.jpeg_quality, 90);
        assert!(parsed.benchmark);
        assert!(!parsed.force_alpha);
    }

    #[test]
    fn render_args_default_optionals() {
        let args = strings(&["a.pdf", "out", "0", "10", "0", "150", "png", "0", "1", "8"]);
        let parsed = parse_render_args(&args).unwrap();
        assert_eq!(parsed.jpeg_quality, 85);
        assert!(!parsed.benchmark);
        assert!(parsed.force_alpha);
    }

    #[test]
    fn render_args_reject_bad_flag_values() {
        let args = strings(&["a.pdf", "out", "0", "10", "0", "150", "png", "0", "yes", "8"]);
        assert!(parse_render_args(&args).is_none());
    }

    #[test]
    fn dispatch_rejects_unknown_arity() {
        assert_eq!(worker_main(&strings(&["a.pdf", "out"])), 1);
    }
}
