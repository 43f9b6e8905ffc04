//! Render command: one document to a directory of page images.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use console::style;
use pagemill_core::{
    render_multiprocess, render_to_directory, ConfigError, EngineError, OutputConfig,
    OutputEncoding, PageRange, RenderJob, RenderOptions, RenderWorkerParams,
};
use pagemill_parser::RenderFlags;

use crate::backend;
use super::{check_thread_count, check_worker_count};

/// Arguments for the render command.
#[derive(Args)]
pub struct RenderArgs {
    /// Input PDF file
    pub pdf: PathBuf,

    /// Output directory for page files
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Render resolution in dots per inch
    #[arg(long, default_value_t = 300.0)]
    pub dpi: f64,

    /// Page selection: a 0-based index N or a closed range A-B
    #[arg(short, long)]
    pub pages: Option<String>,

    /// Worker processes (1-16)
    #[arg(short = 'w', long, default_value_t = 1)]
    pub workers: usize,

    /// Render threads per process (1-32, 0 = adaptive)
    #[arg(short = 't', long, default_value_t = 0)]
    pub threads: usize,

    /// Output format: png, jpg, ppm, or bgra
    #[arg(short, long, default_value = "png")]
    pub format: String,

    /// JPEG quality (0-100)
    #[arg(long, default_value_t = 85)]
    pub jpeg_quality: u8,

    /// Emit an alpha channel in PNG output
    #[arg(long)]
    pub force_alpha: bool,

    /// Trade speed for quality in the renderer
    #[arg(long, default_value_t = 0)]
    pub render_quality: u32,

    /// Measure rendering without writing files
    #[arg(long)]
    pub benchmark: bool,

    /// Document password
    #[arg(long)]
    pub password: Option<String>,
}

pub fn run(args: RenderArgs) -> Result<i32> {
    check_worker_count(args.workers)?;
    let threads = check_thread_count(args.threads)?;
    let encoding = OutputEncoding::parse(&args.format).ok_or_else(|| {
        EngineError::Config(ConfigError::InvalidArgument(format!(
            "unknown output format {:?}",
            args.format
        )))
    })?;
    let range = args
        .pages
        .as_deref()
        .map(|s| s.parse::<PageRange>())
        .transpose()
        .map_err(EngineError::Range)?;

    let started = Instant::now();
    let document = backend::open_document(&args.pdf, args.password.as_deref())?;
    let (start, count) = PageRange::resolve_or_all(range.as_ref(), document.page_count())
        .map_err(EngineError::Range)?;

    if args.workers > 1 {
        // The parent only coordinates; children open their own documents.
        drop(document);
        let exe = std::env::current_exe()?;
        render_multiprocess(
            &exe,
            &args.pdf,
            &args.output_dir,
            start,
            start + count,
            args.workers,
            &RenderWorkerParams {
                dpi: args.dpi,
                format: encoding,
                render_quality: args.render_quality,
                force_alpha: args.force_alpha,
                thread_count: threads,
                jpeg_quality: args.jpeg_quality,
                benchmark: args.benchmark,
            },
        )
        .map_err(EngineError::Coordinator)?;
        println!(
            "{} Rendered {} pages with {} workers in {:.2}s",
            style("✓").green(),
            count,
            args.workers,
            started.elapsed().as_secs_f64()
        );
        return Ok(0);
    }

    let mut flags = RenderFlags::ANNOTATIONS;
    if args.render_quality > 0 {
        flags = flags | RenderFlags::HIGH_QUALITY;
    }
    let summary = render_to_directory(RenderJob {
        document: &document,
        start,
        count,
        options: RenderOptions {
            thread_count: threads,
            dpi: args.dpi,
            flags,
            benchmark: args.benchmark,
            ..Default::default()
        },
        output: OutputConfig {
            dir: args.output_dir.clone(),
            encoding,
            jpeg_quality: args.jpeg_quality,
            force_alpha: args.force_alpha,
        },
    })?;

    println!(
        "{} Rendered {} pages ({} scanned passthrough, {} failed) in {:.2}s",
        if summary.is_clean() {
            style("✓").green()
        } else {
            style("!").yellow()
        },
        summary.pages_done(),
        summary.passthrough,
        summary.failed,
        started.elapsed().as_secs_f64()
    );
    Ok(if summary.is_clean() { 0 } else { 1 })
}
