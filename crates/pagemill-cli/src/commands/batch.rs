//! Batch command: render every document matching a glob pattern.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use pagemill_core::{
    render_to_directory, ConfigError, EngineError, OutputConfig, OutputEncoding, RenderJob,
    RenderOptions,
};
use tracing::warn;

use crate::backend;
use super::check_thread_count;

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern of input PDF files
    #[arg(required = true)]
    pub input: String,

    /// Output directory; each document gets a subdirectory
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Render resolution in dots per inch
    #[arg(long, default_value_t = 300.0)]
    pub dpi: f64,

    /// Output format: png, jpg, ppm, or bgra
    #[arg(short, long, default_value = "jpg")]
    pub format: String,

    /// JPEG quality (0-100)
    #[arg(long, default_value_t = 85)]
    pub jpeg_quality: u8,

    /// Render threads per document (1-32, 0 = adaptive)
    #[arg(short = 't', long, default_value_t = 0)]
    pub threads: usize,

    /// Keep going when a document fails
    #[arg(long)]
    pub continue_on_error: bool,
}

struct BatchResult {
    path: PathBuf,
    pages: usize,
    error: Option<String>,
}

pub fn run(args: BatchArgs) -> Result<i32> {
    let threads = check_thread_count(args.threads)?;
    let encoding = OutputEncoding::parse(&args.format).ok_or_else(|| {
        EngineError::Config(ConfigError::InvalidArgument(format!(
            "unknown output format {:?}",
            args.format
        )))
    })?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|entry| entry.ok())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    if files.is_empty() {
        anyhow::bail!("no PDF files match pattern: {}", args.input);
    }

    println!(
        "{} Found {} documents to render",
        style("ℹ").blue(),
        files.len()
    );

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
            .unwrap()
            .progress_chars("=>-"),
    );

    let started = Instant::now();
    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let result = render_one(&path, &args, encoding, threads);
        match result {
            Ok(pages) => results.push(BatchResult {
                path,
                pages,
                error: None,
            }),
            Err(err) => {
                if !args.continue_on_error {
                    progress.abandon();
                    return Err(err);
                }
                warn!(path = %path.display(), %err, "document failed");
                results.push(BatchResult {
                    path,
                    pages: 0,
                    error: Some(format!("{err:#}")),
                });
            }
        }
        progress.inc(1);
    }
    progress.finish_with_message("Complete");

    let failed: Vec<&BatchResult> = results.iter().filter(|r| r.error.is_some()).collect();
    let total_pages: usize = results.iter().map(|r| r.pages).sum();

    println!();
    println!(
        "{} Rendered {} pages from {} documents in {:.2}s",
        style("✓").green(),
        total_pages,
        results.len() - failed.len(),
        started.elapsed().as_secs_f64()
    );
    if !failed.is_empty() {
        println!("{}", style("Failed documents:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(if failed.is_empty() { 0 } else { 1 })
}

fn render_one(
    path: &PathBuf,
    args: &BatchArgs,
    encoding: OutputEncoding,
    threads: usize,
) -> Result<usize> {
    let document = backend::open_document(path, None)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let dir = args.output_dir.join(stem);

    let summary = render_to_directory(RenderJob {
        document: &document,
        start: 0,
        count: document.page_count(),
        options: RenderOptions {
            thread_count: threads,
            dpi: args.dpi,
            ..Default::default()
        },
        output: OutputConfig {
            dir,
            encoding,
            jpeg_quality: args.jpeg_quality,
            force_alpha: false,
        },
    })?;
    if summary.failed > 0 {
        anyhow::bail!("{} of its pages failed", summary.failed);
    }
    Ok(summary.pages_done())
}
