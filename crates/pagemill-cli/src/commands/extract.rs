//! Extract command: a document's text as one encoded stream.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use console::style;
use pagemill_core::{
    extract_document, extract_jsonl_range, extract_text_multiprocess, ConfigError, EngineError,
    PageRange, TextEncoding,
};

use crate::backend;
use super::check_worker_count;

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input PDF file
    pub pdf: PathBuf,

    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Text encoding: utf8 or utf32le
    #[arg(short, long, default_value = "utf8")]
    pub encoding: String,

    /// Emit one JSON object per character instead of plain text
    #[arg(long)]
    pub jsonl: bool,

    /// Page selection: a 0-based index N or a closed range A-B
    #[arg(short, long)]
    pub pages: Option<String>,

    /// Worker processes (1-16)
    #[arg(short = 'w', long, default_value_t = 1)]
    pub workers: usize,

    /// Document password
    #[arg(long)]
    pub password: Option<String>,
}

pub fn run(args: ExtractArgs) -> Result<i32> {
    check_worker_count(args.workers)?;
    let encoding = TextEncoding::parse(&args.encoding).ok_or_else(|| {
        EngineError::Config(ConfigError::InvalidArgument(format!(
            "unknown text encoding {:?}",
            args.encoding
        )))
    })?;
    if args.jsonl && args.workers > 1 {
        return Err(EngineError::Config(ConfigError::InvalidArgument(
            "JSONL extraction runs in a single process".into(),
        ))
        .into());
    }
    let range = args
        .pages
        .as_deref()
        .map(|s| s.parse::<PageRange>())
        .transpose()
        .map_err(EngineError::Range)?;

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(EngineError::Config(ConfigError::DirectoryNotFound(
                parent.to_path_buf(),
            ))
            .into());
        }
    }

    let started = Instant::now();
    let document = backend::open_document(&args.pdf, args.password.as_deref())?;
    let (start, count) = PageRange::resolve_or_all(range.as_ref(), document.page_count())
        .map_err(EngineError::Range)?;

    if args.workers > 1 {
        // The parent only coordinates; children open their own documents.
        drop(document);
        let exe = std::env::current_exe()?;
        extract_text_multiprocess(
            &exe,
            &args.pdf,
            &args.output,
            start,
            start + count,
            args.workers,
            encoding,
        )
        .map_err(EngineError::Coordinator)?;
        println!(
            "{} Extracted {} pages with {} workers in {:.2}s",
            style("✓").green(),
            count,
            args.workers,
            started.elapsed().as_secs_f64()
        );
        return Ok(0);
    }

    let file = File::create(&args.output)?;
    let mut out = BufWriter::new(file);
    let summary = if args.jsonl {
        extract_jsonl_range(&document, &mut out, start, count)?
    } else {
        extract_document(&document, &mut out, start, count, encoding)?
    };
    std::io::Write::flush(&mut out)?;

    println!(
        "{} Extracted {} pages ({} failed) in {:.2}s",
        if summary.is_clean() {
            style("✓").green()
        } else {
            style("!").yellow()
        },
        summary.pages,
        summary.failed,
        started.elapsed().as_secs_f64()
    );
    Ok(if summary.is_clean() { 0 } else { 1 })
}
