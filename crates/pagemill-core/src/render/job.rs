//! Page-to-file render jobs.
//!
//! A job drives one page range of one document into encoded files: the
//! scanned-page pass first (so a page's bytes never depend on the thread
//! count), then the parallel controller with an encode-and-write callback,
//! then the writer-pool join. Per-page failures are counted and logged but
//! never abort the batch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use pagemill_parser::Rotation;
use tracing::{debug, info, trace, warn};

use crate::document::Document;
use crate::error::{ConfigError, Result};
use crate::output::{encode_bitmap, page_file_name, WritePool};
use crate::pool::CallbackV2;
use crate::render::controller::render_pages_parallel_v2;
use crate::render::options::{OutputConfig, RenderOptions};
use crate::render::smart::scanned_page_jpeg;

/// Writer threads backing one job.
const IO_THREADS: usize = 2;
/// Pending file writes before encoders start blocking.
const IO_QUEUE_DEPTH: usize = 64;

/// What a finished render job did.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderSummary {
    /// Pages rendered through the full pipeline.
    pub rendered: usize,
    /// Scanned pages written as raw JPEG without rendering.
    pub passthrough: usize,
    /// Pages that failed to render or write.
    pub failed: usize,
}

impl RenderSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    pub fn pages_done(&self) -> usize {
        self.rendered + self.passthrough
    }
}

/// A render-to-files request.
pub struct RenderJob<'a> {
    pub document: &'a Arc<Document>,
    pub start: u32,
    pub count: u32,
    pub options: RenderOptions,
    pub output: OutputConfig,
}

/// Render `count` pages from `start` into the output directory.
pub fn render_to_directory(job: RenderJob<'_>) -> Result<RenderSummary> {
    let RenderJob {
        document,
        start,
        count,
        options,
        output,
    } = job;

    if options.dpi <= 0.0 {
        return Err(ConfigError::InvalidArgument("render jobs require a positive dpi".into()).into());
    }
    std::fs::create_dir_all(&output.dir).map_err(|source| ConfigError::OutputDir {
        path: output.dir.clone(),
        source,
    })?;
    if count == 0 {
        return Ok(RenderSummary::default());
    }

    let started = Instant::now();
    let writer = WritePool::new(IO_THREADS, IO_QUEUE_DEPTH);
    let mut done = vec![false; count as usize];
    let mut passthrough = 0usize;

    // Scanned-page pass: runs before thread-count dispatch so the bytes a
    // page produces are invariant under the parallelism choice.
    if output.encoding.supports_scanned_passthrough() && !options.benchmark {
        for offset in 0..count {
            let page_index = start + offset;
            let _guard = document.lock_pages();
            let page = match document.load_page(page_index) {
                Ok(page) => page,
                // Leave the failure to the render pass, which counts it.
                Err(_) => continue,
            };
            if let Some(jpeg) = scanned_page_jpeg(page.as_ref()) {
                trace!(page = page_index, bytes = jpeg.len(), "scanned-page passthrough");
                writer.submit_write(output.dir.join(page_file_name(page_index, "jpg")), jpeg);
                done[offset as usize] = true;
                passthrough += 1;
            }
        }
    }

    let rendered = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let callback: CallbackV2 = {
        let rendered = Arc::clone(&rendered);
        let failed = Arc::clone(&failed);
        let submitter = writer.submitter();
        let dir = output.dir.clone();
        let encoding = output.encoding;
        let jpeg_quality = output.jpeg_quality;
        let force_alpha = output.force_alpha;
        let benchmark = options.benchmark;
        // Encoding happens on the worker that rendered the page, with no
        // document lock held; only the final write crosses to the I/O pool.
        Arc::new(move |page_index, bitmap, success| {
            let Some(bitmap) = bitmap.filter(|_| success) else {
                failed.fetch_add(1, Ordering::SeqCst);
                return;
            };
            if benchmark {
                rendered.fetch_add(1, Ordering::SeqCst);
                return;
            }
            match encode_bitmap(bitmap, encoding, jpeg_quality, force_alpha) {
                Ok(bytes) => {
                    submitter
                        .submit_write(dir.join(page_file_name(page_index, encoding.extension())), bytes);
                    rendered.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => {
                    warn!(page = page_index, %err, "encode failed");
                    failed.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
    };

    render_pages_parallel_v2(
        document,
        start,
        count,
        0,
        0,
        Rotation::None,
        options.flags,
        &options,
        Some(&done),
        callback,
    )?;

    let write_failures = writer.wait_all();
    let summary = RenderSummary {
        rendered: rendered.load(Ordering::SeqCst),
        passthrough,
        failed: failed.load(Ordering::SeqCst) + write_failures.len(),
    };

    let elapsed = started.elapsed();
    if options.benchmark {
        info!(
            pages = summary.pages_done(),
            elapsed_ms = elapsed.as_millis() as u64,
            pages_per_sec =
                format!("{:.1}", summary.pages_done() as f64 / elapsed.as_secs_f64().max(1e-9)),
            "benchmark render finished"
        );
    } else {
        debug!(
            pages = summary.pages_done(),
            passthrough = summary.passthrough,
            failed = summary.failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "render job finished"
        );
    }
    Ok(summary)
}
