//! Parallel render entry points.
//!
//! The controller validates the request, picks a thread count, and fans the
//! page range out to the persistent worker pool — or renders inline when
//! one thread (or one page) makes pool traffic pointless. Before any
//! parallelism it pre-warms the target pages sequentially so the parser's
//! document-wide caches are populated without racing, then freezes the
//! glyph caches into their lock-free read mode.
//!
//! Callbacks may arrive in any order and on any worker thread; callers must
//! not assume page-index order. On return every loaded page has been closed
//! again, in reverse order, under the document's page-load mutex.

use std::sync::Arc;

use pagemill_parser::{RenderFlags, Rotation};
use tracing::{debug, warn};

use crate::document::{Document, PageHandleCollection};
use crate::error::{ConfigError, Result};
use crate::pool::{
    self, render_pool, CallbackV1, CallbackV2, RenderTask, RenderTaskV2,
};
use crate::render::adaptive::{hardware_threads, select_thread_count};
use crate::render::options::RenderOptions;

/// Queue bound switched on automatically for documents past this size.
const AUTO_BACKPRESSURE_THRESHOLD: u32 = 256;

struct Validated {
    count: u32,
    thread_count: usize,
}

fn validate(
    document: &Document,
    start: u32,
    count: u32,
    options: &RenderOptions,
) -> Result<Validated> {
    if count == 0 {
        return Err(ConfigError::InvalidArgument("page count must be positive".into()).into());
    }
    let total = document.page_count();
    if start >= total {
        return Err(ConfigError::InvalidArgument(format!(
            "start page {start} out of range (document has {total} pages)"
        ))
        .into());
    }
    let count = count.min(total - start);
    let thread_count = if options.thread_count > 0 {
        options.thread_count
    } else {
        select_thread_count(total, document.file_size(), hardware_threads())
    };
    Ok(Validated {
        count,
        thread_count,
    })
}

/// Page indices to render, honoring an optional skip mask over the range.
fn pending_pages(start: u32, count: u32, skip: Option<&[bool]>) -> Vec<u32> {
    (0..count)
        .filter(|i| !skip.map(|s| s[*i as usize]).unwrap_or(false))
        .map(|i| start + i)
        .collect()
}

/// Maximal contiguous runs within an ascending index list.
fn contiguous_runs(pages: &[u32]) -> Vec<(u32, u32)> {
    let mut runs = Vec::new();
    let mut iter = pages.iter().copied();
    let Some(first) = iter.next() else {
        return runs;
    };
    let (mut run_start, mut run_end) = (first, first);
    for page in iter {
        if page == run_end + 1 {
            run_end = page;
        } else {
            runs.push((run_start, run_end));
            run_start = page;
            run_end = page;
        }
    }
    runs.push((run_start, run_end));
    runs
}

fn effective_queue_depth(count: u32, options: &RenderOptions) -> usize {
    if options.max_queue_depth > 0 {
        options.max_queue_depth
    } else if count > AUTO_BACKPRESSURE_THRESHOLD {
        AUTO_BACKPRESSURE_THRESHOLD as usize
    } else {
        0
    }
}

/// Render a page range, handing each finished bitmap to the callback.
///
/// The callback owns the bitmaps it receives.
#[allow(clippy::too_many_arguments)]
pub fn render_pages_parallel(
    document: &Arc<Document>,
    start: u32,
    count: u32,
    width: u32,
    height: u32,
    rotation: Rotation,
    flags: RenderFlags,
    options: &RenderOptions,
    callback: CallbackV1,
) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(ConfigError::InvalidArgument("width and height must be positive".into()).into());
    }
    let validated = validate(document, start, count, options)?;
    let count = validated.count;

    let make_task = |page_index: u32, collection: Option<Arc<PageHandleCollection>>| RenderTask {
        document: Arc::clone(document),
        page_index,
        width,
        height,
        rotation,
        flags,
        format: options.output_format,
        collection,
        use_form: options.use_form,
        callback: Arc::clone(&callback),
    };

    if validated.thread_count == 1 || count == 1 {
        for page_index in start..start + count {
            pool::process_task_v1(&make_task(page_index, None));
        }
        return Ok(());
    }

    let pages = pending_pages(start, count, None);
    prewarm(document, &pages);

    let collection = Arc::new(PageHandleCollection::new());
    let pool = render_pool();
    pool.ensure_worker_count(validated.thread_count)?;
    pool.set_max_queue_depth(effective_queue_depth(count, options));

    for &page_index in &pages {
        pool.enqueue(make_task(page_index, Some(Arc::clone(&collection))));
    }
    pool.wait_for_completion();

    collection.close_all(document);
    pool.signal_clear_pools();
    Ok(())
}

/// Render a page range through loaned bitmaps that recycle through the
/// worker-thread pools.
///
/// With `width == height == 0` and `options.dpi > 0`, pixel dimensions are
/// derived per page. `skip` masks out pages (relative to `start`) that are
/// already done — typically via the scanned-page fast path — so they never
/// reach a renderer.
#[allow(clippy::too_many_arguments)]
pub fn render_pages_parallel_v2(
    document: &Arc<Document>,
    start: u32,
    count: u32,
    width: u32,
    height: u32,
    rotation: Rotation,
    flags: RenderFlags,
    options: &RenderOptions,
    skip: Option<&[bool]>,
    callback: CallbackV2,
) -> Result<()> {
    let auto_detect = width == 0 && height == 0 && options.dpi > 0.0;
    if !auto_detect && (width == 0 || height == 0) {
        return Err(ConfigError::InvalidArgument(
            "width and height must be positive unless dpi drives per-page dimensions".into(),
        )
        .into());
    }
    let validated = validate(document, start, count, options)?;
    let count = validated.count;
    if let Some(skip) = skip {
        if skip.len() != count as usize {
            return Err(
                ConfigError::InvalidArgument("skip mask length must match page count".into()).into(),
            );
        }
    }

    let pages = pending_pages(start, count, skip);
    if pages.is_empty() {
        return Ok(());
    }

    let make_task = |page_index: u32, collection: Option<Arc<PageHandleCollection>>| RenderTaskV2 {
        document: Arc::clone(document),
        page_index,
        width,
        height,
        rotation,
        flags,
        format: options.output_format,
        dpi: options.dpi,
        collection,
        use_form: options.use_form,
        callback: Arc::clone(&callback),
    };

    if validated.thread_count == 1 || count == 1 {
        for &page_index in &pages {
            pool::process_task_v2(&make_task(page_index, None));
        }
        return Ok(());
    }

    prewarm(document, &pages);

    let collection = Arc::new(PageHandleCollection::new());
    let pool = render_pool();
    pool.ensure_worker_count(validated.thread_count)?;
    pool.set_max_queue_depth(effective_queue_depth(count, options));

    for (run_start, run_end) in contiguous_runs(&pages) {
        let tasks: Vec<_> = (run_start..=run_end)
            .map(|page_index| make_task(page_index, Some(Arc::clone(&collection))))
            .collect();
        debug!(run_start, run_end, "enqueueing contiguous page run");
        pool.enqueue_batch_v2(tasks);
    }
    pool.wait_for_completion();

    collection.close_all(document);
    pool.signal_clear_pools();
    Ok(())
}

/// Load and close every target page sequentially, with form callbacks, so
/// shared parser caches fill before workers race over them. Afterwards the
/// glyph caches stop changing, so they flip to lock-free reads.
fn prewarm(document: &Document, pages: &[u32]) {
    for &page_index in pages {
        if let Err(err) = document.warm_page(page_index) {
            warn!(page = page_index, %err, "pre-warm failed");
        }
    }
    document.glyphs().freeze();
}
