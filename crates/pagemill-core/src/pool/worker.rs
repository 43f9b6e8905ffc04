//! Persistent render worker pool.
//!
//! One pool per process, lazily created through [`render_pool`] and torn
//! down with [`destroy_render_pool`] so the embedding application controls
//! ordering relative to parser teardown. Worker threads are only ever added,
//! never removed; they loop until the stop flag is set and every accepted
//! task has completed.
//!
//! Tasks flow through two lock-free MPMC queues. The v2 queue is preferred
//! by workers because its bitmaps come from and return to the thread-local
//! pool; v1 hands bitmap ownership to the callback. `outstanding_tasks` is
//! the authoritative completion signal: incremented before a task enters a
//! queue, decremented only after its callback has returned. Approximate
//! queue sizes are unsuitable for joining — they can read zero while a task
//! is still being processed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use pagemill_parser::{Bitmap, PageAction, PixelFormat, RenderFlags, Rotation};
use tracing::{debug, trace, warn};

use crate::document::{Document, PageHandleCollection};
use crate::error::PoolError;
use crate::pool::with_thread_bitmap_pool;
use crate::render::adaptive::{pixel_dimension, scale_for_dpi};

/// Completion callback for v1 tasks: receives the rendered bitmap by value.
pub type CallbackV1 = Arc<dyn Fn(u32, Option<Bitmap>, bool) + Send + Sync>;

/// Completion callback for v2 tasks: borrows the bitmap for the duration of
/// the call; the buffer is reclaimed into the worker's pool afterwards.
pub type CallbackV2 = Arc<dyn Fn(u32, Option<&Bitmap>, bool) + Send + Sync>;

/// A queued v1 render task.
pub struct RenderTask {
    pub document: Arc<Document>,
    pub page_index: u32,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub flags: RenderFlags,
    pub format: PixelFormat,
    pub collection: Option<Arc<PageHandleCollection>>,
    pub use_form: bool,
    pub callback: CallbackV1,
}

/// A queued v2 render task.
///
/// `width == height == 0` with `dpi > 0` selects per-page dimensions
/// computed from the page size at processing time.
pub struct RenderTaskV2 {
    pub document: Arc<Document>,
    pub page_index: u32,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub flags: RenderFlags,
    pub format: PixelFormat,
    pub dpi: f64,
    pub collection: Option<Arc<PageHandleCollection>>,
    pub use_form: bool,
    pub callback: CallbackV2,
}

struct PoolInner {
    queue_v1: SegQueue<RenderTask>,
    queue_v2: SegQueue<RenderTaskV2>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    wait_lock: Mutex<()>,
    task_available: Condvar,
    done: Condvar,
    backpressure: Condvar,
    outstanding: AtomicUsize,
    stop: AtomicBool,
    clear_pools: AtomicBool,
    max_queue_depth: AtomicUsize,
}

/// Handle to a persistent pool of render worker threads.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPool {
    pub fn new() -> Self {
        WorkerPool {
            inner: Arc::new(PoolInner {
                queue_v1: SegQueue::new(),
                queue_v2: SegQueue::new(),
                workers: Mutex::new(Vec::new()),
                wait_lock: Mutex::new(()),
                task_available: Condvar::new(),
                done: Condvar::new(),
                backpressure: Condvar::new(),
                outstanding: AtomicUsize::new(0),
                stop: AtomicBool::new(false),
                clear_pools: AtomicBool::new(false),
                max_queue_depth: AtomicUsize::new(0),
            }),
        }
    }

    /// Grow the pool to at least `desired` worker threads.
    pub fn ensure_worker_count(&self, desired: usize) -> Result<(), PoolError> {
        let mut workers = self.inner.workers.lock();
        let current = workers.len();
        for i in current..desired {
            let inner = Arc::clone(&self.inner);
            let handle = std::thread::Builder::new()
                .name(format!("pagemill-render-{i}"))
                .spawn(move || worker_loop(inner))
                .map_err(PoolError::Spawn)?;
            workers.push(handle);
        }
        if desired > current {
            debug!(from = current, to = desired, "grew render worker pool");
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.inner.workers.lock().len()
    }

    /// Bound on outstanding tasks during enqueue; zero means unlimited.
    pub fn set_max_queue_depth(&self, depth: usize) {
        self.inner.max_queue_depth.store(depth, Ordering::Release);
    }

    pub fn outstanding_tasks(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Submit a v1 task; blocks while the backpressure bound is exceeded.
    pub fn enqueue(&self, task: RenderTask) {
        self.inner.wait_for_backpressure(1);
        self.inner.outstanding.fetch_add(1, Ordering::Release);
        self.inner.queue_v1.push(task);
        let _guard = self.inner.wait_lock.lock();
        self.inner.task_available.notify_one();
    }

    /// Submit a v2 task; blocks while the backpressure bound is exceeded.
    pub fn enqueue_v2(&self, task: RenderTaskV2) {
        self.inner.wait_for_backpressure(1);
        self.inner.outstanding.fetch_add(1, Ordering::Release);
        self.inner.queue_v2.push(task);
        let _guard = self.inner.wait_lock.lock();
        self.inner.task_available.notify_one();
    }

    /// Submit a batch of v2 tasks and wake every worker at once.
    ///
    /// For batches larger than the backpressure bound the required free
    /// space is capped at the bound, so oversized batches make progress by
    /// draining to empty first.
    pub fn enqueue_batch_v2(&self, tasks: Vec<RenderTaskV2>) {
        if tasks.is_empty() {
            return;
        }
        self.inner.wait_for_backpressure(tasks.len());
        self.inner
            .outstanding
            .fetch_add(tasks.len(), Ordering::Release);
        for task in tasks {
            self.inner.queue_v2.push(task);
        }
        let _guard = self.inner.wait_lock.lock();
        self.inner.task_available.notify_all();
    }

    /// Block until every accepted task has fully completed.
    ///
    /// Pairs with the release decrement after each callback, so returning
    /// implies visibility of all callback writes.
    pub fn wait_for_completion(&self) {
        let mut guard = self.inner.wait_lock.lock();
        while self.inner.outstanding.load(Ordering::Acquire) != 0 {
            self.inner.done.wait(&mut guard);
        }
    }

    /// Ask idle workers to drain their bitmap pools.
    ///
    /// Best-effort: a worker that misses the flag clears on a later wakeup.
    pub fn signal_clear_pools(&self) {
        self.inner.clear_pools.store(true, Ordering::Release);
        let _guard = self.inner.wait_lock.lock();
        self.inner.task_available.notify_all();
    }

    /// Stop the workers and join them. Pending tasks are completed first.
    pub fn shutdown(self) {
        self.inner.stop.store(true, Ordering::Release);
        {
            let _guard = self.inner.wait_lock.lock();
            self.inner.task_available.notify_all();
        }
        let handles = std::mem::take(&mut *self.inner.workers.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl PoolInner {
    /// Block while the outstanding count leaves less than `required` free
    /// slots under the configured bound.
    fn wait_for_backpressure(&self, required: usize) {
        let depth = self.max_queue_depth.load(Ordering::Acquire);
        if depth == 0 {
            return;
        }
        let required = required.min(depth);
        let mut guard = self.wait_lock.lock();
        while self.outstanding.load(Ordering::Acquire) > depth - required {
            self.backpressure.wait(&mut guard);
        }
    }

    /// Mark one task complete; wake the joiner on zero and one enqueuer
    /// always.
    fn finish_task(&self) {
        let prev = self.outstanding.fetch_sub(1, Ordering::Release);
        let _guard = self.wait_lock.lock();
        if prev == 1 {
            self.done.notify_all();
        }
        self.backpressure.notify_one();
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    trace!("render worker started");
    loop {
        // v2 first: its bitmaps recycle through the thread pool.
        if let Some(task) = inner.queue_v2.pop() {
            process_task_v2(&task);
            // The task (and its callback clone) must be gone before the
            // counter reads zero; joiners rely on that for teardown.
            drop(task);
            inner.finish_task();
            continue;
        }
        if let Some(task) = inner.queue_v1.pop() {
            process_task_v1(&task);
            drop(task);
            inner.finish_task();
            continue;
        }

        {
            let mut guard = inner.wait_lock.lock();
            while !(inner.stop.load(Ordering::Acquire)
                || inner.clear_pools.load(Ordering::Acquire)
                || !inner.queue_v1.is_empty()
                || !inner.queue_v2.is_empty())
            {
                inner.task_available.wait(&mut guard);
            }
        }

        if inner.clear_pools.load(Ordering::Acquire) {
            with_thread_bitmap_pool(|pool| pool.clear());
            // Reset only once the join has been satisfied; until then other
            // workers still need to observe the flag. Clearing twice is
            // harmless.
            if inner.outstanding.load(Ordering::Acquire) == 0 {
                inner.clear_pools.store(false, Ordering::Release);
            }
        }

        if inner.stop.load(Ordering::Acquire) && inner.outstanding.load(Ordering::Acquire) == 0 {
            // Drain before the thread exits; pooled buffers must not wait
            // for thread-local teardown.
            with_thread_bitmap_pool(|pool| pool.clear());
            trace!("render worker stopped");
            return;
        }
    }
}

/// Per-page pixel dimensions for dpi-driven tasks.
fn dpi_dimensions(dpi: f64, width_pts: f64, height_pts: f64) -> Option<(u32, u32)> {
    let scale = scale_for_dpi(dpi);
    let width = pixel_dimension(width_pts, scale)?;
    let height = pixel_dimension(height_pts, scale)?;
    Some((width, height))
}

/// Process a v1 task. The whole page lifecycle runs under the document's
/// page-load mutex; only the callback runs outside it.
pub(crate) fn process_task_v1(task: &RenderTask) {
    let mut outcome: Option<Bitmap> = None;
    let mut success = false;
    {
        let _guard = task.document.lock_pages();
        let page = match task.document.load_page(task.page_index) {
            Ok(page) => page,
            Err(err) => {
                warn!(page = task.page_index, %err, "page load failed");
                drop(_guard);
                (task.callback)(task.page_index, None, false);
                return;
            }
        };
        let form = task.use_form.then(|| task.document.form()).flatten();
        if let Some(form) = form {
            form.on_after_load(page.as_ref());
            form.page_action(page.as_ref(), PageAction::Open);
        }

        if let Some(mut bitmap) =
            with_thread_bitmap_pool(|pool| pool.acquire(task.width, task.height, task.format))
        {
            let fill = if page.has_transparency() {
                0x00000000
            } else {
                0xFFFFFFFF
            };
            bitmap.fill_rect(0, 0, task.width, task.height, fill);

            let mut flags = task.flags;
            if task.format == PixelFormat::Gray {
                flags = flags | RenderFlags::GRAYSCALE;
            }
            match page.render(
                &mut bitmap,
                0,
                0,
                task.width as i32,
                task.height as i32,
                task.rotation,
                flags,
            ) {
                Ok(()) => {
                    if let Some(form) = form {
                        form.draw_overlay(
                            &mut bitmap,
                            page.as_ref(),
                            0,
                            0,
                            task.width as i32,
                            task.height as i32,
                            task.rotation,
                            task.flags,
                        );
                    }
                    success = true;
                }
                Err(err) => warn!(page = task.page_index, %err, "render failed"),
            }
            outcome = Some(bitmap);
        } else {
            warn!(
                page = task.page_index,
                width = task.width,
                height = task.height,
                "bitmap allocation failed"
            );
        }

        if let Some(form) = form {
            form.page_action(page.as_ref(), PageAction::Close);
            form.on_before_close(page.as_ref());
        }
        match &task.collection {
            Some(collection) => collection.add(page),
            None => drop(page),
        }
    }

    // Ownership of the bitmap transfers to the callback.
    match outcome {
        Some(bitmap) if success => (task.callback)(task.page_index, Some(bitmap), true),
        _ => (task.callback)(task.page_index, None, false),
    }
}

/// Process a v2 task; the bitmap is loaned to the callback and then
/// reclaimed into this thread's pool.
pub(crate) fn process_task_v2(task: &RenderTaskV2) {
    let mut outcome: Option<Bitmap> = None;
    let mut success = false;
    {
        let _guard = task.document.lock_pages();
        let page = match task.document.load_page(task.page_index) {
            Ok(page) => page,
            Err(err) => {
                warn!(page = task.page_index, %err, "page load failed");
                drop(_guard);
                (task.callback)(task.page_index, None, false);
                return;
            }
        };
        let form = task.use_form.then(|| task.document.form()).flatten();
        if let Some(form) = form {
            form.on_after_load(page.as_ref());
            form.page_action(page.as_ref(), PageAction::Open);
        }

        let dims = if task.width == 0 && task.height == 0 && task.dpi > 0.0 {
            let (width_pts, height_pts) = page.size_points();
            dpi_dimensions(task.dpi, width_pts, height_pts)
        } else {
            Some((task.width, task.height))
        };

        if let Some((width, height)) = dims {
            if let Some(mut bitmap) =
                with_thread_bitmap_pool(|pool| pool.acquire(width, height, task.format))
            {
                let fill = if page.has_transparency() {
                    0x00000000
                } else {
                    0xFFFFFFFF
                };
                bitmap.fill_rect(0, 0, width, height, fill);

                let mut flags = task.flags;
                if task.format == PixelFormat::Gray {
                    flags = flags | RenderFlags::GRAYSCALE;
                }
                match page.render(
                    &mut bitmap,
                    0,
                    0,
                    width as i32,
                    height as i32,
                    task.rotation,
                    flags,
                ) {
                    Ok(()) => {
                        if let Some(form) = form {
                            form.draw_overlay(
                                &mut bitmap,
                                page.as_ref(),
                                0,
                                0,
                                width as i32,
                                height as i32,
                                task.rotation,
                                task.flags,
                            );
                        }
                        success = true;
                    }
                    Err(err) => warn!(page = task.page_index, %err, "render failed"),
                }
                outcome = Some(bitmap);
            } else {
                warn!(page = task.page_index, width, height, "bitmap allocation failed");
            }
        } else {
            warn!(
                page = task.page_index,
                dpi = task.dpi,
                "page dimensions unrepresentable at requested scale"
            );
        }

        if let Some(form) = form {
            form.page_action(page.as_ref(), PageAction::Close);
            form.on_before_close(page.as_ref());
        }
        match &task.collection {
            Some(collection) => collection.add(page),
            None => drop(page),
        }
    }

    // Callback runs outside the mutex; the bitmap returns to the pool only
    // after it comes back.
    match &outcome {
        Some(bitmap) if success => (task.callback)(task.page_index, Some(bitmap), true),
        _ => (task.callback)(task.page_index, None, false),
    }
    if let Some(bitmap) = outcome {
        with_thread_bitmap_pool(|pool| pool.release(bitmap));
    }
}

static RENDER_POOL: Mutex<Option<WorkerPool>> = Mutex::new(None);

/// The process-wide render pool, created on first use.
pub fn render_pool() -> WorkerPool {
    RENDER_POOL
        .lock()
        .get_or_insert_with(WorkerPool::new)
        .clone()
}

/// Tear down the process-wide render pool, joining its workers.
///
/// Idempotent. Call before releasing the parser library so worker threads
/// never outlive the engine they render with.
pub fn destroy_render_pool() {
    let pool = RENDER_POOL.lock().take();
    if let Some(pool) = pool {
        pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagemill_parser::{FixtureBackend, FixtureDocument, FixturePage};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    fn fixture_document(pages: usize) -> Arc<Document> {
        let backend = FixtureBackend::new();
        backend.register(
            "doc.pdf",
            FixtureDocument::new()
                .with_file_size(pages as u64 * 40_000)
                .pages(pages, FixturePage::new(100.0, 100.0)),
        );
        Document::open(&backend, Path::new("doc.pdf"), None).unwrap()
    }

    fn v2_task(
        document: &Arc<Document>,
        page_index: u32,
        collection: Option<Arc<PageHandleCollection>>,
        callback: CallbackV2,
    ) -> RenderTaskV2 {
        RenderTaskV2 {
            document: Arc::clone(document),
            page_index,
            width: 64,
            height: 64,
            rotation: Rotation::None,
            flags: RenderFlags::NONE,
            format: PixelFormat::Bgrx,
            dpi: 0.0,
            collection,
            use_form: false,
            callback,
        }
    }

    #[test]
    fn outstanding_balance_over_a_batch() {
        let pool = WorkerPool::new();
        pool.ensure_worker_count(4).unwrap();
        let document = fixture_document(20);
        let collection = Arc::new(PageHandleCollection::new());
        let completed = Arc::new(AtomicUsize::new(0));

        let callback: CallbackV2 = {
            let completed = Arc::clone(&completed);
            Arc::new(move |_, bitmap, success| {
                assert!(success);
                assert!(bitmap.is_some());
                completed.fetch_add(1, Ordering::SeqCst);
            })
        };
        let tasks: Vec<_> = (0..20)
            .map(|i| v2_task(&document, i, Some(Arc::clone(&collection)), Arc::clone(&callback)))
            .collect();

        pool.enqueue_batch_v2(tasks);
        pool.wait_for_completion();

        assert_eq!(completed.load(Ordering::SeqCst), 20);
        assert_eq!(pool.outstanding_tasks(), 0);
        assert_eq!(collection.len(), 20);
        collection.close_all(&document);
        pool.signal_clear_pools();
        pool.shutdown();
    }

    #[test]
    fn backpressure_bounds_outstanding_tasks() {
        let pool = WorkerPool::new();
        pool.ensure_worker_count(2).unwrap();
        pool.set_max_queue_depth(4);
        let document = fixture_document(40);
        let max_seen = Arc::new(AtomicUsize::new(0));

        let callback: CallbackV2 = {
            let max_seen = Arc::clone(&max_seen);
            let pool = pool.clone();
            Arc::new(move |_, _, _| {
                max_seen.fetch_max(pool.outstanding_tasks(), Ordering::SeqCst);
            })
        };
        for i in 0..40 {
            pool.enqueue_v2(v2_task(&document, i, None, Arc::clone(&callback)));
        }
        pool.wait_for_completion();

        assert!(max_seen.load(Ordering::SeqCst) <= 4);
        assert_eq!(pool.outstanding_tasks(), 0);
        pool.shutdown();
    }

    #[test]
    fn v1_transfers_bitmap_ownership() {
        let pool = WorkerPool::new();
        pool.ensure_worker_count(1).unwrap();
        let document = fixture_document(1);
        let kept: Arc<Mutex<Option<Bitmap>>> = Arc::new(Mutex::new(None));

        let callback: CallbackV1 = {
            let kept = Arc::clone(&kept);
            Arc::new(move |_, bitmap, success| {
                assert!(success);
                *kept.lock() = bitmap;
            })
        };
        pool.enqueue(RenderTask {
            document,
            page_index: 0,
            width: 32,
            height: 32,
            rotation: Rotation::None,
            flags: RenderFlags::NONE,
            format: PixelFormat::Bgrx,
            collection: None,
            use_form: false,
            callback,
        });
        pool.wait_for_completion();

        let bitmap = kept.lock().take().unwrap();
        assert_eq!(bitmap.width(), 32);
        pool.shutdown();
    }

    #[test]
    fn failed_page_reports_failure_and_batch_continues() {
        let backend = FixtureBackend::new();
        backend.register(
            "doc.pdf",
            FixtureDocument::new()
                .page(FixturePage::new(100.0, 100.0))
                .page(FixturePage::new(100.0, 100.0).broken())
                .page(FixturePage::new(100.0, 100.0)),
        );
        let document = Document::open(&backend, Path::new("doc.pdf"), None).unwrap();

        let pool = WorkerPool::new();
        pool.ensure_worker_count(2).unwrap();
        let failures = Arc::new(AtomicUsize::new(0));
        let successes = Arc::new(AtomicUsize::new(0));
        let callback: CallbackV2 = {
            let failures = Arc::clone(&failures);
            let successes = Arc::clone(&successes);
            Arc::new(move |_, _, success| {
                if success {
                    successes.fetch_add(1, Ordering::SeqCst);
                } else {
                    failures.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        let tasks: Vec<_> = (0..3)
            .map(|i| v2_task(&document, i, None, Arc::clone(&callback)))
            .collect();
        pool.enqueue_batch_v2(tasks);
        pool.wait_for_completion();

        assert_eq!(successes.load(Ordering::SeqCst), 2);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        pool.shutdown();
    }

    #[test]
    fn dpi_dimensions_follow_the_scale_floor() {
        // 300 dpi on a US Letter page: floor(300/72 * 1e6)/1e6 = 4.166666.
        let (w, h) = dpi_dimensions(300.0, 612.0, 792.0).unwrap();
        assert_eq!((w, h), (2550, 3300));
        assert!(dpi_dimensions(300.0, 0.1, 0.1).is_none());
    }

    #[test]
    fn shutdown_completes_pending_tasks() {
        let pool = WorkerPool::new();
        pool.ensure_worker_count(2).unwrap();
        let document = fixture_document(8);
        let completed = Arc::new(AtomicUsize::new(0));
        let callback: CallbackV2 = {
            let completed = Arc::clone(&completed);
            Arc::new(move |_, _, _| {
                completed.fetch_add(1, Ordering::SeqCst);
            })
        };
        let tasks: Vec<_> = (0..8)
            .map(|i| v2_task(&document, i, None, Arc::clone(&callback)))
            .collect();
        pool.enqueue_batch_v2(tasks);
        pool.shutdown();
        assert_eq!(completed.load(Ordering::SeqCst), 8);
    }
}
