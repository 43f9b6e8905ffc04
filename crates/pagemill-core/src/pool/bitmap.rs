//! Per-thread pools of reusable pixel buffers.
//!
//! Bitmap create/destroy cycles cost a measurable share of a render pass,
//! and mixed-size documents defeat any single-buffer reuse scheme, so each
//! worker thread keeps a small pool of idle bitmaps keyed by exact
//! (width, height, format). A pooled bitmap is never aliased: acquiring
//! removes it, releasing reinserts it.
//!
//! Pools are drained explicitly — on the worker pool's clear signal and by
//! the worker loop right before thread exit — so buffer teardown never
//! depends on thread-local destructor ordering.

use std::cell::RefCell;

use pagemill_parser::{Bitmap, PixelFormat};

/// Upper bound on idle bitmaps kept per thread.
const MAX_POOL_SIZE: usize = 32;

/// A pool of idle bitmaps owned by one thread.
#[derive(Default)]
pub struct BitmapPool {
    idle: Vec<Bitmap>,
}

impl BitmapPool {
    pub fn new() -> Self {
        BitmapPool::default()
    }

    /// Take a bitmap with exactly the requested shape, allocating on miss.
    ///
    /// Returns `None` when a fresh allocation fails.
    pub fn acquire(&mut self, width: u32, height: u32, format: PixelFormat) -> Option<Bitmap> {
        if let Some(pos) = self.idle.iter().position(|bmp| {
            bmp.width() == width && bmp.height() == height && bmp.format() == format
        }) {
            return Some(self.idle.swap_remove(pos));
        }
        Bitmap::new(width, height, format)
    }

    /// Return a bitmap to the pool; drops it when the pool is full.
    pub fn release(&mut self, bitmap: Bitmap) {
        if self.idle.len() < MAX_POOL_SIZE {
            self.idle.push(bitmap);
        }
    }

    /// Drop every idle bitmap.
    pub fn clear(&mut self) {
        self.idle.clear();
    }

    pub fn len(&self) -> usize {
        self.idle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idle.is_empty()
    }
}

thread_local! {
    static THREAD_BITMAP_POOL: RefCell<BitmapPool> = RefCell::new(BitmapPool::new());
}

/// Run `f` with this thread's bitmap pool.
pub fn with_thread_bitmap_pool<R>(f: impl FnOnce(&mut BitmapPool) -> R) -> R {
    THREAD_BITMAP_POOL.with(|pool| f(&mut pool.borrow_mut()))
}
