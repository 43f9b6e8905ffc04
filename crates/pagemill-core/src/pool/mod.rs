//! Reusable-resource pools: per-thread bitmaps and the persistent worker pool.

mod bitmap;
mod worker;

pub use bitmap::{with_thread_bitmap_pool, BitmapPool};
pub use worker::{
    destroy_render_pool, render_pool, CallbackV1, CallbackV2, RenderTask, RenderTaskV2, WorkerPool,
};

pub(crate) use worker::{process_task_v1, process_task_v2};
