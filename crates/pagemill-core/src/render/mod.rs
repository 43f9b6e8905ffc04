//! The parallel render controller and its supporting pieces.

pub mod adaptive;
mod controller;
mod job;
mod options;
mod smart;

pub use controller::{render_pages_parallel, render_pages_parallel_v2};
pub use job::{render_to_directory, RenderJob, RenderSummary};
pub use options::{OutputConfig, RenderOptions};
pub use smart::scanned_page_jpeg;
