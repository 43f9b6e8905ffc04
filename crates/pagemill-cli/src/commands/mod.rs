//! CLI subcommands.

pub mod batch;
pub mod extract;
pub mod render;

use anyhow::Result;
use pagemill_core::{ConfigError, EngineError};

/// Validate the process worker count (1..=16).
pub fn check_worker_count(workers: usize) -> Result<()> {
    if !(1..=16).contains(&workers) {
        return Err(EngineError::Config(ConfigError::WorkerCount(workers)).into());
    }
    Ok(())
}

/// Validate a thread count (1..=32, 0 meaning adaptive) and clamp an
/// explicit request to the hardware, with a notice.
pub fn check_thread_count(threads: usize) -> Result<usize> {
    if threads == 0 {
        return Ok(0);
    }
    if threads > 32 {
        return Err(EngineError::Config(ConfigError::ThreadCount(threads)).into());
    }
    let hardware = pagemill_core::render::adaptive::hardware_threads();
    if threads > hardware {
        tracing::info!(
            requested = threads,
            hardware,
            "thread count exceeds hardware, clamping"
        );
        return Ok(hardware);
    }
    Ok(threads)
}
