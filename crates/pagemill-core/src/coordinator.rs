//! Multi-process coordination.
//!
//! With more than one worker the parent process never parses a byte: it
//! splits the page range into contiguous subranges, re-executes its own
//! binary once per subrange with the reserved `--worker` argument form, and
//! merges the results. Each child is a fully independent engine instance,
//! which insulates the batch from any residual process-global state in the
//! parser and turns a crashed child into a reported failure instead of a
//! lost batch.

use std::path::Path;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::error::CoordinatorError;
use crate::output::OutputEncoding;
use crate::render::adaptive::hardware_threads;
use crate::text::TextEncoding;

/// Per-page wait budget for a render worker.
const TIMEOUT_PER_PAGE_SECS: u64 = 60;
/// Fixed startup/teardown allowance per worker.
const TIMEOUT_OVERHEAD_SECS: u64 = 30;

/// Mode-specific parameters for render workers.
#[derive(Debug, Clone)]
pub struct RenderWorkerParams {
    pub dpi: f64,
    pub format: OutputEncoding,
    pub render_quality: u32,
    pub force_alpha: bool,
    pub thread_count: usize,
    pub jpeg_quality: u8,
    pub benchmark: bool,
}

/// Contiguous subranges `[start, end)` with their worker ids.
///
/// Pages are ceil-divided so the last worker may run short; workers past
/// the end of the range are simply not spawned.
fn worker_subranges(start: u32, end: u32, worker_count: usize) -> Vec<(usize, u32, u32)> {
    let total = (end - start) as usize;
    if total == 0 || worker_count == 0 {
        return Vec::new();
    }
    let per_worker = total.div_ceil(worker_count);
    let mut subranges = Vec::new();
    for worker_id in 0..worker_count {
        let sub_start = start as usize + worker_id * per_worker;
        let sub_end = (sub_start + per_worker).min(end as usize);
        if sub_start >= end as usize {
            break;
        }
        subranges.push((worker_id, sub_start as u32, sub_end as u32));
    }
    subranges
}

/// Cap the per-child thread count so N processes times K threads never
/// oversubscribes the machine.
pub fn capped_thread_count(requested: usize, worker_count: usize) -> usize {
    if worker_count <= 1 || requested <= 1 {
        return requested.max(1);
    }
    let cap = (hardware_threads() / worker_count).max(1);
    if requested > cap {
        info!(
            requested,
            capped = cap,
            worker_count,
            "reducing per-worker thread count to avoid oversubscription"
        );
        cap
    } else {
        requested
    }
}

fn kill_all(children: &mut [(usize, u32, u32, Child)]) {
    for (_, _, _, child) in children.iter_mut() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// Extract text across `worker_count` child processes and merge their
/// outputs behind a single file-level byte-order mark.
pub fn extract_text_multiprocess(
    exe: &Path,
    pdf: &Path,
    output: &Path,
    start: u32,
    end: u32,
    worker_count: usize,
    encoding: TextEncoding,
) -> Result<(), CoordinatorError> {
    let subranges = worker_subranges(start, end, worker_count);
    let mut children: Vec<(usize, u32, u32, Child)> = Vec::new();
    let mut temp_paths: Vec<TempPath> = Vec::new();

    for &(worker_id, sub_start, sub_end) in &subranges {
        let temp = tempfile::Builder::new()
            .prefix("pagemill-text-")
            .suffix(".bin")
            .tempfile()
            .map_err(CoordinatorError::TempFile)?
            .into_temp_path();

        let spawned = Command::new(exe)
            .arg("--worker")
            .arg(pdf)
            .arg(temp.as_os_str())
            .arg(sub_start.to_string())
            .arg(sub_end.to_string())
            .arg(worker_id.to_string())
            .arg(encoding.name())
            .spawn();
        match spawned {
            Ok(child) => {
                debug!(worker_id, sub_start, sub_end, "spawned text worker");
                children.push((worker_id, sub_start, sub_end, child));
                temp_paths.push(temp);
            }
            Err(source) => {
                kill_all(&mut children);
                return Err(CoordinatorError::Spawn { worker_id, source });
            }
        }
    }

    let mut failure: Option<CoordinatorError> = None;
    for (worker_id, sub_start, sub_end, child) in children.iter_mut() {
        match child.wait() {
            Ok(status) if status.success() => {}
            Ok(status) => {
                failure = Some(CoordinatorError::WorkerFailed {
                    worker_id: *worker_id,
                    start: *sub_start,
                    end: *sub_end,
                    status: status.to_string(),
                });
                break;
            }
            Err(source) => {
                failure = Some(CoordinatorError::Spawn {
                    worker_id: *worker_id,
                    source,
                });
                break;
            }
        }
    }
    if let Some(err) = failure {
        // Killing already-exited workers is a harmless no-op.
        kill_all(&mut children);
        return Err(err);
    }

    merge_text_outputs(output, &temp_paths, encoding)
    // Temp files are deleted as `temp_paths` drops.
}

/// Concatenate worker temp files behind one file-level byte-order mark.
fn merge_text_outputs(
    output: &Path,
    temps: &[TempPath],
    encoding: TextEncoding,
) -> Result<(), CoordinatorError> {
    use std::io::Write;

    let mut out = std::fs::File::create(output).map_err(CoordinatorError::Merge)?;
    out.write_all(encoding.bom())
        .map_err(CoordinatorError::Merge)?;
    for temp in temps {
        let mut file = std::fs::File::open(temp).map_err(CoordinatorError::TempFile)?;
        std::io::copy(&mut file, &mut out).map_err(CoordinatorError::Merge)?;
    }
    out.flush().map_err(CoordinatorError::Merge)?;
    Ok(())
}

/// Render pages across `worker_count` child processes.
///
/// Children write page files straight into the final output directory, so
/// there is nothing to merge. A child that exceeds its page-proportional
/// time budget is killed and reported; the remaining workers keep going.
pub fn render_multiprocess(
    exe: &Path,
    pdf: &Path,
    output_dir: &Path,
    start: u32,
    end: u32,
    worker_count: usize,
    params: &RenderWorkerParams,
) -> Result<(), CoordinatorError> {
    let threads = capped_thread_count(params.thread_count, worker_count);
    let subranges = worker_subranges(start, end, worker_count);
    let mut children: Vec<(usize, u32, u32, Child)> = Vec::new();

    for &(worker_id, sub_start, sub_end) in &subranges {
        let spawned = Command::new(exe)
            .arg("--worker")
            .arg(pdf)
            .arg(output_dir)
            .arg(sub_start.to_string())
            .arg(sub_end.to_string())
            .arg(worker_id.to_string())
            .arg(params.dpi.to_string())
            .arg(params.format.extension())
            .arg(params.render_quality.to_string())
            .arg(if params.force_alpha { "1" } else { "0" })
            .arg(threads.to_string())
            .arg(params.jpeg_quality.to_string())
            .arg(if params.benchmark { "1" } else { "0" })
            .spawn();
        match spawned {
            Ok(child) => {
                debug!(worker_id, sub_start, sub_end, threads, "spawned render worker");
                children.push((worker_id, sub_start, sub_end, child));
            }
            Err(source) => {
                kill_all(&mut children);
                return Err(CoordinatorError::Spawn { worker_id, source });
            }
        }
    }

    let mut failure: Option<CoordinatorError> = None;
    'workers: for (worker_id, sub_start, sub_end, child) in children.iter_mut() {
        let pages = (*sub_end - *sub_start) as u64;
        let timeout = Duration::from_secs(TIMEOUT_PER_PAGE_SECS * pages + TIMEOUT_OVERHEAD_SECS);
        let waited_from = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        failure = Some(CoordinatorError::WorkerFailed {
                            worker_id: *worker_id,
                            start: *sub_start,
                            end: *sub_end,
                            status: status.to_string(),
                        });
                        break 'workers;
                    }
                    break;
                }
                Ok(None) => {
                    if waited_from.elapsed() > timeout {
                        warn!(
                            worker_id = *worker_id,
                            sub_start = *sub_start,
                            sub_end = *sub_end,
                            timeout_secs = timeout.as_secs(),
                            "render worker timed out; killing and continuing"
                        );
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(source) => {
                    failure = Some(CoordinatorError::Spawn {
                        worker_id: *worker_id,
                        source,
                    });
                    break 'workers;
                }
            }
        }
    }
    if let Some(err) = failure {
        kill_all(&mut children);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn subranges_cover_the_range_exactly_once() {
        let subranges = worker_subranges(0, 10, 4);
        assert_eq!(subranges, vec![(0, 0, 3), (1, 3, 6), (2, 6, 9), (3, 9, 10)]);

        let flat: Vec<u32> = subranges
            .iter()
            .flat_map(|&(_, s, e)| (s..e).collect::<Vec<_>>())
            .collect();
        assert_eq!(flat, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn more_workers_than_pages_spawns_fewer_workers() {
        let subranges = worker_subranges(5, 7, 8);
        assert_eq!(subranges, vec![(0, 5, 6), (1, 6, 7)]);
    }

    #[test]
    fn empty_range_spawns_nothing() {
        assert!(worker_subranges(3, 3, 4).is_empty());
    }

    #[test]
    fn thread_cap_divides_hardware_between_workers() {
        assert_eq!(capped_thread_count(8, 1), 8);
        assert_eq!(capped_thread_count(1, 8), 1);
        let hw = hardware_threads();
        let capped = capped_thread_count(hw * 2, 2);
        assert_eq!(capped, (hw / 2).max(1));
    }

    #[test]
    fn merge_concatenates_behind_one_bom() {
        let dir = tempfile::tempdir().unwrap();
        let mut temps = Vec::new();
        for content in [&b"aaa"[..], &b"bb"[..]] {
            let mut temp = tempfile::Builder::new().tempfile_in(dir.path()).unwrap();
            temp.write_all(content).unwrap();
            temps.push(temp.into_temp_path());
        }
        let output = dir.path().join("merged.txt");
        merge_text_outputs(&output, &temps, TextEncoding::Utf8).unwrap();

        let merged = std::fs::read(&output).unwrap();
        assert_eq!(&merged[..3], &[0xEF, 0xBB, 0xBF]);
        assert_eq!(&merged[3..], b"aaabb");
    }

    #[test]
    fn spawn_failure_reports_the_worker() {
        let err = extract_text_multiprocess(
            Path::new("/nonexistent/binary"),
            Path::new("doc.pdf"),
            Path::new("/tmp/out.txt"),
            0,
            4,
            2,
            TextEncoding::Utf8,
        )
        .unwrap_err();
        assert!(matches!(err, CoordinatorError::Spawn { worker_id: 0, .. }));
    }
}
