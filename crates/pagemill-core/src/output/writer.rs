//! Bounded I/O writer pool.
//!
//! Completion callbacks run CPU work (encoding) on render workers, but the
//! final disk write can stall on slow storage. This pool hides that behind
//! a bounded queue of write requests serviced by dedicated I/O threads:
//! `submit_write` blocks only when the queue is full, and `wait_all` joins
//! the writers and reports every failed file.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

struct WriteRequest {
    path: PathBuf,
    bytes: Vec<u8>,
}

/// A pool of I/O-only writer threads with a bounded task queue.
pub struct WritePool {
    sender: Option<Sender<WriteRequest>>,
    handles: Vec<JoinHandle<()>>,
    failures: Arc<Mutex<Vec<(PathBuf, std::io::Error)>>>,
}

impl WritePool {
    /// Spawn `threads` writers behind a queue of at most `queue_depth`
    /// pending requests.
    pub fn new(threads: usize, queue_depth: usize) -> WritePool {
        let (sender, receiver) = bounded::<WriteRequest>(queue_depth.max(1));
        let failures: Arc<Mutex<Vec<(PathBuf, std::io::Error)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let handles = (0..threads.max(1))
            .map(|i| {
                let receiver = receiver.clone();
                let failures = Arc::clone(&failures);
                std::thread::Builder::new()
                    .name(format!("pagemill-io-{i}"))
                    .spawn(move || {
                        for request in receiver {
                            if let Err(err) = std::fs::write(&request.path, &request.bytes) {
                                error!(path = %request.path.display(), %err, "write failed");
                                failures.lock().push((request.path, err));
                            }
                        }
                    })
                    .expect("spawn I/O writer thread")
            })
            .collect();
        WritePool {
            sender: Some(sender),
            handles,
            failures,
        }
    }

    /// Queue one file write; blocks while the queue is full.
    pub fn submit_write(&self, path: PathBuf, bytes: Vec<u8>) {
        if let Some(sender) = &self.sender {
            // Send fails only when every writer has exited, which cannot
            // happen before wait_all drops the sender.
            let _ = sender.send(WriteRequest { path, bytes });
        }
    }

    /// A clonable handle for submitting writes from worker callbacks.
    ///
    /// Every clone must be dropped before `wait_all` can finish draining.
    pub fn submitter(&self) -> WriteSubmitter {
        WriteSubmitter {
            sender: self
                .sender
                .clone()
                .expect("writer pool already shut down"),
        }
    }

    /// Finish all pending writes and return the files that failed.
    pub fn wait_all(mut self) -> Vec<(PathBuf, std::io::Error)> {
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        let failures = std::mem::take(&mut *self.failures.lock());
        if !failures.is_empty() {
            debug!(count = failures.len(), "writer pool finished with failures");
        }
        failures
    }
}

impl Drop for WritePool {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Detached submission handle onto a [`WritePool`]'s queue.
#[derive(Clone)]
pub struct WriteSubmitter {
    sender: Sender<WriteRequest>,
}

impl WriteSubmitter {
    /// Queue one file write; blocks while the queue is full.
    pub fn submit_write(&self, path: PathBuf, bytes: Vec<u8>) {
        let _ = self.sender.send(WriteRequest { path, bytes });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_all_submitted_files() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WritePool::new(2, 4);
        for i in 0..16 {
            pool.submit_write(dir.path().join(format!("f{i}.bin")), vec![i as u8; 64]);
        }
        let failures = pool.wait_all();
        assert!(failures.is_empty());
        for i in 0..16 {
            let data = std::fs::read(dir.path().join(format!("f{i}.bin"))).unwrap();
            assert_eq!(data, vec![i as u8; 64]);
        }
    }

    #[test]
    fn reports_failed_paths() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WritePool::new(1, 2);
        pool.submit_write(dir.path().join("missing/sub/dir.bin"), vec![1]);
        pool.submit_write(dir.path().join("ok.bin"), vec![2]);
        let failures = pool.wait_all();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].0.ends_with("dir.bin"));
    }
}
