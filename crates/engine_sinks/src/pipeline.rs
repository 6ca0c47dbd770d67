//! Async sink pipeline: the infrastructure shared by every sink (§4.F).
//!
//! Each sink owns exactly one `AsyncPipeline`. The producer side
//! (`submit`) never blocks: it copies the frame into an owned chunk,
//! pushes it behind a mutex, and notifies a condition variable. A
//! dedicated writer thread blocks on that condition variable and invokes
//! the sink-specific `write_internal` closure outside any lock. This is
//! the direct equivalent of the original `OutputDestination`'s
//! `std::queue<AudioChunk>` + mutex + condition_variable + atomic
//! `m_isOpen`/`m_writerRunning` pair; no task/coroutine runtime is needed
//! because writers are few.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

struct Shared {
    queue: Mutex<VecDeque<Vec<u8>>>,
    cv: Condvar,
    /// Cleared by `close`; observed by `submit` (drop silently once
    /// false) and by the writer thread (stop waiting for new work).
    open: AtomicBool,
}

/// Generic async writer pipeline. `W` is the sink-specific blocking write
/// call; `finalize` runs once, after the queue has fully drained, to write
/// a format footer/header and release the underlying resource.
pub struct AsyncPipeline {
    shared: Arc<Shared>,
    writer: Option<JoinHandle<()>>,
}

impl AsyncPipeline {
    pub fn start<W, Fin>(mut write_internal: W, finalize: Fin) -> Self
    where
        W: FnMut(Vec<u8>) + Send + 'static,
        Fin: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            open: AtomicBool::new(true),
        });

        let worker_shared = Arc::clone(&shared);
        let writer = std::thread::spawn(move || {
            loop {
                let chunk = {
                    let mut queue = worker_shared.queue.lock().unwrap();
                    loop {
                        if let Some(chunk) = queue.pop_front() {
                            break Some(chunk);
                        }
                        if !worker_shared.open.load(Ordering::Acquire) {
                            break None;
                        }
                        queue = worker_shared.cv.wait(queue).unwrap();
                    }
                };
                match chunk {
                    Some(chunk) => write_internal(chunk),
                    None => break,
                }
            }
            // Queue is guaranteed empty here: the loop above only exits
            // via `None` once both the queue popped empty and `open` was
            // false, and no further chunks can be enqueued after `open`
            // goes false (submit checks it first).
            finalize();
        });

        Self {
            shared,
            writer: Some(writer),
        }
    }

    /// Non-blocking: copy already performed by the caller into `chunk`.
    /// Silently dropped if the pipeline is closed.
    pub fn submit(&self, chunk: Vec<u8>) {
        if !self.shared.open.load(Ordering::Acquire) {
            return;
        }
        self.shared.queue.lock().unwrap().push_back(chunk);
        self.shared.cv.notify_one();
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Idempotent. Clears `open`, wakes the writer, and joins it. The
    /// writer drains whatever is still queued and then calls `finalize`
    /// before this returns.
    pub fn close(&mut self) {
        if self.shared.open.swap(false, Ordering::AcqRel) {
            self.shared.cv.notify_all();
        }
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AsyncPipeline {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_chunks_delivered_in_order() {
        let (tx, rx) = mpsc::channel();
        let mut pipeline = AsyncPipeline::start(
            move |chunk: Vec<u8>| {
                tx.send(chunk).unwrap();
            },
            || {},
        );

        for i in 0..10u8 {
            pipeline.submit(vec![i]);
        }
        pipeline.close();

        let received: Vec<u8> = rx.iter().map(|v| v[0]).collect();
        assert_eq!(received, (0..10).collect::<Vec<u8>>());
    }

    #[test]
    fn test_drops_after_close() {
        let (tx, rx) = mpsc::channel();
        let mut pipeline = AsyncPipeline::start(
            move |chunk: Vec<u8>| {
                tx.send(chunk).unwrap();
            },
            || {},
        );
        pipeline.close();
        pipeline.submit(vec![1, 2, 3]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_finalize_runs_once_after_drain() {
        let finalized = Arc::new(AtomicBool::new(false));
        let finalized_writer = Arc::clone(&finalized);
        let mut pipeline = AsyncPipeline::start(
            |_chunk: Vec<u8>| {
                std::thread::sleep(std::time::Duration::from_millis(5));
            },
            move || {
                finalized_writer.store(true, Ordering::SeqCst);
            },
        );
        pipeline.submit(vec![1]);
        pipeline.submit(vec![2]);
        pipeline.close();
        assert!(finalized.load(Ordering::SeqCst));
    }
}
