//! A fixed pool of worker threads fed from one closeable queue.
//!
//! Workers block in [`WorkQueue::pop`] until an item arrives or the queue is
//! closed and empty. The queue also counts outstanding items so the producer
//! can wait until everything pushed has been both taken and finished.
//! Shutdown is explicit: [`WorkerPool::join`] closes the queue and joins
//! every thread.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use thiserror::Error;

/// Returned when pushing to a closed queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("work queue is closed")]
pub struct QueueClosed;

/// Blocking multi-consumer queue with completion tracking.
pub struct WorkQueue<T> {
    sender: Mutex<Option<mpsc::Sender<T>>>,
    receiver: Mutex<mpsc::Receiver<T>>,
    pending: Mutex<usize>,
    drained: Condvar,
}

impl<T> WorkQueue<T> {
    /// Create an open, empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        WorkQueue {
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(rx),
            pending: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    /// Add an item.
    pub fn push(&self, item: T) -> Result<(), QueueClosed> {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = sender.as_ref() else {
            return Err(QueueClosed);
        };

        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        if sender.send(item).is_err() {
            self.task_done();
            return Err(QueueClosed);
        }
        Ok(())
    }

    /// Stop accepting items. Items already queued are still delivered.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    /// Take the next item, blocking until one is available.
    ///
    /// Returns `None` once the queue is closed and empty. Each item is
    /// delivered to exactly one caller.
    pub fn pop(&self) -> Option<T> {
        let receiver = self.receiver.lock().unwrap_or_else(|e| e.into_inner());
        receiver.recv().ok()
    }

    /// Mark one previously popped item as finished.
    pub fn task_done(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    /// Block until every pushed item has been popped and finished.
    pub fn wait_drained(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while *pending > 0 {
            pending = self
                .drained
                .wait(pending)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Items pushed but not yet finished.
    pub fn pending(&self) -> usize {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An item whose handler failed or panicked.
#[derive(Debug, Clone)]
pub struct WorkerFailure<T> {
    pub item: T,
    pub worker: usize,
    pub message: String,
}

/// Worker threads draining a [`WorkQueue`].
pub struct WorkerPool<T> {
    queue: Arc<WorkQueue<T>>,
    handles: Vec<JoinHandle<()>>,
    failures: Arc<Mutex<Vec<WorkerFailure<T>>>>,
}

impl<T> WorkerPool<T>
where
    T: fmt::Display + Send + 'static,
{
    /// Spawn `size` workers running `handler` on every item of `queue`.
    ///
    /// A handler error or panic is logged and recorded against the item;
    /// the worker then moves on to the next item.
    pub fn spawn<F>(size: usize, queue: Arc<WorkQueue<T>>, handler: F) -> Result<Self>
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let failures = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::with_capacity(size);

        for worker in 0..size {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let failures = Arc::clone(&failures);

            let handle = thread::Builder::new()
                .name(format!("buildmatrix-worker-{}", worker))
                .spawn(move || {
                    while let Some(item) = queue.pop() {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (*handler)(&item)));
                        let message = match outcome {
                            Ok(Ok(())) => None,
                            Ok(Err(e)) => Some(format!("{:#}", e)),
                            Err(payload) => Some(format!("panicked: {}", panic_message(&*payload))),
                        };

                        if let Some(message) = message {
                            tracing::error!("worker {} failed on {}: {}", worker, item, message);
                            failures
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .push(WorkerFailure {
                                    item,
                                    worker,
                                    message,
                                });
                        }
                        queue.task_done();
                    }
                    tracing::debug!("worker {} exiting", worker);
                })
                .with_context(|| format!("failed to spawn worker {}", worker))?;
            handles.push(handle);
        }

        Ok(WorkerPool {
            queue,
            handles,
            failures,
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Close the queue, wait for every worker to exit, and return the
    /// items that failed inside a worker.
    pub fn join(self) -> Vec<WorkerFailure<T>> {
        self.queue.close();
        for handle in self.handles {
            if handle.join().is_err() {
                tracing::error!("worker thread terminated abnormally");
            }
        }

        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *failures)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
