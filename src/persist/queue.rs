//! Write-behind queue
//!
//! Bounded crossbeam channel drained by a single named writer thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::backend::Backend;
use crate::error::{Result, StoreError};

use super::Statement;

/// Counters snapshot for a queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Statements accepted by `submit`
    pub submitted: u64,

    /// Statements the backend applied successfully
    pub applied: u64,

    /// Statements the backend rejected (logged, dropped)
    pub failed: u64,
}

impl QueueStats {
    /// Statements accepted but not yet attempted
    pub fn pending(&self) -> u64 {
        self.submitted.saturating_sub(self.applied + self.failed)
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            submitted: self.submitted.load(Ordering::SeqCst),
            applied: self.applied.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// FIFO of pending statements with exactly one consumer
///
/// ## Concurrency:
/// - `submit` clones the sender under a read lock and sends outside it, so
///   producers blocked on a full channel never hold the lock
/// - `close` takes the sender away; the channel disconnects once the last
///   in-flight `submit` finishes, and the worker exits after draining
pub struct WriteBehindQueue {
    /// `None` once closed
    sender: RwLock<Option<Sender<Statement>>>,

    /// Writer thread, taken by the first `close`
    worker: Mutex<Option<JoinHandle<()>>>,

    counters: Arc<Counters>,

    capacity: usize,
}

impl WriteBehindQueue {
    /// Create the channel and spawn the writer thread
    pub fn start(backend: Arc<dyn Backend>, capacity: usize, thread_name: &str) -> Result<Self> {
        if capacity == 0 {
            return Err(StoreError::Config(
                "queue capacity must be at least 1".to_string(),
            ));
        }

        let (sender, receiver) = channel::bounded(capacity);
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);

        let worker = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || run_writer(backend, receiver, worker_counters))?;

        tracing::debug!("Write-behind queue started (capacity={})", capacity);

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            counters,
            capacity,
        })
    }

    /// Enqueue a statement, blocking while the queue is full
    pub fn submit(&self, statement: Statement) -> Result<()> {
        let sender = self
            .sender
            .read()
            .as_ref()
            .cloned()
            .ok_or(StoreError::QueueClosed)?;

        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        if sender.send(statement).is_err() {
            // Writer thread is gone
            self.counters.submitted.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::QueueClosed);
        }
        Ok(())
    }

    /// Stop accepting statements, drain the rest and join the writer
    ///
    /// Later calls return the final stats without doing anything.
    pub fn close(&self) -> Result<QueueStats> {
        drop(self.sender.write().take());

        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            handle
                .join()
                .map_err(|_| StoreError::Backend("writer thread panicked".to_string()))?;

            let stats = self.counters.snapshot();
            tracing::info!(
                "Write-behind queue closed: {} applied, {} failed",
                stats.applied,
                stats.failed
            );
        }

        Ok(self.counters.snapshot())
    }

    /// Whether `close` has been called or the writer is gone
    pub fn is_closed(&self) -> bool {
        if self.sender.read().is_none() {
            return true;
        }
        self.worker
            .lock()
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for WriteBehindQueue {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to close write-behind queue: {}", e);
        }
    }
}

/// Writer loop: apply every statement in arrival order until disconnected
fn run_writer(backend: Arc<dyn Backend>, receiver: Receiver<Statement>, counters: Arc<Counters>) {
    for statement in receiver.iter() {
        tracing::debug!("query = {}, args = {:?}", statement.sql, statement.params);

        // A panicking backend counts as one failed statement
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| backend.execute(&statement)))
            .unwrap_or_else(|payload| Err(StoreError::Backend(panic_message(payload))));

        match outcome {
            Ok(()) => {
                counters.applied.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    "Statement failed, not retried: {} {:?}: {}",
                    statement.sql,
                    statement.params,
                    e
                );
            }
        }
    }

    tracing::debug!("Writer thread drained, exiting");
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown payload".to_string());
    format!("backend panicked: {}", detail)
}
