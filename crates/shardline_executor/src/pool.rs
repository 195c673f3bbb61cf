//! Fixed-size worker pool shared by every executor call.
//!
//! Workers pull boxed jobs from one channel. A panicking job is caught and
//! logged so the worker survives; whatever the job was holding (including
//! its result sender) is dropped during unwinding, which lets the collector
//! notice the missing outcomes instead of waiting forever.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use shardline_common::error::{ShardlineError, ShardlineResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Observable pool counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub threads: usize,
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_panicked: u64,
}

#[derive(Default)]
struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// Spawn `threads` workers (at least one).
    pub fn new(threads: usize) -> ShardlineResult<Self> {
        let threads = threads.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(PoolCounters::default());

        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            let receiver = Arc::clone(&receiver);
            let counters = Arc::clone(&counters);
            let handle = std::thread::Builder::new()
                .name(format!("shardline-worker-{}", id))
                .spawn(move || worker_loop(id, receiver, counters))
                .map_err(|e| {
                    ShardlineError::internal_bug(
                        "E-POOL-001",
                        format!("failed to spawn worker thread: {}", e),
                        format!("worker_id={}, threads={}", id, threads),
                    )
                })?;
            workers.push(handle);
        }

        tracing::info!(threads, "worker pool started");
        shardline_observability::record_pool_size(threads);
        Ok(Self {
            sender: Some(sender),
            workers,
            counters,
        })
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    pub fn submit<F>(&self, job: F) -> ShardlineResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or_else(|| {
            ShardlineError::internal_bug(
                "E-POOL-002",
                "worker pool is shut down",
                "submit called after shutdown",
            )
        })?;
        sender.send(Box::new(job)).map_err(|_| {
            ShardlineError::internal_bug(
                "E-POOL-003",
                "worker pool channel closed",
                format!("threads={}", self.workers.len()),
            )
        })?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            threads: self.workers.len(),
            jobs_submitted: self.counters.submitted.load(Ordering::Relaxed),
            jobs_completed: self.counters.completed.load(Ordering::Relaxed),
            jobs_panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }
}

fn worker_loop(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>, counters: Arc<PoolCounters>) {
    loop {
        // The guard is released before the job runs.
        let job = receiver.lock().recv();
        match job {
            Ok(job) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    counters.panicked.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(worker_id = id, "worker job panicked");
                }
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => break,
        }
    }
    tracing::debug!(worker_id = id, "worker exiting");
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends every worker loop once the queue drains.
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        tracing::info!("worker pool stopped");
    }
}
