//! Execution contexts for attaching and delivering.
//!
//! A [`Scheduler`] decides where a unit of work runs. Two are provided:
//!
//! - [`Immediate`]: runs the task inline on the calling thread
//! - [`WorkerPool`]: a fixed set of named threads fed by a channel; a pool of
//!   one thread is a serial "main thread" style context
//!
//! [`background()`] hands out a shared pool used as the default context for
//! attaching subscriptions.

use crate::error::{Result, SubjectError};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

/// A unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Number of threads in the shared background pool.
const BACKGROUND_THREADS: usize = 4;

/// Somewhere to run tasks.
pub trait Scheduler: Send + Sync {
    /// Queue `task` for execution. Tasks refused by a shut-down scheduler are dropped.
    fn schedule(&self, task: Task);
}

/// Runs every task inline, on the thread that schedules it.
#[derive(Clone, Copy, Debug, Default)]
pub struct Immediate;

impl Scheduler for Immediate {
    fn schedule(&self, task: Task) {
        task();
    }
}

/// Shorthand for an `Arc`'d [`Immediate`].
pub fn immediate() -> Arc<dyn Scheduler> {
    Arc::new(Immediate)
}

/// Shared pool used when no subscribe-side scheduler is given.
pub fn background() -> Arc<dyn Scheduler> {
    static POOL: OnceLock<Arc<WorkerPool>> = OnceLock::new();
    let pool = POOL.get_or_init(|| Arc::new(WorkerPool::new("state-subject-io", BACKGROUND_THREADS)));
    pool.clone()
}

/// Fixed-size thread pool.
///
/// Tasks are taken in submission order; with more than one thread, two tasks
/// may run at the same time. Dropping the pool closes the queue and joins the
/// workers once they have drained it.
pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn a pool of `threads` workers (at least one).
    pub fn new(name: impl Into<String>, threads: usize) -> Self {
        let name = name.into();
        let (sender, receiver) = unbounded::<Task>();

        let workers = (0..threads.max(1))
            .filter_map(|i| {
                let receiver = receiver.clone();
                let thread_name = format!("{}-{}", name, i);
                let spawned = thread::Builder::new().name(thread_name.clone()).spawn(move || {
                    for task in receiver.iter() {
                        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                            tracing::error!(worker = %thread_name, "Scheduled task panicked");
                        }
                    }
                });
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        tracing::error!(pool = %name, error = %e, "Failed to spawn worker thread");
                        None
                    }
                }
            })
            .collect();

        Self {
            name,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Single worker thread; tasks run one after another in submission order.
    pub fn serial(name: impl Into<String>) -> Self {
        Self::new(name, 1)
    }

    /// Pool name, used as the worker thread prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a task, failing if the pool has been shut down.
    pub fn try_schedule(&self, task: Task) -> Result<()> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender
                .send(task)
                .map_err(|_| SubjectError::SchedulerShutdown(self.name.clone())),
            None => Err(SubjectError::SchedulerShutdown(self.name.clone())),
        }
    }

    /// Stop accepting tasks and wait for queued ones to finish.
    ///
    /// Must not be called from one of this pool's own workers.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            let _ = worker.join();
        }
    }
}

impl Scheduler for WorkerPool {
    fn schedule(&self, task: Task) {
        if let Err(e) = self.try_schedule(task) {
            tracing::warn!(error = %e, "Dropped task");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("threads", &self.workers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_immediate_runs_inline() {
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        Immediate.schedule(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_serial_pool_preserves_order() {
        let pool = WorkerPool::serial("test-serial");
        let (tx, rx) = crossbeam_channel::unbounded();

        for i in 0..100 {
            let tx = tx.clone();
            pool.schedule(Box::new(move || {
                tx.send(i).unwrap();
            }));
        }

        let received: Vec<i32> = (0..100)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_shutdown_drains_and_refuses() {
        let pool = WorkerPool::new("test-shutdown", 2);
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let r = ran.clone();
            pool.schedule(Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.shutdown();
        assert_eq!(ran.load(Ordering::SeqCst), 10);

        let result = pool.try_schedule(Box::new(|| {}));
        assert!(matches!(result, Err(SubjectError::SchedulerShutdown(_))));
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let pool = WorkerPool::serial("test-panic");
        let (tx, rx) = crossbeam_channel::unbounded();

        pool.schedule(Box::new(|| panic!("boom")));
        pool.schedule(Box::new(move || {
            tx.send(()).unwrap();
        }));

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
