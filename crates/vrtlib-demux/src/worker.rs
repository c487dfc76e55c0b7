//! Fixed-size pool of conversion workers.
//!
//! Each worker is a dedicated OS thread with a single-slot job channel and
//! a busy flag. The dispatcher picks an idle worker, marks it busy and hands
//! it one task; the worker clears the flag when the task returns. Flips and
//! reconfiguration wait for [`WorkerPool::all_idle`] so that no task can
//! still be writing into a buffer that is about to change hands.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender, TrySendError};

use vrtlib_core::{Error, Result};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Worker {
    jobs: Option<Sender<Task>>,
    busy: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// A bounded set of worker threads, each running one task per wake.
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Spawn `size` workers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `size` is zero, or
    /// [`Error::Io`] if a thread cannot be spawned.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidParameter(
                "worker pool needs at least one worker".into(),
            ));
        }

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let (tx, rx) = channel::bounded::<Task>(1);
            let busy = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&busy);

            let handle = thread::Builder::new()
                .name(format!("vrtlib-worker-{id}"))
                .spawn(move || {
                    for task in rx.iter() {
                        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                            tracing::error!(worker = id, "conversion task panicked");
                        }
                        flag.store(false, Ordering::Release);
                    }
                    tracing::trace!(worker = id, "worker exiting");
                })?;

            workers.push(Worker {
                jobs: Some(tx),
                busy,
                handle: Some(handle),
            });
        }

        tracing::debug!(size, "worker pool started");
        Ok(WorkerPool { workers })
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Whether worker `id` is free to take a task. Unknown ids are never idle.
    pub fn is_idle(&self, id: usize) -> bool {
        self.workers
            .get(id)
            .is_some_and(|w| w.jobs.is_some() && !w.busy.load(Ordering::Acquire))
    }

    /// The first idle worker, if any.
    pub fn idle_worker(&self) -> Option<usize> {
        (0..self.workers.len()).find(|&id| self.is_idle(id))
    }

    /// Whether no worker is running a task.
    pub fn all_idle(&self) -> bool {
        self.workers
            .iter()
            .all(|w| !w.busy.load(Ordering::Acquire))
    }

    /// Hand `task` to worker `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `id` is out of range or the
    /// worker is busy, and [`Error::NotRunning`] once the pool is stopped.
    pub fn wake<F>(&self, id: usize, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let worker = self.workers.get(id).ok_or_else(|| {
            Error::InvalidParameter(format!("no worker {id} in a pool of {}", self.size()))
        })?;
        let jobs = worker.jobs.as_ref().ok_or(Error::NotRunning)?;

        if worker.busy.swap(true, Ordering::AcqRel) {
            return Err(Error::InvalidParameter(format!("worker {id} is busy")));
        }

        match jobs.try_send(Box::new(task)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                worker.busy.store(false, Ordering::Release);
                Err(Error::InvalidParameter(format!("worker {id} is busy")))
            }
            Err(TrySendError::Disconnected(_)) => {
                worker.busy.store(false, Ordering::Release);
                Err(Error::NotRunning)
            }
        }
    }

    /// Sleep in `backoff` steps until every worker is idle.
    pub fn wait_idle(&self, backoff: Duration) {
        while !self.all_idle() {
            thread::sleep(backoff);
        }
    }

    /// Let in-flight tasks finish, then join every worker thread.
    ///
    /// Idempotent.
    pub fn stop(&mut self) {
        for worker in &mut self.workers {
            worker.jobs.take();
        }
        for (id, worker) in self.workers.iter_mut().enumerate() {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    tracing::warn!(worker = id, "worker thread panicked");
                }
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size())
            .field("all_idle", &self.all_idle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    const TICK: Duration = Duration::from_micros(50);

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn runs_task_and_returns_to_idle() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.size(), 2);
        assert!(pool.all_idle());

        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        pool.wake(0, move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.wait_idle(TICK);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(pool.is_idle(0));
    }

    #[test]
    fn busy_worker_is_not_idle() {
        let pool = WorkerPool::new(2).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.wake(0, move || {
            let _ = release_rx.recv();
        })
        .unwrap();

        assert!(!pool.is_idle(0));
        assert!(!pool.all_idle());
        assert_eq!(pool.idle_worker(), Some(1));
        assert!(matches!(pool.wake(0, || {}), Err(Error::InvalidParameter(_))));

        release_tx.send(()).unwrap();
        pool.wait_idle(TICK);
        assert_eq!(pool.idle_worker(), Some(0));
    }

    #[test]
    fn panicking_task_frees_worker() {
        let pool = WorkerPool::new(1).unwrap();
        pool.wake(0, || panic!("boom")).unwrap();
        pool.wait_idle(TICK);

        let (tx, rx) = mpsc::channel();
        pool.wake(0, move || tx.send(7).unwrap()).unwrap();
        assert_eq!(rx.recv().unwrap(), 7);
    }

    #[test]
    fn unknown_worker_id() {
        let pool = WorkerPool::new(1).unwrap();
        assert!(!pool.is_idle(5));
        assert!(matches!(pool.wake(5, || {}), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn stop_drains_and_rejects() {
        let mut pool = WorkerPool::new(1).unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let d = Arc::clone(&done);
        pool.wake(0, move || {
            thread::sleep(Duration::from_millis(5));
            d.store(true, Ordering::SeqCst);
        })
        .unwrap();

        pool.stop();
        assert!(done.load(Ordering::SeqCst));
        assert!(pool.idle_worker().is_none());
        assert!(matches!(pool.wake(0, || {}), Err(Error::NotRunning)));
        pool.stop();
    }
}
