//! Thread pool for background asset jobs (load, thumbnails, audio levels, proxies).
//!
//! Work-stealing deques:
//! - submissions go to a shared injector
//! - each worker drains its own deque, then the injector, then steals
//!
//! Cancellation is per job (see `core::jobs`); the pool only runs closures.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::{trace, warn};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs boxed closures in the background.
pub trait WorkerPool: Send + Sync {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

/// Default thread count: 3/4 of the cores, at least one.
pub fn default_thread_count() -> usize {
    (num_cpus::get() * 3 / 4).max(1)
}

pub struct Workers {
    injector: Arc<Injector<Task>>,
    handles: Vec<thread::JoinHandle<()>>,
    /// Queued + running tasks
    in_flight: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Spawn `num_threads` workers (clamped to at least one).
    pub fn new(num_threads: usize) -> io::Result<Self> {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Task>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let locals: Vec<Worker<Task>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Task>> = locals.iter().map(|w| w.stealer()).collect();
        let mut handles = Vec::with_capacity(num_threads);

        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let in_flight = Arc::clone(&in_flight);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("mediabin-worker-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);
                    loop {
                        let task = local
                            .pop()
                            .or_else(|| injector.steal_batch_and_pop(&local).success())
                            .or_else(|| stealers.iter().find_map(|s| s.steal().success()));

                        match task {
                            Some(task) => {
                                task();
                                in_flight.fetch_sub(1, Ordering::AcqRel);
                            }
                            None if shutdown.load(Ordering::Relaxed) => break,
                            None => thread::sleep(Duration::from_millis(1)),
                        }
                    }
                    trace!("Worker {} stopped", worker_id);
                })?;
            handles.push(handle);
        }

        trace!("Workers initialized: {} threads (work-stealing)", num_threads);
        Ok(Self {
            injector,
            handles,
            in_flight,
            shutdown,
        })
    }

    /// Run closure on a worker thread.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.injector.push(Box::new(f));
    }

    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }

    /// Queued plus running tasks
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Block until every submitted task finished or `timeout` elapsed.
    /// Returns true when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl WorkerPool for Workers {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        self.execute(task)
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);
        self.shutdown.store(true, Ordering::SeqCst);

        // Give running jobs 500ms, then leave remaining threads to the process
        let deadline = Instant::now() + Duration::from_millis(500);
        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    warn!("Worker shutdown timeout reached, exiting anyway");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
        trace!("All {} workers stopped", num_threads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_all_tasks() {
        let workers = Workers::new(3).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let c = Arc::clone(&counter);
            workers.execute(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(workers.wait_idle(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(workers.in_flight(), 0);
    }

    #[test]
    fn test_zero_threads_clamped() {
        let workers = Workers::new(0).unwrap();
        assert_eq!(workers.thread_count(), 1);
        assert!(default_thread_count() >= 1);
    }
}
