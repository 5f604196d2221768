use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of threads pulling boxed jobs off one channel. Jobs report back
/// through whatever channel they capture; the pool itself returns nothing.
pub struct WorkerPool {
    tx: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> io::Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let num_threads = num_threads.max(1);
        let mut handles = Vec::with_capacity(num_threads);

        for i in 0..num_threads {
            let rx_clone = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("imgcull-worker-{}", i))
                .spawn(move || {
                    while let Ok(job) = rx_clone.recv() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("Worker job panicked");
                        }
                    }
                })?;
            handles.push(handle);
        }
        debug!("Started worker pool with {} threads", num_threads);

        Ok(Self { tx: Some(tx), handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(tx) = &self.tx else { return };
        if tx.send(Box::new(job)).is_err() {
            warn!("Worker pool is shut down, job dropped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends every worker loop once the queue drains.
        self.tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_jobs_run_and_report() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.size(), 3);

        let (tx, rx) = unbounded();
        for i in 0..20usize {
            let tx = tx.clone();
            pool.execute(move || { let _ = tx.send(i * 2); });
        }
        let mut results: Vec<usize> = (0..20).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        results.sort();
        assert_eq!(results, (0..20).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = unbounded();

        pool.execute(|| panic!("decoder blew up"));
        pool.execute(move || { let _ = tx.send(42); });

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(42));
    }

    #[test]
    fn test_drop_drains_queue() {
        let pool = WorkerPool::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let c = counter.clone();
            pool.execute(move || { c.fetch_add(1, Ordering::SeqCst); });
        }

        // Drop joins after the queue drains
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
