use crate::config::SchedulerConfig;
use crate::error::{PipelineError, Result};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Pool {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Pool {
    fn shutdown(&self) {
        // Closing the channel ends every worker loop once queued jobs finish
        self.sender.lock().take();

        let current = thread::current().id();
        for worker in self.workers.lock().drain(..) {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::warn!(pool = %self.name, "worker thread panicked");
            }
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A fixed-size pool of worker threads
///
/// Cloning yields another handle to the same pool; the threads are joined
/// when the last handle is dropped or [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct Scheduler {
    pool: Arc<Pool>,
}

impl Scheduler {
    /// Spawn the worker threads described by `config`
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;

        let (sender, receiver) = channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(config.workers);

        for idx in 0..config.workers {
            let receiver = receiver.clone();
            let name = format!("{}-{}", config.thread_name, idx);
            let pool_name = config.thread_name.clone();
            let worker = thread::Builder::new()
                .name(name)
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!(pool = %pool_name, "job panicked");
                        }
                    }
                })
                .map_err(|e| PipelineError::ThreadError(e.to_string()))?;
            workers.push(worker);
        }

        tracing::debug!(pool = %config.thread_name, workers = config.workers, "scheduler started");
        Ok(Self {
            pool: Arc::new(Pool {
                name: config.thread_name.clone(),
                sender: Mutex::new(Some(sender)),
                workers: Mutex::new(workers),
            }),
        })
    }

    /// A pool with `workers` threads and the default name
    pub fn parallel(workers: usize) -> Result<Self> {
        Self::new(&SchedulerConfig::parallel(workers))
    }

    /// Run `job` on one of the worker threads
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.pool.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender
                .send(Box::new(job))
                .map_err(|_| PipelineError::SchedulerShutdown),
            None => Err(PipelineError::SchedulerShutdown),
        }
    }

    /// Number of worker threads still owned by the pool
    pub fn workers(&self) -> usize {
        self.pool.workers.lock().len()
    }

    /// Stop accepting jobs and join the workers after queued jobs finish
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.pool.name)
            .field("workers", &self.workers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_on_workers() {
        let scheduler = Scheduler::parallel(2).unwrap();
        let (tx, rx) = channel::unbounded();
        let caller = thread::current().id();

        for _ in 0..8 {
            let tx = tx.clone();
            scheduler
                .execute(move || tx.send(thread::current().id()).unwrap())
                .unwrap();
        }

        let ids: HashSet<_> = (0..8)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert!(!ids.contains(&caller));
        assert!(ids.len() <= 2);
    }

    #[test]
    fn test_execute_after_shutdown() {
        let scheduler = Scheduler::parallel(1).unwrap();
        scheduler.shutdown();
        assert_eq!(scheduler.workers(), 0);
        assert_eq!(
            scheduler.execute(|| {}),
            Err(PipelineError::SchedulerShutdown)
        );
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let scheduler = Scheduler::parallel(1).unwrap();
        scheduler.execute(|| panic!("boom")).unwrap();

        let (tx, rx) = channel::bounded(1);
        scheduler.execute(move || tx.send(()).unwrap()).unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            Scheduler::parallel(0),
            Err(PipelineError::InvalidConfiguration(_))
        ));
    }
}
