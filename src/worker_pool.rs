//! Fixed-size pool of worker threads.
//!
//! Tasks go through an unbounded channel so submitting never blocks; the
//! number of threads bounds how many tasks run at once.

use crossbeam::channel::{self, Sender};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

pub const DEFAULT_WORKERS: usize = 5;

/// Returned by [`WorkerPool::submit`] after the pool has been shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClosed;

pub struct WorkerPool<T> {
    sender: Option<Sender<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Starts `size` threads (at least one) that feed each task to `handler`.
    pub fn new<F>(size: usize, handler: F) -> io::Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let (sender, receiver) = channel::unbounded::<T>();
        let handler = Arc::new(handler);

        let workers = (0..size.max(1))
            .map(|id| {
                let receiver = receiver.clone();
                let handler = Arc::clone(&handler);
                thread::Builder::new()
                    .name(format!("tidywatch-worker-{id}"))
                    .spawn(move || {
                        for task in receiver.iter() {
                            handler(task);
                        }
                        debug!(worker = id, "worker exiting");
                    })
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a task. Never blocks.
    pub fn submit(&self, task: T) -> Result<(), PoolClosed> {
        match &self.sender {
            Some(sender) => sender.send(task).map_err(|_| PoolClosed),
            None => Err(PoolClosed),
        }
    }

    /// Closes the queue and waits for every queued and running task.
    pub fn drain(mut self) {
        self.close_and_join();
    }
}

impl<T> WorkerPool<T> {
    fn close_and_join(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.close_and_join();
    }
}
