use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::WorkerError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of named threads fed by a bounded queue.
pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(name: &str, workers: usize, queue: usize) -> Result<Self, WorkerError> {
        let (sender, receiver) = bounded::<Job>(queue.max(1));
        let mut handles = Vec::new();
        for i in 0..workers.max(1) {
            let receiver = receiver.clone();
            let thread_name = format!("{}-{}", name, i);
            let handle = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    for job in receiver.iter() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            warn!("job panicked on {}", thread_name);
                        }
                    }
                })?;
            handles.push(handle);
        }

        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
        })
    }

    /// Queues a job without blocking.
    pub fn submit<F>(&self, job: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(WorkerError::ShutDown)?;
        sender.try_send(Box::new(job)).map_err(|e| match e {
            TrySendError::Full(_) => WorkerError::QueueFull,
            TrySendError::Disconnected(_) => WorkerError::ShutDown,
        })
    }

    pub fn queued(&self) -> usize {
        self.sender.lock().as_ref().map_or(0, |s| s.len())
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Closes the queue, lets the workers drain it and joins them.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_none() {
            return;
        }
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        let current = std::thread::current().id();
        for worker in workers {
            if worker.thread().id() != current && worker.join().is_err() {
                warn!("worker of {} panicked", self.name);
            }
        }
        debug!("worker pool {} drained", self.name);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
