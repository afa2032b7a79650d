use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    /// Backpressure: the job was not queued
    #[error("Worker queue is full")]
    QueueFull,

    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Cannot spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
