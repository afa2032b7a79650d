//! Scheduling facilities shared by the control point and the GENA manager.
//!
//! - [`TaskQueue`] : time-ordered pending tasks
//! - [`TimerThread`] : calls a [`Runnable`] no later than its next wake time
//! - [`WorkerPool`] : bounded pool running I/O jobs off the timer and listener threads

pub mod errors;
mod queue;
mod timer;
mod worker;

pub use errors::WorkerError;
pub use queue::{SHORT_DELAY, Task, TaskQueue};
pub use timer::{Runnable, TimerThread};
pub use worker::WorkerPool;
