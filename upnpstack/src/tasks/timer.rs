use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

/// Longest sleep when nothing is scheduled.
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// Timer-driven component.
pub trait Runnable: Send + Sync {
    /// Executes due work and returns the next wake time, if any.
    fn run(&self) -> Option<Instant>;
}

#[derive(Default)]
struct TimerState {
    stopped: bool,
    woken: bool,
}

struct Shared {
    state: Mutex<TimerState>,
    condvar: Condvar,
}

/// Thread calling [`Runnable::run`] at or before each wake time.
///
/// The thread only holds a weak reference and exits once the runnable is
/// dropped.
pub struct TimerThread {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimerThread {
    pub fn start(name: &str, runnable: Weak<dyn Runnable>) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState::default()),
            condvar: Condvar::new(),
        });
        let thread_shared = shared.clone();
        let thread_name = name.to_string();
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run(&thread_name, &thread_shared, runnable))?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    fn run(name: &str, shared: &Shared, runnable: Weak<dyn Runnable>) {
        loop {
            let next = match runnable.upgrade() {
                Some(runnable) => runnable.run(),
                None => break,
            };

            let mut state = shared.state.lock();
            if state.stopped {
                break;
            }
            if state.woken {
                state.woken = false;
                continue;
            }
            let deadline = next.unwrap_or_else(|| Instant::now() + IDLE_WAIT);
            if deadline > Instant::now() {
                shared.condvar.wait_until(&mut state, deadline);
            }
            state.woken = false;
            if state.stopped {
                break;
            }
        }
        debug!("timer {} stopped", name);
    }

    /// Makes the thread recompute its next wake time.
    pub fn wake(&self) {
        let mut state = self.shared.state.lock();
        state.woken = true;
        self.shared.condvar.notify_one();
    }

    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            self.shared.condvar.notify_one();
        }
        let thread = self.thread.lock().take();
        if let Some(thread) = thread
            && thread.thread().id() != std::thread::current().id()
            && thread.join().is_err()
        {
            warn!("timer thread panicked");
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        runs: AtomicUsize,
        due: Mutex<Option<Instant>>,
    }

    impl Runnable for Counter {
        fn run(&self) -> Option<Instant> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.due.lock().take()
        }
    }

    #[test]
    fn test_timer_runs_at_wake_time() {
        let counter = Arc::new(Counter {
            runs: AtomicUsize::new(0),
            due: Mutex::new(Some(Instant::now() + Duration::from_millis(50))),
        });
        let weak: Weak<dyn Runnable> = Arc::downgrade(&counter) as Weak<dyn Runnable>;
        let timer = TimerThread::start("test-timer", weak).unwrap();

        std::thread::sleep(Duration::from_millis(400));
        assert!(counter.runs.load(Ordering::SeqCst) >= 2);

        let before = counter.runs.load(Ordering::SeqCst);
        timer.wake();
        std::thread::sleep(Duration::from_millis(200));
        assert!(counter.runs.load(Ordering::SeqCst) > before);
        timer.stop();
    }
}
