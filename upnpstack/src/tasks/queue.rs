use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Delays below this are inserted scanning from the head of the queue,
/// longer ones from the tail.
pub const SHORT_DELAY: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task<T> {
    pub timestamp: Instant,
    pub payload: T,
}

/// Pending tasks in ascending timestamp order.
///
/// Tasks sharing a timestamp keep their insertion order.
#[derive(Debug, Clone)]
pub struct TaskQueue<T> {
    tasks: VecDeque<Task<T>>,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Inserts a task; returns `true` when it became the head of the queue.
    pub fn add(&mut self, timestamp: Instant, payload: T) -> bool {
        let task = Task { timestamp, payload };
        let short = timestamp.saturating_duration_since(Instant::now()) < SHORT_DELAY;

        let index = if short {
            self.tasks
                .iter()
                .position(|t| t.timestamp > timestamp)
                .unwrap_or(self.tasks.len())
        } else {
            self.tasks
                .iter()
                .rposition(|t| t.timestamp <= timestamp)
                .map_or(0, |i| i + 1)
        };
        self.tasks.insert(index, task);
        index == 0
    }

    pub fn add_in(&mut self, delay: Duration, payload: T) -> bool {
        self.add(Instant::now() + delay, payload)
    }

    /// Removes every task whose payload matches; returns how many were removed.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.tasks.len();
        self.tasks.retain(|t| !predicate(&t.payload));
        before - self.tasks.len()
    }

    /// Pops the head if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<T> {
        match self.tasks.front() {
            Some(task) if task.timestamp <= now => self.tasks.pop_front().map(|t| t.payload),
            _ => None,
        }
    }

    /// Smallest pending timestamp.
    pub fn next_timestamp(&self) -> Option<Instant> {
        self.tasks.front().map(|t| t.timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task<T>> {
        self.tasks.iter()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn is_sorted<T>(queue: &TaskQueue<T>) -> bool {
        let stamps: Vec<Instant> = queue.iter().map(|t| t.timestamp).collect();
        stamps.windows(2).all(|w| w[0] <= w[1])
    }

    #[test]
    fn test_random_operations_keep_order() {
        let mut rng = rand::rng();
        let base = Instant::now();
        let mut queue = TaskQueue::new();

        for i in 0..500u32 {
            let delay = Duration::from_secs(rng.random_range(0..3600));
            queue.add(base + delay, i);
            if i % 7 == 0 {
                let target = rng.random_range(0..=i);
                queue.remove_where(|p| *p == target);
            }
            assert!(is_sorted(&queue));
            let min = queue.iter().map(|t| t.timestamp).min();
            assert_eq!(queue.next_timestamp(), min);
        }
    }

    #[test]
    fn test_add_reports_new_head() {
        let now = Instant::now();
        let mut queue = TaskQueue::new();
        assert!(queue.add(now + Duration::from_secs(10), "a"));
        assert!(!queue.add(now + Duration::from_secs(20), "b"));
        assert!(!queue.add(now + Duration::from_secs(5000), "c"));
        assert!(queue.add(now + Duration::from_secs(1), "d"));
        let order: Vec<&str> = queue.iter().map(|t| t.payload).collect();
        assert_eq!(order, vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let at = Instant::now() + Duration::from_secs(900);
        let mut queue = TaskQueue::new();
        queue.add(at, 1);
        queue.add(at, 2);
        queue.add(at, 3);
        let order: Vec<i32> = queue.iter().map(|t| t.payload).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_pop_due() {
        let now = Instant::now();
        let mut queue = TaskQueue::new();
        queue.add(now, "due");
        queue.add(now + Duration::from_secs(60), "later");

        assert_eq!(queue.pop_due(now), Some("due"));
        assert_eq!(queue.pop_due(now), None);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.remove_where(|p| *p == "later"), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.next_timestamp(), None);
    }
}
