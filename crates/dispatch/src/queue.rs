use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Shared FIFO of pending tasks.
///
/// Every session pulls from the same queue, so removal happens under one lock
/// and a task is handed to at most one caller. When a caller finds the queue
/// empty it broadcasts on the `emptied` notification, which is what the
/// manager's control task waits on before it starts shutting down.
#[derive(Debug)]
pub struct TaskQueue<T> {
    tasks: Mutex<VecDeque<T>>,
    emptied: Notify,
}

impl<T> TaskQueue<T> {
    /// Create a queue holding `tasks` in iteration order.
    pub fn new(tasks: impl IntoIterator<Item = T>) -> Self {
        Self {
            tasks: Mutex::new(tasks.into_iter().collect()),
            emptied: Notify::new(),
        }
    }

    /// True iff no tasks remain. Never wakes waiters.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of tasks still pending.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Remove and return the head of the queue.
    ///
    /// Returns `None` once the queue is exhausted, waking every task blocked in
    /// [`wait_until_empty`](Self::wait_until_empty).
    pub fn take(&self) -> Option<T> {
        let mut tasks = self.lock();
        let next = tasks.pop_front();
        if next.is_none() {
            self.emptied.notify_waiters();
        }
        next
    }

    /// Wait until the queue has been observed empty.
    ///
    /// The predicate is re-checked after every wake. The waiter is registered
    /// before each check, so a broadcast issued between the check and the
    /// await is not lost.
    pub async fn wait_until_empty(&self) {
        loop {
            let notified = self.emptied.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    // The guarded value is a plain collection; a panicking holder cannot
    // leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn take_is_fifo() {
        let queue = TaskQueue::new([1, 2, 3]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.take(), Some(1));
        assert_eq!(queue.take(), Some(2));
        assert_eq!(queue.take(), Some(3));
        assert_eq!(queue.take(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn is_empty_does_not_change_state() {
        let queue = TaskQueue::new(["a"]);
        for _ in 0..10 {
            assert!(!queue.is_empty());
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.take(), Some("a"));
    }

    #[tokio::test]
    async fn wait_returns_immediately_on_empty_queue() {
        let queue: TaskQueue<u32> = TaskQueue::new([]);
        tokio::time::timeout(Duration::from_secs(1), queue.wait_until_empty())
            .await
            .expect("empty queue should not block");
    }

    #[tokio::test]
    async fn is_empty_never_wakes_waiter() {
        let queue = Arc::new(TaskQueue::new([7u32]));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_until_empty().await })
        };

        for _ in 0..100 {
            assert!(!queue.is_empty());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "waiter woke while tasks remained");

        assert_eq!(queue.take(), Some(7));
        assert_eq!(queue.take(), None);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after the queue is exhausted")
            .unwrap();
    }

    #[tokio::test]
    async fn waiter_stays_blocked_until_exhaustion_is_observed() {
        let queue = Arc::new(TaskQueue::new([1u32]));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_until_empty().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Removing the last task empties the queue, but only a take() that
        // finds nothing broadcasts.
        assert_eq!(queue.take(), Some(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        assert_eq!(queue.take(), None);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_takers_never_share_a_task() {
        let queue = Arc::new(TaskQueue::new(0..1_000u32));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                while let Some(task) = queue.take() {
                    taken.push(task);
                    tokio::task::yield_now().await;
                }
                taken
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for task in handle.await.unwrap() {
                assert!(seen.insert(task), "task {task} delivered twice");
                total += 1;
            }
        }
        assert_eq!(total, 1_000);
        assert!(queue.is_empty());
    }
}
