use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Work queue lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    /// Items handed to the queue that have not been completed yet.
    active: usize,
    /// Set once `active` reaches zero.
    done: bool,
    /// Set by `close`; pops return `None` even if items remain.
    closed: bool,
}

/// Shared blocking FIFO.
///
/// Items, the active counter and both flags live under one mutex, so a
/// waiter can never miss the wakeup that follows the last completion.
#[derive(Debug)]
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                active: 0,
                done: false,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Queue pre-loaded with `items`. An empty queue starts out done.
    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        let items: VecDeque<T> = items.into_iter().collect();
        let active = items.len();
        Self {
            state: Mutex::new(QueueState {
                items,
                active,
                done: active == 0,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState<T>>, QueueError> {
        self.state.lock().map_err(|_| QueueError::Poisoned)
    }

    /// Submit a new item.
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        state.items.push_back(item);
        state.active += 1;
        state.done = false;
        self.ready.notify_one();
        Ok(())
    }

    /// Put an already-submitted item back at the tail.
    pub fn requeue(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        state.items.push_back(item);
        self.ready.notify_one();
        Ok(())
    }

    /// Block until an item is available. `None` once the queue is done and
    /// empty, or closed.
    pub fn pop(&self) -> Result<Option<T>, QueueError> {
        let mut state = self.lock()?;
        loop {
            if state.closed {
                return Ok(None);
            }
            if let Some(item) = state.items.pop_front() {
                return Ok(Some(item));
            }
            if state.done {
                return Ok(None);
            }
            state = self.ready.wait(state).map_err(|_| QueueError::Poisoned)?;
        }
    }

    /// Take the head item without waiting. `None` when nothing is queued
    /// right now or the queue is closed.
    pub fn try_pop(&self) -> Result<Option<T>, QueueError> {
        let mut state = self.lock()?;
        if state.closed {
            return Ok(None);
        }
        Ok(state.items.pop_front())
    }

    /// Mark one item finished. Returns how many are still active; the last
    /// completion sets the done flag and wakes every waiter.
    pub fn complete_one(&self) -> Result<usize, QueueError> {
        let mut state = self.lock()?;
        state.active = state.active.saturating_sub(1);
        if state.active == 0 {
            state.done = true;
            self.ready.notify_all();
        }
        Ok(state.active)
    }

    /// Stop handing out items and wake every waiter.
    pub fn close(&self) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        state.closed = true;
        self.ready.notify_all();
        Ok(())
    }

    /// Take whatever is still queued.
    pub fn drain(&self) -> Result<Vec<T>, QueueError> {
        let mut state = self.lock()?;
        Ok(state.items.drain(..).collect())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active(&self) -> usize {
        self.lock().map(|s| s.active).unwrap_or(0)
    }

    pub fn is_done(&self) -> bool {
        self.lock().map(|s| s.done).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn fifo_order() {
        let q = WorkQueue::with_items([1, 2, 3]);
        assert_eq!(q.pop().unwrap(), Some(1));
        assert_eq!(q.pop().unwrap(), Some(2));
        q.requeue(1).unwrap();
        assert_eq!(q.pop().unwrap(), Some(3));
        assert_eq!(q.pop().unwrap(), Some(1));
        assert_eq!(q.active(), 3);
    }

    #[test]
    fn try_pop_never_waits() {
        let q = WorkQueue::with_items(["a"]);
        assert_eq!(q.try_pop().unwrap(), Some("a"));
        assert_eq!(q.try_pop().unwrap(), None);
        assert!(!q.is_done());

        q.requeue("a").unwrap();
        q.close().unwrap();
        assert_eq!(q.try_pop().unwrap(), None);
    }

    #[test]
    fn empty_queue_is_done() {
        let q: WorkQueue<u32> = WorkQueue::with_items(Vec::new());
        assert!(q.is_done());
        assert_eq!(q.pop().unwrap(), None);
    }

    #[test]
    fn last_completion_releases_blocked_pop() {
        let q = Arc::new(WorkQueue::with_items([7]));
        assert_eq!(q.pop().unwrap(), Some(7));

        let waiter = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop().unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.complete_one().unwrap(), 0);
        assert_eq!(waiter.join().unwrap(), None);
        assert!(q.is_done());
    }

    #[test]
    fn push_wakes_waiter() {
        let q: Arc<WorkQueue<&str>> = Arc::new(WorkQueue::new());
        let waiter = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop().unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        q.push("job").unwrap();
        assert_eq!(waiter.join().unwrap(), Some("job"));
    }

    #[test]
    fn close_stops_handing_out_items() {
        let q = WorkQueue::with_items([1, 2]);
        q.close().unwrap();
        assert_eq!(q.pop().unwrap(), None);
        assert_eq!(q.drain().unwrap(), vec![1, 2]);
        assert!(q.is_empty());
    }
}
