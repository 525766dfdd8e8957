//! Per-destination FIFO of pending change events
//!
//! Decouples notification capture from propagation. The mutex guards only
//! the push/take critical sections and is never held across I/O or across
//! an await point.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::event::ChangeEvent;

/// Pending events for one destination endpoint.
///
/// Insertion order is preserved and nothing is deduplicated; duplicate
/// suppression happens before enqueue, in the loop guard. Producers on any
/// thread may enqueue; the owning worker drains.
#[derive(Debug, Default)]
pub struct SyncQueue {
    events: Mutex<VecDeque<ChangeEvent>>,
    ready: Notify,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ChangeEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event. Never blocks beyond the short critical section.
    pub fn enqueue(&self, event: ChangeEvent) {
        self.lock().push_back(event);
        self.ready.notify_one();
    }

    /// Take every queued event in insertion order, leaving the queue empty.
    ///
    /// Each event is returned by exactly one drain; events enqueued while the
    /// lock is held land in the next drain.
    pub fn drain_all(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.lock()).into()
    }

    /// Put events back at the front, ahead of anything queued since.
    pub fn restore(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        {
            let mut queue = self.lock();
            for event in events.into_iter().rev() {
                queue.push_front(event);
            }
        }
        self.ready.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait until the queue holds at least one event or `timeout` elapses.
    ///
    /// Returns whether the queue is non-empty.
    pub async fn wait_non_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return !self.is_empty();
            }
        }
    }

    /// Pop the oldest event, waiting up to `timeout` for one to arrive.
    pub async fn dequeue_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.lock().pop_front() {
                return Some(event);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.wait_non_empty(remaining).await {
                return None;
            }
        }
    }
}
