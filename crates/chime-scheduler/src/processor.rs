//! In-memory single-timer queue that dispatches reminders at their instant.
//!
//! One dispatch loop sleeps until the earliest queued `execution_time` and is
//! woken through a [`Notify`] whenever the head of the heap changes, so there
//! is never more than one armed timer regardless of queue size.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tracing::{debug, info};

use chime_core::reminder::{Reminder, ReminderKey};

use crate::clock::Clock;
use crate::error::{Result, SchedulerError};

/// Invoked by the dispatch loop for every due reminder. Built by the service
/// before the processor exists: the conditional consume under lease plus the
/// user callback.
pub type ExecuteFn = Arc<dyn Fn(Reminder) + Send + Sync>;

/// Heap entry: earliest `execution_time` first, insertion order on ties.
struct QueuedReminder {
    reminder: Reminder,
    seq: u64,
}

impl QueuedReminder {
    fn sort_key(&self) -> (i64, u64) {
        (self.reminder.execution_time, self.seq)
    }
}

impl PartialEq for QueuedReminder {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for QueuedReminder {}

impl PartialOrd for QueuedReminder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedReminder {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the earliest entry first.
        other.sort_key().cmp(&self.sort_key())
    }
}

struct QueueState {
    heap: BinaryHeap<QueuedReminder>,
    next_seq: u64,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Wakes the dispatch loop when the head entry changes or the queue closes.
    head_changed: Notify,
}

/// Cloneable handle to the in-memory queue; [`Processor::run`] drives dispatch.
#[derive(Clone)]
pub struct Processor {
    shared: Arc<Shared>,
    execute: ExecuteFn,
    clock: Arc<dyn Clock>,
}

impl Processor {
    pub fn new(clock: Arc<dyn Clock>, execute: ExecuteFn) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    heap: BinaryHeap::new(),
                    next_seq: 0,
                    closed: false,
                }),
                head_changed: Notify::new(),
            }),
            execute,
            clock,
        }
    }

    /// Queue a leased reminder for dispatch at its `execution_time`.
    pub fn enqueue(&self, reminder: Reminder) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        if state.closed {
            return Err(SchedulerError::Closed);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        let entry = QueuedReminder { reminder, seq };
        let new_head = state
            .heap
            .peek()
            .map_or(true, |head| entry.sort_key() < head.sort_key());
        state.heap.push(entry);
        drop(state);
        if new_head {
            self.shared.head_changed.notify_one();
        }
        Ok(())
    }

    /// Drop every queued entry for `key`. Idempotent; an absent key is fine.
    pub fn dequeue(&self, key: &ReminderKey) {
        let mut state = self.shared.state.lock().unwrap();
        let head_key = state.heap.peek().map(|e| e.reminder.key());
        let before = state.heap.len();
        state.heap.retain(|e| e.reminder.key() != *key);
        let removed = before - state.heap.len();
        drop(state);
        if removed > 0 {
            debug!(key = %key, removed, "dequeued reminder");
            if head_key.as_ref() == Some(key) {
                self.shared.head_changed.notify_one();
            }
        }
    }

    /// Drain the queue and refuse further enqueues. Pending entries never fire.
    pub fn close(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        let dropped = state.heap.len();
        state.heap.clear();
        drop(state);
        if dropped > 0 {
            info!(dropped, "processor closed with queued reminders");
        }
        self.shared.head_changed.notify_one();
    }

    /// Dispatch loop: sleep until the head is due, fire everything due,
    /// recompute. Runs until [`Processor::close`] or the shutdown signal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!("processor dispatch loop started");
        loop {
            let next_due = {
                let state = self.shared.state.lock().unwrap();
                if state.closed {
                    break;
                }
                state.heap.peek().map(|e| e.reminder.execution_time)
            };
            match next_due {
                None => {
                    tokio::select! {
                        _ = self.shared.head_changed.notified() => {}
                        res = shutdown.changed() => {
                            if res.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                Some(at) => {
                    let delay = (at - self.clock.now_millis()).max(0) as u64;
                    tokio::select! {
                        // Head changed under us: recompute the deadline.
                        _ = self.shared.head_changed.notified() => {}
                        _ = tokio::time::sleep(Duration::from_millis(delay)) => self.fire_due(),
                        res = shutdown.changed() => {
                            if res.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        debug!("processor dispatch loop stopped");
    }

    /// Pop and execute every entry whose instant has elapsed, in heap order.
    fn fire_due(&self) {
        loop {
            let due = {
                let mut state = self.shared.state.lock().unwrap();
                let now = self.clock.now_millis();
                let head_due = state
                    .heap
                    .peek()
                    .map_or(false, |head| head.reminder.execution_time <= now);
                if head_due {
                    state.heap.pop()
                } else {
                    None
                }
            };
            // The lock is released before the callback runs, so user code may
            // re-enter enqueue/dequeue.
            match due {
                Some(entry) => (self.execute)(entry.reminder),
                None => break,
            }
        }
    }
}
