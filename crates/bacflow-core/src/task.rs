//! Timed task queue driving every timer in a stack.
//!
//! Tasks fire in scheduled-time order with ties broken by insertion order.
//! Recurring tasks are rescheduled from the time they were due, not the
//! time they actually ran, so a late loop never accumulates drift.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

#[derive(Debug)]
struct Entry<T> {
    task: T,
    at: Instant,
    interval: Option<Duration>,
    seq: u64,
}

/// A task popped off the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTask<T> {
    pub id: TaskId,
    pub scheduled: Instant,
    pub task: T,
}

#[derive(Debug)]
pub struct TaskManager<T> {
    heap: BinaryHeap<Reverse<(Instant, u64, TaskId)>>,
    tasks: HashMap<TaskId, Entry<T>>,
    next_id: u64,
    next_seq: u64,
}

impl<T> Default for TaskManager<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            tasks: HashMap::new(),
            next_id: 0,
            next_seq: 0,
        }
    }
}

impl<T: Clone> TaskManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn push(&mut self, id: TaskId, at: Instant) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((at, seq, id)));
        seq
    }

    fn insert(&mut self, at: Instant, interval: Option<Duration>, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let seq = self.push(id, at);
        self.tasks.insert(
            id,
            Entry {
                task,
                at,
                interval,
                seq,
            },
        );
        id
    }

    pub fn install_task(&mut self, at: Instant, task: T) -> TaskId {
        self.insert(at, None, task)
    }

    /// Fires at `first`, then every `interval` after each scheduled time.
    pub fn install_recurring(&mut self, first: Instant, interval: Duration, task: T) -> TaskId {
        let interval = interval.max(Duration::from_millis(1));
        self.insert(first, Some(interval), task)
    }

    /// Zero-delay task: runs on the next dispatch pass, after anything already due.
    pub fn deferred(&mut self, now: Instant, task: T) -> TaskId {
        self.install_task(now, task)
    }

    /// Moves an installed task to a new time. Returns false for unknown ids.
    pub fn reschedule(&mut self, id: TaskId, at: Instant) -> bool {
        if !self.tasks.contains_key(&id) {
            return false;
        }
        let seq = self.push(id, at);
        if let Some(entry) = self.tasks.get_mut(&id) {
            entry.at = at;
            entry.seq = seq;
        }
        true
    }

    /// Cancels a task. Its heap slot goes stale and is skipped later.
    pub fn suspend_task(&mut self, id: TaskId) -> Option<T> {
        self.tasks.remove(&id).map(|entry| entry.task)
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn scheduled_time(&self, id: TaskId) -> Option<Instant> {
        self.tasks.get(&id).map(|entry| entry.at)
    }

    fn is_live(&self, seq: u64, id: TaskId) -> bool {
        self.tasks.get(&id).is_some_and(|entry| entry.seq == seq)
    }

    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((at, seq, id))) = self.heap.peek().copied() {
            if self.is_live(seq, id) {
                return Some(at);
            }
            self.heap.pop();
        }
        None
    }

    /// Pops the earliest task due at or before `now`.
    pub fn get_next_task(&mut self, now: Instant) -> Option<DueTask<T>> {
        let at = self.next_deadline()?;
        if at > now {
            return None;
        }
        let Reverse((scheduled, _, id)) = self.heap.pop()?;

        let interval = self.tasks.get(&id)?.interval;
        match interval {
            Some(interval) => {
                let next = scheduled + interval;
                let seq = self.push(id, next);
                let entry = self.tasks.get_mut(&id)?;
                entry.at = next;
                entry.seq = seq;
                Some(DueTask {
                    id,
                    scheduled,
                    task: entry.task.clone(),
                })
            }
            None => {
                let entry = self.tasks.remove(&id)?;
                Some(DueTask {
                    id,
                    scheduled,
                    task: entry.task,
                })
            }
        }
    }
}
