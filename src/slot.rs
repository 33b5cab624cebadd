//! Per-worker slot: the park/publish half of the wake protocol.
//!
//! Each managed worker owns exactly one slot. The mutex guards a single-slot
//! mailbox and the condition variable is bound to that mutex. Producers fill
//! an empty mailbox and signal; only the owning worker drains it. Callbacks
//! are never run under the lock.

use std::sync::{Condvar, Mutex};

use crate::roster::WorkerId;

/// A unit of work handed to a worker. Receives the id of the worker that
/// runs it and may block, suspend, or run arbitrarily long.
pub type Task = Box<dyn FnOnce(WorkerId) + Send + 'static>;

/// A worker's park primitive and mailbox.
pub(crate) struct Slot {
    id: WorkerId,
    /// Holds at most one pending task.
    mailbox: Mutex<Option<Task>>,
    /// Signaled whenever the mailbox transitions to non-empty.
    ready: Condvar,
}

impl Slot {
    pub(crate) fn new(id: WorkerId) -> Self {
        Slot {
            id,
            mailbox: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// Offers `task` to this worker. Returns `false` without side effects if
    /// the mailbox is already occupied (the worker is claimed by someone
    /// else); the caller decides how to handle the miss.
    pub(crate) fn publish(&self, task: Task) -> bool {
        let mut mail = self.mailbox.lock().unwrap();
        if mail.is_some() {
            return false;
        }
        *mail = Some(task);
        drop(mail);
        self.ready.notify_one();
        true
    }

    /// Ensures the owning worker is not left parked. Installs a do-nothing
    /// task if the mailbox is empty; if a task is already pending the worker
    /// is about to wake anyway and nothing is installed.
    pub(crate) fn nudge(&self) {
        let mut mail = self.mailbox.lock().unwrap();
        if mail.is_none() {
            *mail = Some(Box::new(|_| {}));
            drop(mail);
            self.ready.notify_one();
        }
    }

    /// Blocks the owning worker until a task arrives, then drains it.
    pub(crate) fn park(&self) -> Task {
        let mut mail = self.mailbox.lock().unwrap();
        loop {
            if let Some(task) = mail.take() {
                return task;
            }
            mail = self.ready.wait(mail).unwrap();
        }
    }

    /// Blocks the owning worker until a task arrives or `until(ready)`
    /// holds, then drains whatever is pending. The predicate is re-checked
    /// under the lock, closing the race where a producer flips the
    /// condition and nudges between the caller's check and the wait.
    pub(crate) fn park_until<T, F>(&self, state: &T, until: &F) -> Option<Task>
    where
        F: Fn(&T) -> bool,
    {
        let mut mail = self.mailbox.lock().unwrap();
        while mail.is_none() && !until(state) {
            mail = self.ready.wait(mail).unwrap();
        }
        mail.take()
    }
}
