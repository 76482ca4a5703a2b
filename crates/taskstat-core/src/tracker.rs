//! Named task counter registry.
//!
//! `TaskTracker` keeps `name -> active count` plus a global outstanding counter
//! that callers can block on until every started task has finished.
//!
//! Lock order is always `counts` -> `outstanding`. Waiters only take
//! `outstanding`, so they never hold up writers for longer than a notify.
//!
//! Names that drop back to zero stay in the map with count `0`; use
//! [`TaskTracker::prune_idle`] to drop them.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::time::Duration;

use crate::error::{Result, TaskStatError};

pub struct TaskTracker {
    service_name: String,
    counts: RwLock<HashMap<String, u64>>,
    outstanding: Mutex<u64>,
    drained: Condvar,
}

impl TaskTracker {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            counts: RwLock::new(HashMap::new()),
            outstanding: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    /// Service label attached to every exported series.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Mark one task named `name` as started.
    pub fn add(&self, name: &str) {
        let mut counts = self.counts.write().unwrap_or_else(PoisonError::into_inner);
        match counts.get_mut(name) {
            Some(c) => *c += 1,
            None => {
                counts.insert(name.to_string(), 1);
            }
        }

        let mut outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        *outstanding += 1;
    }

    /// Mark one task named `name` as finished.
    ///
    /// Every `done` must pair with an earlier `add` for the same name. An
    /// unmatched call returns [`TaskStatError::UnmatchedDone`] and leaves all
    /// counters untouched.
    pub fn done(&self, name: &str) -> Result<()> {
        let mut counts = self.counts.write().unwrap_or_else(PoisonError::into_inner);
        let Some(c) = counts.get_mut(name).filter(|c| **c > 0) else {
            return Err(TaskStatError::UnmatchedDone(name.to_string()));
        };
        *c -= 1;

        let mut outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.drained.notify_all();
        }
        Ok(())
    }

    /// Start a task and return a guard that calls `done` when dropped.
    pub fn start(self: &Arc<Self>, name: &str) -> TaskGuard {
        self.add(name);
        TaskGuard {
            tracker: Arc::clone(self),
            name: name.to_string(),
        }
    }

    /// Point-in-time copy of every tracked name and its count.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        let counts = self.counts.read().unwrap_or_else(PoisonError::into_inner);
        counts.clone()
    }

    pub fn count(&self, name: &str) -> u64 {
        let counts = self.counts.read().unwrap_or_else(PoisonError::into_inner);
        counts.get(name).copied().unwrap_or(0)
    }

    /// Tasks started but not yet finished, across all names.
    pub fn outstanding(&self) -> u64 {
        *self.outstanding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove names whose count is zero. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let mut counts = self.counts.write().unwrap_or_else(PoisonError::into_inner);
        let before = counts.len();
        counts.retain(|_, c| *c > 0);
        let removed = before - counts.len();
        if removed > 0 {
            tracing::debug!(service = %self.service_name, removed, "pruned idle task names");
        }
        removed
    }

    /// Block the current thread until every started task has finished.
    ///
    /// Any number of threads may wait at once. Do not call this from an async
    /// executor thread; use `spawn_blocking` there.
    pub fn wait(&self) {
        let outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        let _drained = self
            .drained
            .wait_while(outstanding, |n| *n > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    /// Returns `true` when all tasks finished in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        let (_drained, res) = self
            .drained
            .wait_timeout_while(outstanding, timeout, |n| *n > 0)
            .unwrap_or_else(PoisonError::into_inner);
        !res.timed_out()
    }
}

/// RAII handle for one running task; dropping it marks the task done.
#[must_use = "dropping the guard immediately marks the task done"]
pub struct TaskGuard {
    tracker: Arc<TaskTracker>,
    name: String,
}

impl TaskGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        // Paired with the add in `start`; only fails if the caller also
        // called `done` by hand for this task.
        if let Err(e) = self.tracker.done(&self.name) {
            tracing::warn!(error = %e, "task guard dropped after manual done");
        }
    }
}
