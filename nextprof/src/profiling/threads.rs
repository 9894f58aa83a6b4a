//! Fixed-capacity table of the threads being sampled

use log::warn;

use crate::domain::{Address, ThreadId};

/// A thread of the debuggee that is sampled on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachedThread {
    pub id: ThreadId,
    /// Program counter when the thread was attached.
    pub start_address: Address,
    /// Stack pointer when the thread was attached; stack slices end here.
    pub stack_top: Address,
}

/// Attached threads, at most `capacity` of them, unique by id.
///
/// Storage is allocated once; removal swaps the last entry into the hole.
#[derive(Debug)]
pub struct ThreadTable {
    threads: Vec<AttachedThread>,
    capacity: usize,
}

impl ThreadTable {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            threads: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Track a thread. An entry with the same id is replaced.
    ///
    /// Returns `false` and drops the thread when the table is full.
    pub fn insert(&mut self, thread: AttachedThread) -> bool {
        if let Some(existing) = self.threads.iter_mut().find(|t| t.id == thread.id) {
            *existing = thread;
            return true;
        }
        if self.threads.len() >= self.capacity {
            warn!(
                "Thread table full ({}), not sampling {}",
                self.capacity, thread.id
            );
            return false;
        }
        self.threads.push(thread);
        true
    }

    /// Stop tracking a thread; unknown ids are ignored.
    pub fn remove(&mut self, id: ThreadId) -> Option<AttachedThread> {
        let index = self.threads.iter().position(|t| t.id == id)?;
        Some(self.threads.swap_remove(index))
    }

    pub fn clear(&mut self) {
        self.threads.clear();
    }

    #[must_use]
    pub fn get(&self, id: ThreadId) -> Option<&AttachedThread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttachedThread> {
        self.threads.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
