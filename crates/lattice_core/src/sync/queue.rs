//! FIFO queue of deferred synchronization tasks.
//!
//! A task only names a lattice; it reads current state when it runs, so
//! two pending tasks for the same lattice do the same work and may be
//! merged.

use crate::model::lattice::LatticeId;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTask {
    pub lattice_id: LatticeId,
    /// Monotonic enqueue counter, for diagnostics.
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued(SyncTask),
    /// A task for the same lattice was already pending.
    Coalesced(SyncTask),
}

#[derive(Debug, Default)]
pub struct SyncQueue {
    tasks: RefCell<VecDeque<SyncTask>>,
    next_sequence: Cell<u64>,
    coalesce: bool,
}

impl SyncQueue {
    pub fn new(coalesce: bool) -> Self {
        Self {
            coalesce,
            ..Self::default()
        }
    }

    pub fn push(&self, lattice_id: LatticeId) -> Enqueued {
        let mut tasks = self.tasks.borrow_mut();
        if self.coalesce {
            if let Some(pending) = tasks.iter().find(|task| task.lattice_id == lattice_id) {
                return Enqueued::Coalesced(*pending);
            }
        }
        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence + 1);
        let task = SyncTask {
            lattice_id,
            sequence,
        };
        tasks.push_back(task);
        Enqueued::Queued(task)
    }

    /// Next task; the queue borrow is released before returning.
    pub fn pop(&self) -> Option<SyncTask> {
        self.tasks.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}
