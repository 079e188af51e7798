use crate::records::{Category, Change, Departure};
use std::mem;
use std::sync::Mutex;

/// In-memory pending queues: one per category plus one for departures.
///
/// `append` routes by the change's own category, so a producer can never put
/// a row in the wrong queue. A drain swaps the live vector for a fresh empty
/// one under the queue's lock; that swap is the only synchronization the
/// store needs, and an append racing a drain lands in exactly one of the
/// detached batch or the replacement.
#[derive(Default)]
pub struct PendingQueues {
    changes: [Mutex<Vec<Change>>; Category::ALL.len()],
    departures: Mutex<Vec<Departure>>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, change: Change) {
        self.changes[change.category().index()]
            .lock()
            .expect("pending queue mutex poisoned")
            .push(change);
    }

    pub fn extend(&self, changes: impl IntoIterator<Item = Change>) {
        for change in changes {
            self.append(change);
        }
    }

    /// Detach the full current contents and install a new empty queue.
    /// Subsequent appends land in the new queue, never in the detached batch.
    pub fn drain(&self, category: Category) -> Vec<Change> {
        mem::take(
            &mut *self.changes[category.index()]
                .lock()
                .expect("pending queue mutex poisoned"),
        )
    }

    pub fn len(&self, category: Category) -> usize {
        self.changes[category.index()]
            .lock()
            .expect("pending queue mutex poisoned")
            .len()
    }

    pub fn is_empty(&self, category: Category) -> bool {
        self.len(category) == 0
    }

    pub fn push_departure(&self, departure: Departure) {
        self.departures
            .lock()
            .expect("departure queue mutex poisoned")
            .push(departure);
    }

    pub fn drain_departures(&self) -> Vec<Departure> {
        mem::take(
            &mut *self
                .departures
                .lock()
                .expect("departure queue mutex poisoned"),
        )
    }

    pub fn departures_len(&self) -> usize {
        self.departures
            .lock()
            .expect("departure queue mutex poisoned")
            .len()
    }
}
