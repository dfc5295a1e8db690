//! Time-ordered buffer of updates the client applied locally but the server
//! has not confirmed yet.

use shared::{Timestamp, Update};

/// Updates sorted newest first by processed time.
#[derive(Debug, Clone, Default)]
pub struct UpdateBuffer {
    updates: Vec<Update>,
    capacity: usize,
}

impl UpdateBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            updates: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts in front of the first entry not newer than `update`, so entries
    /// sharing a timestamp stay in arrival order when replayed oldest first.
    /// The oldest entries fall off once the buffer is over capacity.
    pub fn insert(&mut self, update: Update) {
        let processed = update.processed_or_zero();
        let index = self
            .updates
            .iter()
            .position(|u| u.processed_or_zero() <= processed)
            .unwrap_or(self.updates.len());
        self.updates.insert(index, update);
        if self.capacity > 0 && self.updates.len() > self.capacity {
            self.updates.truncate(self.capacity);
        }
    }

    /// The newest entries processed at or after `t`.
    pub fn from(&self, t: Timestamp) -> &[Update] {
        &self.updates[..self.split_at(t)]
    }

    /// Drops every entry processed before `t`.
    pub fn retain_from(&mut self, t: Timestamp) {
        let end = self.split_at(t);
        self.updates.truncate(end);
    }

    fn split_at(&self, t: Timestamp) -> usize {
        self.updates
            .iter()
            .position(|u| u.processed_or_zero() < t)
            .unwrap_or(self.updates.len())
    }

    /// Replay order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &Update> {
        self.updates.iter().rev()
    }

    pub fn contains(&self, update: &Update) -> bool {
        self.updates.contains(update)
    }

    pub fn clear(&mut self) {
        self.updates.clear();
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}
