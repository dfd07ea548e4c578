//! Bounded memory of server message ids we have already processed.

use std::collections::BTreeMap;

use crate::consts::IDS_BUFFER_SIZE;

/// What we know about a server message id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdState {
    NotFound,
    /// Received, and it asked for an acknowledgement.
    NeedsAck,
    NoAckNeeded,
}

/// Outcome of [`ReceivedIds::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registered {
    /// First time seen; handle it.
    Fresh,
    /// Already handled; drop it.
    Duplicate,
    /// Older than everything we still remember while the buffer is full.
    /// Whether it was processed cannot be told any more.
    TooOld,
}

#[derive(Clone, Debug, Default)]
pub struct ReceivedIds {
    ids: BTreeMap<i64, bool>,
}

impl ReceivedIds {
    pub fn new() -> Self { Self::default() }

    /// Remember `msg_id`. An id is never admitted twice.
    pub fn register(&mut self, msg_id: i64, needs_ack: bool) -> Registered {
        if self.ids.contains_key(&msg_id) {
            return Registered::Duplicate;
        }
        if self.ids.len() >= IDS_BUFFER_SIZE && msg_id < self.min() {
            return Registered::TooOld;
        }
        self.ids.insert(msg_id, needs_ack);
        Registered::Fresh
    }

    pub fn lookup(&self, msg_id: i64) -> IdState {
        match self.ids.get(&msg_id) {
            None => IdState::NotFound,
            Some(true) => IdState::NeedsAck,
            Some(false) => IdState::NoAckNeeded,
        }
    }

    /// Smallest remembered id, 0 when empty.
    pub fn min(&self) -> i64 {
        self.ids.keys().next().copied().unwrap_or(0)
    }

    /// Largest remembered id, 0 when empty.
    pub fn max(&self) -> i64 {
        self.ids.keys().next_back().copied().unwrap_or(0)
    }

    /// Forget the oldest ids beyond the buffer size.
    pub fn shrink(&mut self) {
        while self.ids.len() > IDS_BUFFER_SIZE {
            self.ids.pop_first();
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
