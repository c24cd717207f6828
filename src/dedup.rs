//! Sequence-based deduplication of redelivered trades

use crate::types::SequenceId;
use std::collections::{HashSet, VecDeque};

/// Remembers processed sequence identifiers.
///
/// Unbounded by default. With a window, only the most recent `window` sequences are
/// remembered and the oldest is forgotten first, so a redelivery older than the
/// window is treated as new.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<SequenceId>,
    order: VecDeque<SequenceId>,
    window: Option<usize>,
}

impl Deduplicator {
    /// Remember every sequence for the lifetime of the deduplicator
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Remember at most `window` sequences
    pub fn bounded(window: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(window.min(1 << 16)),
            order: VecDeque::with_capacity(window.min(1 << 16)),
            window: Some(window.max(1)),
        }
    }

    pub fn from_window(window: Option<usize>) -> Self {
        match window {
            Some(window) => Self::bounded(window),
            None => Self::unbounded(),
        }
    }

    /// Returns `true` if the sequence was already seen. Otherwise records it and
    /// returns `false`.
    pub fn check_and_record(&mut self, sequence: &SequenceId) -> bool {
        if self.seen.contains(sequence) {
            return true;
        }

        self.seen.insert(sequence.clone());
        if let Some(window) = self.window {
            self.order.push_back(sequence.clone());
            while self.order.len() > window {
                if let Some(evicted) = self.order.pop_front() {
                    self.seen.remove(&evicted);
                }
            }
        }
        false
    }

    pub fn contains(&self, sequence: &SequenceId) -> bool {
        self.seen.contains(sequence)
    }

    /// Number of sequences currently remembered
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
