//! Binding iterator: paginated listing over a snapshot.

use std::collections::VecDeque;

use crate::model::BindingEntry;

/// Cursor over the bindings a `list` call did not return directly.
///
/// The cursor owns a copy of the table taken when `list` ran; nothing done
/// to the live context afterwards is visible through it. Every entry is
/// handed out exactly once.
#[derive(Debug, Clone)]
pub struct BindingIterator {
    remaining: VecDeque<BindingEntry>,
}

impl BindingIterator {
    pub(crate) fn new(entries: Vec<BindingEntry>) -> Self {
        Self { remaining: entries.into() }
    }

    /// Take the next entry.
    pub fn next_one(&mut self) -> Option<BindingEntry> {
        self.remaining.pop_front()
    }

    /// Take up to `how_many` entries. An empty result means the cursor is
    /// exhausted (or `how_many` was zero).
    pub fn next_n(&mut self, how_many: usize) -> Vec<BindingEntry> {
        let take = how_many.min(self.remaining.len());
        self.remaining.drain(..take).collect()
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Release the cursor and whatever it still holds.
    pub fn destroy(self) {}
}

impl Iterator for BindingIterator {
    type Item = BindingEntry;

    fn next(&mut self) -> Option<BindingEntry> {
        self.next_one()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining.len(), Some(self.remaining.len()))
    }
}

impl ExactSizeIterator for BindingIterator {}
