//! Bounded undo history.
//!
//! Entries are appended when a drag, resize or nudge commits. Undo pops the
//! newest entry, so an entry can be undone at most once; there is no redo.

use std::collections::VecDeque;

use dgrid_core::geometry::Bounds;
use serde::{Deserialize, Serialize};

use crate::panel::PanelId;

/// Operation that produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Drag,
    Resize,
    Nudge,
}

/// One committed geometry change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub panel_id: PanelId,
    pub from: Bounds,
    pub to: Bounds,
    /// Milliseconds since the owning workspace's epoch.
    pub timestamp_ms: u64,
    pub kind: OperationKind,
}

/// Fixed-capacity ring buffer of [`HistoryEntry`] values.
///
/// When full, pushing evicts the oldest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    /// A history holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry, returning the evicted oldest entry when full.
    pub fn push(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Remove and return the newest entry.
    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    /// Put an entry back after a failed undo.
    ///
    /// The entry becomes the newest again; nothing is evicted since it was
    /// just popped.
    pub(crate) fn restore(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    #[must_use]
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Drop every entry that mentions `id`.
    pub fn forget_panel(&mut self, id: PanelId) {
        self.entries.retain(|entry| entry.panel_id != id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(crate::config::DEFAULT_HISTORY_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(raw: u64, ts: u64) -> HistoryEntry {
        HistoryEntry {
            panel_id: PanelId::new(raw).expect("id"),
            from: Bounds::new(0.0, 0.0, 10.0, 10.0),
            to: Bounds::new(20.0, 0.0, 10.0, 10.0),
            timestamp_ms: ts,
            kind: OperationKind::Drag,
        }
    }

    #[test]
    fn push_evicts_oldest_when_full() {
        let mut history = History::with_capacity(2);
        assert!(history.push(entry(1, 0)).is_none());
        assert!(history.push(entry(2, 1)).is_none());
        let evicted = history.push(entry(3, 2)).expect("evicted");
        assert_eq!(evicted.timestamp_ms, 0);
        let order: Vec<u64> = history.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn pop_is_lifo_and_single_use() {
        let mut history = History::default();
        history.push(entry(1, 0));
        history.push(entry(1, 5));
        assert_eq!(history.pop().map(|e| e.timestamp_ms), Some(5));
        assert_eq!(history.pop().map(|e| e.timestamp_ms), Some(0));
        assert_eq!(history.pop(), None);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut history = History::with_capacity(0);
        history.push(entry(1, 0));
        history.push(entry(1, 1));
        assert_eq!(history.len(), 1);
        assert_eq!(history.capacity(), 1);
    }

    #[test]
    fn forget_panel_drops_its_entries() {
        let mut history = History::default();
        history.push(entry(1, 0));
        history.push(entry(2, 1));
        history.push(entry(1, 2));
        history.forget_panel(PanelId::new(1).expect("id"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.last().map(|e| e.timestamp_ms), Some(1));
    }
}
