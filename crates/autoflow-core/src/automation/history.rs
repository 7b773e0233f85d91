//! Undo/redo history of persisted automation changes.
//!
//! Entries hold full before/after snapshots. Applying an entry is the store's
//! job (it needs the repository); this module only tracks the cursor.

use autoflow_types::automation::Automation;

/// One recorded change.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryOperation {
    /// A save. `before` is `None` when the save created the automation.
    Save {
        before: Option<Automation>,
        after: Automation,
    },
    Delete { before: Automation },
}

impl HistoryOperation {
    /// Id of the automation the entry concerns.
    pub fn automation_id(&self) -> Option<&str> {
        match self {
            HistoryOperation::Save { after, .. } => after.id.as_deref(),
            HistoryOperation::Delete { before } => before.id.as_deref(),
        }
    }

    fn snapshots_mut(&mut self) -> impl Iterator<Item = &mut Automation> {
        let (first, second) = match self {
            HistoryOperation::Save { before, after } => (before.as_mut(), Some(after)),
            HistoryOperation::Delete { before } => (Some(before), None),
        };
        first.into_iter().chain(second)
    }
}

/// Bounded linear history with a cursor.
///
/// Entries before `position` can be undone, entries from `position` on can be
/// redone. Recording a new entry discards the redo tail.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<HistoryOperation>,
    position: usize,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            position: 0,
            limit: limit.max(1),
        }
    }

    pub fn record(&mut self, operation: HistoryOperation) {
        self.entries.truncate(self.position);
        self.entries.push(operation);
        if self.entries.len() > self.limit {
            let overflow = self.entries.len() - self.limit;
            self.entries.drain(..overflow);
        }
        self.position = self.entries.len();
    }

    pub fn can_undo(&self) -> bool {
        self.position > 0
    }

    pub fn can_redo(&self) -> bool {
        self.position < self.entries.len()
    }

    /// Step back, returning the entry to revert.
    pub fn undo(&mut self) -> Option<HistoryOperation> {
        if !self.can_undo() {
            return None;
        }
        self.position -= 1;
        self.entries.get(self.position).cloned()
    }

    /// Step forward, returning the entry to replay.
    pub fn redo(&mut self) -> Option<HistoryOperation> {
        let entry = self.entries.get(self.position).cloned()?;
        self.position += 1;
        Some(entry)
    }

    /// Restore the cursor after a failed undo.
    pub fn cancel_undo(&mut self) {
        if self.can_redo() {
            self.position += 1;
        }
    }

    /// Restore the cursor after a failed redo.
    pub fn cancel_redo(&mut self) {
        if self.can_undo() {
            self.position -= 1;
        }
    }

    /// Point every snapshot of `old_id` at `new_id`. Needed when an undo or
    /// redo recreates a deleted automation under a new id.
    pub fn remap_id(&mut self, old_id: &str, new_id: &str) {
        for entry in &mut self.entries {
            for snapshot in entry.snapshots_mut() {
                if snapshot.id.as_deref() == Some(old_id) {
                    snapshot.id = Some(new_id.to_string());
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.position = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
