use crate::types::HistoryEntry;

/// Append-only record of the actions executed for one task.
#[derive(Debug, Default, Clone)]
pub struct ActionHistory {
    entries: Vec<HistoryEntry>,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// The most recent `k` entries, oldest first.
    pub fn last_n(&self, k: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(k);
        &self.entries[start..]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<HistoryEntry> {
        self.entries
    }
}
