//! Ordered position files, one per simple index.
//!
//! A simple index is a sequence of (projected key, local id, global id)
//! entries sorted by key. The query engine walks these files outward from a
//! binary-searched starting point, so the only operations needed are a
//! deterministic sort at build time and an insertion-point lookup.

/// One record of a position file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct IndexEntry {
    /// Projected coordinate along this simple index's direction.
    pub key: f64,
    /// Position of the point within its level's subset.
    pub local_id: u32,
    /// Position of the point in the full data set.
    pub global_id: u32,
}

/// A sorted position file.
#[derive(Debug, Clone)]
pub(crate) struct SimpleIndex {
    entries: Vec<IndexEntry>,
}

impl SimpleIndex {
    /// Sorts the entries by key. Equal keys fall back to local id so that
    /// construction order never leaks into the layout.
    pub fn build(mut entries: Vec<IndexEntry>) -> Self {
        entries.sort_unstable_by(|a, b| {
            a.key
                .total_cmp(&b.key)
                .then_with(|| a.local_id.cmp(&b.local_id))
        });
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn entry(&self, pos: usize) -> &IndexEntry {
        &self.entries[pos]
    }

    /// First position whose key is not less than `key`.
    pub fn insertion_point(&self, key: f64) -> usize {
        self.entries.partition_point(|e| e.key < key)
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}
