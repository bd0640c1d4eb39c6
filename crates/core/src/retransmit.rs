//! Retransmit table (spec.md §3/§4.4, C4): an ascending, deduplicated set
//! of block numbers the receiver still wants, flushed to the sender on a
//! periodic repeat and pruned against the bitmap as it goes.

use crate::{bitmap::ReceivedBitmap, config::RETRANSMIT_TABLE_INITIAL_CAPACITY};

pub struct RetransmitTable {
    entries: Vec<u64>,
}

impl Default for RetransmitTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RetransmitTable {
    pub fn new() -> Self {
        Self { entries: Vec::with_capacity(RETRANSMIT_TABLE_INITIAL_CAPACITY) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<u64> {
        self.entries.first().copied()
    }

    pub fn last(&self) -> Option<u64> {
        self.entries.last().copied()
    }

    /// Inserts `block`, preserving ascending order; a duplicate is a no-op.
    /// Grows the backing storage by doubling, matching the original's
    /// realloc-doubling table (spec.md §4.4).
    pub fn insert(&mut self, block: u64) {
        match self.entries.binary_search(&block) {
            Ok(_) => {}
            Err(pos) => {
                if self.entries.len() == self.entries.capacity() {
                    self.entries.reserve_exact(self.entries.capacity().max(1));
                }
                self.entries.insert(pos, block);
            }
        }
    }

    /// Inserts every block in `[from, to)`.
    pub fn insert_range(&mut self, from: u64, to: u64) {
        for block in from..to {
            self.insert(block);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops entries the bitmap now reports as received, compacting the
    /// survivors to the front (spec.md §4.4 step 1-2). Returns the kept
    /// blocks in order.
    pub fn prune(&mut self, bitmap: &ReceivedBitmap) -> &[u64] {
        self.entries.retain(|&block| !bitmap.is_set(block));
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_ascending_order_and_dedupes() {
        let mut table = RetransmitTable::new();
        for block in [7, 3, 7, 12, 1, 12] {
            table.insert(block);
        }

        assert_eq!(table.iter().collect::<Vec<_>>(), vec![1, 3, 7, 12]);
    }

    #[test]
    fn prune_drops_entries_the_bitmap_has_received() {
        let mut table = RetransmitTable::new();
        table.insert_range(1, 6);

        let mut bitmap = ReceivedBitmap::new(10);
        bitmap.mark(2);
        bitmap.mark(4);

        let kept = table.prune(&bitmap).to_vec();
        assert_eq!(kept, vec![1, 3, 5]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut table = RetransmitTable::new();
        for block in 1..=(RETRANSMIT_TABLE_INITIAL_CAPACITY as u64 + 10) {
            table.insert(block);
        }

        assert_eq!(table.len(), RETRANSMIT_TABLE_INITIAL_CAPACITY + 10);
        assert!(table.entries.capacity() >= table.len());
    }
}
