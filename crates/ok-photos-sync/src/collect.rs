use std::collections::HashSet;

use crate::types::{Identified, RemoteId};

/// Insertion-ordered collection that keeps the first item seen per id.
#[derive(Debug, Clone)]
pub struct UniqueById<T> {
    seen: HashSet<RemoteId>,
    items: Vec<T>,
}

impl<T> Default for UniqueById<T> {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }
}

impl<T> UniqueById<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `id` was already collected.
    pub fn push(&mut self, id: RemoteId, item: T) -> bool {
        if self.seen.insert(id) {
            self.items.push(item);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: Identified> UniqueById<T> {
    pub fn push_record(&mut self, record: T) -> bool {
        self.push(record.remote_id(), record)
    }
}

impl<T: Identified> Extend<T> for UniqueById<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, records: I) {
        for record in records {
            self.push_record(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_wins_and_order_is_kept() {
        let mut unique = UniqueById::new();
        assert!(unique.push(3, "a"));
        assert!(unique.push(1, "b"));
        assert!(!unique.push(3, "c"));
        assert!(unique.push(2, "d"));

        assert_eq!(unique.len(), 3);
        assert_eq!(unique.into_vec(), vec!["a", "b", "d"]);
    }
}
