//! Annotation identifiers: generation and the id → position index.
//!
//! Ids are `a` + a zero-padded counter (`a000001`). The counter lives for the
//! whole session and only ever moves forward, so an id is never handed out
//! twice even after its record has been deleted. Group ids share the counter
//! and swap the prefix for `g`.
//!
//! The index is rebuilt from scratch after every structural change. Documents
//! hold tens to low hundreds of records, so an O(n) scan is cheap enough that
//! incremental patching is not worth its bookkeeping.

#[cfg(test)]
#[path = "ids_test.rs"]
mod ids_test;

use std::collections::HashMap;

use crate::consts::{ANNOTATION_ID_PREFIX, GROUP_ID_PREFIX, ID_DIGITS};
use crate::doc::AnnotationRecord;

/// Monotonic source of annotation ids.
#[derive(Debug, Clone)]
pub struct IdRegistry {
    next: u64,
}

impl IdRegistry {
    /// Create a registry whose first id is `a000001`.
    #[must_use]
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Return a fresh annotation id.
    pub fn new_id(&mut self) -> String {
        self.take(ANNOTATION_ID_PREFIX)
    }

    /// Return a fresh group id. Shares the counter with [`Self::new_id`].
    pub fn new_group_id(&mut self) -> String {
        self.take(GROUP_ID_PREFIX)
    }

    /// Note an id that entered the session from outside (a loaded document,
    /// a hand edit). If it has the generated shape, the counter is advanced
    /// past it so a later generated id cannot collide with it.
    pub fn observe(&mut self, id: &str) {
        let mut chars = id.chars();
        let Some(prefix) = chars.next() else {
            return;
        };
        if prefix != ANNOTATION_ID_PREFIX && prefix != GROUP_ID_PREFIX {
            return;
        }
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return;
        }
        if let Ok(n) = digits.parse::<u64>() {
            self.next = self.next.max(n.saturating_add(1));
        }
    }

    fn take(&mut self, prefix: char) -> String {
        let id = format!("{prefix}{:0width$}", self.next, width = ID_DIGITS);
        self.next += 1;
        id
    }
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of each top-level record in the current document, keyed by id.
///
/// Never persisted. Records without a non-empty string id are left out, and
/// when two records share an id the first one wins.
#[derive(Debug, Clone, Default)]
pub struct IdIndex {
    positions: HashMap<String, usize>,
}

impl IdIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from a record list in one pass.
    pub fn rebuild(&mut self, records: &[AnnotationRecord]) {
        self.positions.clear();
        for (i, rec) in records.iter().enumerate() {
            if let Some(id) = rec.id() {
                self.positions.entry(id.to_string()).or_insert(i);
            }
        }
    }

    /// Empty the index.
    pub fn clear(&mut self) {
        self.positions.clear();
    }

    /// Position of the record with `id`, if indexed.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Whether `id` is indexed.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Number of indexed ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if no ids are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
