// Insertion-ordered dedup index: the structure behind likes, tracks and artists.
//
// Each entry is keyed by an entity ID and carries an occurrence count plus a
// membership set of associated IDs (customers for likes and tracks, tracks for
// artists). Lookups go through an id -> slot map, so upserts stay O(1) no
// matter how many entities or members have been seen.

use std::collections::HashMap;

/// An ordered set of IDs with constant-time membership checks.
///
/// Iteration follows first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSet {
    order: Vec<String>,
    positions: HashMap<String, usize>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ID if absent. Returns true when the ID was newly inserted.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.positions.contains_key(id) {
            return false;
        }
        self.positions.insert(id.to_string(), self.order.len());
        self.order.push(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.order
    }
}

/// One aggregated entity: its ID, payload, occurrence count and members.
#[derive(Debug, Clone)]
pub struct Tallied<T> {
    pub id: String,
    pub item: T,
    /// Number of upserts seen for this ID (repeats included).
    pub count: u64,
    pub members: MemberSet,
}

/// Anything with an occurrence count, so compaction can work on any sequence.
pub trait Counted {
    fn count(&self) -> u64;
}

impl<T> Counted for Tallied<T> {
    fn count(&self) -> u64 {
        self.count
    }
}

/// Insertion-ordered map from entity ID to its aggregated entry.
#[derive(Debug, Clone)]
pub struct OrderedIndex<T> {
    entries: Vec<Tallied<T>>,
    positions: HashMap<String, usize>,
}

impl<T> Default for OrderedIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<T> OrderedIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sighting of `id` associated with `member`.
    ///
    /// Unseen IDs get a fresh entry built by `seed` with count 1 and
    /// membership `{member}`. Seen IDs have their count incremented and
    /// `member` added only if it isn't already present. The payload of an
    /// existing entry is left alone; `seed` is not called for it.
    pub fn upsert(&mut self, id: &str, member: &str, seed: impl FnOnce() -> T) -> &mut Tallied<T> {
        let slot = match self.positions.get(id) {
            Some(&slot) => {
                let entry = &mut self.entries[slot];
                entry.count += 1;
                entry.members.insert(member);
                slot
            }
            None => {
                let mut members = MemberSet::new();
                members.insert(member);
                let slot = self.entries.len();
                self.entries.push(Tallied {
                    id: id.to_string(),
                    item: seed(),
                    count: 1,
                    members,
                });
                self.positions.insert(id.to_string(), slot);
                slot
            }
        };
        &mut self.entries[slot]
    }

    pub fn get(&self, id: &str) -> Option<&Tallied<T>> {
        self.positions.get(id).map(|&slot| &self.entries[slot])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Tallied<T>> {
        match self.positions.get(id) {
            Some(&slot) => Some(&mut self.entries[slot]),
            None => None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tallied<T>> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Tallied<T>> {
        self.entries.iter_mut()
    }

    pub fn as_slice(&self) -> &[Tallied<T>] {
        &self.entries
    }

    /// Entity IDs in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }
}
