//! Values tracked together with the sources asserting them
//!
//! Several independent contributors can assert a fact about one quantity
//! (e.g. three effects each claim the board is "night"). The collection
//! keeps one entry per distinct value and the set of sources currently
//! asserting it; resolution picks the value with the most sources.

use crate::core::source::{SourceArena, SourceId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;

/// A value and the sources currently asserting it
///
/// Equality and ordering look only at the value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcedValue<T> {
    value: T,
    sources: SmallVec<[SourceId; 4]>,
}

impl<T> SourcedValue<T> {
    pub fn new(source: SourceId, value: T) -> Self {
        let mut sources = SmallVec::new();
        sources.push(source);
        SourcedValue { value, sources }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn sources(&self) -> &[SourceId] {
        &self.sources
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// A value is only meaningful while something asserts it
    pub fn is_valid(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Attach a source. Returns false if it was already attached.
    pub fn add_source(&mut self, source: SourceId) -> bool {
        if self.sources.contains(&source) {
            return false;
        }
        self.sources.push(source);
        true
    }

    /// Detach a source. Returns false if it was not attached.
    pub fn remove_source(&mut self, source: SourceId) -> bool {
        match self.sources.iter().position(|s| *s == source) {
            Some(pos) => {
                self.sources.remove(pos);
                true
            }
            None => false,
        }
    }
}

impl<T: PartialEq> PartialEq for SourcedValue<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: Eq> Eq for SourcedValue<T> {}

impl<T: PartialOrd> PartialOrd for SourcedValue<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl<T: Ord> Ord for SourcedValue<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

/// One [`SourcedValue`] per distinct value, aggregated across all adds and
/// removes. Entries keep first-assertion order, which is also the order tied
/// values are handed to a tie resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcedValueCollection<T> {
    values: Vec<SourcedValue<T>>,
}

impl<T: PartialEq> SourcedValueCollection<T> {
    pub fn new() -> Self {
        SourcedValueCollection { values: Vec::new() }
    }

    /// `source` asserts `value`
    pub fn add(&mut self, source: SourceId, value: T) {
        match self.values.iter_mut().find(|tracked| tracked.value == value) {
            Some(tracked) => {
                tracked.add_source(source);
            }
            None => self.values.push(SourcedValue::new(source, value)),
        }
    }

    /// `source` no longer asserts `value`. A no-op if it never did.
    pub fn remove(&mut self, source: SourceId, value: &T) {
        if let Some(pos) = self.values.iter().position(|tracked| tracked.value == *value) {
            let tracked = &mut self.values[pos];
            if tracked.remove_source(source) && !tracked.is_valid() {
                self.values.remove(pos);
            }
        }
    }

    /// Number of sources asserting `value` (0 if untracked)
    pub fn source_count(&self, value: &T) -> usize {
        self.get(value).map_or(0, SourcedValue::source_count)
    }

    pub fn get(&self, value: &T) -> Option<&SourcedValue<T>> {
        self.values.iter().find(|tracked| tracked.value == *value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourcedValue<T>> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Detach every source the arena no longer considers valid
    pub fn prune_invalid(&mut self, arena: &SourceArena) {
        for tracked in &mut self.values {
            tracked.sources.retain(|source| arena.is_valid(*source));
        }
        self.values.retain(SourcedValue::is_valid);
    }

    /// Detach `source` from every value it asserts
    pub fn remove_source_everywhere(&mut self, source: SourceId) {
        for tracked in &mut self.values {
            tracked.remove_source(source);
        }
        self.values.retain(SourcedValue::is_valid);
    }
}

impl<T: PartialEq + Clone> SourcedValueCollection<T> {
    /// Resolve to the value asserted by the most sources.
    ///
    /// Returns `fallback` if nothing is tracked. If several values share the
    /// highest source count, `tie_resolver` picks among them (in
    /// first-assertion order).
    pub fn get_most_sourced_value<F>(&self, fallback: T, tie_resolver: F) -> T
    where
        F: FnOnce(&[&T]) -> T,
    {
        let Some(max) = self.values.iter().map(SourcedValue::source_count).max() else {
            return fallback;
        };

        let tied: SmallVec<[&T; 4]> = self
            .values
            .iter()
            .filter(|tracked| tracked.source_count() == max)
            .map(|tracked| &tracked.value)
            .collect();

        match tied.as_slice() {
            [only] => (**only).clone(),
            _ => tie_resolver(tied.as_slice()),
        }
    }
}

impl<T: PartialEq> Default for SourcedValueCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}
