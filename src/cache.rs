use std::fmt::{self, Display, Formatter};

use rustc_hash::FxHashMap;
use slab::Slab;

use crate::invocation::Invocation;
use crate::mutable::Resource;
use crate::value::Value;

/// The result of a completed target call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The call that produced the value.
    key: Invocation,
    /// The value returned by the call.
    value: Value,
    /// The resources the call was found to depend on.
    sources: Vec<Resource>,
}

impl Record {
    /// Create a new record.
    pub fn new(key: Invocation, value: Value, sources: Vec<Resource>) -> Self {
        Self { key, value, sources }
    }

    pub fn key(&self) -> &Invocation {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn sources(&self) -> &[Resource] {
        &self.sources
    }

    /// Whether the record is invalid because something it depends on changed.
    ///
    /// This is the case if one of the call's arguments, the value itself, or
    /// one of the sources is a resource that reports a modification.
    pub fn modified(&self) -> bool {
        self.key.modified()
            || self.value.as_resource().is_some_and(Resource::modified)
            || self.sources.iter().any(Resource::modified)
    }

    /// Whether the record can be persisted.
    pub fn encodable(&self) -> bool {
        self.key.encodable()
            && self.value.encodable()
            && self.sources.iter().all(|source| source.snapshot().is_some())
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} = {}", self.key, self.value)
    }
}

/// Maps invocations to their results.
///
/// Iteration order is deterministic: records come out in slot order, and a
/// record that replaces an evicted one typically reuses its slot.
#[derive(Debug, Default)]
pub struct Cache {
    /// The stored records.
    slots: Slab<Record>,
    /// Maps from key fingerprints to slots.
    index: FxHashMap<u128, usize>,
}

impl Cache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the record for a call.
    pub fn get(&self, key: &Invocation) -> Option<&Record> {
        let slot = *self.index.get(&key.fingerprint())?;
        let record = &self.slots[slot];
        debug_assert_eq!(record.key(), key, "jam: fingerprint collision");
        Some(record)
    }

    /// Whether there is a record for a call.
    pub fn contains(&self, key: &Invocation) -> bool {
        self.get(key).is_some()
    }

    /// Insert a record, replacing any record with an equal key.
    pub fn insert(&mut self, record: Record) {
        let fingerprint = record.key().fingerprint();
        match self.index.get(&fingerprint) {
            Some(&slot) => self.slots[slot] = record,
            None => {
                let slot = self.slots.insert(record);
                self.index.insert(fingerprint, slot);
            }
        }
    }

    /// Remove the record for a call.
    pub fn remove(&mut self, key: &Invocation) -> Option<Record> {
        let slot = self.index.remove(&key.fingerprint())?;
        Some(self.slots.remove(slot))
    }

    /// Insert many records. Later records win over earlier ones.
    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            self.insert(record);
        }
    }

    /// Remove all records.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }

    /// Iterate over all records.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.slots.iter().map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
