//! Deduplicating record aggregator
//!
//! The key index is split into shards, each behind its own mutex, so workers
//! adding records with unrelated keys rarely contend. The ordered record list
//! sits behind a read/write lock that is held only for the push itself.
//!
//! Lock order is always shard, then list.

use crate::validate::ValidatedRecord;
use serde::{Serialize, Serializer};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

const DEFAULT_SHARDS: usize = 16;

/// Identity of a record for deduplication purposes
///
/// Each key field is kept as its own part, so values containing any
/// character cannot run into one another. Absent fields are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey(Vec<(String, Option<String>)>);

impl DedupeKey {
    /// Builds the key from the named fields, or from every field when
    /// `fields` is empty
    pub fn of(record: &ValidatedRecord, fields: &[String]) -> Self {
        let part = |name: &str| {
            (
                name.to_string(),
                record.get(name).map(|value| value.canonical()),
            )
        };

        if fields.is_empty() {
            Self(record.fields.iter().map(|(name, _)| part(name)).collect())
        } else {
            Self(fields.iter().map(|name| part(name)).collect())
        }
    }

    /// Field names with their canonical values, in key order
    pub fn parts(&self) -> &[(String, Option<String>)] {
        &self.0
    }
}

/// Result of offering a record to the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    /// A record with the same key was added earlier and is kept
    Duplicate,
    /// The aggregator was finalized; the record was discarded
    Frozen,
}

/// Ordered, unique records at a point in time
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<Arc<ValidatedRecord>>,
    frozen: bool,
}

impl Dataset {
    pub fn records(&self) -> &[Arc<ValidatedRecord>] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatedRecord> {
        self.records.iter().map(|record| &**record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when taken by [`Aggregator::finalize`]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Collects validated records into a deduplicated dataset
///
/// Safe to share across workers behind an `Arc`. The first record seen with
/// a given key wins; later ones are reported as [`AddOutcome::Duplicate`].
#[derive(Debug)]
pub struct Aggregator {
    key_fields: Vec<String>,
    shards: Vec<Mutex<HashSet<DedupeKey>>>,
    records: RwLock<Vec<Arc<ValidatedRecord>>>,
    frozen: AtomicBool,
}

impl Aggregator {
    pub fn new(key_fields: Vec<String>) -> Self {
        Self::with_shards(key_fields, DEFAULT_SHARDS)
    }

    pub fn with_shards(key_fields: Vec<String>, shards: usize) -> Self {
        Self {
            key_fields,
            shards: (0..shards.max(1))
                .map(|_| Mutex::new(HashSet::new()))
                .collect(),
            records: RwLock::new(Vec::new()),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    pub fn add(&self, record: ValidatedRecord) -> AddOutcome {
        if self.frozen.load(Ordering::Acquire) {
            return AddOutcome::Frozen;
        }

        let key = DedupeKey::of(&record, &self.key_fields);
        let mut shard = self.shards[self.shard_for(&key)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if shard.contains(&key) {
            return AddOutcome::Duplicate;
        }

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        // finalize flips the flag under this lock, so this check is exact
        if self.frozen.load(Ordering::Acquire) {
            return AddOutcome::Frozen;
        }
        shard.insert(key);
        records.push(Arc::new(record));
        AddOutcome::Inserted
    }

    pub fn contains(&self, key: &DedupeKey) -> bool {
        self.shards[self.shard_for(key)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistent point-in-time copy of the records added so far
    pub fn snapshot(&self) -> Dataset {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Dataset {
            records: records.clone(),
            frozen: self.frozen.load(Ordering::Acquire),
        }
    }

    /// Freezes the aggregator; every later `add` returns `Frozen`
    pub fn finalize(&self) -> Dataset {
        let records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        self.frozen.store(true, Ordering::Release);
        Dataset {
            records: records.clone(),
            frozen: true,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    fn shard_for(&self, key: &DedupeKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
