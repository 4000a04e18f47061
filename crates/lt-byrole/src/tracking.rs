// tracking.rs — Tracking records and the store abstraction.
//
// A tracking record marks a course that has been seen without a responsible
// role, and since when. The store is keyed by `TrackingKey`, which is either
// the course alone or the course plus a trigger instance, depending on the
// configured scope. One key, at most one record.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TriggerError;
use crate::locks::KeyLocks;
use crate::ids::{CourseId, TriggerInstanceId};

/// Which key shape tracking records use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingScope {
    /// One record per course, shared by every trigger instance.
    #[default]
    Global,
    /// One record per (course, trigger instance).
    PerInstance(TriggerInstanceId),
}

impl TrackingScope {
    pub fn key_for(&self, course_id: CourseId) -> TrackingKey {
        match self {
            TrackingScope::Global => TrackingKey::course(course_id),
            TrackingScope::PerInstance(instance) => TrackingKey::instance(course_id, *instance),
        }
    }
}

/// Unique key of a tracking record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackingKey {
    pub course_id: CourseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<TriggerInstanceId>,
}

impl TrackingKey {
    pub fn course(course_id: CourseId) -> Self {
        Self {
            course_id,
            instance: None,
        }
    }

    pub fn instance(course_id: CourseId, instance: TriggerInstanceId) -> Self {
        Self {
            course_id,
            instance: Some(instance),
        }
    }
}

/// Renders as `course-12` or `course-12.instance-3`; file stores use it as a
/// file stem.
impl fmt::Display for TrackingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance {
            None => write!(f, "course-{}", self.course_id),
            Some(instance) => write!(f, "course-{}.instance-{}", self.course_id, instance),
        }
    }
}

/// A course currently believed to lack a responsible person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub key: TrackingKey,
    /// When the missing role was first observed.
    pub first_missing_at: DateTime<Utc>,
}

impl TrackingRecord {
    pub fn new(key: TrackingKey, first_missing_at: DateTime<Utc>) -> Self {
        Self {
            key,
            first_missing_at,
        }
    }

    pub fn course_id(&self) -> CourseId {
        self.key.course_id
    }

    /// Time since the condition was first observed.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.first_missing_at)
    }

    /// True once the age is strictly greater than `delay`.
    pub fn is_expired(&self, now: DateTime<Utc>, delay: chrono::Duration) -> bool {
        self.age(now) > delay
    }
}

/// Persistence for tracking records, keyed uniquely by [`TrackingKey`].
///
/// Methods take `&self` so one store can serve concurrent evaluations;
/// implementations provide their own interior synchronization. `put`
/// creates or replaces a record atomically.
///
/// Every evaluator working on a store serializes same-key read-then-write
/// through the store's [`KeyLocks`], so evaluators sharing a store exclude
/// each other. Writers outside this process are not covered; `delete`
/// reporting `false` is how an evaluator notices one got there first.
pub trait TrackingStore: Send + Sync {
    /// Per-key exclusion shared by everything using this store.
    fn key_locks(&self) -> &KeyLocks;

    fn exists(&self, key: &TrackingKey) -> Result<bool, TriggerError> {
        Ok(self.get(key)?.is_some())
    }

    fn get(&self, key: &TrackingKey) -> Result<Option<TrackingRecord>, TriggerError>;

    fn put(&self, record: &TrackingRecord) -> Result<(), TriggerError>;

    /// Remove a record. Returns whether one existed.
    fn delete(&self, key: &TrackingKey) -> Result<bool, TriggerError>;

    /// All records, ordered by key.
    fn list(&self) -> Result<Vec<TrackingRecord>, TriggerError>;
}

/// In-memory tracking store.
///
/// Used by tests and by dry runs, which copy a persistent store into one of
/// these so nothing is written back.
#[derive(Debug, Default)]
pub struct MemoryTrackingStore {
    records: RwLock<BTreeMap<TrackingKey, TrackingRecord>>,
    locks: KeyLocks,
}

impl MemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = TrackingRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.key, r)).collect()),
            locks: KeyLocks::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(key: &TrackingKey) -> TriggerError {
    TriggerError::store(key, "in-memory store lock poisoned")
}

impl TrackingStore for MemoryTrackingStore {
    fn key_locks(&self) -> &KeyLocks {
        &self.locks
    }

    fn get(&self, key: &TrackingKey) -> Result<Option<TrackingRecord>, TriggerError> {
        let records = self.records.read().map_err(|_| poisoned(key))?;
        Ok(records.get(key).cloned())
    }

    fn put(&self, record: &TrackingRecord) -> Result<(), TriggerError> {
        let mut records = self.records.write().map_err(|_| poisoned(&record.key))?;
        records.insert(record.key, record.clone());
        Ok(())
    }

    fn delete(&self, key: &TrackingKey) -> Result<bool, TriggerError> {
        let mut records = self.records.write().map_err(|_| poisoned(key))?;
        Ok(records.remove(key).is_some())
    }

    fn list(&self) -> Result<Vec<TrackingRecord>, TriggerError> {
        let records = self
            .records
            .read()
            .map_err(|_| TriggerError::store("*", "in-memory store lock poisoned"))?;
        Ok(records.values().cloned().collect())
    }
}
