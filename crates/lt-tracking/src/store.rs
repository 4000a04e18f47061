// store.rs — JsonTrackingStore: tracking records as JSON files.
//
// Each record is stored as `<store_dir>/<key>.json`, e.g.
// `course-42.json` or `course-42.instance-3.json`. One file per key keeps
// the at-most-one-record invariant in the file system itself and makes the
// store easy to inspect or repair by hand.
//
// Writes go to a uniquely named temporary sibling which is then renamed
// over the target, so a reader sees either the old record or the new one,
// never a partial file, even with several processes writing one key.
// Deletes are a single `remove_file`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use lt_byrole::{KeyLocks, TrackingKey, TrackingRecord, TrackingStore, TriggerError};
use uuid::Uuid;

use crate::error::TrackingStoreError;

const RECORD_EXTENSION: &str = "json";

/// File-backed tracking store.
pub struct JsonTrackingStore {
    store_dir: PathBuf,
    locks: KeyLocks,
}

impl JsonTrackingStore {
    /// Create a store backed by the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self, TrackingStoreError> {
        let store_dir = store_dir.as_ref().to_path_buf();
        fs::create_dir_all(&store_dir).map_err(|source| TrackingStoreError::Io {
            path: store_dir.clone(),
            source,
        })?;
        Ok(Self {
            store_dir,
            locks: KeyLocks::new(),
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Path to the JSON file for a given key.
    fn record_file(&self, key: &TrackingKey) -> PathBuf {
        self.store_dir.join(format!("{}.{}", key, RECORD_EXTENSION))
    }

    fn read_record(path: &Path) -> Result<Option<TrackingRecord>, TrackingStoreError> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(TrackingStoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let record = serde_json::from_str(&json).map_err(|source| TrackingStoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(record))
    }

    fn write_record(&self, record: &TrackingRecord) -> Result<(), TrackingStoreError> {
        let path = self.record_file(&record.key);
        let tmp = path.with_extension(format!(
            "{}.{}.tmp",
            RECORD_EXTENSION,
            Uuid::new_v4().simple()
        ));
        let json = serde_json::to_string_pretty(record).map_err(|source| {
            TrackingStoreError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;

        fs::write(&tmp, json).map_err(|source| TrackingStoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            TrackingStoreError::Io {
                path: path.clone(),
                source,
            }
        })
    }
}

impl TrackingStore for JsonTrackingStore {
    fn key_locks(&self) -> &KeyLocks {
        &self.locks
    }

    fn get(&self, key: &TrackingKey) -> Result<Option<TrackingRecord>, TriggerError> {
        let path = self.record_file(key);
        let record = Self::read_record(&path)?;
        if let Some(record) = &record {
            if record.key != *key {
                return Err(TrackingStoreError::KeyMismatch {
                    path,
                    expected: key.to_string(),
                    found: record.key.to_string(),
                }
                .into());
            }
        }
        Ok(record)
    }

    fn put(&self, record: &TrackingRecord) -> Result<(), TriggerError> {
        self.write_record(record)?;
        tracing::debug!(key = %record.key, dir = %self.store_dir.display(), "wrote tracking record");
        Ok(())
    }

    fn delete(&self, key: &TrackingKey) -> Result<bool, TriggerError> {
        let path = self.record_file(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(TrackingStoreError::Io { path, source }.into()),
        }
    }

    /// Unreadable or corrupt files are skipped with a warning so one damaged
    /// record does not hide all the others.
    fn list(&self) -> Result<Vec<TrackingRecord>, TriggerError> {
        let entries = fs::read_dir(&self.store_dir).map_err(|source| TrackingStoreError::Io {
            path: self.store_dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| TrackingStoreError::Io {
                path: self.store_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
                continue;
            }
            match Self::read_record(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => tracing::warn!("skipping tracking record: {}", e),
            }
        }

        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }
}
