//! URL-keyed annotation store.
//!
//! # Responsibility
//! - Own every `AnnotationRecord` and serialize the full map to one blob.
//!
//! # Invariants
//! - `set` is a full-record upsert followed by a synchronous full save.
//! - A failed save never discards the in-memory map; the next mutation (or an
//!   explicit `save_all`) retries with the complete current state.
//! - Records are never removed automatically. After a failed load, nothing is
//!   written until the persisted map has been read back and merged; an
//!   undecodable blob is copied to [`METADATA_BACKUP_KEY`] before it is
//!   replaced.

use crate::model::tab::AnnotationRecord;
use crate::repo::blob_repo::{BlobStore, StoreError, StoreResult};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Blob key holding the serialized annotation map.
pub const METADATA_BLOB_KEY: &str = "tab_metadata";
/// Blob key receiving an undecodable annotation blob before it is replaced.
pub const METADATA_BACKUP_KEY: &str = "tab_metadata.corrupt";

pub struct MetadataStore {
    records: BTreeMap<String, AnnotationRecord>,
    blobs: Arc<dyn BlobStore>,
    dirty: bool,
    /// Set while the persisted map has not been read successfully.
    unsynced: bool,
}

impl MetadataStore {
    /// Creates a store and loads any persisted annotations.
    ///
    /// Missing or unreadable state starts an empty map; the persisted blob
    /// is left untouched until it can be merged on the next save.
    pub fn load(blobs: Arc<dyn BlobStore>) -> Self {
        let mut store = Self {
            records: BTreeMap::new(),
            blobs,
            dirty: false,
            unsynced: false,
        };
        if let Err(err) = store.load_all() {
            store.unsynced = true;
            error!(
                "event=metadata_load module=repo status=error error_code=metadata_load_failed error={}",
                err
            );
        }
        store
    }

    /// Replaces the in-memory map with the persisted one.
    ///
    /// Returns the number of loaded records.
    pub fn load_all(&mut self) -> StoreResult<usize> {
        let Some(bytes) = self.blobs.load_blob(METADATA_BLOB_KEY)? else {
            self.unsynced = false;
            info!("event=metadata_load module=repo status=ok records=0 source=empty");
            return Ok(0);
        };

        self.records = decode(&bytes)?;
        self.dirty = false;
        self.unsynced = false;
        info!(
            "event=metadata_load module=repo status=ok records={}",
            self.records.len()
        );
        Ok(self.records.len())
    }

    /// Serializes the full map and writes it under [`METADATA_BLOB_KEY`].
    ///
    /// After a failed load the persisted map is read back first and merged
    /// under the in-memory records; if it still cannot be read, nothing is
    /// written.
    pub fn save_all(&mut self) -> StoreResult<()> {
        if self.unsynced {
            self.merge_persisted()?;
        }
        let bytes = serde_json::to_vec(&self.records)?;
        self.blobs.save_blob(METADATA_BLOB_KEY, &bytes)?;
        self.dirty = false;
        Ok(())
    }

    fn merge_persisted(&mut self) -> StoreResult<()> {
        let persisted = match self.blobs.load_blob(METADATA_BLOB_KEY)? {
            None => BTreeMap::new(),
            Some(bytes) => match decode(&bytes) {
                Ok(records) => records,
                Err(err) => {
                    self.blobs.save_blob(METADATA_BACKUP_KEY, &bytes)?;
                    warn!(
                        "event=metadata_backup module=repo status=ok key={} bytes={} error={}",
                        METADATA_BACKUP_KEY,
                        bytes.len(),
                        err
                    );
                    BTreeMap::new()
                }
            },
        };

        let restored = persisted.len();
        for (url, record) in persisted {
            self.records.entry(url).or_insert(record);
        }
        self.unsynced = false;
        info!(
            "event=metadata_merge module=repo status=ok restored={} records={}",
            restored,
            self.records.len()
        );
        Ok(())
    }

    pub fn get(&self, url: &str) -> Option<&AnnotationRecord> {
        self.records.get(url)
    }

    /// Upserts the complete record for `url`, then persists the whole store.
    ///
    /// Persistence failure is logged and otherwise ignored; callers keep
    /// using the in-memory record.
    pub fn set(&mut self, url: &str, record: AnnotationRecord) {
        self.records.insert(url.to_string(), record);
        self.dirty = true;
        match self.save_all() {
            Ok(()) => info!(
                "event=metadata_save module=repo status=ok records={}",
                self.records.len()
            ),
            Err(err) if self.unsynced => warn!(
                "event=metadata_save module=repo status=skipped error_code=metadata_reload_failed records={} error={}",
                self.records.len(),
                err
            ),
            Err(err) => warn!(
                "event=metadata_save module=repo status=error error_code=metadata_save_failed records={} error={}",
                self.records.len(),
                err
            ),
        }
    }

    /// Whether the in-memory map has changes the blob store has not accepted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the persisted map is still unread after a failed load.
    pub fn is_unsynced(&self) -> bool {
        self.unsynced
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates records in URL order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnnotationRecord)> {
        self.records
            .iter()
            .map(|(url, record)| (url.as_str(), record))
    }
}

fn decode(bytes: &[u8]) -> StoreResult<BTreeMap<String, AnnotationRecord>> {
    serde_json::from_slice(bytes)
        .map_err(|err| StoreError::InvalidData(format!("{METADATA_BLOB_KEY}: {err}")))
}
