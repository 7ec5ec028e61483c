//! Per-browser enabled flags.
//!
//! Flags are persisted as JSON booleans under `browser_enabled.<display name>`.
//! Unknown or unreadable flags default to enabled. The in-memory copy stays
//! authoritative when a write fails.

use crate::model::browser::BrowserKind;
use crate::repo::blob_repo::{BlobStore, StoreResult};
use log::warn;
use std::collections::BTreeMap;
use std::sync::Arc;

const BROWSER_ENABLED_KEY_PREFIX: &str = "browser_enabled.";

/// Returns the blob key for one browser flag.
pub fn browser_enabled_key(kind: BrowserKind) -> String {
    format!("{BROWSER_ENABLED_KEY_PREFIX}{}", kind.display_name())
}

pub struct SettingsRepository {
    blobs: Arc<dyn BlobStore>,
    enabled: BTreeMap<BrowserKind, bool>,
}

impl SettingsRepository {
    /// Loads every known browser flag.
    pub fn load(blobs: Arc<dyn BlobStore>) -> Self {
        let enabled = BrowserKind::all()
            .map(|kind| (kind, read_flag(blobs.as_ref(), kind)))
            .collect();
        Self { blobs, enabled }
    }

    pub fn is_browser_enabled(&self, kind: BrowserKind) -> bool {
        self.enabled.get(&kind).copied().unwrap_or(true)
    }

    /// Enabled browsers in descriptor order.
    pub fn enabled_browsers(&self) -> Vec<BrowserKind> {
        BrowserKind::all()
            .filter(|kind| self.is_browser_enabled(*kind))
            .collect()
    }

    /// Updates one flag in memory, then persists it.
    pub fn set_browser_enabled(&mut self, kind: BrowserKind, enabled: bool) -> StoreResult<()> {
        self.enabled.insert(kind, enabled);
        let bytes = serde_json::to_vec(&enabled)?;
        self.blobs.save_blob(&browser_enabled_key(kind), &bytes)
    }
}

fn read_flag(blobs: &dyn BlobStore, kind: BrowserKind) -> bool {
    let key = browser_enabled_key(kind);
    match blobs.load_blob(&key) {
        Ok(Some(bytes)) => serde_json::from_slice::<bool>(&bytes).unwrap_or_else(|err| {
            warn!(
                "event=settings_load module=repo status=error error_code=invalid_flag key={} error={}",
                key, err
            );
            true
        }),
        Ok(None) => true,
        Err(err) => {
            warn!(
                "event=settings_load module=repo status=error error_code=settings_load_failed key={} error={}",
                key, err
            );
            true
        }
    }
}
