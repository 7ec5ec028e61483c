//! Core domain logic for Tabby.
//! Tab reconciliation, classification, URL-keyed annotations and reminder
//! scheduling live here; presentation layers only talk to [`RuntimeHandle`].

pub mod adapter;
pub mod classifier;
pub mod clock;
pub mod db;
pub mod delivery;
pub mod logging;
pub mod model;
pub mod repo;
pub mod runtime;
pub mod service;

pub use adapter::{BrowserAdapter, OsaScriptAdapter, TabActivator};
pub use classifier::classify;
pub use clock::{Clock, SystemClock};
pub use delivery::{CalendarSink, DeliveryError, IcsCalendarSink, LocalTimerNotifier, Notifier};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::browser::{BrowserKind, BrowserRegistration};
pub use model::tab::{AnnotationRecord, RawTab, Tab, TabId, Tier};
pub use repo::blob_repo::{BlobStore, MemoryBlobStore, SqliteBlobStore, StoreError, StoreResult};
pub use repo::metadata_store::MetadataStore;
pub use repo::settings_repo::SettingsRepository;
pub use runtime::{spawn_runtime, RuntimeConfig, RuntimeHandle};
pub use service::reminder_service::{ReminderOutcome, ReminderScheduler, ReminderTarget};
pub use service::session::{CoreSession, SessionError, SessionResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
