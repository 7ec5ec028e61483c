//! Test doubles shared by integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tabby_core::delivery::{CalendarEvent, DeliveryResult, NotificationRequest};
use tabby_core::repo::blob_repo::MemoryBlobStore;
use tabby_core::{
    BlobStore, BrowserAdapter, BrowserKind, CalendarSink, Clock, CoreSession, DeliveryError,
    MetadataStore, Notifier, RawTab, ReminderScheduler, SettingsRepository, StoreError,
    StoreResult, TabActivator,
};

pub const NOW_MS: i64 = 1_700_000_000_000;

/// Clock pinned to a settable instant.
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now_ms: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(now_ms)))
    }

    pub fn set(&self, now_ms: i64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Notifier that keeps pending requests in a map and records every call.
#[derive(Default)]
pub struct RecordingNotifier {
    pending: Mutex<BTreeMap<String, NotificationRequest>>,
    calls: Mutex<Vec<String>>,
    fail_schedule: bool,
}

impl RecordingNotifier {
    /// Notifier whose `schedule` always fails.
    pub fn failing_schedule() -> Self {
        Self {
            fail_schedule: true,
            ..Self::default()
        }
    }

    pub fn pending(&self) -> BTreeMap<String, NotificationRequest> {
        self.pending.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn request_authorization(&self) -> DeliveryResult<bool> {
        self.calls.lock().unwrap().push("authorize".to_string());
        Ok(true)
    }

    fn schedule(&self, request: &NotificationRequest) -> DeliveryResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("schedule {} {}", request.id, request.fire_at_ms));
        if self.fail_schedule {
            return Err(DeliveryError::delivery_failed("notification center offline"));
        }
        self.pending
            .lock()
            .unwrap()
            .insert(request.id.clone(), request.clone());
        Ok(())
    }

    fn cancel(&self, id: &str) -> DeliveryResult<()> {
        self.calls.lock().unwrap().push(format!("cancel {id}"));
        self.pending.lock().unwrap().remove(id);
        Ok(())
    }
}

/// Calendar that records events, or rejects them when `deny` is set.
#[derive(Default)]
pub struct RecordingCalendar {
    events: Mutex<Vec<CalendarEvent>>,
    deny: bool,
}

impl RecordingCalendar {
    /// Calendar that rejects every event.
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CalendarSink for RecordingCalendar {
    fn create_event(&self, event: &CalendarEvent) -> DeliveryResult<()> {
        if self.deny {
            return Err(DeliveryError::permission_denied("calendar access denied"));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Blob store whose writes always fail.
#[derive(Default)]
pub struct ReadOnlyBlobStore;

impl BlobStore for ReadOnlyBlobStore {
    fn load_blob(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn save_blob(&self, _key: &str, _bytes: &[u8]) -> StoreResult<()> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }
}

/// Adapter returning scripted snapshots, optionally after a delay.
#[derive(Default)]
pub struct ScriptedAdapter {
    tabs: Mutex<HashMap<BrowserKind, Vec<RawTab>>>,
    fetches: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedAdapter {
    pub fn set_tabs(&self, kind: BrowserKind, tabs: Vec<RawTab>) {
        self.tabs.lock().unwrap().insert(kind, tabs);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Total `fetch_tabs` calls across all browsers.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl BrowserAdapter for ScriptedAdapter {
    fn fetch_tabs(&self, kind: BrowserKind) -> Vec<RawTab> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.tabs
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    fn is_installed(&self, kind: BrowserKind) -> bool {
        kind != BrowserKind::Arc
    }
}

/// Activator that records focus requests.
#[derive(Default)]
pub struct RecordingActivator {
    requests: Mutex<Vec<(String, BrowserKind)>>,
}

impl RecordingActivator {
    pub fn requests(&self) -> Vec<(String, BrowserKind)> {
        self.requests.lock().unwrap().clone()
    }
}

impl TabActivator for RecordingActivator {
    fn activate(&self, url: &str, kind: BrowserKind) -> bool {
        self.requests.lock().unwrap().push((url.to_string(), kind));
        true
    }
}

/// Everything a test needs to drive a `CoreSession`.
pub struct Fixture {
    pub blobs: Arc<dyn BlobStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub calendar: Option<Arc<RecordingCalendar>>,
    pub clock: Arc<FixedClock>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_blobs(Arc::new(MemoryBlobStore::new()))
    }

    pub fn with_blobs(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            notifier: Arc::new(RecordingNotifier::default()),
            calendar: None,
            clock: FixedClock::new(NOW_MS),
        }
    }

    pub fn with_calendar(mut self, calendar: RecordingCalendar) -> Self {
        self.calendar = Some(Arc::new(calendar));
        self
    }

    pub fn with_notifier(mut self, notifier: RecordingNotifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Builds a session; must run inside a tokio runtime.
    pub fn session(&self) -> CoreSession {
        let calendar = self
            .calendar
            .clone()
            .map(|calendar| calendar as Arc<dyn CalendarSink>);
        let reminders = ReminderScheduler::spawn(
            Arc::clone(&self.notifier) as Arc<dyn Notifier>,
            calendar,
            Arc::clone(&self.clock) as Arc<dyn Clock>,
        );
        CoreSession::new(
            MetadataStore::load(Arc::clone(&self.blobs)),
            SettingsRepository::load(Arc::clone(&self.blobs)),
            reminders,
        )
    }
}

pub fn raw(title: &str, url: &str, browser: BrowserKind) -> RawTab {
    RawTab::new(title, url, browser.display_name())
}
