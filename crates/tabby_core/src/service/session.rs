//! Core session: the single owner of tab state and annotations.
//!
//! # Responsibility
//! - Publish the reconciled tab set and replace it once per refresh cycle.
//! - Apply note/reminder updates via URL-keyed read-modify-write.
//! - Persist browser enable flags.
//!
//! # Invariants
//! - The metadata store, not the tab set, is authoritative for annotations.
//! - Note updates never touch scheduling; reminder updates never clear notes.
//! - Snapshot rows from disabled browsers never reach the reconciler.

use crate::model::browser::{BrowserKind, BrowserRegistration};
use crate::model::tab::{normalize_note, AnnotationRecord, RawTab, Tab, TabId};
use crate::repo::metadata_store::MetadataStore;
use crate::repo::settings_repo::SettingsRepository;
use crate::service::reconciler::reconcile_with_stats;
use crate::service::reminder_service::{ReminderScheduler, ReminderTarget};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No tab with this id in the current tab set.
    TabNotFound(TabId),
    /// The runtime that owned the session has stopped.
    Closed,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TabNotFound(id) => write!(f, "tab not found: {id}"),
            Self::Closed => write!(f, "tab runtime is closed"),
        }
    }
}

impl Error for SessionError {}

pub struct CoreSession {
    tabs: Vec<Tab>,
    metadata: MetadataStore,
    settings: SettingsRepository,
    reminders: ReminderScheduler,
}

impl CoreSession {
    pub fn new(
        metadata: MetadataStore,
        settings: SettingsRepository,
        reminders: ReminderScheduler,
    ) -> Self {
        Self {
            tabs: Vec::new(),
            metadata,
            settings,
            reminders,
        }
    }

    /// Current published tab set.
    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn find_tab(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == id)
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    pub fn is_browser_enabled(&self, kind: BrowserKind) -> bool {
        self.settings.is_browser_enabled(kind)
    }

    pub fn enabled_browsers(&self) -> Vec<BrowserKind> {
        self.settings.enabled_browsers()
    }

    /// Reconciles `fresh` against the current tab set and publishes the result.
    ///
    /// Rows whose browser is known but disabled are discarded first.
    pub fn apply_snapshots(&mut self, fresh: Vec<RawTab>) -> &[Tab] {
        let received = fresh.len();
        let fresh: Vec<RawTab> = fresh
            .into_iter()
            .filter(|raw| {
                BrowserKind::from_display_name(&raw.browser_name)
                    .map_or(true, |kind| self.settings.is_browser_enabled(kind))
            })
            .collect();

        let (tabs, stats) = reconcile_with_stats(&self.tabs, &fresh, &self.metadata);
        info!(
            "event=reconcile module=service status=ok received={} tabs={} reused={} minted={} dropped={}",
            received,
            tabs.len(),
            stats.reused,
            stats.minted,
            stats.dropped
        );
        self.tabs = tabs;
        &self.tabs
    }

    /// Replaces the note for the tab's URL.
    ///
    /// Blank notes are stored as absent. The stored reminder is preserved.
    pub fn update_note(&mut self, id: TabId, note: Option<String>) -> SessionResult<Tab> {
        let url = self.url_of(id)?;
        let mut record = self.record_for(&url);
        record.note = normalize_note(note);
        self.metadata.set(&url, record);
        let tab = self.patch_url(id, &url)?;
        info!(
            "event=annotation_update module=service status=ok field=note tab_id={} host={} has_note={}",
            id,
            tab.host(),
            tab.note.is_some()
        );
        Ok(tab)
    }

    /// Replaces the reminder for the tab's URL and hands it to the scheduler.
    ///
    /// `None` clears the reminder. The stored note is preserved.
    pub fn update_reminder(&mut self, id: TabId, at: Option<i64>) -> SessionResult<Tab> {
        let url = self.url_of(id)?;
        let mut record = self.record_for(&url);
        record.reminder_at = at;
        self.metadata.set(&url, record);
        let tab = self.patch_url(id, &url)?;
        info!(
            "event=annotation_update module=service status=ok field=reminder tab_id={} host={} reminder_at={:?}",
            id,
            tab.host(),
            tab.reminder_at
        );
        self.reminders.set_reminder(ReminderTarget::from(&tab), at);
        Ok(tab)
    }

    /// Re-submits every stored reminder that is still in the future, whether
    /// or not its URL is open.
    ///
    /// Used after startup, when an in-process notifier has no pending state.
    /// Open tabs lend their title; closed URLs are titled by the URL itself.
    /// Returns the number of reminders submitted.
    pub fn resume_reminders(&self, now_ms: i64) -> usize {
        let mut submitted = 0;
        let mut closed = 0;
        for (url, record) in self.metadata.iter() {
            let Some(at) = record.reminder_at.filter(|at| *at > now_ms) else {
                continue;
            };
            let title = match self.tabs.iter().find(|tab| tab.url == url) {
                Some(tab) => tab.title.as_str(),
                None => {
                    closed += 1;
                    url
                }
            };
            let target = ReminderTarget {
                url,
                title,
                note: record.note.as_deref(),
            };
            self.reminders.set_reminder(target, Some(at));
            submitted += 1;
        }
        info!(
            "event=reminder_resume module=service status=ok submitted={submitted} closed={closed}"
        );
        submitted
    }

    /// Persists a browser's enabled flag.
    ///
    /// Takes effect on the next refresh. A failed write is logged and the
    /// in-memory flag is kept.
    pub fn set_browser_enabled(&mut self, kind: BrowserKind, enabled: bool) {
        match self.settings.set_browser_enabled(kind, enabled) {
            Ok(()) => info!(
                "event=browser_toggle module=service status=ok browser={} enabled={}",
                kind.descriptor().slug,
                enabled
            ),
            Err(err) => warn!(
                "event=browser_toggle module=service status=error error_code=settings_save_failed browser={} enabled={} error={}",
                kind.descriptor().slug,
                enabled,
                err
            ),
        }
    }

    /// Registration rows for every known browser.
    pub fn browser_registrations(
        &self,
        installed: impl Fn(BrowserKind) -> bool,
    ) -> Vec<BrowserRegistration> {
        BrowserKind::all()
            .map(|kind| BrowserRegistration::new(kind, self.is_browser_enabled(kind), installed(kind)))
            .collect()
    }

    fn url_of(&self, id: TabId) -> SessionResult<String> {
        self.find_tab(id)
            .map(|tab| tab.url.clone())
            .ok_or(SessionError::TabNotFound(id))
    }

    fn record_for(&self, url: &str) -> AnnotationRecord {
        self.metadata.get(url).cloned().unwrap_or_default()
    }

    /// Copies the stored record onto every tab showing `url` and returns the
    /// tab with `id`.
    fn patch_url(&mut self, id: TabId, url: &str) -> SessionResult<Tab> {
        let record = self.metadata.get(url);
        for tab in self.tabs.iter_mut().filter(|tab| tab.url == url) {
            tab.apply_annotation(record);
        }
        self.find_tab(id).cloned().ok_or(SessionError::TabNotFound(id))
    }
}
