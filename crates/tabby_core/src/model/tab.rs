//! Tab domain model.
//!
//! # Responsibility
//! - Define the raw snapshot row produced by browser adapters.
//! - Define the reconciled `Tab` projection and the URL-keyed annotation record.
//!
//! # Invariants
//! - `Tab::id` is stable across refresh cycles while its URL stays open.
//! - `Tab::tier` is always derived from `(url, title)`, never stored.
//! - `note`/`reminder_at` only ever come from an `AnnotationRecord`.
//!
//! # See also
//! - crate::service::reconciler

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for one reconciled tab.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type TabId = Uuid;

/// One `(title, url)` row reported by a browser adapter.
///
/// Raw tabs carry no identity; two rows with equal content are still two tabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTab {
    pub title: String,
    pub url: String,
    /// Display name of the browser that reported this row.
    pub browser_name: String,
}

impl RawTab {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        browser_name: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            browser_name: browser_name.into(),
        }
    }
}

/// Usage category assigned to every tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Focus,
    Research,
    Chill,
    Other,
}

impl Tier {
    /// All tiers in classification priority order.
    pub const ALL: [Tier; 4] = [Tier::Focus, Tier::Research, Tier::Chill, Tier::Other];

    /// Stable user-facing label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::Research => "Research",
            Self::Chill => "Chill",
            Self::Other => "Other",
        }
    }

    /// Symbol name used by list renderers.
    pub fn icon(self) -> &'static str {
        match self {
            Self::Focus => "brain.head.profile",
            Self::Research => "book.closed.fill",
            Self::Chill => "cup.and.saucer.fill",
            Self::Other => "globe",
        }
    }

    /// Parses a label case-insensitively.
    pub fn from_label(value: &str) -> Option<Tier> {
        let normalized = value.trim();
        Self::ALL
            .into_iter()
            .find(|tier| tier.label().eq_ignore_ascii_case(normalized))
    }
}

/// Reconciled tab entity published to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub id: TabId,
    pub title: String,
    pub url: String,
    /// Display name of the owning browser.
    pub browser: String,
    pub note: Option<String>,
    /// Unix epoch milliseconds.
    pub reminder_at: Option<i64>,
    pub tier: Tier,
}

impl Tab {
    /// Copies annotation fields from a stored record, clearing both when absent.
    pub fn apply_annotation(&mut self, record: Option<&AnnotationRecord>) {
        self.note = record.and_then(|value| value.note.clone());
        self.reminder_at = record.and_then(|value| value.reminder_at);
    }

    /// Short host used in metadata-only log lines.
    pub fn host(&self) -> &str {
        url_host(&self.url)
    }
}

/// Persisted, URL-keyed annotation.
///
/// Records are upserted as a whole and never deleted automatically, so a
/// reopened URL gets its note and reminder back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    #[serde(default)]
    pub note: Option<String>,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub reminder_at: Option<i64>,
}

impl AnnotationRecord {
    pub fn is_empty(&self) -> bool {
        self.note.is_none() && self.reminder_at.is_none()
    }
}

/// Maps blank note input to `None`.
pub fn normalize_note(note: Option<String>) -> Option<String> {
    note.filter(|value| !value.trim().is_empty())
}

/// Returns the host part of `url`, or the whole input when it has no scheme.
pub fn url_host(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let end = without_scheme
        .find(['/', '?', '#'])
        .unwrap_or(without_scheme.len());
    &without_scheme[..end]
}
