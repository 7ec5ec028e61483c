//! Notification and calendar subsystem contracts.
//!
//! # Responsibility
//! - Describe what the reminder scheduler needs from OS delivery services.
//! - Provide local implementations usable without OS integration.
//!
//! # Invariants
//! - Notification ids are always the tab URL.
//! - Implementations report failures as `DeliveryError`; they never panic.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod ics;
pub mod local_timer;

pub use ics::IcsCalendarSink;
pub use local_timer::{FiredReminder, LocalTimerNotifier};

pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Failure reported by a notification or calendar backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError {
    /// Stable machine-readable code, e.g. `permission_denied`.
    pub code: &'static str,
    pub message: String,
}

impl DeliveryError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new("permission_denied", message)
    }

    pub fn delivery_failed(message: impl Into<String>) -> Self {
        Self::new("delivery_failed", message)
    }
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error for DeliveryError {}

/// One pending local notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    /// Tab URL; scheduling again with the same id replaces the request.
    pub id: String,
    /// Unix epoch milliseconds.
    pub fire_at_ms: i64,
    pub title: String,
    pub body: String,
}

/// Local notification center.
pub trait Notifier: Send + Sync {
    /// Asks the user for permission to post notifications.
    ///
    /// Returns whether permission is granted.
    fn request_authorization(&self) -> DeliveryResult<bool> {
        Ok(true)
    }

    fn schedule(&self, request: &NotificationRequest) -> DeliveryResult<()>;

    /// Removes a pending request. Unknown ids are not an error.
    fn cancel(&self, id: &str) -> DeliveryResult<()>;
}

/// Calendar entry mirroring one reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub title: String,
    pub notes: Option<String>,
    /// Unix epoch milliseconds.
    pub start_ms: i64,
    pub end_ms: i64,
    pub alarm_at_ms: i64,
    pub url: String,
}

/// External calendar store.
pub trait CalendarSink: Send + Sync {
    fn create_event(&self, event: &CalendarEvent) -> DeliveryResult<()>;
}
