//! Browser adapter contracts.
//!
//! # Responsibility
//! - Enumerate open tabs per browser and bring a tab to the foreground.
//!
//! # Invariants
//! - `fetch_tabs` never fails: an unavailable browser yields an empty list.
//! - Calls may block; runtimes must run them off the session's critical path.

use crate::model::browser::BrowserKind;
use crate::model::tab::RawTab;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod osascript;

pub use osascript::OsaScriptAdapter;

/// Source of raw tab snapshots.
pub trait BrowserAdapter: Send + Sync {
    /// Returns every open tab of `kind`, or an empty list when the browser is
    /// not running or cannot be queried.
    fn fetch_tabs(&self, kind: BrowserKind) -> Vec<RawTab>;

    /// Whether the browser is installed on this machine.
    fn is_installed(&self, _kind: BrowserKind) -> bool {
        true
    }
}

/// Best-effort tab focusing.
pub trait TabActivator: Send + Sync {
    /// Returns whether an activation attempt was made.
    fn activate(&self, url: &str, kind: BrowserKind) -> bool;
}

/// Reasons a browser query produced no snapshot.
///
/// Adapters log these and report an empty snapshot instead.
#[derive(Debug)]
pub enum AdapterError {
    UnsupportedPlatform,
    Spawn(std::io::Error),
    ScriptFailed { status: Option<i32>, stderr: String },
    InvalidOutput(String),
}

impl Display for AdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedPlatform => write!(f, "browser automation requires macOS"),
            Self::Spawn(err) => write!(f, "failed to start osascript: {err}"),
            Self::ScriptFailed { status, stderr } => {
                write!(f, "script exited with status {status:?}: {stderr}")
            }
            Self::InvalidOutput(message) => write!(f, "unexpected script output: {message}"),
        }
    }
}

impl Error for AdapterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(value: std::io::Error) -> Self {
        Self::Spawn(value)
    }
}
