//! AppleScript browser adapter.
//!
//! Runs `osascript` once to check that the browser is running and once to
//! list `title<TAB>url` records for every tab in every window.

use crate::adapter::{AdapterError, BrowserAdapter, TabActivator};
use crate::model::browser::{BrowserDescriptor, BrowserKind, TabSelection};
use crate::model::tab::RawTab;
use log::{debug, warn};
use std::path::PathBuf;
use std::process::Command;
use std::time::Instant;

const OSASCRIPT_PROGRAM: &str = "osascript";
const UNTITLED_TAB: &str = "No Title";
/// ASCII record separator ending each tab in a listing.
pub const RECORD_SEPARATOR: char = '\u{1e}';
const MISSING_VALUE: &str = "missing value";

pub struct OsaScriptAdapter {
    program: PathBuf,
    application_dirs: Vec<PathBuf>,
}

impl Default for OsaScriptAdapter {
    fn default() -> Self {
        let mut application_dirs = vec![PathBuf::from("/Applications")];
        if let Some(home) = std::env::var_os("HOME") {
            application_dirs.push(PathBuf::from(home).join("Applications"));
        }
        Self {
            program: PathBuf::from(OSASCRIPT_PROGRAM),
            application_dirs,
        }
    }
}

impl OsaScriptAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the directories searched by install detection.
    pub fn with_application_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.application_dirs = dirs;
        self
    }

    fn try_fetch(&self, descriptor: &BrowserDescriptor) -> Result<Vec<RawTab>, AdapterError> {
        if !self.is_running(descriptor)? {
            debug!(
                "event=browser_fetch module=adapter status=skipped browser={} reason=not_running",
                descriptor.slug
            );
            return Ok(Vec::new());
        }
        let output = self.run_script(&list_tabs_script(descriptor))?;
        Ok(parse_tab_listing(&output, descriptor.display_name))
    }

    fn is_running(&self, descriptor: &BrowserDescriptor) -> Result<bool, AdapterError> {
        let output = self.run_script(&format!(
            "return application id \"{}\" is running",
            descriptor.bundle_identifier
        ))?;
        match output.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(AdapterError::InvalidOutput(format!(
                "expected true|false, got `{other}`"
            ))),
        }
    }

    fn run_script(&self, script: &str) -> Result<String, AdapterError> {
        if !cfg!(target_os = "macos") {
            return Err(AdapterError::UnsupportedPlatform);
        }
        let output = Command::new(&self.program).arg("-e").arg(script).output()?;
        if !output.status.success() {
            return Err(AdapterError::ScriptFailed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl BrowserAdapter for OsaScriptAdapter {
    fn fetch_tabs(&self, kind: BrowserKind) -> Vec<RawTab> {
        let descriptor = kind.descriptor();
        let started_at = Instant::now();
        match self.try_fetch(descriptor) {
            Ok(tabs) => {
                debug!(
                    "event=browser_fetch module=adapter status=ok browser={} tabs={} duration_ms={}",
                    descriptor.slug,
                    tabs.len(),
                    started_at.elapsed().as_millis()
                );
                tabs
            }
            Err(err) => {
                warn!(
                    "event=browser_fetch module=adapter status=error error_code=source_unavailable browser={} duration_ms={} error={}",
                    descriptor.slug,
                    started_at.elapsed().as_millis(),
                    err
                );
                Vec::new()
            }
        }
    }

    fn is_installed(&self, kind: BrowserKind) -> bool {
        let bundle = kind.descriptor().app_bundle;
        self.application_dirs
            .iter()
            .any(|dir| dir.join(bundle).exists())
    }
}

impl TabActivator for OsaScriptAdapter {
    fn activate(&self, url: &str, kind: BrowserKind) -> bool {
        let descriptor = kind.descriptor();
        match self.run_script(&activate_script(descriptor, url)) {
            Ok(output) => {
                debug!(
                    "event=tab_activate module=adapter status=ok browser={} found={}",
                    descriptor.slug,
                    output.trim()
                );
                true
            }
            Err(AdapterError::UnsupportedPlatform) => false,
            Err(err) => {
                warn!(
                    "event=tab_activate module=adapter status=error browser={} error={}",
                    descriptor.slug, err
                );
                true
            }
        }
    }
}

/// Script that returns one `title<TAB>url` record per open tab, each ended by
/// [`RECORD_SEPARATOR`].
pub fn list_tabs_script(descriptor: &BrowserDescriptor) -> String {
    format!(
        r#"tell application id "{bundle}"
    set tabList to ""
    repeat with w in windows
        repeat with t in tabs of w
            set tabList to tabList & ({title} of t) & tab & (URL of t) & (character id 30)
        end repeat
    end repeat
    return tabList
end tell"#,
        bundle = descriptor.bundle_identifier,
        title = descriptor.title_property,
    )
}

/// Script that focuses the first window/tab showing `url`.
pub fn activate_script(descriptor: &BrowserDescriptor, url: &str) -> String {
    let select = match descriptor.selection {
        TabSelection::ActiveTabIndex => "set active tab index of w to i",
        TabSelection::CurrentTab => "set current tab of w to t",
    };
    format!(
        r#"tell application id "{bundle}"
    repeat with w in windows
        set i to 1
        repeat with t in tabs of w
            if (URL of t) is "{url}" then
                {select}
                set index of w to 1
                activate
                return true
            end if
            set i to i + 1
        end repeat
    end repeat
end tell
return false"#,
        bundle = descriptor.bundle_identifier,
        url = escape_applescript_string(url),
    )
}

/// Parses `title<TAB>url` records separated by [`RECORD_SEPARATOR`].
///
/// Rows without a URL are skipped; blank titles become `No Title`. Line
/// breaks inside a title are flattened to spaces.
pub fn parse_tab_listing(output: &str, browser_name: &str) -> Vec<RawTab> {
    output
        .split(RECORD_SEPARATOR)
        .filter_map(|record| {
            let (title, url) = record.rsplit_once('\t')?;
            let url = url.trim();
            if url.is_empty() || url == MISSING_VALUE {
                return None;
            }
            let title = title.trim().replace(['\n', '\r'], " ");
            let title = if title.is_empty() || title == MISSING_VALUE {
                UNTITLED_TAB.to_string()
            } else {
                title
            };
            Some(RawTab::new(title, url, browser_name))
        })
        .collect()
}

fn escape_applescript_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
