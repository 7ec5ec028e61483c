//! Calendar sink that writes one iCalendar file per reminded URL.
//!
//! Files are named after the URL, so mirroring a new reminder for the same
//! URL replaces the previous event file.

use crate::delivery::{CalendarEvent, CalendarSink, DeliveryError, DeliveryResult};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use uuid::Uuid;

static NON_FILENAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid file name regex"));
static URL_SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("valid scheme regex"));

const MAX_FILE_STEM_CHARS: usize = 80;

pub struct IcsCalendarSink {
    dir: PathBuf,
}

impl IcsCalendarSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the event file mirroring reminders for `url`.
    pub fn event_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.ics", file_stem_for_url(url)))
    }
}

impl CalendarSink for IcsCalendarSink {
    fn create_event(&self, event: &CalendarEvent) -> DeliveryResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|err| {
            DeliveryError::delivery_failed(format!(
                "failed to create calendar directory `{}`: {err}",
                self.dir.display()
            ))
        })?;
        let body = render_event(event, Utc::now())?;
        let path = self.event_path(&event.url);
        std::fs::write(&path, body).map_err(|err| {
            DeliveryError::delivery_failed(format!(
                "failed to write calendar event `{}`: {err}",
                path.display()
            ))
        })
    }
}

/// Renders a single-event VCALENDAR document with a display alarm.
pub fn render_event(event: &CalendarEvent, stamp: DateTime<Utc>) -> DeliveryResult<String> {
    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//tabby//tab reminders//EN".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@tabby", Uuid::new_v4()),
        format!("DTSTAMP:{}", format_utc(stamp)),
        format!("DTSTART:{}", format_epoch_ms(event.start_ms)?),
        format!("DTEND:{}", format_epoch_ms(event.end_ms)?),
        format!("SUMMARY:{}", escape_text(&event.title)),
        format!(
            "DESCRIPTION:{}",
            escape_text(event.notes.as_deref().unwrap_or_default())
        ),
        format!("URL:{}", event.url),
        "BEGIN:VALARM".to_string(),
        "ACTION:DISPLAY".to_string(),
        format!("DESCRIPTION:{}", escape_text(&event.title)),
        format!(
            "TRIGGER;VALUE=DATE-TIME:{}",
            format_epoch_ms(event.alarm_at_ms)?
        ),
        "END:VALARM".to_string(),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];
    let mut body = lines.join("\r\n");
    body.push_str("\r\n");
    Ok(body)
}

fn format_epoch_ms(value: i64) -> DeliveryResult<String> {
    DateTime::<Utc>::from_timestamp_millis(value)
        .map(format_utc)
        .ok_or_else(|| DeliveryError::new("invalid_time", format!("timestamp out of range: {value}")))
}

fn format_utc(value: DateTime<Utc>) -> String {
    value.format("%Y%m%dT%H%M%SZ").to_string()
}

fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

fn file_stem_for_url(url: &str) -> String {
    let without_scheme = URL_SCHEME_RE.replace(url, "");
    let collapsed = NON_FILENAME_RE.replace_all(&without_scheme, "-");
    let stem: String = collapsed
        .trim_matches('-')
        .chars()
        .take(MAX_FILE_STEM_CHARS)
        .collect();
    if stem.is_empty() {
        "reminder".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::{file_stem_for_url, render_event, IcsCalendarSink};
    use crate::delivery::{CalendarEvent, CalendarSink};
    use chrono::{DateTime, Utc};

    fn event(url: &str) -> CalendarEvent {
        CalendarEvent {
            title: "Tab Reminder: Docs, part 1".to_string(),
            notes: Some("read; then close".to_string()),
            start_ms: 1_700_000_000_000,
            end_ms: 1_700_003_600_000,
            alarm_at_ms: 1_700_000_000_000,
            url: url.to_string(),
        }
    }

    #[test]
    fn render_includes_times_alarm_and_escaped_text() {
        let stamp = DateTime::<Utc>::from_timestamp_millis(0).unwrap();
        let body = render_event(&event("https://docs.rs/x"), stamp).unwrap();
        assert!(body.contains("DTSTART:20231114T221320Z\r\n"));
        assert!(body.contains("DTEND:20231114T231320Z\r\n"));
        assert!(body.contains("TRIGGER;VALUE=DATE-TIME:20231114T221320Z\r\n"));
        assert!(body.contains("SUMMARY:Tab Reminder: Docs\\, part 1\r\n"));
        assert!(body.contains("DESCRIPTION:read\\; then close\r\n"));
        assert!(body.contains("DTSTAMP:19700101T000000Z\r\n"));
    }

    #[test]
    fn file_stems_are_sanitized() {
        assert_eq!(
            file_stem_for_url("https://github.com/a/b?c=d"),
            "github-com-a-b-c-d"
        );
        assert_eq!(file_stem_for_url("://"), "reminder");
    }

    #[test]
    fn same_url_overwrites_event_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = IcsCalendarSink::new(dir.path().join("calendar"));
        sink.create_event(&event("https://a.example/x")).unwrap();

        let mut later = event("https://a.example/x");
        later.title = "second".to_string();
        sink.create_event(&later).unwrap();

        let files: Vec<_> = std::fs::read_dir(sink.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let body = std::fs::read_to_string(sink.event_path("https://a.example/x")).unwrap();
        assert!(body.contains("SUMMARY:second"));
    }
}
