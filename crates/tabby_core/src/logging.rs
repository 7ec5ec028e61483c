//! Rolling file logs for the core and its front ends.
//!
//! # Responsibility
//! - Start one `flexi_logger` file backend per process.
//! - Record panics as one sanitized log line before the default hook runs.
//!
//! # Invariants
//! - The first successful call fixes the `(level, dir)` target; repeating it is
//!   a no-op and any other target is rejected.
//! - Nothing in this module panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::panic::PanicHookInfo;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "tabby";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_LOG_FILES: usize = 5;
const PANIC_PAYLOAD_LIMIT: usize = 160;
const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Validated `(level, dir)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogTarget {
    level: &'static str,
    dir: PathBuf,
}

impl LogTarget {
    fn parse(level: &str, dir: &str) -> Result<Self, String> {
        let wanted = level.trim().to_ascii_lowercase();
        let wanted = if wanted == "warning" { "warn".to_string() } else { wanted };
        let level = LEVELS
            .into_iter()
            .find(|known| *known == wanted)
            .ok_or_else(|| {
                format!("unsupported log level `{wanted}`; expected trace|debug|info|warn|error")
            })?;

        let dir = dir.trim();
        if dir.is_empty() {
            return Err("log_dir cannot be empty".to_string());
        }
        if !Path::new(dir).is_absolute() {
            return Err(format!("log_dir must be an absolute path, got `{dir}`"));
        }

        Ok(Self {
            level,
            dir: PathBuf::from(dir),
        })
    }

    /// Rejects a request that differs from the already active target.
    fn check_against(&self, active: &LogTarget) -> Result<(), String> {
        if active.dir != self.dir {
            Err(format!(
                "logging already initialized at `{}`; refusing to switch to `{}`",
                active.dir.display(),
                self.dir.display()
            ))
        } else if active.level != self.level {
            Err(format!(
                "logging already initialized with level `{}`; refusing to switch to `{}`",
                active.level, self.level
            ))
        } else {
            Ok(())
        }
    }
}

struct ActiveLogger {
    target: LogTarget,
    _handle: LoggerHandle,
}

/// Starts file logging under `log_dir` at `level`.
///
/// # Errors
/// - Unknown level, or an empty/relative/uncreatable directory.
/// - Logging already runs with another level or directory.
/// - The backend fails to start.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let requested = LogTarget::parse(level, log_dir)?;
    let active = ACTIVE.get_or_try_init(|| start_backend(requested.clone()))?;
    requested.check_against(&active.target)
}

/// Active `(level, log_dir)`, if logging was initialized.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.target.level, active.target.dir.clone()))
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_backend(target: LogTarget) -> Result<ActiveLogger, String> {
    std::fs::create_dir_all(&target.dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            target.dir.display()
        )
    })?;

    let handle = Logger::try_with_str(target.level)
        .map_err(|err| format!("invalid log level `{}`: {err}", target.level))?
        .log_to_file(
            FileSpec::default()
                .directory(target.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    if PANIC_HOOK.set(()).is_ok() {
        install_panic_hook();
    }

    info!(
        "event=app_start module=core status=ok platform={} build={} version={}",
        std::env::consts::OS,
        if cfg!(debug_assertions) { "debug" } else { "release" },
        env!("CARGO_PKG_VERSION")
    );
    info!(
        "event=logging_init module=core status=ok level={} log_dir={}",
        target.level,
        target.dir.display()
    );

    Ok(ActiveLogger {
        target,
        _handle: handle,
    })
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let (location, payload) = describe_panic(info);
        error!(
            "event=panic_captured module=core status=error location={location} payload={payload}"
        );
        previous(info);
    }));
}

/// Location and a single-line, capped payload. Payloads may quote tab
/// titles or notes.
fn describe_panic(info: &PanicHookInfo<'_>) -> (String, String) {
    let location = info.location().map_or_else(
        || "unknown".to_string(),
        |loc| format!("{}:{}", loc.file(), loc.line()),
    );
    let payload: &str = if let Some(message) = info.payload().downcast_ref::<&str>() {
        *message
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    };
    (location, single_line(payload, PANIC_PAYLOAD_LIMIT))
}

fn single_line(value: &str, limit: usize) -> String {
    let mut chars = value.chars().map(|ch| match ch {
        '\n' | '\r' => ' ',
        other => other,
    });
    let mut line: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        line.push_str("...");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::{init_logging, logging_status, single_line, LogTarget};

    #[test]
    fn target_parsing_normalizes_levels_and_requires_absolute_dirs() {
        let dir = std::env::temp_dir();
        let dir = dir.to_str().unwrap();
        assert_eq!(LogTarget::parse("INFO", dir).unwrap().level, "info");
        assert_eq!(LogTarget::parse(" warning ", dir).unwrap().level, "warn");
        assert!(LogTarget::parse("verbose", dir).is_err());
        assert!(LogTarget::parse("info", "logs/dev")
            .unwrap_err()
            .contains("absolute"));
        assert!(LogTarget::parse("info", "  ").unwrap_err().contains("empty"));
    }

    #[test]
    fn single_line_flattens_and_truncates() {
        let line = single_line("line1\nline2\rline3", 8);
        assert_eq!(line, "line1 li...");
        assert_eq!(single_line("short", 8), "short");
    }

    #[test]
    fn init_is_idempotent_and_rejects_reconfiguration() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let first_dir = first.path().join("logs");
        let first_str = first_dir.to_str().unwrap();
        let second_str = second.path().to_str().unwrap();

        init_logging("info", first_str).unwrap();
        init_logging("INFO", first_str).unwrap();

        assert!(init_logging("debug", first_str)
            .unwrap_err()
            .contains("refusing to switch"));
        assert!(init_logging("info", second_str)
            .unwrap_err()
            .contains("refusing to switch"));

        let (level, dir) = logging_status().unwrap();
        assert_eq!(level, "info");
        assert_eq!(dir, first_dir);
        assert!(first_dir.exists());
    }
}
