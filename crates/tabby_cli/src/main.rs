//! Command-line front end for `tabby_core`.
//!
//! # Responsibility
//! - Wire the SQLite store, local notifier and AppleScript adapter into a
//!   runtime and expose its operations as subcommands.
//! - Keep all tab semantics in the core crate; this binary only parses input
//!   and prints results.

use chrono::{Local, NaiveDateTime, TimeZone};
use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabby_core::delivery::FiredReminder;
use tabby_core::{
    default_log_level, init_logging, spawn_runtime, BlobStore, BrowserKind, CalendarSink, Clock,
    CoreSession, IcsCalendarSink, LocalTimerNotifier, MetadataStore, OsaScriptAdapter,
    ReminderScheduler, RuntimeConfig, RuntimeHandle, SettingsRepository, SqliteBlobStore,
    SystemClock, Tab, Tier,
};
use tokio::sync::mpsc;

const STORE_FILE_NAME: &str = "tabby.sqlite3";
const LOG_DIR_NAME: &str = "logs";

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Tabby: browser tabs with notes, tiers and reminders.
#[derive(Parser)]
#[command(name = "tabby", version, about)]
struct Cli {
    /// Directory holding the annotation store and logs.
    #[arg(long, env = "TABBY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error).
    #[arg(long, env = "TABBY_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List open tabs.
    List {
        /// Only show tabs of this tier (focus|research|chill|other).
        #[arg(long)]
        tier: Option<String>,
    },

    /// Set or clear the note of a tab.
    Note {
        /// 1-based list index, exact URL, or unique URL fragment.
        selector: String,
        /// Note text; leave out (or pass --clear) to remove the note.
        text: Option<String>,
        #[arg(long, conflicts_with = "text")]
        clear: bool,
    },

    /// Set or clear the reminder of a tab.
    Remind {
        selector: String,
        /// `YYYY-MM-DD HH:MM` local time, `+30m`/`+2h`/`+1d`, or `clear`.
        when: String,
    },

    /// Show known browsers and whether they are enabled.
    Browsers,

    /// Include a browser in refreshes.
    Enable { browser: BrowserKind },

    /// Exclude a browser from refreshes.
    Disable { browser: BrowserKind },

    /// Bring a tab to the foreground.
    Open { selector: String },

    /// Keep refreshing and deliver reminders until Ctrl+C.
    Watch {
        /// Seconds between refreshes.
        #[arg(long, env = "TABBY_REFRESH_SECS", default_value_t = 5)]
        interval: u64,
        /// Also write an `.ics` file per reminder into this directory.
        #[arg(long)]
        calendar_dir: Option<PathBuf>,
    },
}

struct App {
    handle: RuntimeHandle,
    fired: mpsc::UnboundedReceiver<FiredReminder>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let data_dir = resolve_data_dir(cli.data_dir)?;
    std::fs::create_dir_all(&data_dir)?;
    let level = cli
        .log_level
        .unwrap_or_else(|| default_log_level().to_string());
    if let Err(err) = init_logging(&level, &data_dir.join(LOG_DIR_NAME).to_string_lossy()) {
        eprintln!("warning: logging disabled: {err}");
    }

    let command = cli.command.unwrap_or(Command::List { tier: None });
    let (config, calendar_dir) = match &command {
        Command::Watch {
            interval,
            calendar_dir,
        } => (
            RuntimeConfig::default().with_refresh_interval(Duration::from_secs(*interval)),
            calendar_dir.clone(),
        ),
        _ => (RuntimeConfig::manual(), None),
    };
    let mut app = start(&data_dir, config, calendar_dir)?;

    let result = match command {
        Command::List { tier } => list(&app.handle, tier.as_deref()).await,
        Command::Note {
            selector,
            text,
            clear,
        } => note(&app.handle, &selector, if clear { None } else { text }).await,
        Command::Remind { selector, when } => remind(&app.handle, &selector, &when).await,
        Command::Browsers => browsers(&app.handle).await,
        Command::Enable { browser } => toggle(&app.handle, browser, true).await,
        Command::Disable { browser } => toggle(&app.handle, browser, false).await,
        Command::Open { selector } => open(&app.handle, &selector).await,
        Command::Watch { .. } => watch(&mut app).await,
    };

    app.handle.flush_reminders().await;
    let _ = app.handle.shutdown().await;
    result
}

fn resolve_data_dir(flag: Option<PathBuf>) -> CliResult<PathBuf> {
    let dir = match flag {
        Some(dir) => dir,
        None => {
            let home = std::env::var_os("HOME").ok_or("HOME is not set; pass --data-dir")?;
            PathBuf::from(home).join(".tabby")
        }
    };
    if dir.is_absolute() {
        Ok(dir)
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

fn start(data_dir: &Path, config: RuntimeConfig, calendar_dir: Option<PathBuf>) -> CliResult<App> {
    let blobs: Arc<dyn BlobStore> = Arc::new(SqliteBlobStore::open(data_dir.join(STORE_FILE_NAME))?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (notifier, fired) =
        LocalTimerNotifier::new(tokio::runtime::Handle::current(), Arc::clone(&clock));
    let calendar = match calendar_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            Some(Arc::new(IcsCalendarSink::new(dir)) as Arc<dyn CalendarSink>)
        }
        None => None,
    };
    let reminders = ReminderScheduler::spawn(Arc::new(notifier), calendar, clock);
    let session = CoreSession::new(
        MetadataStore::load(Arc::clone(&blobs)),
        SettingsRepository::load(blobs),
        reminders,
    );
    let adapter = Arc::new(OsaScriptAdapter::new());
    let (handle, _task) = spawn_runtime(session, adapter.clone(), adapter, config);
    info!("event=cli_start module=cli status=ok data_dir={}", data_dir.display());
    Ok(App { handle, fired })
}

async fn list(handle: &RuntimeHandle, tier: Option<&str>) -> CliResult<()> {
    let tier = tier
        .map(|label| Tier::from_label(label).ok_or_else(|| format!("unknown tier `{label}`")))
        .transpose()?;
    let tabs = handle.refresh().await?;
    if tabs.is_empty() {
        println!("No open tabs found.");
        return Ok(());
    }
    for (index, tab) in tabs.iter().enumerate() {
        if tier.is_some_and(|wanted| wanted != tab.tier) {
            continue;
        }
        print_tab(index + 1, tab);
    }
    Ok(())
}

fn print_tab(position: usize, tab: &Tab) {
    println!(
        "{position:>3}. [{}] {} ({})",
        tab.tier.label(),
        tab.title,
        tab.browser
    );
    println!("     {}", tab.url);
    if let Some(note) = &tab.note {
        println!("     note: {note}");
    }
    if let Some(at) = tab.reminder_at {
        println!("     reminder: {}", format_local(at));
    }
}

async fn note(handle: &RuntimeHandle, selector: &str, text: Option<String>) -> CliResult<()> {
    let tabs = handle.refresh().await?;
    let tab = select_tab(&tabs, selector)?;
    let updated = handle.update_note(tab.id, text).await?;
    match &updated.note {
        Some(note) => println!("Note saved for {}: {note}", updated.url),
        None => println!("Note cleared for {}", updated.url),
    }
    Ok(())
}

async fn remind(handle: &RuntimeHandle, selector: &str, when: &str) -> CliResult<()> {
    let at = parse_when(when, Local::now().timestamp_millis())?;
    let tabs = handle.refresh().await?;
    let tab = select_tab(&tabs, selector)?;
    let updated = handle.update_reminder(tab.id, at).await?;
    match updated.reminder_at {
        Some(at) => println!(
            "Reminder for {} set to {}; run `tabby watch` to receive it.",
            updated.url,
            format_local(at)
        ),
        None => println!("Reminder cleared for {}", updated.url),
    }
    Ok(())
}

async fn browsers(handle: &RuntimeHandle) -> CliResult<()> {
    for browser in handle.browsers().await? {
        println!(
            "{:<14} {:<8} {}",
            browser.display_name,
            if browser.enabled { "enabled" } else { "disabled" },
            if browser.installed { "installed" } else { "not installed" }
        );
    }
    Ok(())
}

async fn toggle(handle: &RuntimeHandle, browser: BrowserKind, enabled: bool) -> CliResult<()> {
    handle.set_browser_enabled(browser, enabled).await?;
    println!(
        "{browser} {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

async fn open(handle: &RuntimeHandle, selector: &str) -> CliResult<()> {
    let tabs = handle.refresh().await?;
    let tab = select_tab(&tabs, selector)?;
    if handle.activate(tab.id).await? {
        println!("Opening {}", tab.url);
    } else {
        println!("Cannot focus tabs of {}", tab.browser);
    }
    Ok(())
}

async fn watch(app: &mut App) -> CliResult<()> {
    let tabs = app.handle.refresh().await?;
    let resumed = app
        .handle
        .resume_reminders(Local::now().timestamp_millis())
        .await?;
    println!(
        "Watching {} tabs ({resumed} pending reminders). Press Ctrl+C to stop.",
        tabs.len()
    );

    loop {
        tokio::select! {
            fired = app.fired.recv() => match fired {
                Some(reminder) => {
                    println!("[{}] {}", format_local(reminder.fire_at_ms), reminder.title);
                    println!("    {}", reminder.body);
                    println!("    {}", reminder.id);
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }
    Ok(())
}

/// Resolves a 1-based index, an exact URL, or a URL fragment matching one tab.
fn select_tab<'a>(tabs: &'a [Tab], selector: &str) -> CliResult<&'a Tab> {
    let selector = selector.trim();
    if let Ok(position) = selector.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|index| tabs.get(index))
            .ok_or_else(|| format!("no tab at position {position}").into());
    }
    if let Some(tab) = tabs.iter().find(|tab| tab.url == selector) {
        return Ok(tab);
    }
    let mut matches = tabs.iter().filter(|tab| tab.url.contains(selector));
    match (matches.next(), matches.next()) {
        (Some(tab), None) => Ok(tab),
        (None, _) => Err(format!("no tab matches `{selector}`").into()),
        (Some(_), Some(_)) => Err(format!("`{selector}` matches several tabs").into()),
    }
}

/// Parses reminder input into epoch milliseconds; `clear` yields `None`.
fn parse_when(input: &str, now_ms: i64) -> CliResult<Option<i64>> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("clear") || input.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    if let Some(offset) = input.strip_prefix('+') {
        let split = offset
            .char_indices()
            .last()
            .map_or(0, |(index, _)| index);
        let (amount, unit) = offset.split_at(split);
        let amount: i64 = amount
            .parse()
            .map_err(|_| format!("invalid offset `{input}`"))?;
        let unit_ms = match unit {
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => return Err(format!("invalid offset unit in `{input}`; expected m|h|d").into()),
        };
        return Ok(Some(now_ms.saturating_add(amount.saturating_mul(unit_ms))));
    }
    let naive = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M")
        .map_err(|_| format!("invalid time `{input}`; expected YYYY-MM-DD HH:MM"))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("`{input}` does not exist in the local time zone"))?;
    Ok(Some(local.timestamp_millis()))
}

fn format_local(epoch_ms: i64) -> String {
    Local
        .timestamp_millis_opt(epoch_ms)
        .single()
        .map(|value| value.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse_when, select_tab};
    use tabby_core::{Tab, Tier};

    fn tab(url: &str) -> Tab {
        Tab {
            id: Default::default(),
            title: url.to_string(),
            url: url.to_string(),
            browser: "Safari".to_string(),
            note: None,
            reminder_at: None,
            tier: Tier::Other,
        }
    }

    #[test]
    fn offsets_are_relative_to_now() {
        assert_eq!(parse_when("+30m", 1_000).unwrap(), Some(1_000 + 30 * 60_000));
        assert_eq!(parse_when("+2h", 0).unwrap(), Some(2 * 3_600_000));
        assert_eq!(parse_when("+1d", 0).unwrap(), Some(86_400_000));
        assert!(parse_when("+5y", 0).is_err());
        assert!(parse_when("+m", 0).is_err());
    }

    #[test]
    fn clear_yields_none_and_garbage_is_rejected() {
        assert_eq!(parse_when("clear", 0).unwrap(), None);
        assert!(parse_when("tomorrow", 0).is_err());
        assert!(parse_when("2030-01-02 09:30", 0).unwrap().is_some());
    }

    #[test]
    fn selector_accepts_index_url_and_unique_fragment() {
        let tabs = vec![tab("https://github.com/a"), tab("https://github.com/b")];
        assert_eq!(select_tab(&tabs, "2").unwrap().url, "https://github.com/b");
        assert_eq!(
            select_tab(&tabs, "https://github.com/a").unwrap().url,
            "https://github.com/a"
        );
        assert_eq!(select_tab(&tabs, "com/b").unwrap().url, "https://github.com/b");
        assert!(select_tab(&tabs, "github").is_err());
        assert!(select_tab(&tabs, "0").is_err());
        assert!(select_tab(&tabs, "3").is_err());
    }
}
