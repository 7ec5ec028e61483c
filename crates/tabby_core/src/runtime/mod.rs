//! Refresh runtime.
//!
//! # Responsibility
//! - Own a [`CoreSession`] inside one tokio task and serialize every mutation
//!   through its command channel.
//! - Drive refresh cycles from a periodic timer and from explicit requests.
//!
//! # Invariants
//! - At most one refresh cycle is in flight. An explicit request arriving
//!   mid-cycle queues a single rerun; a timer tick arriving mid-cycle is
//!   skipped.
//! - Browser queries run on blocking worker threads; annotation updates keep
//!   being served while they run.
//! - Snapshots from browsers disabled during a cycle are discarded.

use crate::adapter::{BrowserAdapter, TabActivator};
use crate::model::browser::{BrowserKind, BrowserRegistration};
use crate::model::tab::{RawTab, Tab, TabId};
use crate::service::reminder_service::{ReminderOutcome, ReminderScheduler};
use crate::service::session::{CoreSession, SessionError, SessionResult};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Runtime tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Period of timer-driven refreshes. Clamped to [`MIN_REFRESH_INTERVAL`].
    pub refresh_interval: Duration,
    /// Whether timer-driven refreshes run at all.
    pub periodic: bool,
    /// Per-browser query budget; slower browsers count as unavailable.
    pub fetch_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            periodic: true,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl RuntimeConfig {
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval.max(MIN_REFRESH_INTERVAL);
        self
    }

    /// Explicit refreshes only.
    pub fn manual() -> Self {
        Self {
            periodic: false,
            ..Self::default()
        }
    }
}

/// Tabs reported by one browser during a refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSnapshot {
    pub kind: BrowserKind,
    pub tabs: Vec<RawTab>,
}

/// Queries `kinds` concurrently on blocking threads.
///
/// Join failures and timeouts yield an empty snapshot for that browser.
pub async fn gather_snapshots(
    adapter: Arc<dyn BrowserAdapter>,
    kinds: Vec<BrowserKind>,
    fetch_timeout: Duration,
) -> Vec<BrowserSnapshot> {
    let pending: Vec<_> = kinds
        .into_iter()
        .map(|kind| {
            let adapter = Arc::clone(&adapter);
            (
                kind,
                tokio::task::spawn_blocking(move || adapter.fetch_tabs(kind)),
            )
        })
        .collect();

    let mut snapshots = Vec::with_capacity(pending.len());
    for (kind, task) in pending {
        let tabs = match tokio::time::timeout(fetch_timeout, task).await {
            Ok(Ok(tabs)) => tabs,
            Ok(Err(err)) => {
                warn!(
                    "event=browser_fetch module=runtime status=error error_code=worker_join_failed browser={} error={}",
                    kind.descriptor().slug,
                    err
                );
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "event=browser_fetch module=runtime status=error error_code=fetch_timeout browser={} timeout_ms={}",
                    kind.descriptor().slug,
                    fetch_timeout.as_millis()
                );
                Vec::new()
            }
        };
        snapshots.push(BrowserSnapshot { kind, tabs });
    }
    snapshots
}

enum Command {
    Refresh(Option<oneshot::Sender<Vec<Tab>>>),
    Tabs(oneshot::Sender<Vec<Tab>>),
    UpdateNote {
        id: TabId,
        note: Option<String>,
        reply: oneshot::Sender<SessionResult<Tab>>,
    },
    UpdateReminder {
        id: TabId,
        at: Option<i64>,
        reply: oneshot::Sender<SessionResult<Tab>>,
    },
    SetBrowserEnabled {
        kind: BrowserKind,
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    Browsers(oneshot::Sender<Vec<BrowserRegistration>>),
    Activate {
        id: TabId,
        reply: oneshot::Sender<SessionResult<bool>>,
    },
    ResumeReminders {
        now_ms: i64,
        reply: oneshot::Sender<usize>,
    },
    Shutdown(oneshot::Sender<()>),
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    started_at: Option<Instant>,
    rerun_requested: bool,
    waiters: Vec<oneshot::Sender<Vec<Tab>>>,
    next_waiters: Vec<oneshot::Sender<Vec<Tab>>>,
}

struct RuntimeActor {
    session: CoreSession,
    adapter: Arc<dyn BrowserAdapter>,
    activator: Arc<dyn TabActivator>,
    config: RuntimeConfig,
    refresh: RefreshState,
    snapshots_tx: mpsc::UnboundedSender<Vec<BrowserSnapshot>>,
}

/// Starts the runtime task on the current tokio runtime.
///
/// With a periodic config the first refresh starts immediately.
pub fn spawn_runtime(
    session: CoreSession,
    adapter: Arc<dyn BrowserAdapter>,
    activator: Arc<dyn TabActivator>,
    config: RuntimeConfig,
) -> (RuntimeHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (snapshots_tx, snapshots_rx) = mpsc::unbounded_channel();
    let handle = RuntimeHandle {
        commands: commands_tx,
        reminders: session.reminders().clone(),
    };
    let actor = RuntimeActor {
        session,
        adapter,
        activator,
        config,
        refresh: RefreshState::default(),
        snapshots_tx,
    };
    let task = tokio::spawn(actor.run(commands_rx, snapshots_rx));
    (handle, task)
}

impl RuntimeActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut snapshots: mpsc::UnboundedReceiver<Vec<BrowserSnapshot>>,
    ) {
        let period = self.config.refresh_interval.max(MIN_REFRESH_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "event=runtime_start module=runtime status=ok periodic={} interval_ms={}",
            self.config.periodic,
            period.as_millis()
        );

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(batch) = snapshots.recv() => self.finish_refresh(batch),
                _ = ticker.tick(), if self.config.periodic => self.on_tick(),
            }
        }
        info!("event=runtime_stop module=runtime status=ok");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Refresh(waiter) => self.request_refresh(waiter),
            Command::Tabs(reply) => {
                let _ = reply.send(self.session.tabs().to_vec());
            }
            Command::UpdateNote { id, note, reply } => {
                let _ = reply.send(self.session.update_note(id, note));
            }
            Command::UpdateReminder { id, at, reply } => {
                let _ = reply.send(self.session.update_reminder(id, at));
            }
            Command::SetBrowserEnabled {
                kind,
                enabled,
                reply,
            } => {
                self.session.set_browser_enabled(kind, enabled);
                let _ = reply.send(());
                self.request_refresh(None);
            }
            Command::Browsers(reply) => {
                let adapter = Arc::clone(&self.adapter);
                let _ = reply.send(
                    self.session
                        .browser_registrations(|kind| adapter.is_installed(kind)),
                );
            }
            Command::Activate { id, reply } => {
                let _ = reply.send(self.activate(id));
            }
            Command::ResumeReminders { now_ms, reply } => {
                let _ = reply.send(self.session.resume_reminders(now_ms));
            }
            Command::Shutdown(_) => {}
        }
    }

    fn on_tick(&mut self) {
        if self.refresh.in_flight {
            debug!("event=refresh module=runtime status=skipped trigger=timer reason=in_flight");
            return;
        }
        self.begin_refresh("timer");
    }

    fn request_refresh(&mut self, waiter: Option<oneshot::Sender<Vec<Tab>>>) {
        if self.refresh.in_flight {
            self.refresh.rerun_requested = true;
            self.refresh.next_waiters.extend(waiter);
            debug!("event=refresh module=runtime status=deferred trigger=request reason=in_flight");
            return;
        }
        self.refresh.waiters.extend(waiter);
        self.begin_refresh("request");
    }

    fn begin_refresh(&mut self, trigger: &str) {
        let kinds = self.session.enabled_browsers();
        info!(
            "event=refresh module=runtime status=start trigger={} browsers={}",
            trigger,
            kinds.len()
        );
        self.refresh.in_flight = true;
        self.refresh.started_at = Some(Instant::now());

        let adapter = Arc::clone(&self.adapter);
        let fetch_timeout = self.config.fetch_timeout;
        let snapshots_tx = self.snapshots_tx.clone();
        tokio::spawn(async move {
            let batch = gather_snapshots(adapter, kinds, fetch_timeout).await;
            let _ = snapshots_tx.send(batch);
        });
    }

    fn finish_refresh(&mut self, batch: Vec<BrowserSnapshot>) {
        let fresh: Vec<RawTab> = batch
            .into_iter()
            .filter(|snapshot| self.session.is_browser_enabled(snapshot.kind))
            .flat_map(|snapshot| snapshot.tabs)
            .collect();
        let tabs = self.session.apply_snapshots(fresh).to_vec();
        info!(
            "event=refresh module=runtime status=ok tabs={} duration_ms={}",
            tabs.len(),
            self.refresh
                .started_at
                .take()
                .map_or(0, |started_at| started_at.elapsed().as_millis())
        );

        for waiter in self.refresh.waiters.drain(..) {
            let _ = waiter.send(tabs.clone());
        }
        self.refresh.in_flight = false;

        if std::mem::take(&mut self.refresh.rerun_requested) {
            self.refresh.waiters = std::mem::take(&mut self.refresh.next_waiters);
            self.begin_refresh("deferred");
        }
    }

    fn activate(&self, id: TabId) -> SessionResult<bool> {
        let tab = self
            .session
            .find_tab(id)
            .ok_or(SessionError::TabNotFound(id))?;
        let Some(kind) = BrowserKind::from_display_name(&tab.browser) else {
            return Ok(false);
        };
        let activator = Arc::clone(&self.activator);
        let url = tab.url.clone();
        let _ = tokio::task::spawn_blocking(move || activator.activate(&url, kind));
        Ok(true)
    }
}

/// Cloneable entry point to a running runtime.
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
    reminders: ReminderScheduler,
}

impl RuntimeHandle {
    /// Runs (or joins) a refresh cycle and returns the tabs it published.
    pub async fn refresh(&self) -> SessionResult<Vec<Tab>> {
        self.call(|reply| Command::Refresh(Some(reply))).await
    }

    /// Asks for a refresh without waiting for it.
    pub fn request_refresh(&self) {
        if self.commands.try_send(Command::Refresh(None)).is_err() {
            debug!("event=refresh module=runtime status=skipped trigger=request reason=queue_full");
        }
    }

    pub async fn tabs(&self) -> SessionResult<Vec<Tab>> {
        self.call(Command::Tabs).await
    }

    pub async fn update_note(&self, id: TabId, note: Option<String>) -> SessionResult<Tab> {
        self.call(|reply| Command::UpdateNote { id, note, reply })
            .await?
    }

    pub async fn update_reminder(&self, id: TabId, at: Option<i64>) -> SessionResult<Tab> {
        self.call(|reply| Command::UpdateReminder { id, at, reply })
            .await?
    }

    /// Persists the flag and starts a refresh so the change shows up.
    pub async fn set_browser_enabled(&self, kind: BrowserKind, enabled: bool) -> SessionResult<()> {
        self.call(|reply| Command::SetBrowserEnabled {
            kind,
            enabled,
            reply,
        })
        .await
    }

    pub async fn browsers(&self) -> SessionResult<Vec<BrowserRegistration>> {
        self.call(Command::Browsers).await
    }

    /// Dispatches a focus request for the tab. Returns whether it was attempted.
    pub async fn activate(&self, id: TabId) -> SessionResult<bool> {
        self.call(|reply| Command::Activate { id, reply }).await?
    }

    /// Re-submits stored future reminders of currently open URLs.
    pub async fn resume_reminders(&self, now_ms: i64) -> SessionResult<usize> {
        self.call(|reply| Command::ResumeReminders { now_ms, reply })
            .await
    }

    pub fn subscribe_reminders(&self) -> broadcast::Receiver<ReminderOutcome> {
        self.reminders.subscribe()
    }

    /// Waits until reminder plans submitted so far have been delivered.
    pub async fn flush_reminders(&self) {
        self.reminders.flush().await;
    }

    /// Stops the runtime task after the commands queued before this one.
    pub async fn shutdown(&self) -> SessionResult<()> {
        self.call(Command::Shutdown).await
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> SessionResult<T> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }
}
