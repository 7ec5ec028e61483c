//! Reminder scheduling.
//!
//! # Responsibility
//! - Turn `(target, at)` into a cancel-then-maybe-schedule plan keyed by URL.
//! - Execute plans on a background worker so callers never wait on delivery.
//!
//! # Invariants
//! - Every plan cancels the URL's pending notification first.
//! - Nothing is scheduled unless `at` is strictly after the planning instant.
//! - Plans run one at a time in submission order, so at most one notification
//!   per URL is ever pending.
//! - Calendar mirroring runs after notification scheduling and its failure
//!   does not undo it.

use crate::clock::Clock;
use crate::delivery::{CalendarEvent, CalendarSink, DeliveryError, NotificationRequest, Notifier};
use crate::model::tab::{url_host, Tab};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Body used when the tab has no note.
pub const DEFAULT_REMINDER_BODY: &str = "Time to check this tab!";
/// Nominal length of mirrored calendar events.
pub const CALENDAR_EVENT_DURATION_MS: i64 = 60 * 60 * 1000;

const OUTCOME_CHANNEL_CAPACITY: usize = 64;

/// What one `set_reminder` call will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderPlan {
    /// Remove any pending notification for `id`.
    CancelOnly { id: String },
    /// Replace any pending notification for the request id.
    Schedule {
        request: NotificationRequest,
        calendar: Option<CalendarEvent>,
    },
}

impl ReminderPlan {
    pub fn id(&self) -> &str {
        match self {
            Self::CancelOnly { id } => id,
            Self::Schedule { request, .. } => &request.id,
        }
    }
}

/// The URL a reminder is about, with the text shown when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderTarget<'a> {
    pub url: &'a str,
    pub title: &'a str,
    pub note: Option<&'a str>,
}

impl<'a> From<&'a Tab> for ReminderTarget<'a> {
    fn from(tab: &'a Tab) -> Self {
        Self {
            url: &tab.url,
            title: &tab.title,
            note: tab.note.as_deref(),
        }
    }
}

/// Builds the plan for `target` at `now_ms`.
pub fn plan_reminder(
    target: ReminderTarget<'_>,
    at: Option<i64>,
    now_ms: i64,
    mirror_calendar: bool,
) -> ReminderPlan {
    let Some(fire_at_ms) = at.filter(|value| *value > now_ms) else {
        return ReminderPlan::CancelOnly {
            id: target.url.to_string(),
        };
    };

    let title = format!("Tab Reminder: {}", target.title);
    let body = target.note.unwrap_or(DEFAULT_REMINDER_BODY).to_string();
    let calendar = mirror_calendar.then(|| CalendarEvent {
        title: title.clone(),
        notes: target.note.map(str::to_string),
        start_ms: fire_at_ms,
        end_ms: fire_at_ms.saturating_add(CALENDAR_EVENT_DURATION_MS),
        alarm_at_ms: fire_at_ms,
        url: target.url.to_string(),
    });

    ReminderPlan::Schedule {
        request: NotificationRequest {
            id: target.url.to_string(),
            fire_at_ms,
            title,
            body,
        },
        calendar,
    }
}

/// Step of a plan that produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderStage {
    Authorization,
    Cancel,
    Schedule,
    Calendar,
}

impl ReminderStage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::Cancel => "cancel",
            Self::Schedule => "schedule",
            Self::Calendar => "calendar",
        }
    }
}

/// Asynchronous result of delivery work, published after the caller returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderOutcome {
    Cancelled { id: String },
    Scheduled { id: String, fire_at_ms: i64 },
    CalendarMirrored { id: String },
    Failed {
        id: String,
        stage: ReminderStage,
        error: DeliveryError,
    },
}

/// Runs one plan synchronously against the delivery backends.
///
/// Each stage is attempted independently; failures are logged and returned
/// as `Failed` outcomes.
pub fn execute_plan(
    notifier: &dyn Notifier,
    calendar: Option<&dyn CalendarSink>,
    plan: &ReminderPlan,
) -> Vec<ReminderOutcome> {
    let id = plan.id().to_string();
    let host = url_host(&id).to_string();
    let mut outcomes = Vec::with_capacity(3);

    match notifier.cancel(&id) {
        Ok(()) => {
            info!("event=reminder_cancel module=service status=ok host={host}");
            outcomes.push(ReminderOutcome::Cancelled { id: id.clone() });
        }
        Err(err) => outcomes.push(failed(&id, &host, ReminderStage::Cancel, err)),
    }

    let ReminderPlan::Schedule {
        request,
        calendar: event,
    } = plan
    else {
        return outcomes;
    };

    match notifier.schedule(request) {
        Ok(()) => {
            info!(
                "event=reminder_schedule module=service status=ok host={host} fire_at_ms={}",
                request.fire_at_ms
            );
            outcomes.push(ReminderOutcome::Scheduled {
                id: id.clone(),
                fire_at_ms: request.fire_at_ms,
            });
        }
        Err(err) => outcomes.push(failed(&id, &host, ReminderStage::Schedule, err)),
    }

    if let (Some(sink), Some(event)) = (calendar, event) {
        match sink.create_event(event) {
            Ok(()) => {
                info!("event=calendar_mirror module=service status=ok host={host}");
                outcomes.push(ReminderOutcome::CalendarMirrored { id: id.clone() });
            }
            Err(err) => outcomes.push(failed(&id, &host, ReminderStage::Calendar, err)),
        }
    }

    outcomes
}

fn failed(id: &str, host: &str, stage: ReminderStage, error: DeliveryError) -> ReminderOutcome {
    warn!(
        "event=reminder_{} module=service status=error host={} error_code={} error={}",
        stage.as_str(),
        host,
        error.code,
        error.message
    );
    ReminderOutcome::Failed {
        id: id.to_string(),
        stage,
        error,
    }
}

enum WorkerRequest {
    Authorize,
    Apply(ReminderPlan),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget front end over a serial delivery worker.
///
/// Clones share the same worker.
#[derive(Clone)]
pub struct ReminderScheduler {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    outcomes: broadcast::Sender<ReminderOutcome>,
    clock: Arc<dyn Clock>,
    mirror_calendar: bool,
}

impl ReminderScheduler {
    /// Spawns the delivery worker on the current tokio runtime.
    ///
    /// Notification permission is requested once, before any plan runs.
    /// Calendar mirroring is enabled iff `calendar` is provided.
    pub fn spawn(
        notifier: Arc<dyn Notifier>,
        calendar: Option<Arc<dyn CalendarSink>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        let mirror_calendar = calendar.is_some();

        tokio::spawn(run_worker(
            requests_rx,
            notifier,
            calendar,
            outcomes.clone(),
        ));
        let _ = requests.send(WorkerRequest::Authorize);

        Self {
            requests,
            outcomes,
            clock,
            mirror_calendar,
        }
    }

    /// Cancels the URL's pending reminder and, when `at` is in the future,
    /// schedules a replacement. Returns without waiting for delivery.
    pub fn set_reminder(&self, target: ReminderTarget<'_>, at: Option<i64>) -> ReminderPlan {
        let plan = plan_reminder(target, at, self.clock.now_ms(), self.mirror_calendar);
        if self
            .requests
            .send(WorkerRequest::Apply(plan.clone()))
            .is_err()
        {
            error!(
                "event=reminder_dispatch module=service status=error error_code=worker_stopped host={}",
                url_host(target.url)
            );
        }
        plan
    }

    /// Subscribes to outcomes of plans submitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ReminderOutcome> {
        self.outcomes.subscribe()
    }

    /// Resolves once every plan submitted before this call has run.
    pub async fn flush(&self) {
        let (done, done_rx) = oneshot::channel();
        if self.requests.send(WorkerRequest::Flush(done)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_worker(
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    notifier: Arc<dyn Notifier>,
    calendar: Option<Arc<dyn CalendarSink>>,
    outcomes: broadcast::Sender<ReminderOutcome>,
) {
    while let Some(request) = requests.recv().await {
        match request {
            WorkerRequest::Flush(done) => {
                let _ = done.send(());
            }
            WorkerRequest::Authorize => {
                let notifier = Arc::clone(&notifier);
                match tokio::task::spawn_blocking(move || notifier.request_authorization()).await {
                    Ok(Ok(true)) => {
                        info!("event=reminder_authorization module=service status=ok granted=true")
                    }
                    Ok(Ok(false)) => warn!(
                        "event=reminder_authorization module=service status=ok granted=false"
                    ),
                    Ok(Err(err)) => {
                        let _ = outcomes.send(failed("", "-", ReminderStage::Authorization, err));
                    }
                    Err(err) => error!(
                        "event=reminder_authorization module=service status=error error_code=worker_join_failed error={}",
                        err
                    ),
                }
            }
            WorkerRequest::Apply(plan) => {
                let notifier = Arc::clone(&notifier);
                let calendar = calendar.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    execute_plan(notifier.as_ref(), calendar.as_deref(), &plan)
                })
                .await;
                match joined {
                    Ok(results) => {
                        for outcome in results {
                            let _ = outcomes.send(outcome);
                        }
                    }
                    Err(err) => error!(
                        "event=reminder_dispatch module=service status=error error_code=worker_join_failed error={}",
                        err
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{plan_reminder, ReminderPlan, ReminderTarget, DEFAULT_REMINDER_BODY};
    use crate::model::tab::{Tab, Tier};
    use uuid::Uuid;

    fn tab(note: Option<&str>) -> Tab {
        Tab {
            id: Uuid::new_v4(),
            title: "Rust docs".to_string(),
            url: "https://doc.rust-lang.org".to_string(),
            browser: "Safari".to_string(),
            note: note.map(str::to_string),
            reminder_at: None,
            tier: Tier::Focus,
        }
    }

    fn target(tab: &Tab) -> ReminderTarget<'_> {
        ReminderTarget::from(tab)
    }

    #[test]
    fn absent_or_past_times_plan_cancel_only() {
        let expected = ReminderPlan::CancelOnly {
            id: "https://doc.rust-lang.org".to_string(),
        };
        assert_eq!(plan_reminder(target(&tab(None)), None, 1_000, true), expected);
        assert_eq!(plan_reminder(target(&tab(None)), Some(999), 1_000, true), expected);
        assert_eq!(plan_reminder(target(&tab(None)), Some(1_000), 1_000, true), expected);
    }

    #[test]
    fn future_time_plans_notification_with_note_body() {
        let ReminderPlan::Schedule { request, calendar } =
            plan_reminder(target(&tab(Some("finish chapter 3"))), Some(5_000), 1_000, false)
        else {
            panic!("expected a schedule plan");
        };
        assert_eq!(request.id, "https://doc.rust-lang.org");
        assert_eq!(request.fire_at_ms, 5_000);
        assert_eq!(request.title, "Tab Reminder: Rust docs");
        assert_eq!(request.body, "finish chapter 3");
        assert!(calendar.is_none());
    }

    #[test]
    fn missing_note_uses_default_body_and_calendar_spans_one_hour() {
        let ReminderPlan::Schedule { request, calendar } =
            plan_reminder(target(&tab(None)), Some(5_000), 1_000, true)
        else {
            panic!("expected a schedule plan");
        };
        assert_eq!(request.body, DEFAULT_REMINDER_BODY);
        let event = calendar.expect("calendar mirror requested");
        assert_eq!(event.start_ms, 5_000);
        assert_eq!(event.alarm_at_ms, 5_000);
        assert_eq!(event.end_ms, 5_000 + 60 * 60 * 1000);
        assert_eq!(event.url, "https://doc.rust-lang.org");
    }

    #[test]
    fn closed_url_target_plans_with_its_url_as_title() {
        let url = "https://closed.example/page";
        let target = ReminderTarget {
            url,
            title: url,
            note: Some("follow up"),
        };
        let ReminderPlan::Schedule { request, .. } = plan_reminder(target, Some(5_000), 1_000, false)
        else {
            panic!("expected a schedule plan");
        };
        assert_eq!(request.id, url);
        assert_eq!(request.title, "Tab Reminder: https://closed.example/page");
        assert_eq!(request.body, "follow up");
    }
}
