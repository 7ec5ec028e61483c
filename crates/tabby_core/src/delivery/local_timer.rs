//! In-process notifier backed by tokio timers.
//!
//! Pending requests live only as long as the process. A fired reminder is
//! logged and published on the channel returned by [`LocalTimerNotifier::new`].

use crate::clock::Clock;
use crate::delivery::{DeliveryError, DeliveryResult, NotificationRequest, Notifier};
use crate::model::tab::url_host;
use log::info;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Reminder delivered by a local timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredReminder {
    pub id: String,
    pub title: String,
    pub body: String,
    pub fire_at_ms: i64,
}

struct PendingTimer {
    generation: u64,
    task: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingTimer>>>;

pub struct LocalTimerNotifier {
    runtime: Handle,
    clock: Arc<dyn Clock>,
    pending: PendingMap,
    next_generation: AtomicU64,
    fired: mpsc::UnboundedSender<FiredReminder>,
}

impl LocalTimerNotifier {
    /// Creates a notifier whose timers run on `runtime`.
    pub fn new(
        runtime: Handle,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<FiredReminder>) {
        let (fired, fired_rx) = mpsc::unbounded_channel();
        let notifier = Self {
            runtime,
            clock,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            fired,
        };
        (notifier, fired_rx)
    }

    /// Ids with a timer that has not fired yet.
    pub fn pending_ids(&self) -> Vec<String> {
        let Ok(pending) = self.pending.lock() else {
            return Vec::new();
        };
        let mut ids: Vec<String> = pending
            .iter()
            .filter(|(_, timer)| !timer.task.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn lock_pending(
        &self,
    ) -> DeliveryResult<std::sync::MutexGuard<'_, HashMap<String, PendingTimer>>> {
        self.pending
            .lock()
            .map_err(|_| DeliveryError::delivery_failed("pending timer map lock poisoned"))
    }
}

impl Notifier for LocalTimerNotifier {
    fn schedule(&self, request: &NotificationRequest) -> DeliveryResult<()> {
        let delay_ms = request.fire_at_ms.saturating_sub(self.clock.now_ms()).max(0);
        let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let pending = Arc::clone(&self.pending);
        let fired = self.fired.clone();
        let reminder = FiredReminder {
            id: request.id.clone(),
            title: request.title.clone(),
            body: request.body.clone(),
            fire_at_ms: request.fire_at_ms,
        };

        let mut timers = self.lock_pending()?;
        if let Some(previous) = timers.remove(&request.id) {
            previous.task.abort();
        }
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            info!(
                "event=reminder_fired module=delivery status=ok host={} fire_at_ms={}",
                url_host(&reminder.id),
                reminder.fire_at_ms
            );
            if let Ok(mut timers) = pending.lock() {
                if timers
                    .get(&reminder.id)
                    .is_some_and(|timer| timer.generation == generation)
                {
                    timers.remove(&reminder.id);
                }
            }
            let _ = fired.send(reminder);
        });
        timers.insert(request.id.clone(), PendingTimer { generation, task });
        Ok(())
    }

    fn cancel(&self, id: &str) -> DeliveryResult<()> {
        if let Some(previous) = self.lock_pending()?.remove(id) {
            previous.task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::LocalTimerNotifier;
    use crate::clock::Clock;
    use crate::delivery::{NotificationRequest, Notifier};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0
        }
    }

    fn request(id: &str, fire_at_ms: i64, body: &str) -> NotificationRequest {
        NotificationRequest {
            id: id.to_string(),
            fire_at_ms,
            title: "Tab Reminder: t".to_string(),
            body: body.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_same_id_replaces_the_timer() {
        let (notifier, mut fired) =
            LocalTimerNotifier::new(Handle::current(), Arc::new(FixedClock(1_000)));
        notifier.schedule(&request("https://a", 2_000, "first")).unwrap();
        notifier.schedule(&request("https://a", 3_000, "second")).unwrap();
        assert_eq!(notifier.pending_ids(), vec!["https://a".to_string()]);

        let delivered = fired.recv().await.unwrap();
        assert_eq!(delivered.body, "second");
        assert_eq!(delivered.fire_at_ms, 3_000);

        let extra = tokio::time::timeout(Duration::from_secs(60), fired.recv()).await;
        assert!(extra.is_err());
        assert!(notifier.pending_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (notifier, mut fired) =
            LocalTimerNotifier::new(Handle::current(), Arc::new(FixedClock(0)));
        notifier.schedule(&request("https://b", 500, "body")).unwrap();
        notifier.cancel("https://b").unwrap();
        notifier.cancel("https://never-scheduled").unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(60), fired.recv()).await;
        assert!(outcome.is_err());
    }
}
