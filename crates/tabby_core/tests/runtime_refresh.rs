mod common;

use common::{raw, Fixture, RecordingActivator, ScriptedAdapter, NOW_MS};
use std::sync::Arc;
use std::time::Duration;
use tabby_core::runtime::spawn_runtime;
use tabby_core::{BrowserKind, RuntimeConfig, RuntimeHandle, SessionError, Tier};
use uuid::Uuid;

const REPO: &str = "https://github.com/rust-lang/rust";
const QUESTION: &str = "https://stackoverflow.com/questions/1";
const VIDEO: &str = "https://www.youtube.com/watch?v=abc";

struct Harness {
    fixture: Fixture,
    adapter: Arc<ScriptedAdapter>,
    activator: Arc<RecordingActivator>,
    handle: RuntimeHandle,
}

fn start(config: RuntimeConfig) -> Harness {
    let fixture = Fixture::new();
    let adapter = Arc::new(ScriptedAdapter::default());
    adapter.set_tabs(
        BrowserKind::Safari,
        vec![raw("Stack Overflow", QUESTION, BrowserKind::Safari)],
    );
    adapter.set_tabs(
        BrowserKind::Chrome,
        vec![
            raw("rust-lang/rust", REPO, BrowserKind::Chrome),
            raw("Video", VIDEO, BrowserKind::Chrome),
        ],
    );
    let activator = Arc::new(RecordingActivator::default());
    let (handle, _task) = spawn_runtime(
        fixture.session(),
        adapter.clone(),
        activator.clone(),
        config,
    );
    Harness {
        fixture,
        adapter,
        activator,
        handle,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_publishes_tabs_in_browser_order_with_tiers() {
    let harness = start(RuntimeConfig::manual());

    let tabs = harness.handle.refresh().await.unwrap();

    let summary: Vec<_> = tabs
        .iter()
        .map(|tab| (tab.url.as_str(), tab.browser.as_str(), tab.tier))
        .collect();
    assert_eq!(
        summary,
        vec![
            (REPO, "Google Chrome", Tier::Focus),
            (VIDEO, "Google Chrome", Tier::Chill),
            (QUESTION, "Safari", Tier::Research),
        ]
    );
    assert_eq!(harness.handle.tabs().await.unwrap(), tabs);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ids_stay_stable_across_refreshes() {
    let harness = start(RuntimeConfig::manual());

    let first = harness.handle.refresh().await.unwrap();
    harness.adapter.set_tabs(
        BrowserKind::Chrome,
        vec![
            raw("Video", VIDEO, BrowserKind::Chrome),
            raw("rust-lang/rust: PRs", REPO, BrowserKind::Chrome),
        ],
    );
    let second = harness.handle.refresh().await.unwrap();

    assert_eq!(second[0].id, first[1].id);
    assert_eq!(second[1].id, first[0].id);
    assert_eq!(second[1].title, "rust-lang/rust: PRs");
    assert_eq!(second[2].id, first[2].id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn annotation_updates_flow_through_the_handle() {
    let harness = start(RuntimeConfig::manual());
    let tabs = harness.handle.refresh().await.unwrap();
    let repo = tabs[0].id;

    harness
        .handle
        .update_note(repo, Some("review PR".to_string()))
        .await
        .unwrap();
    let tab = harness
        .handle
        .update_reminder(repo, Some(NOW_MS + 30_000))
        .await
        .unwrap();
    harness.handle.flush_reminders().await;

    assert_eq!(tab.note.as_deref(), Some("review PR"));
    assert_eq!(tab.reminder_at, Some(NOW_MS + 30_000));
    let pending = harness.fixture.notifier.pending();
    assert_eq!(pending[REPO].body, "review PR");

    let refreshed = harness.handle.refresh().await.unwrap();
    assert_eq!(refreshed[0].note.as_deref(), Some("review PR"));

    let missing = Uuid::new_v4();
    assert_eq!(
        harness.handle.update_note(missing, None).await,
        Err(SessionError::TabNotFound(missing))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabling_a_browser_removes_its_tabs() {
    let harness = start(RuntimeConfig::manual());
    harness.handle.refresh().await.unwrap();

    harness
        .handle
        .set_browser_enabled(BrowserKind::Chrome, false)
        .await
        .unwrap();
    let tabs = harness.handle.refresh().await.unwrap();

    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0].url, QUESTION);

    let browsers = harness.handle.browsers().await.unwrap();
    let chrome = browsers
        .iter()
        .find(|row| row.kind == BrowserKind::Chrome)
        .unwrap();
    assert!(!chrome.enabled);
    assert!(chrome.installed);
    let arc = browsers
        .iter()
        .find(|row| row.kind == BrowserKind::Arc)
        .unwrap();
    assert!(arc.enabled);
    assert!(!arc.installed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn requests_during_a_refresh_share_one_deferred_rerun() {
    let harness = start(RuntimeConfig::manual());
    harness
        .adapter
        .set_delay(Some(Duration::from_millis(200)));

    let first = harness.handle.clone();
    let in_flight = tokio::spawn(async move { first.refresh().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (second, third) = tokio::join!(harness.handle.refresh(), harness.handle.refresh());
    let first = in_flight.await.unwrap().unwrap();
    let second = second.unwrap();
    let third = third.unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(second, third);
    // Three browsers per cycle, two cycles.
    assert_eq!(harness.adapter.fetches(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn annotation_updates_are_served_while_a_refresh_runs() {
    let harness = start(RuntimeConfig::manual());
    let tabs = harness.handle.refresh().await.unwrap();
    harness
        .adapter
        .set_delay(Some(Duration::from_millis(400)));

    harness.handle.request_refresh();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let updated = tokio::time::timeout(
        Duration::from_millis(200),
        harness.handle.update_note(tabs[2].id, Some("answer later".to_string())),
    )
    .await
    .expect("update should not wait for the refresh")
    .unwrap();

    assert_eq!(updated.note.as_deref(), Some("answer later"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_browsers_count_as_unavailable() {
    let config = RuntimeConfig {
        fetch_timeout: Duration::from_millis(50),
        ..RuntimeConfig::manual()
    };
    let harness = start(config);
    harness
        .adapter
        .set_delay(Some(Duration::from_millis(300)));

    let tabs = harness.handle.refresh().await.unwrap();

    assert!(tabs.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn periodic_runtime_refreshes_without_requests() {
    let harness = start(RuntimeConfig::default().with_refresh_interval(Duration::from_secs(1)));

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(harness.adapter.fetches() >= 3);
    assert_eq!(harness.handle.tabs().await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn activation_dispatches_to_the_owning_browser() {
    let harness = start(RuntimeConfig::manual());
    let tabs = harness.handle.refresh().await.unwrap();

    assert!(harness.handle.activate(tabs[2].id).await.unwrap());
    let missing = Uuid::new_v4();
    assert_eq!(
        harness.handle.activate(missing).await,
        Err(SessionError::TabNotFound(missing))
    );

    for _ in 0..50 {
        if !harness.activator.requests().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        harness.activator.requests(),
        vec![(QUESTION.to_string(), BrowserKind::Safari)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handle_reports_closed_after_shutdown() {
    let harness = start(RuntimeConfig::manual());

    harness.handle.shutdown().await.unwrap();

    assert_eq!(harness.handle.tabs().await, Err(SessionError::Closed));
}
