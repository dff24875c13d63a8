mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use common::{MockEnforcer, RecordingNotifier, ScriptedClassifier, TestMessage};
use vigil_guard::config::{
    App, ClassifierSettings, Discord, Logging, MemorySettings, Settings, SettingsStore,
};
use vigil_guard::ledger::MemoryLedger;
use vigil_guard::rules::MemoryRules;
use vigil_guard::watch::{ContextCache, WatchTargets};
use vigil_guard::{AppContext, Collaborators};

fn settings() -> Settings {
    Settings {
        env: "test".into(),
        app: App { name: "test".into() },
        classifier: ClassifierSettings {
            endpoint: "http://localhost:0/v1/chat/completions".into(),
            model: "test-model".into(),
            api_keys: vec!["k-test".into()],
            timeout_secs: Some(1),
        },
        discord: Discord {
            token: String::new(),
            guild_id: None,
            log_channel_id: None,
            mod_log_channel_id: None,
        },
        logging: Logging { json: Some(false), level: Some("info".into()) },
    }
}

fn collaborators(
    classifier: Arc<ScriptedClassifier>,
    notifier: Arc<RecordingNotifier>,
    store: Arc<MemorySettings>,
) -> Collaborators {
    Collaborators {
        ledger: Arc::new(MemoryLedger::new()),
        rules: Arc::new(MemoryRules::default()),
        store,
        classifier,
        notifier,
        enforcement: MockEnforcer::new(),
    }
}

// Pełna ścieżka: obserwowany użytkownik -> batcher -> klasyfikator ->
// bramka -> odpowiedź + audyt.
#[tokio::test(start_paused = true)]
async fn watched_user_burst_reaches_alert_path() {
    let classifier = ScriptedClassifier::new();
    let notifier = RecordingNotifier::new();
    let store = Arc::new(MemorySettings::new());
    let app = AppContext::bootstrap(
        settings(),
        collaborators(classifier.clone(), notifier.clone(), store),
    )
    .await
    .unwrap();

    let monitor = app.monitor();
    monitor.targets().set_user(42, true, true);

    let m1 = TestMessage::new(1, 7, 42, "first message");
    let m2 = TestMessage::new(2, 7, 42, "second message");
    classifier.script(2, 90, "Rule 1: harassment");

    monitor.ingest(m1.clone()).await;
    monitor.ingest(m2.clone()).await;

    sleep(Duration::from_millis(3_100)).await;

    assert_eq!(classifier.call_count(), 1);
    assert_eq!(m2.reply_count(), 1);
    assert!(
        notifier
            .audit_titles()
            .iter()
            .any(|t| t == "AI Monitor Violation")
    );
}

#[tokio::test(start_paused = true)]
async fn unwatched_traffic_never_reaches_classifier() {
    let classifier = ScriptedClassifier::new();
    let notifier = RecordingNotifier::new();
    let store = Arc::new(MemorySettings::new());
    let app = AppContext::bootstrap(
        settings(),
        collaborators(classifier.clone(), notifier, store),
    )
    .await
    .unwrap();

    let m = TestMessage::new(1, 7, 99, "hello there");
    app.monitor().ingest(m).await;

    sleep(Duration::from_millis(3_100)).await;
    assert_eq!(classifier.call_count(), 0);
}

// Monitoring per kanał łapie każdego autora piszącego na kanale.
#[tokio::test(start_paused = true)]
async fn channel_watch_covers_all_authors() {
    let classifier = ScriptedClassifier::new();
    let notifier = RecordingNotifier::new();
    let store = Arc::new(MemorySettings::new());
    let app = AppContext::bootstrap(
        settings(),
        collaborators(classifier.clone(), notifier, store),
    )
    .await
    .unwrap();

    app.monitor().targets().set_channel(7, true, true);

    app.monitor().ingest(TestMessage::new(1, 7, 100, "one")).await;
    app.monitor().ingest(TestMessage::new(2, 7, 101, "two")).await;

    sleep(Duration::from_millis(3_100)).await;
    assert_eq!(classifier.batch_calls.lock().unwrap()[0], vec![1, 2]);
}

// Wyłączenie AI w worku ustawień zatrzymuje pipeline bez ruszania reszty.
#[tokio::test(start_paused = true)]
async fn ai_disabled_setting_stops_monitoring() {
    let classifier = ScriptedClassifier::new();
    let notifier = RecordingNotifier::new();
    let store = Arc::new(MemorySettings::new());
    store.set("aiEnabled", "false").await.unwrap();

    // przy wyłączonym AI brak kluczy nie blokuje startu
    let mut s = settings();
    s.classifier.api_keys.clear();
    let app = AppContext::bootstrap(s, collaborators(classifier.clone(), notifier, store))
        .await
        .unwrap();

    app.monitor().targets().set_user(42, true, true);
    app.monitor().ingest(TestMessage::new(1, 7, 42, "hello")).await;

    sleep(Duration::from_millis(3_100)).await;
    assert_eq!(classifier.call_count(), 0);
}

// Włączone AI bez poświadczeń = odmowa startu.
#[tokio::test]
async fn bootstrap_refuses_to_start_without_credentials() {
    let classifier = ScriptedClassifier::new();
    let notifier = RecordingNotifier::new();
    let store = Arc::new(MemorySettings::new());

    let mut s = settings();
    s.classifier.api_keys.clear();

    let res = AppContext::bootstrap(s, collaborators(classifier, notifier, store)).await;
    assert!(res.is_err());
}

#[tokio::test(start_paused = true)]
async fn reload_picks_up_dashboard_changes() {
    let classifier = ScriptedClassifier::new();
    let notifier = RecordingNotifier::new();
    let store = Arc::new(MemorySettings::new());
    let app = AppContext::bootstrap(
        settings(),
        collaborators(classifier, notifier, store.clone()),
    )
    .await
    .unwrap();

    assert_eq!(app.config.snapshot().ai_threshold, 60);
    store.set("aiThreshold", "80").await.unwrap();
    app.reload_config().await;
    assert_eq!(app.config.snapshot().ai_threshold, 80);
}

/* ===================== Cache kontekstu / cele ===================== */

#[tokio::test(start_paused = true)]
async fn context_snippet_is_bounded_and_precedes_message() {
    let cache = ContextCache::new(20, Duration::from_secs(600));
    for i in 1u64..=10 {
        cache.record(7, i, "alice", &format!("msg {i}"));
    }

    // 5 linii sprzed wiadomości #9
    let snippet = cache.before(7, 9, 5);
    let contents: Vec<&str> = snippet.iter().map(|l| l.content.as_str()).collect();
    assert_eq!(contents, vec!["msg 4", "msg 5", "msg 6", "msg 7", "msg 8"]);

    // nieznany kanał -> pusto
    assert!(cache.before(8, 1, 5).is_empty());
}

#[tokio::test(start_paused = true)]
async fn context_ring_drops_oldest_beyond_limit() {
    let cache = ContextCache::new(3, Duration::from_secs(600));
    for i in 1u64..=5 {
        cache.record(7, i, "bob", &format!("m{i}"));
    }
    let all = cache.before(7, u64::MAX, 10);
    let contents: Vec<&str> = all.iter().map(|l| l.content.as_str()).collect();
    assert_eq!(contents, vec!["m3", "m4", "m5"]);
}

#[test]
fn user_watch_takes_precedence_over_channel() {
    let targets = WatchTargets::default();
    targets.set_channel(7, true, false);
    targets.set_user(42, true, true);

    // użytkownik obserwowany z własnymi flagami
    assert!(targets.flags_for(42, 7).unwrap().detoxify);
    // inny autor na obserwowanym kanale dziedziczy flagi kanału
    assert!(!targets.flags_for(99, 7).unwrap().detoxify);
    // nic nie pasuje
    assert!(targets.flags_for(99, 8).is_none());

    targets.set_user(42, false, true);
    assert!(targets.flags_for(42, 8).is_none());
}
