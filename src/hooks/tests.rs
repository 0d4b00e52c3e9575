//! Hook 模块测试

use super::*;
use crate::telemetry::MetricsRegistry;
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_hook(dir: &Path, file: &str, content: &str) {
    fs::write(dir.join(file), content).unwrap();
}

fn new_bus() -> (Arc<EventBus>, Arc<MetricsRegistry>) {
    let metrics = Arc::new(MetricsRegistry::new());
    (Arc::new(EventBus::new(64, metrics.clone())), metrics)
}

fn manager_for(dir: &Path) -> (Arc<HookManager>, Arc<EventBus>, Arc<MetricsRegistry>) {
    let (bus, metrics) = new_bus();
    let manager = HookManager::new(Some(dir.to_path_buf()), bus.clone(), metrics.clone()).unwrap();
    (Arc::new(manager), bus, metrics)
}

/// 注册一个计数动作，返回计数器
fn counting_action(manager: &HookManager, name: &str) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let hits = counter.clone();
    manager.register_action(
        HookAction::from(name),
        Arc::new(move |_hook: &Hook, _ctx: &EventContext| -> Result<(), ActionError> {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    counter
}

async fn wait_until(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ============================================================================
// 类型
// ============================================================================

#[test]
fn test_event_names_round_trip() {
    for event in HookEvent::ALL {
        assert_eq!(event.as_str().parse::<HookEvent>().unwrap(), event);
        let encoded = serde_json::to_value(event).unwrap();
        assert_eq!(encoded, json!(event.as_str()));
    }
    assert!("unknown_event".parse::<HookEvent>().is_err());
}

#[test]
fn test_custom_action_names() {
    assert_eq!(HookAction::from("notify_webhook"), HookAction::NotifyWebhook);
    assert_eq!(
        HookAction::from("page_oncall"),
        HookAction::Custom("page_oncall".to_string())
    );
    let hook: Hook = serde_yaml::from_str(
        "id: h\nevent: quota_warning\naction: page_oncall\nenabled: true\n",
    )
    .unwrap();
    assert_eq!(hook.action.as_str(), "page_oncall");
    assert!(hook.condition.is_empty());
}

#[test]
fn test_hook_enabled_defaults_to_false() {
    let hook: Hook = serde_yaml::from_str("id: h\nevent: request_failed\naction: log_warning\n").unwrap();
    assert!(!hook.enabled);
}

#[test]
fn test_event_context_condition_env() {
    let evaluator = crate::condition::ConditionEvaluator::new();
    let ctx = EventContext::new(HookEvent::QuotaWarning)
        .with_provider("gemini")
        .with_data("quota_used", json!(95))
        .with_error("boom");

    assert!(evaluator
        .evaluate("Provider == 'gemini' && Data.quota_used > 90", &ctx)
        .unwrap());
    assert!(evaluator.evaluate("Error == 'boom'", &ctx).unwrap());
    assert!(evaluator.evaluate("Request == nil", &ctx).unwrap());
}

// ============================================================================
// 事件总线
// ============================================================================

#[test]
fn test_publish_in_registration_order() {
    let (bus, _) = new_bus();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..3 {
        let order = order.clone();
        bus.subscribe(HookEvent::RequestFailed, move |_| order.lock().push(i));
    }
    bus.publish(&EventContext::new(HookEvent::RequestFailed));
    bus.publish(&EventContext::new(HookEvent::RequestReceived));

    assert_eq!(*order.lock(), vec![0, 1, 2]);
    assert_eq!(bus.subscriber_count(HookEvent::RequestFailed), 3);
    assert_eq!(bus.subscriber_count(HookEvent::QuotaWarning), 0);
}

#[test]
fn test_filter_skips_only_its_subscriber() {
    let (bus, _) = new_bus();
    let hits = Arc::new(AtomicUsize::new(0));

    let h = hits.clone();
    bus.subscribe_with_filter(
        HookEvent::QuotaWarning,
        move |_| {
            h.fetch_add(10, Ordering::SeqCst);
        },
        |ctx| ctx.provider == "openai",
    );
    let h = hits.clone();
    bus.subscribe(HookEvent::QuotaWarning, move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish(&EventContext::new(HookEvent::QuotaWarning).with_provider("gemini"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    bus.publish(&EventContext::new(HookEvent::QuotaWarning).with_provider("openai"));
    assert_eq!(hits.load(Ordering::SeqCst), 12);
}

#[test]
fn test_panicking_subscriber_is_isolated() {
    let (bus, metrics) = new_bus();
    let hits = Arc::new(AtomicUsize::new(0));

    bus.subscribe(HookEvent::RequestFailed, |_| panic!("subscriber failure"));
    let h = hits.clone();
    bus.subscribe(HookEvent::RequestFailed, move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish(&EventContext::new(HookEvent::RequestFailed));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.snapshot().subscriber_panics, 1);
}

#[tokio::test]
async fn test_panicking_subscriber_is_isolated_on_async_path() {
    let (bus, metrics) = new_bus();
    let seen = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe(HookEvent::QuotaExceeded, |ctx| {
        if ctx.data["n"].as_i64().unwrap_or(0) % 2 == 0 {
            panic!("subscriber failure");
        }
    });
    let sink = seen.clone();
    bus.subscribe(HookEvent::QuotaExceeded, move |ctx| {
        sink.lock().push(ctx.data["n"].as_i64().unwrap_or(-1));
    });

    for n in 0..10 {
        assert!(bus.publish_async(EventContext::new(HookEvent::QuotaExceeded).with_data("n", json!(n))));
    }

    assert!(wait_until(|| seen.lock().len() == 10).await);
    assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    assert_eq!(metrics.snapshot().subscriber_panics, 5);

    // 消费任务在 panic 之后仍然存活
    assert!(bus.publish_async(EventContext::new(HookEvent::QuotaExceeded).with_data("n", json!(11))));
    assert!(wait_until(|| seen.lock().len() == 11).await);
}

#[test]
fn test_unsubscribe_removes_only_that_registration() {
    let (bus, _) = new_bus();
    let first = bus.subscribe(HookEvent::ModelDiscovered, |_| {});
    let _second = bus.subscribe(HookEvent::ModelDiscovered, |_| {});

    assert_eq!(first.event(), HookEvent::ModelDiscovered);
    assert!(first.unsubscribe());
    assert!(!first.unsubscribe());
    assert_eq!(bus.subscriber_count(HookEvent::ModelDiscovered), 1);
}

#[test]
fn test_publish_async_without_runtime_is_inert() {
    let (bus, _) = new_bus();
    assert!(!bus.publish_async(EventContext::new(HookEvent::RequestFailed)));
}

#[tokio::test]
async fn test_publish_async_preserves_order() {
    let (bus, metrics) = new_bus();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(HookEvent::RoutingDecision, move |ctx| {
        sink.lock().push(ctx.data["n"].as_i64().unwrap_or(-1));
    });

    for n in 0..20 {
        assert!(bus.publish_async(EventContext::new(HookEvent::RoutingDecision).with_data("n", json!(n))));
    }

    assert!(wait_until(|| seen.lock().len() == 20).await);
    assert_eq!(*seen.lock(), (0..20).collect::<Vec<_>>());
    assert_eq!(metrics.snapshot().events_queued, 20);
}

#[tokio::test]
async fn test_publish_async_drops_newest_when_full() {
    let metrics = Arc::new(MetricsRegistry::new());
    let bus = EventBus::new(2, metrics.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(HookEvent::RequestReceived, move |ctx| {
        sink.lock().push(ctx.data["n"].as_i64().unwrap_or(-1));
    });

    // 当前线程运行时：消费任务在让出前不会运行
    let results: Vec<bool> = (0..3)
        .map(|n| bus.publish_async(EventContext::new(HookEvent::RequestReceived).with_data("n", json!(n))))
        .collect();
    assert_eq!(results, vec![true, true, false]);
    assert_eq!(metrics.snapshot().events_dropped, 1);

    assert!(wait_until(|| seen.lock().len() == 2).await);
    assert_eq!(*seen.lock(), vec![0, 1]);
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_inert() {
    let (bus, _) = new_bus();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    bus.subscribe(HookEvent::RequestFailed, move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    bus.shutdown();
    bus.shutdown();
    assert!(bus.is_shut_down());
    assert!(!bus.publish_async(EventContext::new(HookEvent::RequestFailed)));

    // 同步发布不受影响
    bus.publish(&EventContext::new(HookEvent::RequestFailed));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Hook 管理器
// ============================================================================

#[test]
fn test_load_only_enabled_hooks() {
    let dir = TempDir::new().unwrap();
    write_hook(
        dir.path(),
        "a.yaml",
        "id: a\nname: A\nevent: request_failed\naction: log_warning\nenabled: true\n",
    );
    write_hook(
        dir.path(),
        "b.yaml",
        "id: b\nname: B\nevent: request_failed\naction: log_warning\nenabled: false\n",
    );
    write_hook(
        dir.path(),
        "c.yml",
        "id: c\nname: C\nevent: quota_warning\naction: log_warning\nenabled: true\n",
    );
    write_hook(dir.path(), "notes.txt", "not a hook");

    let (manager, _, metrics) = manager_for(dir.path());
    assert_eq!(manager.load_hooks().unwrap(), 2);

    let ids: Vec<String> = manager.hooks().iter().map(|h| h.id.clone()).collect();
    assert_eq!(ids, vec!["a".to_string(), "c".to_string()]);
    assert!(manager.hook("b").is_none());
    assert!(manager.hook("c").unwrap().file_path.ends_with("c.yml"));
    assert_eq!(metrics.snapshot().hooks_loaded, 2);
}

#[test]
fn test_bad_hook_files_are_skipped() {
    let dir = TempDir::new().unwrap();
    write_hook(dir.path(), "broken.yaml", "id: [unterminated\n");
    write_hook(
        dir.path(),
        "bad-cond.yaml",
        "id: x\nevent: request_failed\naction: log_warning\ncondition: \"Provider ==\"\nenabled: true\n",
    );
    write_hook(
        dir.path(),
        "good.yaml",
        "id: ok\nevent: request_failed\naction: log_warning\nenabled: true\n",
    );

    let (manager, _, metrics) = manager_for(dir.path());
    assert_eq!(manager.load_hooks().unwrap(), 1);
    assert_eq!(metrics.snapshot().hooks_skipped, 2);
}

#[test]
fn test_load_creates_missing_dir() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("nested").join("hooks");
    let (manager, _, _) = manager_for(&dir);
    assert_eq!(manager.load_hooks().unwrap(), 0);
    assert!(dir.is_dir());
    assert_eq!(manager.hooks_dir(), dir.as_path());
}

#[test]
fn test_default_hooks_dir() {
    let dir = default_hooks_dir();
    assert!(dir.ends_with(Path::new(".switchailocal").join("hooks")));
}

#[tokio::test]
async fn test_matching_hook_runs_action() {
    let dir = TempDir::new().unwrap();
    write_hook(
        dir.path(),
        "notify.yaml",
        r#"
id: notify-groq
name: Notify Groq failures
event: request_failed
condition: "Provider == 'groq'"
action: count_me
enabled: true
"#,
    );

    let (manager, bus, metrics) = manager_for(dir.path());
    let counter = counting_action(&manager, "count_me");
    manager.load_hooks().unwrap();
    manager.subscribe_to_all_events();

    bus.publish(&EventContext::new(HookEvent::RequestFailed).with_provider("openai"));
    bus.publish(&EventContext::new(HookEvent::RequestFailed).with_provider("groq"));
    bus.publish(&EventContext::new(HookEvent::QuotaWarning).with_provider("groq"));

    assert!(wait_until(|| counter.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.hooks_triggered, 1);
    assert_eq!(snapshot.actions_succeeded, 1);
}

#[tokio::test]
async fn test_subscribe_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write_hook(
        dir.path(),
        "h.yaml",
        "id: h\nevent: model_discovered\naction: count_me\nenabled: true\n",
    );

    let (manager, bus, _) = manager_for(dir.path());
    let counter = counting_action(&manager, "count_me");
    manager.load_hooks().unwrap();
    manager.subscribe_to_all_events();
    manager.subscribe_to_all_events();

    for event in HookEvent::ALL {
        assert_eq!(bus.subscriber_count(event), 1);
    }

    bus.publish(&EventContext::new(HookEvent::ModelDiscovered));
    assert!(wait_until(|| counter.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    manager.unsubscribe_all();
    assert_eq!(bus.subscriber_count(HookEvent::ModelDiscovered), 0);
}

#[tokio::test]
async fn test_reload_does_not_need_resubscribe() {
    let dir = TempDir::new().unwrap();
    let (manager, bus, _) = manager_for(dir.path());
    let counter = counting_action(&manager, "count_me");
    manager.load_hooks().unwrap();
    manager.subscribe_to_all_events();

    write_hook(
        dir.path(),
        "late.yaml",
        "id: late\nevent: health_check_failed\naction: count_me\nenabled: true\n",
    );
    manager.load_hooks().unwrap();

    bus.publish(&EventContext::new(HookEvent::HealthCheckFailed));
    assert!(wait_until(|| counter.load(Ordering::SeqCst) == 1).await);
}

#[tokio::test]
async fn test_failing_and_unhandled_actions_are_counted() {
    let dir = TempDir::new().unwrap();
    write_hook(
        dir.path(),
        "fail.yaml",
        "id: fail\nevent: request_failed\naction: prefer_provider\nenabled: true\n",
    );
    write_hook(
        dir.path(),
        "missing.yaml",
        "id: missing\nevent: request_failed\naction: nobody_handles_this\nenabled: true\n",
    );

    let (manager, bus, metrics) = manager_for(dir.path());
    manager.load_hooks().unwrap();
    manager.subscribe_to_all_events();
    bus.publish(&EventContext::new(HookEvent::RequestFailed));

    assert!(
        wait_until(|| {
            let s = metrics.snapshot();
            s.actions_failed == 1 && s.actions_unhandled == 1
        })
        .await
    );
}

#[tokio::test]
async fn test_condition_error_counts_as_no_match() {
    let dir = TempDir::new().unwrap();
    write_hook(
        dir.path(),
        "typed.yaml",
        "id: typed\nevent: quota_warning\naction: count_me\ncondition: \"Data.quota_used > 'high'\"\nenabled: true\n",
    );

    let (manager, bus, metrics) = manager_for(dir.path());
    let counter = counting_action(&manager, "count_me");
    manager.load_hooks().unwrap();
    manager.subscribe_to_all_events();

    bus.publish(&EventContext::new(HookEvent::QuotaWarning).with_data("quota_used", json!(90)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(metrics.snapshot().condition_errors, 1);
}

#[tokio::test]
async fn test_bounded_action_concurrency() {
    let dir = TempDir::new().unwrap();
    for i in 0..4 {
        write_hook(
            dir.path(),
            &format!("slow{}.yaml", i),
            &format!("id: slow{}\nevent: request_received\naction: slow\nenabled: true\n", i),
        );
    }

    let (bus, metrics) = new_bus();
    let manager = Arc::new(
        HookManager::with_settings(
            Some(dir.path().to_path_buf()),
            bus.clone(),
            metrics.clone(),
            &crate::config::WebhookConfig::default(),
            Some(1),
        )
        .unwrap(),
    );

    struct Slow {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ActionHandler for Slow {
        async fn handle(&self, _hook: &Hook, _ctx: &EventContext) -> Result<(), ActionError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let slow = Arc::new(Slow {
        running: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    manager.register_action(HookAction::from("slow"), slow.clone());
    manager.load_hooks().unwrap();
    manager.subscribe_to_all_events();

    bus.publish(&EventContext::new(HookEvent::RequestReceived));
    assert!(wait_until(|| metrics.snapshot().actions_succeeded == 4).await);
    assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
}

#[test]
fn test_set_hook_enabled_rewrites_file() {
    let dir = TempDir::new().unwrap();
    write_hook(
        dir.path(),
        "toggle.yaml",
        "id: toggle\nname: Toggle\nevent: quota_exceeded\naction: log_warning\nparams:\n  message: over quota\nenabled: false\n",
    );

    let (manager, _, _) = manager_for(dir.path());
    assert_eq!(manager.load_hooks().unwrap(), 0);

    let path = manager.set_hook_enabled("toggle", true).unwrap();
    assert!(path.ends_with("toggle.yaml"));
    assert_eq!(manager.load_hooks().unwrap(), 1);

    let hook = manager.hook("toggle").unwrap();
    assert_eq!(hook.param_str("message"), Some("over quota"));

    manager.set_hook_enabled("toggle", false).unwrap();
    assert_eq!(manager.load_hooks().unwrap(), 0);

    assert!(matches!(
        manager.set_hook_enabled("ghost", true),
        Err(HookFileError::NotFound(_))
    ));
}

#[test]
fn test_dry_run_reports_every_hook() {
    let dir = TempDir::new().unwrap();
    write_hook(
        dir.path(),
        "a.yaml",
        "id: a\nevent: request_failed\naction: log_warning\ncondition: \"Provider == 'groq'\"\nenabled: true\n",
    );
    write_hook(
        dir.path(),
        "b.yaml",
        "id: b\nevent: request_failed\naction: log_warning\ncondition: \"Provider == 'openai'\"\nenabled: true\n",
    );
    write_hook(
        dir.path(),
        "c.yaml",
        "id: c\nevent: request_failed\naction: log_warning\nenabled: false\n",
    );
    write_hook(
        dir.path(),
        "d.yaml",
        "id: d\nevent: quota_warning\naction: log_warning\nenabled: true\n",
    );
    write_hook(
        dir.path(),
        "e.yaml",
        "id: e\nevent: request_failed\naction: notify_webhook\ncondition: \"Data.count > 'x'\"\nenabled: true\n",
    );

    let (manager, _, _) = manager_for(dir.path());
    let ctx = EventContext::new(HookEvent::RequestFailed)
        .with_provider("groq")
        .with_data("count", json!(3));
    let report = manager.dry_run(&ctx).unwrap();

    let outcomes: Vec<(String, DryRunOutcome)> = report
        .iter()
        .map(|r| (r.hook_id.clone(), r.outcome.clone()))
        .collect();
    assert_eq!(outcomes[0], ("a".to_string(), DryRunOutcome::ConditionMet));
    assert_eq!(outcomes[1], ("b".to_string(), DryRunOutcome::ConditionNotMet));
    assert_eq!(outcomes[2], ("c".to_string(), DryRunOutcome::Disabled));
    assert_eq!(outcomes[3], ("d".to_string(), DryRunOutcome::EventMismatch));
    assert!(matches!(outcomes[4].1, DryRunOutcome::ConditionFailed(_)));

    assert!(report[0].would_trigger());
    assert_eq!(report[4].action, "notify_webhook");

    let encoded = serde_json::to_value(&report[0]).unwrap();
    assert_eq!(encoded["outcome"], "condition_met");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_reloads_hooks() {
    let dir = TempDir::new().unwrap();
    let (manager, _, _) = manager_for(dir.path());
    manager.load_hooks().unwrap();

    manager.start_watcher().unwrap();
    manager.start_watcher().unwrap();
    assert!(manager.is_watching());

    write_hook(
        dir.path(),
        "hot.yaml",
        "id: hot\nevent: request_failed\naction: log_warning\nenabled: true\n",
    );

    let mut loaded = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if manager.hook("hot").is_some() {
            loaded = true;
            break;
        }
    }
    assert!(loaded, "watcher should pick up the new hook");

    manager.stop_watcher();
    manager.stop_watcher();
    assert!(!manager.is_watching());
}

proptest! {
    /// **Feature: steering-hooks, Property 9: 只有启用的 Hook 被加载**
    /// *对于任意* 启用标记组合，加载数量等于启用的 Hook 数
    #[test]
    fn prop_only_enabled_hooks_loaded(flags in prop::collection::vec(any::<bool>(), 0..10)) {
        let dir = TempDir::new().unwrap();
        for (i, enabled) in flags.iter().enumerate() {
            write_hook(
                dir.path(),
                &format!("h{:02}.yaml", i),
                &format!("id: h{}\nevent: request_failed\naction: log_warning\nenabled: {}\n", i, enabled),
            );
        }

        let (manager, _, _) = manager_for(dir.path());
        let expected = flags.iter().filter(|f| **f).count();
        prop_assert_eq!(manager.load_hooks().unwrap(), expected);
        prop_assert!(manager.hooks().iter().all(|h| h.enabled));
    }

    /// **Feature: steering-hooks, Property 10: 同步发布按注册顺序到达**
    #[test]
    fn prop_publish_reaches_all_in_order(count in 1usize..12) {
        let (bus, _) = new_bus();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..count {
            let order = order.clone();
            bus.subscribe(HookEvent::RoutingDecision, move |_| order.lock().push(i));
        }
        bus.publish(&EventContext::new(HookEvent::RoutingDecision));
        prop_assert_eq!(order.lock().clone(), (0..count).collect::<Vec<_>>());
    }
}
