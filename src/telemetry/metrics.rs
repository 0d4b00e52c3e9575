//! 计数器注册表
//!
//! 各组件通过 `Arc<MetricsRegistry>` 共享同一份计数器，
//! 测试中可以随时 `reset()` 后再读取 `snapshot()`。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// 单调计数器
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// 转向与 Hook 系统的全部计数器
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// 成功加载的转向规则数（累计）
    pub rules_loaded: Counter,
    /// 因解析/条件/安全检查被跳过的规则文件数
    pub rules_skipped: Counter,
    pub rule_matches: Counter,
    pub steering_decisions: Counter,
    /// 条件求值失败次数（按不匹配处理）
    pub condition_errors: Counter,
    pub hooks_loaded: Counter,
    pub hooks_skipped: Counter,
    /// 条件命中并派发动作的 Hook 次数
    pub hooks_triggered: Counter,
    pub actions_succeeded: Counter,
    pub actions_failed: Counter,
    /// 未注册处理器的动作
    pub actions_unhandled: Counter,
    pub events_published: Counter,
    pub events_queued: Counter,
    /// 异步队列已满而丢弃的事件
    pub events_dropped: Counter,
    pub subscriber_panics: Counter,
    pub webhook_attempts: Counter,
    pub webhook_rate_limited: Counter,
}

/// 计数器快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub rules_loaded: u64,
    pub rules_skipped: u64,
    pub rule_matches: u64,
    pub steering_decisions: u64,
    pub condition_errors: u64,
    pub hooks_loaded: u64,
    pub hooks_skipped: u64,
    pub hooks_triggered: u64,
    pub actions_succeeded: u64,
    pub actions_failed: u64,
    pub actions_unhandled: u64,
    pub events_published: u64,
    pub events_queued: u64,
    pub events_dropped: u64,
    pub subscriber_panics: u64,
    pub webhook_attempts: u64,
    pub webhook_rate_limited: u64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> [&Counter; 17] {
        [
            &self.rules_loaded,
            &self.rules_skipped,
            &self.rule_matches,
            &self.steering_decisions,
            &self.condition_errors,
            &self.hooks_loaded,
            &self.hooks_skipped,
            &self.hooks_triggered,
            &self.actions_succeeded,
            &self.actions_failed,
            &self.actions_unhandled,
            &self.events_published,
            &self.events_queued,
            &self.events_dropped,
            &self.subscriber_panics,
            &self.webhook_attempts,
            &self.webhook_rate_limited,
        ]
    }

    /// 读取当前所有计数
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rules_loaded: self.rules_loaded.get(),
            rules_skipped: self.rules_skipped.get(),
            rule_matches: self.rule_matches.get(),
            steering_decisions: self.steering_decisions.get(),
            condition_errors: self.condition_errors.get(),
            hooks_loaded: self.hooks_loaded.get(),
            hooks_skipped: self.hooks_skipped.get(),
            hooks_triggered: self.hooks_triggered.get(),
            actions_succeeded: self.actions_succeeded.get(),
            actions_failed: self.actions_failed.get(),
            actions_unhandled: self.actions_unhandled.get(),
            events_published: self.events_published.get(),
            events_queued: self.events_queued.get(),
            events_dropped: self.events_dropped.get(),
            subscriber_panics: self.subscriber_panics.get(),
            webhook_attempts: self.webhook_attempts.get(),
            webhook_rate_limited: self.webhook_rate_limited.get(),
        }
    }

    /// 所有计数器归零
    pub fn reset(&self) {
        for counter in self.counters() {
            counter.reset();
        }
    }
}
