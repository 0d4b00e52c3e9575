//! 事件总线
//!
//! 进程内发布/订阅：
//! - `publish` 在调用线程上按注册顺序同步分发
//! - `publish_async` 写入有界队列，由单个后台任务按顺序消费；队列满时丢弃新事件
//! - 单个订阅者 panic 不影响其他订阅者

use super::types::{EventContext, HookEvent};
use crate::telemetry::MetricsRegistry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 默认异步队列容量
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// 订阅回调
pub type EventCallback = Arc<dyn Fn(&EventContext) + Send + Sync>;

/// 订阅过滤器，返回 `false` 时跳过该订阅者
pub type EventFilter = Arc<dyn Fn(&EventContext) -> bool + Send + Sync>;

struct Subscriber {
    id: String,
    callback: EventCallback,
    filter: Option<EventFilter>,
}

struct Registry {
    subscribers: RwLock<HashMap<HookEvent, Vec<Arc<Subscriber>>>>,
    metrics: Arc<MetricsRegistry>,
}

impl Registry {
    fn publish(&self, ctx: &EventContext) {
        // 复制订阅者列表，回调执行期间不持锁
        let subscribers = match self.subscribers.read().get(&ctx.event) {
            Some(subs) => subs.clone(),
            None => Vec::new(),
        };
        self.metrics.events_published.inc();

        for sub in subscribers {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let accepted = match &sub.filter {
                    Some(filter) => filter(ctx),
                    None => true,
                };
                if accepted {
                    (sub.callback)(ctx);
                }
            }));

            if outcome.is_err() {
                self.metrics.subscriber_panics.inc();
                tracing::error!(
                    "[EVENT_BUS] 订阅者 {} 处理事件 {} 时发生 panic",
                    sub.id,
                    ctx.event
                );
            }
        }
    }

    fn remove(&self, event: HookEvent, id: &str) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(subs) = subscribers.get_mut(&event) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        before != subs.len()
    }
}

/// 订阅句柄
///
/// 只移除本次注册，总线释放后调用为空操作。
pub struct Subscription {
    id: String,
    event: HookEvent,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event(&self) -> HookEvent {
        self.event
    }

    /// 取消订阅，返回是否确实移除了订阅者
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.event, &self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event", &self.event)
            .finish()
    }
}

/// 事件总线
pub struct EventBus {
    registry: Arc<Registry>,
    sender: RwLock<Option<mpsc::Sender<EventContext>>>,
    cancel: CancellationToken,
    shut_down: AtomicBool,
}

impl EventBus {
    /// 创建事件总线
    ///
    /// 在 tokio 运行时内创建时启动异步消费任务；否则只支持同步 `publish`。
    ///
    /// # Arguments
    /// * `capacity` - 异步队列容量
    /// * `metrics` - 共享计数器
    pub fn new(capacity: usize, metrics: Arc<MetricsRegistry>) -> Self {
        let registry = Arc::new(Registry {
            subscribers: RwLock::new(HashMap::new()),
            metrics,
        });
        let cancel = CancellationToken::new();

        let sender = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let (tx, mut rx) = mpsc::channel::<EventContext>(capacity.max(1));
                let worker_registry = registry.clone();
                let worker_cancel = cancel.clone();
                handle.spawn(async move {
                    loop {
                        tokio::select! {
                            biased;
                            _ = worker_cancel.cancelled() => break,
                            event = rx.recv() => match event {
                                Some(event) => worker_registry.publish(&event),
                                None => break,
                            },
                        }
                    }
                    tracing::debug!("[EVENT_BUS] 异步队列消费任务退出");
                });
                Some(tx)
            }
            Err(_) => {
                tracing::warn!("[EVENT_BUS] 未在 tokio 运行时中创建，异步发布不可用");
                None
            }
        };

        Self {
            registry,
            sender: RwLock::new(sender),
            cancel,
            shut_down: AtomicBool::new(false),
        }
    }

    /// 使用默认容量与独立计数器创建
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, Arc::new(MetricsRegistry::new()))
    }

    /// 订阅事件
    pub fn subscribe<F>(&self, event: HookEvent, callback: F) -> Subscription
    where
        F: Fn(&EventContext) + Send + Sync + 'static,
    {
        self.register(event, Arc::new(callback), None)
    }

    /// 带过滤器订阅事件
    pub fn subscribe_with_filter<F, P>(&self, event: HookEvent, callback: F, filter: P) -> Subscription
    where
        F: Fn(&EventContext) + Send + Sync + 'static,
        P: Fn(&EventContext) -> bool + Send + Sync + 'static,
    {
        self.register(event, Arc::new(callback), Some(Arc::new(filter)))
    }

    fn register(
        &self,
        event: HookEvent,
        callback: EventCallback,
        filter: Option<EventFilter>,
    ) -> Subscription {
        let id = Uuid::new_v4().to_string();
        self.registry
            .subscribers
            .write()
            .entry(event)
            .or_default()
            .push(Arc::new(Subscriber {
                id: id.clone(),
                callback,
                filter,
            }));

        Subscription {
            id,
            event,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// 同步分发事件
    pub fn publish(&self, ctx: &EventContext) {
        self.registry.publish(ctx);
    }

    /// 异步分发事件，从不阻塞
    ///
    /// 返回事件是否入队；关闭后或队列满时返回 `false`。
    pub fn publish_async(&self, ctx: EventContext) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            return false;
        }

        let sender = self.sender.read();
        let Some(tx) = sender.as_ref() else {
            return false;
        };

        match tx.try_send(ctx) {
            Ok(()) => {
                self.registry.metrics.events_queued.inc();
                true
            }
            Err(TrySendError::Full(ctx)) => {
                self.registry.metrics.events_dropped.inc();
                tracing::warn!("[EVENT_BUS] 事件队列已满，丢弃事件: {}", ctx.event);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// 某事件当前的订阅者数量
    pub fn subscriber_count(&self, event: HookEvent) -> usize {
        self.registry
            .subscribers
            .read()
            .get(&event)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// 关闭异步队列，可重复调用
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.sender.write().take();
        tracing::info!("[EVENT_BUS] 事件总线已关闭");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
