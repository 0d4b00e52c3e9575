//! Hook 管理器
//!
//! 从目录加载 Hook 定义，订阅事件总线，条件成立时在 tokio 运行时上执行动作。

use super::actions::{builtin_handlers, ActionError, ActionHandler};
use super::event_bus::{EventBus, Subscription};
use super::types::{DryRunOutcome, EventContext, Hook, HookAction, HookDryRun, HookEvent};
use crate::condition::{ConditionError, ConditionEvaluator};
use crate::config::WebhookConfig;
use crate::loader::{ensure_dir, scan_yaml_files, LoadError};
use crate::telemetry::MetricsRegistry;
use crate::watcher::{DirWatcher, WatchError, DEFAULT_DEBOUNCE};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

/// 默认 Hook 目录：`~/.switchailocal/hooks`
pub fn default_hooks_dir() -> PathBuf {
    dirs::home_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchailocal")
        .join("hooks")
}

/// 修改 Hook 文件时的错误
#[derive(Debug, Error)]
pub enum HookFileError {
    #[error("未找到 Hook: {0}")]
    NotFound(String),

    #[error("读写 Hook 文件 {path} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hook 文件 {path} 格式错误: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Load(#[from] LoadError),
}

type HookIndex = HashMap<HookEvent, Vec<Arc<Hook>>>;

/// Hook 管理器
pub struct HookManager {
    hooks_dir: PathBuf,
    /// 按事件索引的已启用 Hook，整体替换
    hooks: RwLock<Arc<HookIndex>>,
    handlers: RwLock<HashMap<HookAction, Arc<dyn ActionHandler>>>,
    evaluator: ConditionEvaluator,
    bus: Arc<EventBus>,
    subscriptions: Mutex<Vec<Subscription>>,
    runtime: Option<Handle>,
    action_limit: Option<Arc<Semaphore>>,
    watcher: Mutex<Option<DirWatcher>>,
    metrics: Arc<MetricsRegistry>,
}

impl HookManager {
    /// 使用默认 Webhook 配置创建，动作并发不限
    pub fn new(
        hooks_dir: Option<PathBuf>,
        bus: Arc<EventBus>,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self, ActionError> {
        Self::with_settings(hooks_dir, bus, metrics, &WebhookConfig::default(), None)
    }

    /// 创建 Hook 管理器并注册全部内置动作
    ///
    /// 构造时所在的 tokio 运行时用于执行动作。
    ///
    /// # Arguments
    /// * `hooks_dir` - Hook 目录，`None` 时使用默认目录
    /// * `bus` - 订阅的事件总线
    /// * `metrics` - 共享计数器
    /// * `webhook` - Webhook 动作配置
    /// * `max_concurrent_actions` - 同时执行的动作上限
    pub fn with_settings(
        hooks_dir: Option<PathBuf>,
        bus: Arc<EventBus>,
        metrics: Arc<MetricsRegistry>,
        webhook: &WebhookConfig,
        max_concurrent_actions: Option<usize>,
    ) -> Result<Self, ActionError> {
        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            tracing::warn!("[HOOKS] 未在 tokio 运行时中创建，Hook 动作不会执行");
        }

        let handlers = builtin_handlers(webhook, metrics.clone())?
            .into_iter()
            .collect::<HashMap<_, _>>();

        Ok(Self {
            hooks_dir: hooks_dir.unwrap_or_else(default_hooks_dir),
            hooks: RwLock::new(Arc::new(HashMap::new())),
            handlers: RwLock::new(handlers),
            evaluator: ConditionEvaluator::new(),
            bus,
            subscriptions: Mutex::new(Vec::new()),
            runtime,
            action_limit: max_concurrent_actions.map(|n| Arc::new(Semaphore::new(n))),
            watcher: Mutex::new(None),
            metrics,
        })
    }

    pub fn hooks_dir(&self) -> &Path {
        &self.hooks_dir
    }

    /// 解析目录下全部 Hook 文件（含未启用的）
    ///
    /// 返回解析成功的 Hook 与跳过的文件数。
    fn read_hook_files(&self) -> Result<(Vec<Hook>, usize), LoadError> {
        ensure_dir(&self.hooks_dir)?;
        let scan = scan_yaml_files(&self.hooks_dir, "HOOKS")?;
        let mut skipped = scan.skipped.len();
        let mut hooks = Vec::with_capacity(scan.files.len());

        for path in &scan.files {
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::error!("[HOOKS] 读取 Hook 文件 {} 失败: {}", path.display(), e);
                    skipped += 1;
                    continue;
                }
            };
            match serde_yaml::from_str::<Hook>(&content) {
                Ok(mut hook) => {
                    hook.file_path = path.clone();
                    hooks.push(hook);
                }
                Err(e) => {
                    tracing::error!("[HOOKS] 解析 Hook 文件 {} 失败: {}", path.display(), e);
                    skipped += 1;
                }
            }
        }
        Ok((hooks, skipped))
    }

    /// 重新加载 Hook 并原子替换当前集合
    ///
    /// 只保留 `enabled: true` 的 Hook；条件无法编译的 Hook 被跳过。返回加载数量。
    pub fn load_hooks(&self) -> Result<usize, LoadError> {
        let (parsed, mut skipped) = self.read_hook_files()?;

        let mut index: HookIndex = HashMap::new();
        let mut count = 0;
        for hook in parsed {
            if !hook.enabled {
                tracing::debug!("[HOOKS] Hook '{}' 未启用，忽略", hook.id);
                continue;
            }
            if let Err(e) = self.evaluator.validate(&hook.condition) {
                tracing::error!(
                    "[HOOKS] Hook '{}' 条件无效，已跳过 ({}): {}",
                    hook.id,
                    hook.file_path.display(),
                    e
                );
                skipped += 1;
                continue;
            }
            tracing::debug!("[HOOKS] 已加载 Hook '{}'，事件 {}", hook.name, hook.event);
            index.entry(hook.event).or_default().push(Arc::new(hook));
            count += 1;
        }

        *self.hooks.write() = Arc::new(index);
        self.evaluator.clear_cache();
        self.metrics.hooks_loaded.add(count as u64);
        self.metrics.hooks_skipped.add(skipped as u64);

        tracing::info!("[HOOKS] 成功加载 {} 个 Hook", count);
        Ok(count)
    }

    /// 订阅全部事件类型，重复调用无效果
    ///
    /// 订阅回调始终查询当前 Hook 集合，重载后无需重新订阅。
    pub fn subscribe_to_all_events(self: &Arc<Self>) {
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.is_empty() {
            return;
        }

        for event in HookEvent::ALL {
            let weak = Arc::downgrade(self);
            subscriptions.push(self.bus.subscribe(event, move |ctx| {
                if let Some(manager) = weak.upgrade() {
                    manager.handle_event(ctx);
                }
            }));
        }
        tracing::debug!("[HOOKS] 已订阅 {} 种事件", subscriptions.len());
    }

    /// 取消全部事件订阅
    pub fn unsubscribe_all(&self) {
        for subscription in self.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }
    }

    /// 分发事件：筛选条件成立的 Hook 并异步执行其动作
    pub fn handle_event(self: &Arc<Self>, ctx: &EventContext) {
        let hooks = match self.hooks.read().get(&ctx.event) {
            Some(hooks) => hooks.clone(),
            None => return,
        };

        for hook in hooks {
            match self.evaluate_condition(&hook, ctx) {
                Ok(true) => self.spawn_action(hook, ctx.clone()),
                Ok(false) => {}
                Err(e) => {
                    self.metrics.condition_errors.inc();
                    tracing::warn!("[HOOKS] Hook '{}' 条件求值失败: {}", hook.id, e);
                }
            }
        }
    }

    fn spawn_action(self: &Arc<Self>, hook: Arc<Hook>, ctx: EventContext) {
        let Some(runtime) = &self.runtime else {
            tracing::warn!("[HOOKS] 无可用运行时，跳过 Hook '{}'", hook.id);
            return;
        };

        self.metrics.hooks_triggered.inc();
        tracing::info!("[HOOKS] 执行 Hook: {} (动作: {})", hook.name, hook.action);

        let manager = self.clone();
        let limit = self.action_limit.clone();
        runtime.spawn(async move {
            let _permit = match limit {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };
            manager.execute_action(&hook, &ctx).await;
        });
    }

    /// 执行 Hook 的动作，错误只记录日志
    pub async fn execute_action(&self, hook: &Hook, ctx: &EventContext) {
        let handler = self.handlers.read().get(&hook.action).cloned();
        let Some(handler) = handler else {
            self.metrics.actions_unhandled.inc();
            tracing::warn!("[HOOKS] 动作 {} 没有注册处理器 (hook: {})", hook.action, hook.id);
            return;
        };

        match handler.handle(hook, ctx).await {
            Ok(()) => self.metrics.actions_succeeded.inc(),
            Err(e) => {
                self.metrics.actions_failed.inc();
                tracing::error!(
                    hook_id = %hook.id,
                    "[HOOKS] Hook '{}' 的动作 {} 执行失败: {}",
                    hook.name,
                    hook.action,
                    e
                );
            }
        }
    }

    /// 注册或替换动作处理器
    pub fn register_action(&self, action: HookAction, handler: Arc<dyn ActionHandler>) {
        self.handlers.write().insert(action, handler);
    }

    /// 当前已启用的 Hook，按事件类型顺序展开
    pub fn hooks(&self) -> Vec<Arc<Hook>> {
        let index = self.hooks.read().clone();
        HookEvent::ALL
            .iter()
            .filter_map(|event| index.get(event))
            .flat_map(|hooks| hooks.iter().cloned())
            .collect()
    }

    pub fn hook(&self, id: &str) -> Option<Arc<Hook>> {
        self.hooks().into_iter().find(|h| h.id == id)
    }

    pub fn evaluate_condition(
        &self,
        hook: &Hook,
        ctx: &EventContext,
    ) -> Result<bool, ConditionError> {
        self.evaluator.evaluate(&hook.condition, ctx)
    }

    /// 修改 Hook 文件中的 `enabled` 字段，返回文件路径
    ///
    /// 包含当前未启用的 Hook；修改在下次重载后生效。
    pub fn set_hook_enabled(&self, id: &str, enabled: bool) -> Result<PathBuf, HookFileError> {
        let scan = scan_yaml_files(&self.hooks_dir, "HOOKS")?;

        for path in scan.files {
            let content = fs::read_to_string(&path).map_err(|source| HookFileError::Io {
                path: path.clone(),
                source,
            })?;
            let Ok(mut doc) = serde_yaml::from_str::<serde_yaml::Value>(&content) else {
                continue;
            };
            let Some(map) = doc.as_mapping_mut() else {
                continue;
            };
            if map.get("id").and_then(serde_yaml::Value::as_str) != Some(id) {
                continue;
            }

            map.insert(
                serde_yaml::Value::from("enabled"),
                serde_yaml::Value::from(enabled),
            );
            let updated = serde_yaml::to_string(&doc).map_err(|source| HookFileError::Yaml {
                path: path.clone(),
                source,
            })?;
            fs::write(&path, updated).map_err(|source| HookFileError::Io {
                path: path.clone(),
                source,
            })?;

            tracing::info!(
                "[HOOKS] Hook '{}' 已{} ({})",
                id,
                if enabled { "启用" } else { "停用" },
                path.display()
            );
            return Ok(path);
        }

        Err(HookFileError::NotFound(id.to_string()))
    }

    /// 试运行：判断每个 Hook 对给定事件的反应，不执行动作
    pub fn dry_run(&self, ctx: &EventContext) -> Result<Vec<HookDryRun>, LoadError> {
        let (hooks, _) = self.read_hook_files()?;

        Ok(hooks
            .into_iter()
            .map(|hook| {
                let outcome = if hook.event != ctx.event {
                    DryRunOutcome::EventMismatch
                } else if !hook.enabled {
                    DryRunOutcome::Disabled
                } else {
                    match self.evaluate_condition(&hook, ctx) {
                        Ok(true) => DryRunOutcome::ConditionMet,
                        Ok(false) => DryRunOutcome::ConditionNotMet,
                        Err(e) => DryRunOutcome::ConditionFailed(e.to_string()),
                    }
                };
                HookDryRun {
                    hook_id: hook.id,
                    hook_name: hook.name,
                    action: hook.action.as_str().to_string(),
                    file_path: hook.file_path,
                    outcome,
                }
            })
            .collect())
    }

    /// 启动目录监听，文件变更后自动重载
    pub fn start_watcher(self: &Arc<Self>) -> Result<(), WatchError> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let weak = Arc::downgrade(self);
        let watcher = DirWatcher::start(
            &self.hooks_dir,
            "HOOKS",
            DEFAULT_DEBOUNCE,
            Arc::new(move || {
                let Some(manager) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = manager.load_hooks() {
                    tracing::error!("[HOOKS] 重载 Hook 失败: {}", e);
                }
            }),
        )?;
        *slot = Some(watcher);
        Ok(())
    }

    /// 停止目录监听，可重复调用
    pub fn stop_watcher(&self) {
        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }
}
