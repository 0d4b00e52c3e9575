//! 自动化服务
//!
//! 按配置组装事件总线、转向引擎与 Hook 管理器，并提供重载入口。

use crate::config::{AutomationConfig, ConfigError};
use crate::hooks::{ActionError, EventBus, EventEmitter, HookManager};
use crate::loader::LoadError;
use crate::steering::SteeringEngine;
use crate::telemetry::MetricsRegistry;
use crate::watcher::WatchError;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// 启动错误
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Action(#[from] ActionError),
}

/// 重载结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    pub count: usize,
}

/// 重载错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReloadError {
    #[error("组件尚未初始化")]
    NotInitialized,

    #[error("组件已在配置中禁用")]
    Disabled,

    #[error("重载失败: {0}")]
    Failed(String),
}

/// 自动化服务
pub struct AutomationService {
    config: AutomationConfig,
    metrics: Arc<MetricsRegistry>,
    bus: Arc<EventBus>,
    steering: RwLock<Option<Arc<SteeringEngine>>>,
    hooks: RwLock<Option<Arc<HookManager>>>,
}

impl AutomationService {
    /// 创建服务，只构建事件总线；组件在 `start()` 中初始化
    ///
    /// 需要在 tokio 运行时中调用，异步事件与 Hook 动作依赖它。
    pub fn new(config: AutomationConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let metrics = Arc::new(MetricsRegistry::new());
        let bus = Arc::new(EventBus::new(
            config.event_bus.queue_capacity,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            metrics,
            bus,
            steering: RwLock::new(None),
            hooks: RwLock::new(None),
        })
    }

    /// 初始化启用的组件：加载定义、订阅事件、按需启动监听
    pub fn start(&self) -> Result<(), ServiceError> {
        if self.config.steering.enabled {
            let engine = Arc::new(SteeringEngine::new(
                self.config.steering.dir.clone(),
                self.metrics.clone(),
            ));
            engine.load_rules()?;
            if self.config.steering.watch {
                engine.start_watcher()?;
            }
            *self.steering.write() = Some(engine);
        } else {
            tracing::info!("[STEERING] 转向功能已禁用");
        }

        if self.config.hooks.enabled {
            let manager = Arc::new(HookManager::with_settings(
                self.config.hooks.dir.clone(),
                self.bus.clone(),
                self.metrics.clone(),
                &self.config.webhook,
                self.config.hooks.max_concurrent_actions,
            )?);
            manager.load_hooks()?;
            manager.subscribe_to_all_events();
            if self.config.hooks.watch {
                manager.start_watcher()?;
            }
            *self.hooks.write() = Some(manager);
        } else {
            tracing::info!("[HOOKS] Hook 功能已禁用");
        }

        Ok(())
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn steering(&self) -> Option<Arc<SteeringEngine>> {
        self.steering.read().clone()
    }

    pub fn hooks(&self) -> Option<Arc<HookManager>> {
        self.hooks.read().clone()
    }

    /// 绑定到本服务事件总线的发布器
    pub fn emitter(&self) -> EventEmitter {
        if self.bus.is_shut_down() {
            return EventEmitter::disabled();
        }
        EventEmitter::new(self.bus.clone())
    }

    pub fn reload_steering(&self) -> Result<ReloadSummary, ReloadError> {
        if !self.config.steering.enabled {
            return Err(ReloadError::Disabled);
        }
        let engine = self.steering().ok_or(ReloadError::NotInitialized)?;
        engine
            .load_rules()
            .map(|count| ReloadSummary { count })
            .map_err(|e| ReloadError::Failed(e.to_string()))
    }

    pub fn reload_hooks(&self) -> Result<ReloadSummary, ReloadError> {
        if !self.config.hooks.enabled {
            return Err(ReloadError::Disabled);
        }
        let manager = self.hooks().ok_or(ReloadError::NotInitialized)?;
        manager
            .load_hooks()
            .map(|count| ReloadSummary { count })
            .map_err(|e| ReloadError::Failed(e.to_string()))
    }

    /// 停止监听、取消订阅并关闭事件总线，可重复调用
    pub fn shutdown(&self) {
        if let Some(engine) = self.steering.write().take() {
            engine.stop_watcher();
        }
        if let Some(manager) = self.hooks.write().take() {
            manager.stop_watcher();
            manager.unsubscribe_all();
        }
        self.bus.shutdown();
    }
}

impl Drop for AutomationService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
