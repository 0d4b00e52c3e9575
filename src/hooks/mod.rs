//! 事件驱动的 Hook 模块
//!
//! - `event_bus` 进程内发布/订阅
//! - `manager` 加载 Hook 定义并在事件到达时执行动作
//! - `actions` 内置动作处理器
//! - `emitter` 常见事件的发布辅助

pub mod actions;
pub mod emitter;
mod event_bus;
mod manager;
mod types;

pub use actions::{ActionError, ActionHandler};
pub use emitter::{
    extract_provider, EventEmitter, ProviderStatus, ProviderStatusEvent, ProviderStatusKind,
    RoutingDecisionInfo,
};
pub use event_bus::{EventBus, EventCallback, EventFilter, Subscription, DEFAULT_QUEUE_CAPACITY};
pub use manager::{default_hooks_dir, HookFileError, HookManager};
pub use types::{DryRunOutcome, EventContext, Hook, HookAction, HookDryRun, HookEvent};

#[cfg(test)]
mod tests;
