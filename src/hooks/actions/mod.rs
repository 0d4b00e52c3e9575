//! Hook 动作处理器
//!
//! 内置动作：
//! - `log_warning` 记录告警日志
//! - `run_command` 执行白名单命令
//! - `notify_webhook` 调用 Webhook（限流、签名、重试）
//! - `prefer_provider`、`rotate_credential`、`restart_provider`、`retry_with_fallback`
//!   校验参数并记录意图

mod command;
mod provider;
mod webhook;

pub use command::{RunCommandHandler, ALLOWED_COMMANDS};
pub use provider::{
    LogWarningHandler, PreferProviderHandler, RestartProviderHandler, RetryWithFallbackHandler,
    RotateCredentialHandler,
};
pub use webhook::{build_payload, sign_payload, WebhookHandler};

use super::types::{EventContext, Hook, HookAction};
use crate::config::WebhookConfig;
use crate::telemetry::MetricsRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// 动作执行错误
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("缺少参数: {0}")]
    MissingParam(&'static str),

    #[error("insecure webhook url (must be https or localhost): {0}")]
    InsecureUrl(String),

    #[error("rate limit exceeded for webhook: {0}")]
    RateLimited(String),

    #[error("webhook failed after retries ({attempts} attempts): {last_error}")]
    WebhookExhausted { attempts: usize, last_error: String },

    #[error("HTTP 客户端错误: {0}")]
    Http(String),

    #[error("空命令")]
    EmptyCommand,

    #[error("命令 '{0}' 不在白名单中")]
    CommandNotAllowed(String),

    #[error("命令执行失败: {status}, 输出: {output}")]
    CommandFailed { status: String, output: String },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

/// 动作处理器
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, hook: &Hook, ctx: &EventContext) -> Result<(), ActionError>;
}

/// 同步闭包可直接作为处理器注册
#[async_trait]
impl<F> ActionHandler for F
where
    F: Fn(&Hook, &EventContext) -> Result<(), ActionError> + Send + Sync,
{
    async fn handle(&self, hook: &Hook, ctx: &EventContext) -> Result<(), ActionError> {
        self(hook, ctx)
    }
}

/// 全部内置动作处理器
///
/// Webhook 处理器只创建一份，限流状态在所有 Hook 之间共享。
pub fn builtin_handlers(
    webhook: &WebhookConfig,
    metrics: Arc<MetricsRegistry>,
) -> Result<Vec<(HookAction, Arc<dyn ActionHandler>)>, ActionError> {
    let webhook_handler: Arc<dyn ActionHandler> =
        Arc::new(WebhookHandler::new(webhook.clone())?.with_metrics(metrics));
    Ok(vec![
        (HookAction::LogWarning, Arc::new(LogWarningHandler)),
        (HookAction::NotifyWebhook, webhook_handler),
        (HookAction::RunCommand, Arc::new(RunCommandHandler::default())),
        (HookAction::RetryWithFallback, Arc::new(RetryWithFallbackHandler)),
        (HookAction::PreferProvider, Arc::new(PreferProviderHandler)),
        (HookAction::RotateCredential, Arc::new(RotateCredentialHandler)),
        (HookAction::RestartProvider, Arc::new(RestartProviderHandler)),
    ])
}
