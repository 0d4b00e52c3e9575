//! 日志与 Provider 相关动作
//!
//! Provider 类动作只校验参数并记录意图，实际操作由外部协作者完成。

use super::{ActionError, ActionHandler};
use crate::hooks::types::{EventContext, Hook};
use async_trait::async_trait;

/// `log_warning` 的默认消息
pub const DEFAULT_WARNING_MESSAGE: &str = "Hook triggered";

pub struct LogWarningHandler;

#[async_trait]
impl ActionHandler for LogWarningHandler {
    async fn handle(&self, hook: &Hook, ctx: &EventContext) -> Result<(), ActionError> {
        let message = hook.param_str("message").unwrap_or(DEFAULT_WARNING_MESSAGE);
        tracing::warn!(
            hook_id = %hook.id,
            "[HOOKS] [Hook: {}] {} (Event: {})",
            hook.name,
            message,
            ctx.event
        );
        Ok(())
    }
}

pub struct PreferProviderHandler;

#[async_trait]
impl ActionHandler for PreferProviderHandler {
    async fn handle(&self, hook: &Hook, _ctx: &EventContext) -> Result<(), ActionError> {
        let provider = hook
            .param_str("provider")
            .ok_or(ActionError::MissingParam("provider"))?;
        tracing::info!("[HOOKS] 调整偏好，优先使用 Provider: {}", provider);
        Ok(())
    }
}

pub struct RotateCredentialHandler;

#[async_trait]
impl ActionHandler for RotateCredentialHandler {
    async fn handle(&self, hook: &Hook, ctx: &EventContext) -> Result<(), ActionError> {
        let provider = hook.param_str("provider").unwrap_or(&ctx.provider);
        tracing::info!("[HOOKS] 请求轮换 Provider 凭证: {}", provider);
        Ok(())
    }
}

pub struct RestartProviderHandler;

#[async_trait]
impl ActionHandler for RestartProviderHandler {
    async fn handle(&self, hook: &Hook, ctx: &EventContext) -> Result<(), ActionError> {
        let provider = hook.param_str("provider").unwrap_or(&ctx.provider);
        tracing::info!("[HOOKS] 请求重启 Provider: {}", provider);
        Ok(())
    }
}

pub struct RetryWithFallbackHandler;

#[async_trait]
impl ActionHandler for RetryWithFallbackHandler {
    async fn handle(&self, hook: &Hook, ctx: &EventContext) -> Result<(), ActionError> {
        tracing::info!(
            "[HOOKS] 请求使用备用路由重试 (hook: {}, model: {})",
            hook.id,
            ctx.model
        );
        Ok(())
    }
}
