//! Webhook 动作
//!
//! - URL 必须是 https，或 `http://localhost` 用于本地调试
//! - 每个 URL 独立的滚动窗口限流
//! - 可选 HMAC-SHA256 签名，写入 `X-Hook-Signature`
//! - 固定退避重试

use super::{ActionError, ActionHandler};
use crate::config::WebhookConfig;
use crate::hooks::types::{EventContext, Hook};
use crate::logger::sanitize_log_message;
use crate::telemetry::MetricsRegistry;
use async_trait::async_trait;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// 签名请求头
pub const SIGNATURE_HEADER: &str = "X-Hook-Signature";

/// 构造 Webhook 请求体
pub fn build_payload(hook: &Hook, ctx: &EventContext) -> Value {
    let mut payload = json!({
        "event": ctx.event.as_str(),
        "timestamp": ctx.timestamp.to_rfc3339(),
        "hook_id": hook.id,
        "data": ctx.data,
    });

    if !ctx.provider.is_empty() {
        payload["provider"] = json!(ctx.provider);
    }
    if !ctx.model.is_empty() {
        payload["model"] = json!(ctx.model);
    }
    if ctx.request.is_some() {
        // 请求体本身不含意图，从事件数据中取
        if let Some(intent) = ctx.data.get("intent").and_then(Value::as_str) {
            payload["request_intent"] = json!(intent);
        }
        payload["selected_model"] = json!(ctx.model);
    }
    if !ctx.error_message.is_empty() {
        payload["error"] = json!(ctx.error_message);
    }
    payload
}

/// 计算 `sha256=<hex>` 形式的签名
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, ActionError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| ActionError::Custom(format!("invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

fn is_allowed_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://localhost")
}

/// Webhook 处理器
///
/// 整个进程共享一个实例，限流状态按 URL 隔离。
pub struct WebhookHandler {
    client: reqwest::Client,
    config: WebhookConfig,
    limiters: DashMap<String, Arc<Mutex<VecDeque<Instant>>>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl WebhookHandler {
    pub fn new(config: WebhookConfig) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .timeout(config.attempt_timeout())
            .build()
            .map_err(|e| ActionError::Http(e.to_string()))?;

        Ok(Self {
            client,
            config,
            limiters: DashMap::new(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// 滚动窗口限流，返回是否放行
    pub fn check_rate_limit(&self, url: &str) -> bool {
        let window = self
            .limiters
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .value()
            .clone();

        let mut calls = window.lock();
        let now = Instant::now();
        let span = self.config.window();
        while let Some(front) = calls.front() {
            if now.duration_since(*front) >= span {
                calls.pop_front();
            } else {
                break;
            }
        }

        if calls.len() >= self.config.max_calls_per_window {
            return false;
        }
        calls.push_back(now);
        true
    }

    /// 发送请求体，按退避序列重试
    ///
    /// 首个状态码 < 400 的响应视为成功。
    pub async fn deliver(
        &self,
        url: &str,
        secret: Option<&str>,
        payload: &Value,
    ) -> Result<(), ActionError> {
        let body = serde_json::to_vec(payload)?;
        let signature = match secret {
            Some(secret) => Some(sign_payload(secret, &body)?),
            None => None,
        };

        let backoff = self.config.backoff();
        let attempts = backoff.len() + 1;
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(backoff[attempt - 1]).await;
            }
            if let Some(metrics) = &self.metrics {
                metrics.webhook_attempts.inc();
            }

            let mut request = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .header(USER_AGENT, self.config.user_agent.as_str())
                .body(body.clone());
            if let Some(signature) = &signature {
                request = request.header(SIGNATURE_HEADER, signature.as_str());
            }

            match request.send().await {
                Ok(response) if response.status().as_u16() < 400 => return Ok(()),
                Ok(response) => {
                    last_error = format!("status {}", response.status().as_u16());
                    tracing::warn!(
                        "[WEBHOOK] 第 {} 次请求失败，状态码: {}",
                        attempt + 1,
                        response.status().as_u16()
                    );
                }
                Err(e) => {
                    last_error = sanitize_log_message(&e.to_string());
                    tracing::warn!("[WEBHOOK] 第 {} 次请求失败: {}", attempt + 1, last_error);
                }
            }
        }

        Err(ActionError::WebhookExhausted {
            attempts,
            last_error,
        })
    }
}

#[async_trait]
impl ActionHandler for WebhookHandler {
    async fn handle(&self, hook: &Hook, ctx: &EventContext) -> Result<(), ActionError> {
        let url = hook.param_str("url").ok_or(ActionError::MissingParam("url"))?;
        if !is_allowed_url(url) {
            return Err(ActionError::InsecureUrl(url.to_string()));
        }

        if !self.check_rate_limit(url) {
            if let Some(metrics) = &self.metrics {
                metrics.webhook_rate_limited.inc();
            }
            return Err(ActionError::RateLimited(url.to_string()));
        }

        let payload = build_payload(hook, ctx);
        self.deliver(url, hook.param_str("secret"), &payload).await
    }
}
