//! 事件发布辅助
//!
//! 把请求处理、路由决策和 Provider 健康状态转换为 Hook 事件并异步发布。
//! 未接入事件总线时所有方法都是空操作。

use super::event_bus::EventBus;
use super::types::{EventContext, HookEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// 一次路由决策及其结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoutingDecisionInfo {
    pub timestamp: DateTime<Utc>,
    pub api_key_hash: String,
    /// 请求中指定的模型
    pub model: String,
    pub intent: String,
    pub tier: String,
    /// 路由选中的模型，形如 `provider:model`
    pub selected_model: String,
    pub confidence: f64,
    pub latency_ms: i64,
    pub success: bool,
    pub response_time_ms: i64,
    pub quality_score: f64,
    pub error: String,
}

impl Default for RoutingDecisionInfo {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            api_key_hash: String::new(),
            model: String::new(),
            intent: String::new(),
            tier: String::new(),
            selected_model: String::new(),
            confidence: 0.0,
            latency_ms: 0,
            success: false,
            response_time_ms: 0,
            quality_score: 0.0,
            error: String::new(),
        }
    }
}

/// Provider 健康监测事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatusKind {
    ProviderUnavailable,
    HealthCheckFailed,
    QuotaWarning,
    QuotaCritical,
    ModelDiscovered,
    ProviderHealthy,
    ProviderDegraded,
    HeartbeatStarted,
    HeartbeatStopped,
}

impl ProviderStatusKind {
    /// 对应的 Hook 事件；信息类与生命周期事件不转发
    pub fn hook_event(&self) -> Option<HookEvent> {
        match self {
            ProviderStatusKind::ProviderUnavailable => Some(HookEvent::ProviderUnavailable),
            ProviderStatusKind::HealthCheckFailed => Some(HookEvent::HealthCheckFailed),
            ProviderStatusKind::QuotaWarning => Some(HookEvent::QuotaWarning),
            ProviderStatusKind::QuotaCritical => Some(HookEvent::QuotaExceeded),
            ProviderStatusKind::ModelDiscovered => Some(HookEvent::ModelDiscovered),
            ProviderStatusKind::ProviderHealthy
            | ProviderStatusKind::ProviderDegraded
            | ProviderStatusKind::HeartbeatStarted
            | ProviderStatusKind::HeartbeatStopped => None,
        }
    }
}

/// Provider 状态快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderStatus {
    pub status: String,
    pub last_check: DateTime<Utc>,
    pub response_time_ms: u64,
    pub models_count: usize,
    pub quota_used: f64,
    pub quota_limit: f64,
    #[serde(default)]
    pub error_message: String,
}

/// Provider 健康监测事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderStatusEvent {
    pub kind: ProviderStatusKind,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub status: Option<ProviderStatus>,
    #[serde(default)]
    pub previous_status: Option<ProviderStatus>,
}

/// 取模型名中 `:` 之前的 Provider 部分，没有 `:` 时返回整个字符串
pub fn extract_provider(model: &str) -> &str {
    model.split_once(':').map(|(p, _)| p).unwrap_or(model)
}

/// 构造 `request_received` 事件
pub fn request_received_event(provider: &str, model: &str, api_key_hash: &str) -> EventContext {
    EventContext::new(HookEvent::RequestReceived)
        .with_provider(provider)
        .with_model(model)
        .with_data("api_key_hash", json!(api_key_hash))
}

/// 构造 `request_failed` 事件，附带可选的路由决策信息
pub fn request_failed_event(
    provider: &str,
    model: &str,
    error_message: &str,
    decision: Option<&RoutingDecisionInfo>,
) -> EventContext {
    let mut ctx = EventContext::new(HookEvent::RequestFailed)
        .with_provider(provider)
        .with_model(model)
        .with_error_message(error_message);

    if let Some(d) = decision {
        ctx.data.insert("api_key_hash".into(), json!(d.api_key_hash));
        ctx.data.insert("intent".into(), json!(d.intent));
        ctx.data.insert("tier".into(), json!(d.tier));
        ctx.data.insert("selected_model".into(), json!(d.selected_model));
        ctx.data.insert("confidence".into(), json!(d.confidence));
        ctx.data.insert("latency_ms".into(), json!(d.latency_ms));
    }
    ctx
}

/// 构造 `routing_decision` 事件
pub fn routing_decision_event(decision: &RoutingDecisionInfo) -> EventContext {
    let data = json!({
        "api_key_hash": decision.api_key_hash,
        "model": decision.model,
        "intent": decision.intent,
        "tier": decision.tier,
        "selected_model": decision.selected_model,
        "confidence": decision.confidence,
        "latency_ms": decision.latency_ms,
        "success": decision.success,
        "response_time_ms": decision.response_time_ms,
        "quality_score": decision.quality_score,
    });

    let mut ctx = EventContext::new(HookEvent::RoutingDecision)
        .with_timestamp(decision.timestamp)
        .with_model(decision.selected_model.as_str())
        .with_provider(extract_provider(&decision.selected_model));
    if let Value::Object(data) = data {
        ctx.data = data;
    }
    if !decision.error.is_empty() {
        ctx.error_message = decision.error.clone();
    }
    ctx
}

/// 把 Provider 健康事件转换为 Hook 事件，不需要转发时返回 `None`
pub fn provider_status_event(event: &ProviderStatusEvent) -> Option<EventContext> {
    let hook_event = event.kind.hook_event()?;

    let mut ctx = EventContext::new(hook_event)
        .with_timestamp(event.timestamp)
        .with_provider(event.provider.as_str());
    ctx.data = event.data.clone();

    if let Some(status) = &event.status {
        ctx.data.insert("status".into(), json!(status.status));
        ctx.data
            .insert("last_check".into(), json!(status.last_check.to_rfc3339()));
        ctx.data
            .insert("response_time".into(), json!(status.response_time_ms));
        ctx.data.insert("models_count".into(), json!(status.models_count));
        ctx.data.insert("quota_used".into(), json!(status.quota_used));
        ctx.data.insert("quota_limit".into(), json!(status.quota_limit));
        if !status.error_message.is_empty() {
            ctx.error_message = status.error_message.clone();
        }
    }
    if let Some(previous) = &event.previous_status {
        ctx.data
            .insert("previous_status".into(), json!(previous.status));
    }
    Some(ctx)
}

/// 事件发布器
#[derive(Clone, Default)]
pub struct EventEmitter {
    bus: Option<Arc<EventBus>>,
}

impl EventEmitter {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus: Some(bus) }
    }

    /// 未接入事件总线的发布器
    pub fn disabled() -> Self {
        Self { bus: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.bus.is_some()
    }

    /// 异步发布任意事件，返回是否入队
    pub fn emit(&self, ctx: EventContext) -> bool {
        let Some(bus) = &self.bus else {
            tracing::debug!("[HOOKS] 事件总线不可用，跳过事件: {}", ctx.event);
            return false;
        };
        let event = ctx.event;
        let queued = bus.publish_async(ctx);
        if queued {
            tracing::debug!("[HOOKS] 已发布事件: {}", event);
        }
        queued
    }

    pub fn emit_request_received(&self, provider: &str, model: &str, api_key_hash: &str) -> bool {
        self.emit(request_received_event(provider, model, api_key_hash))
    }

    pub fn emit_request_failed(
        &self,
        provider: &str,
        model: &str,
        error_message: &str,
        decision: Option<&RoutingDecisionInfo>,
    ) -> bool {
        self.emit(request_failed_event(provider, model, error_message, decision))
    }

    pub fn emit_routing_decision(&self, decision: &RoutingDecisionInfo) -> bool {
        self.emit(routing_decision_event(decision))
    }

    /// 转发 Provider 健康事件；不需要转发的类型返回 `false`
    pub fn emit_provider_status(&self, event: &ProviderStatusEvent) -> bool {
        match provider_status_event(event) {
            Some(ctx) => self.emit(ctx),
            None => false,
        }
    }
}
