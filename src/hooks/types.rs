//! Hook 类型定义

use crate::condition::ConditionContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// 可触发 Hook 的事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    RequestReceived,
    RequestFailed,
    ProviderUnavailable,
    QuotaWarning,
    QuotaExceeded,
    ModelDiscovered,
    HealthCheckFailed,
    RoutingDecision,
}

impl HookEvent {
    /// 全部事件类型
    pub const ALL: [HookEvent; 8] = [
        HookEvent::RequestReceived,
        HookEvent::RequestFailed,
        HookEvent::ProviderUnavailable,
        HookEvent::QuotaWarning,
        HookEvent::QuotaExceeded,
        HookEvent::ModelDiscovered,
        HookEvent::HealthCheckFailed,
        HookEvent::RoutingDecision,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::RequestReceived => "request_received",
            HookEvent::RequestFailed => "request_failed",
            HookEvent::ProviderUnavailable => "provider_unavailable",
            HookEvent::QuotaWarning => "quota_warning",
            HookEvent::QuotaExceeded => "quota_exceeded",
            HookEvent::ModelDiscovered => "model_discovered",
            HookEvent::HealthCheckFailed => "health_check_failed",
            HookEvent::RoutingDecision => "routing_decision",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookEvent::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("未知事件类型: {}", s))
    }
}

/// Hook 触发后执行的动作
///
/// 除内置动作外，运行时注册的处理器以 `Custom` 表示。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HookAction {
    RetryWithFallback,
    NotifyWebhook,
    PreferProvider,
    LogWarning,
    RotateCredential,
    RestartProvider,
    RunCommand,
    Custom(String),
}

impl HookAction {
    pub fn as_str(&self) -> &str {
        match self {
            HookAction::RetryWithFallback => "retry_with_fallback",
            HookAction::NotifyWebhook => "notify_webhook",
            HookAction::PreferProvider => "prefer_provider",
            HookAction::LogWarning => "log_warning",
            HookAction::RotateCredential => "rotate_credential",
            HookAction::RestartProvider => "restart_provider",
            HookAction::RunCommand => "run_command",
            HookAction::Custom(name) => name,
        }
    }
}

impl From<String> for HookAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "retry_with_fallback" => HookAction::RetryWithFallback,
            "notify_webhook" => HookAction::NotifyWebhook,
            "prefer_provider" => HookAction::PreferProvider,
            "log_warning" => HookAction::LogWarning,
            "rotate_credential" => HookAction::RotateCredential,
            "restart_provider" => HookAction::RestartProvider,
            "run_command" => HookAction::RunCommand,
            _ => HookAction::Custom(value),
        }
    }
}

impl From<&str> for HookAction {
    fn from(value: &str) -> Self {
        HookAction::from(value.to_string())
    }
}

impl From<HookAction> for String {
    fn from(action: HookAction) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for HookAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 自动化 Hook 定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hook {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub event: HookEvent,
    #[serde(default)]
    pub condition: String,
    pub action: HookAction,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub enabled: bool,
    /// 来源文件
    #[serde(skip)]
    pub file_path: PathBuf,
}

impl Hook {
    /// 读取字符串参数，空串视为缺失
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// 事件上下文
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventContext {
    pub event: HookEvent,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    /// 底层错误描述
    #[serde(skip)]
    pub error: Option<String>,
    #[serde(default, rename = "error", skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

impl EventContext {
    pub fn new(event: HookEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
            data: Map::new(),
            request: None,
            provider: String::new(),
            model: String::new(),
            error: None,
            error_message: String::new(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_request(mut self, request: Value) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl ConditionContext for EventContext {
    fn condition_env(&self) -> Value {
        json!({
            "Event": self.event.as_str(),
            "Timestamp": self.timestamp.to_rfc3339(),
            "Data": self.data,
            "Request": self.request.clone().unwrap_or(Value::Null),
            "Provider": self.provider,
            "Model": self.model,
            "Error": self.error.clone().map(Value::String).unwrap_or(Value::Null),
            "ErrorMessage": self.error_message,
        })
    }
}

/// 试运行时单个 Hook 的判定结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum DryRunOutcome {
    /// 事件类型不匹配
    EventMismatch,
    Disabled,
    ConditionMet,
    ConditionNotMet,
    ConditionFailed(String),
}

/// 试运行报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookDryRun {
    pub hook_id: String,
    pub hook_name: String,
    pub action: String,
    pub file_path: PathBuf,
    #[serde(flatten)]
    pub outcome: DryRunOutcome,
}

impl HookDryRun {
    /// 该 Hook 在真实事件中是否会执行动作
    pub fn would_trigger(&self) -> bool {
        self.outcome == DryRunOutcome::ConditionMet
    }
}
