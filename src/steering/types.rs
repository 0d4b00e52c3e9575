//! 转向规则类型定义

use crate::condition::ConditionContext;
use chrono::{DateTime, Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

/// 转向规则
///
/// 每个 YAML 文件描述一条规则，加载后以 `Arc` 共享且不再修改。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SteeringRule {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub activation: ActivationRule,
    #[serde(default)]
    pub preferences: RoutePreferences,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// 规则来源文件
    #[serde(skip)]
    pub file_path: PathBuf,
}

/// 激活条件
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivationRule {
    /// 条件表达式，例如 `Intent == 'coding'`
    #[serde(default)]
    pub condition: String,
    /// 数值越大优先级越高
    #[serde(default)]
    pub priority: i32,
}

/// 路由偏好
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoutePreferences {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub primary_model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_models: Vec<String>,
    #[serde(default)]
    pub override_router: bool,
    /// 注入的系统提示词模板，支持 `{{intent}}`、`{{model}}`、`{{hour}}`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context_injection: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_settings: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_based_rules: Vec<TimeBasedRule>,
}

/// 基于时间的模型偏好
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeBasedRule {
    /// 例如 `9-17` 或 `9-11,14-17`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hours: String,
    /// 例如 `Mon-Fri` 或 `Mon,Wed,Fri`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub days: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefer_model: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

/// 路由上下文
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingContext {
    pub intent: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key_hash: String,
    #[serde(default)]
    pub content_length: u64,
    pub hour: u32,
    pub day_of_week: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Local>,
}

impl RoutingContext {
    /// 以当前本地时间创建上下文
    pub fn new(intent: impl Into<String>) -> Self {
        Self::at(intent, Local::now())
    }

    /// 以指定时间创建上下文，`hour` 与 `day_of_week` 由时间推导
    pub fn at(intent: impl Into<String>, timestamp: DateTime<Local>) -> Self {
        Self {
            intent: intent.into(),
            provider: String::new(),
            model: String::new(),
            api_key_hash: String::new(),
            content_length: 0,
            hour: timestamp.hour(),
            day_of_week: weekday_name(timestamp.weekday()).to_string(),
            metadata: Map::new(),
            timestamp,
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

    pub fn with_api_key_hash(mut self, hash: impl Into<String>) -> Self {
        self.api_key_hash = hash.into();
        self
    }

    pub fn with_content_length(mut self, len: u64) -> Self {
        self.content_length = len;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

fn weekday_name(day: chrono::Weekday) -> &'static str {
    match day {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

impl ConditionContext for RoutingContext {
    fn condition_env(&self) -> Value {
        json!({
            "Intent": self.intent,
            "Provider": self.provider,
            "Model": self.model,
            "APIKeyHash": self.api_key_hash,
            "ContentLength": self.content_length,
            "Hour": self.hour,
            "DayOfWeek": self.day_of_week,
            "Metadata": self.metadata,
            "Timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

/// 聊天消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// 转向结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SteeringDecision {
    /// 选中的模型，未指定时为 `None`
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub metadata: Option<Map<String, Value>>,
    /// 生效规则名
    pub rule: Option<String>,
    /// 命中时间规则时的原因
    pub reason: Option<String>,
}
