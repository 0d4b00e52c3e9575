//! 上下文注入
//!
//! 纯函数：不修改入参，返回新的消息列表/元数据。

use super::types::{ChatMessage, RoutingContext};
use serde_json::{Map, Value};

/// Provider 设置写入元数据时的键前缀
pub const PROVIDER_SETTING_PREFIX: &str = "steering_";

/// 注入系统提示词
///
/// - 空提示词不做任何修改
/// - 首条消息为 system 时，提示词拼接在其内容之前
/// - 否则在最前面插入一条新的 system 消息
pub fn inject_system_prompt(messages: &[ChatMessage], prompt: &str) -> Vec<ChatMessage> {
    if prompt.is_empty() {
        return messages.to_vec();
    }

    let mut result = messages.to_vec();
    match result.first_mut() {
        Some(first) if first.role == "system" => {
            first.content = format!("{}\n\n{}", prompt, first.content);
        }
        _ => result.insert(0, ChatMessage::system(prompt)),
    }
    result
}

/// 把 Provider 设置以 `steering_` 前缀合并到元数据
///
/// 设置为空时原样返回；元数据为空则按需创建。
pub fn apply_provider_settings(
    metadata: Option<Map<String, Value>>,
    settings: &Map<String, Value>,
) -> Option<Map<String, Value>> {
    if settings.is_empty() {
        return metadata;
    }

    let mut metadata = metadata.unwrap_or_default();
    for (key, value) in settings {
        metadata.insert(format!("{}{}", PROVIDER_SETTING_PREFIX, key), value.clone());
    }
    Some(metadata)
}

/// 替换模板中的 `{{intent}}`、`{{model}}`、`{{hour}}`
pub fn format_context_injection(template: &str, ctx: &RoutingContext) -> String {
    template
        .replace("{{intent}}", &ctx.intent)
        .replace("{{model}}", &ctx.model)
        .replace("{{hour}}", &ctx.hour.to_string())
}
