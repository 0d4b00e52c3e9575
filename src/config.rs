//! 自动化配置
//!
//! 所有字段都有默认值，空 YAML 即可得到完整配置。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("解析配置失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 顶层配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutomationConfig {
    pub steering: SteeringConfig,
    pub hooks: HooksConfig,
    pub event_bus: EventBusConfig,
    pub webhook: WebhookConfig,
    pub logging: LoggingConfig,
}

/// 转向规则配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SteeringConfig {
    pub enabled: bool,
    /// 规则目录，未设置时为 `~/.switchailocal/steering`
    pub dir: Option<PathBuf>,
    /// 是否监听目录变更
    pub watch: bool,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            watch: false,
        }
    }
}

/// Hook 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HooksConfig {
    pub enabled: bool,
    /// Hook 目录，未设置时为 `~/.switchailocal/hooks`
    pub dir: Option<PathBuf>,
    pub watch: bool,
    /// 同时执行的动作上限，未设置表示不限制
    pub max_concurrent_actions: Option<usize>,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            watch: false,
            max_concurrent_actions: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventBusConfig {
    pub queue_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
        }
    }
}

/// Webhook 动作配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebhookConfig {
    /// 每个 URL 在一个窗口内允许的调用次数
    pub max_calls_per_window: usize,
    pub window_secs: u64,
    /// 单次请求超时
    pub attempt_timeout_secs: u64,
    /// 重试间隔，长度即重试次数
    pub backoff_ms: Vec<u64>,
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_calls_per_window: 10,
            window_secs: 60,
            attempt_timeout_secs: 5,
            backoff_ms: vec![1000, 2000, 4000],
            user_agent: "switchAILocal-Hooks/1.0".to_string(),
        }
    }
}

impl WebhookConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn backoff(&self) -> Vec<Duration> {
        self.backoff_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别，`RUST_LOG` 优先
    pub level: String,
    /// 是否输出 JSON 格式
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AutomationConfig {
    /// 从 YAML 文本解析并校验
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AutomationConfig = if content.trim().is_empty() {
            AutomationConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_bus.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_bus.queue_capacity 必须大于 0".to_string(),
            ));
        }
        if self.webhook.max_calls_per_window == 0 {
            return Err(ConfigError::Invalid(
                "webhook.max_calls_per_window 必须大于 0".to_string(),
            ));
        }
        if self.hooks.max_concurrent_actions == Some(0) {
            return Err(ConfigError::Invalid(
                "hooks.max_concurrent_actions 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = AutomationConfig::from_yaml_str("").unwrap();
        assert_eq!(config, AutomationConfig::default());
        assert_eq!(config.event_bus.queue_capacity, 1000);
        assert_eq!(config.webhook.backoff_ms, vec![1000, 2000, 4000]);
        assert_eq!(config.webhook.user_agent, "switchAILocal-Hooks/1.0");
        assert!(config.steering.enabled);
        assert!(config.hooks.max_concurrent_actions.is_none());
    }

    #[test]
    fn test_partial_yaml() {
        let config = AutomationConfig::from_yaml_str(
            r#"
steering:
  dir: /tmp/steering
  watch: true
hooks:
  max_concurrent_actions: 4
webhook:
  backoff_ms: [10, 20]
logging:
  level: debug
  json: true
"#,
        )
        .unwrap();

        assert_eq!(config.steering.dir, Some(PathBuf::from("/tmp/steering")));
        assert!(config.steering.watch);
        assert!(config.steering.enabled);
        assert_eq!(config.hooks.max_concurrent_actions, Some(4));
        assert_eq!(config.webhook.backoff().len(), 2);
        assert_eq!(config.webhook.max_calls_per_window, 10);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let err = AutomationConfig::from_yaml_str("event_bus:\n  queue_capacity: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err =
            AutomationConfig::from_yaml_str("webhook:\n  max_calls_per_window: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("automation.yaml");
        std::fs::write(&path, "hooks:\n  enabled: false\n").unwrap();

        let config = AutomationConfig::load_from_file(&path).unwrap();
        assert!(!config.hooks.enabled);

        let missing = AutomationConfig::load_from_file(&dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
