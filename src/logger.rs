//! 日志初始化与脱敏
use crate::config::LoggingConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing_subscriber::EnvFilter;

/// 安装全局 tracing subscriber
///
/// `RUST_LOG` 优先于配置中的级别；已安装过时返回 `false`。
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.is_ok()
}

/// 脱敏规则，按顺序应用
static SANITIZE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"Bearer\s+[A-Za-z0-9._-]+", "Bearer ***"),
        (
            r#"api[_-]?key["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "api_key: ***",
        ),
        (
            r#"access[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "access_token: ***",
        ),
        (
            r#"refresh[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "refresh_token: ***",
        ),
        (r#"\btoken["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#, "token: ***"),
        (
            r#"client[_-]?secret["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "client_secret: ***",
        ),
        (r#"\bsecret["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#, "secret: ***"),
        (r#"password["']?\s*[:=]\s*["']?[^\s"',}]+"#, "password: ***"),
        (r"sha256=[0-9a-fA-F]{16,}", "sha256=***"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// 屏蔽日志中的凭证、令牌与签名
pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in SANITIZE_PATTERNS.iter() {
        sanitized = re.replace_all(&sanitized, *replacement).to_string();
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_bearer_token() {
        let output = sanitize_log_message("Authorization: Bearer abcDEF123._-XYZ");
        assert!(!output.contains("abcDEF123"));
        assert!(output.contains("***"));
    }

    #[test]
    fn test_sanitize_api_key() {
        let output = sanitize_log_message(r#"curl failed api_key="sk-test_123.456-ABC" end"#);
        assert!(output.contains("api_key: ***"));
        assert!(!output.contains("sk-test_123"));
    }

    #[test]
    fn test_sanitize_tokens() {
        let output = sanitize_log_message("access_token=atk_12345 refresh_token: rtk_ABCDE-123");
        assert!(output.contains("access_token: ***"));
        assert!(output.contains("refresh_token: ***"));
        assert!(!output.contains("atk_12345"));
        assert!(!output.contains("rtk_ABCDE"));
    }

    #[test]
    fn test_sanitize_secrets_and_signatures() {
        let output = sanitize_log_message(
            r#"secret=hunter2 client_secret = "cs_SeCreT-999" X-Hook-Signature: sha256=0123456789abcdef0123"#,
        );
        assert!(!output.contains("hunter2"));
        assert!(!output.contains("cs_SeCreT"));
        assert!(!output.contains("0123456789abcdef0123"));
    }

    #[test]
    fn test_sanitize_password() {
        let output = sanitize_log_message(r#"{"password":"p@ssW0rd!"}"#);
        assert!(output.contains("password: ***"));
        assert!(!output.contains("p@ssW0rd!"));
    }

    #[test]
    fn test_plain_text_unchanged() {
        let input = "这是一段普通日志，不包含任何敏感字段。";
        assert_eq!(sanitize_log_message(input), input);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig::default();
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
