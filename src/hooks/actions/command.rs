//! 白名单命令执行

use super::{ActionError, ActionHandler};
use crate::hooks::types::{EventContext, Hook};
use crate::logger::sanitize_log_message;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// 允许执行的命令
pub const ALLOWED_COMMANDS: [&str; 3] = ["echo", "logger", "notify-send"];

/// 默认超时时间（秒）
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// `run_command` 处理器
///
/// 命令按空白切分，不经过 shell，首个词必须在白名单内。
pub struct RunCommandHandler {
    timeout: Duration,
}

impl Default for RunCommandHandler {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RunCommandHandler {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 执行命令，返回合并后的 stdout/stderr
    pub async fn run(&self, command_line: &str) -> Result<String, ActionError> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or(ActionError::EmptyCommand)?;
        if !ALLOWED_COMMANDS.contains(&program) {
            return Err(ActionError::CommandNotAllowed(program.to_string()));
        }
        let args: Vec<&str> = parts.collect();

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, child).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ActionError::CommandFailed {
                    status: format!("timed out after {}s", self.timeout.as_secs()),
                    output: String::new(),
                })
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        if !output.status.success() {
            return Err(ActionError::CommandFailed {
                status: output.status.to_string(),
                output: sanitize_log_message(combined.trim()),
            });
        }
        Ok(combined)
    }
}

#[async_trait]
impl ActionHandler for RunCommandHandler {
    async fn handle(&self, hook: &Hook, _ctx: &EventContext) -> Result<(), ActionError> {
        let command_line = hook
            .param_str("command")
            .ok_or(ActionError::MissingParam("command"))?;
        let output = self.run(command_line).await?;
        tracing::debug!(
            "[HOOKS] 命令执行完成 (hook: {}): {}",
            hook.id,
            sanitize_log_message(output.trim())
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::types::{HookAction, HookEvent};
    use serde_json::{json, Map};

    fn command_hook(command: Option<&str>) -> Hook {
        let mut params = Map::new();
        if let Some(command) = command {
            params.insert("command".to_string(), json!(command));
        }
        Hook {
            id: "cmd".to_string(),
            name: "Command".to_string(),
            description: String::new(),
            event: HookEvent::QuotaWarning,
            condition: String::new(),
            action: HookAction::RunCommand,
            params,
            enabled: true,
            file_path: Default::default(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_echo_output() {
        let output = RunCommandHandler::default().run("echo quota  warning").await.unwrap();
        assert_eq!(output.trim(), "quota warning");
    }

    #[tokio::test]
    async fn test_rejects_commands_outside_whitelist() {
        let err = RunCommandHandler::default().run("rm -rf /tmp/x").await.unwrap_err();
        assert!(matches!(err, ActionError::CommandNotAllowed(ref p) if p == "rm"));

        let handler = RunCommandHandler::default();
        let err = handler.run("sh -c 'echo hi'").await.unwrap_err();
        assert!(matches!(err, ActionError::CommandNotAllowed(_)));
    }

    #[tokio::test]
    async fn test_empty_and_missing_command() {
        let handler = RunCommandHandler::default();
        assert!(matches!(handler.run("   ").await, Err(ActionError::EmptyCommand)));

        let ctx = EventContext::new(HookEvent::QuotaWarning);
        let err = handler.handle(&command_hook(None), &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::MissingParam("command")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_handle_runs_command() {
        let ctx = EventContext::new(HookEvent::QuotaWarning);
        RunCommandHandler::with_timeout(Duration::from_secs(5))
            .handle(&command_hook(Some("echo done")), &ctx)
            .await
            .unwrap();
    }
}
