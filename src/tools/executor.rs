//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，invoke(tool_name, args) 在超时内调用 registry.execute，
//! 结果统一转为 ToolOutcome（成功 / 失败 / 超时）；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;

use crate::tools::{OutcomeStatus, Tool, ToolOutcome, ToolRegistry};

/// 工具调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool timeout: {0}")]
    Timeout(String),

    #[error("Tool cancelled: {0}")]
    Cancelled(String),

    #[error("Tool execution failed: {0}")]
    Failed(String),
}

impl ToolError {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::Timeout(_) => OutcomeStatus::Timeout,
            Self::Cancelled(_) => OutcomeStatus::Cancelled,
            Self::UnknownTool(_) | Self::Failed(_) => OutcomeStatus::Failure,
        }
    }
}

/// 统一调用契约：invoke(name, params) -> ToolOutcome，永不 panic、永不返回 Err
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, tool: &str, params: Value) -> ToolOutcome;

    /// 是否存在该工具（链优化据此替换未注册的工具）
    fn has_tool(&self, tool: &str) -> bool;

    fn tool_names(&self) -> Vec<String>;
}

/// 工具执行器：对每次调用施加超时，并将结果映射为 ToolOutcome
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self {
            registry: Arc::new(registry),
            timeout,
        }
    }

    /// 执行指定工具；超时返回 Timeout，工具返回 Err 则转为 Failed；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<Value, ToolError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let result = match self.registry.get(tool_name) {
            None => Err(ToolError::UnknownTool(tool_name.to_string())),
            Some(tool) => match timeout(self.timeout, tool.execute(args)).await {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(e)) => Err(ToolError::Failed(e)),
                Err(_) => Err(ToolError::Timeout(tool_name.to_string())),
            },
        };

        let (ok, outcome): (bool, &str) = match &result {
            Ok(_) => (true, "ok"),
            Err(ToolError::Timeout(_)) => (false, "timeout"),
            Err(ToolError::UnknownTool(_)) => (false, "unknown_tool"),
            Err(_) => (false, "error"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry.get(name)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

#[async_trait]
impl ToolInvoker for ToolExecutor {
    async fn invoke(&self, tool: &str, params: Value) -> ToolOutcome {
        let start = Instant::now();
        let result = self.execute(tool, params).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(payload) => ToolOutcome::success(tool, payload, duration_ms),
            Err(ToolError::Failed(msg)) => ToolOutcome::failure(tool, msg, duration_ms),
            Err(e) => ToolOutcome::failed_with(tool, e.to_string(), e.status(), duration_ms),
        }
    }

    fn has_tool(&self, tool: &str) -> bool {
        self.registry.contains(tool)
    }

    fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ScriptedTool;

    fn executor(timeout: Duration) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(ScriptedTool::echo("file_manager"));
        registry.register(ScriptedTool::failing("terminal_executor", "permission denied"));
        registry.register(ScriptedTool::echo("web_search").with_delay(Duration::from_millis(200)));
        ToolExecutor::with_timeout(registry, timeout)
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let exec = executor(Duration::from_secs(5));
        let outcome = exec.invoke("file_manager", serde_json::json!({"path": "a.txt"})).await;
        assert!(outcome.success);
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.payload["path"], "a.txt");
    }

    #[tokio::test]
    async fn test_invoke_failure_keeps_error_text() {
        let exec = executor(Duration::from_secs(5));
        let outcome = exec.invoke("terminal_executor", Value::Null).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_text(), "permission denied");
    }

    #[tokio::test]
    async fn test_invoke_timeout() {
        let exec = executor(Duration::from_millis(20));
        let outcome = exec.invoke("web_search", Value::Null).await;
        assert_eq!(outcome.status, OutcomeStatus::Timeout);
        assert!(outcome.error_text().contains("timeout"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let exec = executor(Duration::from_secs(1));
        assert!(!exec.has_tool("database"));
        let err = exec.execute("database", Value::Null).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("database".into()));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = Value::String("x".repeat(500));
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
    }
}
