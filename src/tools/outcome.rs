//! 工具调用结果
//!
//! 统一的调用契约输出：success / payload / error / duration / status，
//! 恢复系统在其上追加所采用的恢复策略与标记（skipped、fallback_for 等）。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::RecoveryStrategy;

/// 结果状态标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
    Timeout,
    Cancelled,
    /// 恢复系统以空输出跳过
    Skipped,
    /// 由备用工具完成
    Fallback,
}

/// 单次工具调用的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub success: bool,
    pub payload: Value,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub status: OutcomeStatus,
    /// 失败后实际采用的恢复策略
    pub recovery: Option<RecoveryStrategy>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ToolOutcome {
    pub fn success(tool: impl Into<String>, payload: Value, duration_ms: u64) -> Self {
        Self {
            tool: tool.into(),
            success: true,
            payload,
            error: None,
            duration_ms,
            status: OutcomeStatus::Success,
            recovery: None,
            metadata: Map::new(),
        }
    }

    pub fn failure(tool: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self::failed_with(tool, error, OutcomeStatus::Failure, duration_ms)
    }

    pub fn failed_with(
        tool: impl Into<String>,
        error: impl Into<String>,
        status: OutcomeStatus,
        duration_ms: u64,
    ) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            payload: Value::Null,
            error: Some(error.into()),
            duration_ms,
            status,
            recovery: None,
            metadata: Map::new(),
        }
    }

    /// SKIP 策略：合成一个成功的空输出，保留原始错误
    pub fn skipped(tool: impl Into<String>, original_error: &str) -> Self {
        let mut outcome = Self::success(tool, Value::String(String::new()), 0);
        outcome.status = OutcomeStatus::Skipped;
        outcome.recovery = Some(RecoveryStrategy::Skip);
        outcome.metadata.insert("skipped".into(), Value::Bool(true));
        outcome
            .metadata
            .insert("original_error".into(), Value::String(original_error.to_string()));
        outcome
    }

    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// 面向用户的失败描述：原始错误 + 采用的恢复策略
    pub fn describe_failure(&self) -> String {
        match self.recovery {
            Some(strategy) => format!("{} (recovery: {})", self.error_text(), strategy),
            None => self.error_text().to_string(),
        }
    }
}
