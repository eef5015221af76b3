//! 引擎错误类型、失败分类与恢复策略
//!
//! FailureCategory / RecoveryStrategy 是恢复系统的两套固定词表；EngineError 覆盖跟踪、校验阻断、
//! 链构建与规则加载等需要以 Result 形式返回的错误。

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::ChainError;

/// 失败类别（按错误文本的关键词规则确定，默认 Logic）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// 网络超时、临时不可用
    Transient,
    /// 参数错误、缺少配置
    Configuration,
    Logic,
    /// 内存、磁盘、配额
    Resource,
    Permission,
    Fatal,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Configuration => "configuration",
            Self::Logic => "logic",
            Self::Resource => "resource",
            Self::Permission => "permission",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 恢复策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    Fallback,
    Escalate,
    Skip,
    Abort,
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Retry => "retry",
            Self::Fallback => "fallback",
            Self::Escalate => "escalate",
            Self::Skip => "skip",
            Self::Abort => "abort",
        };
        f.write_str(s)
    }
}

/// 规划 / 执行引擎错误
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown tracking id: {0}")]
    UnknownTracking(String),

    #[error("Checkpoint {checkpoint_id} not found for {tracking_id}")]
    CheckpointNotFound {
        tracking_id: String,
        checkpoint_id: String,
    },

    #[error("Validation blocked: {0}")]
    ValidationBlocked(String),

    #[error("Invalid tool chain: {0}")]
    Chain(#[from] ChainError),

    #[error("Invalid rule table: {0}")]
    Rules(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),
}
