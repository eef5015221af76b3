//! 叙述推理接口
//!
//! 规划核心只用 LLM 生成说明性文字（分解理由等）；其错误不属于工具失败分类，按原样上抛。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 单次调用的 token 统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCount {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub token_usage: TokenCount,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM returned no content")]
    EmptyResponse,
}

impl LlmError {
    /// 不带前缀的错误正文
    pub fn message(&self) -> String {
        match self {
            Self::InvalidRequest(msg) | Self::Request(msg) => msg.clone(),
            Self::EmptyResponse => self.to_string(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<LlmResponse, LlmError>;

    fn model(&self) -> &str {
        "unknown"
    }

    /// 累计 token 使用：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
