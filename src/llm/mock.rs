//! Mock LLM 客户端（用于测试与离线运行，无需 API）

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmResponse, TokenCount};

/// 回显 prompt 首行；`failing` 构造的实例总是返回请求错误
#[derive(Debug, Default)]
pub struct MockLlmClient {
    fail_with: Option<String>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, prompt: &str, _system_prompt: Option<&str>) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(LlmError::Request(message.clone()));
        }
        let first_line = prompt.lines().next().unwrap_or("(no input)");
        let words = prompt.split_whitespace().count() as u64;
        Ok(LlmResponse {
            content: format!("Mock rationale: {first_line}"),
            token_usage: TokenCount {
                prompt: words,
                completion: 3,
                total: words + 3,
            },
        })
    }

    fn model(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_first_line() {
        let llm = MockLlmClient::new();
        let resp = llm.generate("Explain the plan\nmore", None).await.unwrap();
        assert_eq!(resp.content, "Mock rationale: Explain the plan");
        assert_eq!(resp.token_usage.total, resp.token_usage.prompt + 3);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let llm = MockLlmClient::failing("quota exceeded");
        let err = llm.generate("x", Some("sys")).await.unwrap_err();
        assert_eq!(err, LlmError::Request("quota exceeded".to_string()));
        assert_eq!(err.message(), "quota exceeded");
        assert_eq!(LlmError::EmptyResponse.message(), "LLM returned no content");
    }
}
