//! LLM 层：叙述推理接口与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError, LlmResponse, TokenCount};

use crate::config::LlmConfig;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// 按配置创建叙述用 LLM；未启用返回 None，没有 API Key 时退回 Mock
pub fn create_narrator(cfg: &LlmConfig) -> Option<Arc<dyn LlmClient>> {
    if !cfg.enabled {
        return None;
    }
    let provider = cfg.provider.to_lowercase();
    let deepseek_key = std::env::var("DEEPSEEK_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    if provider == "deepseek" && (deepseek_key.is_some() || openai_key.is_some()) {
        let base = cfg.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
        tracing::info!("Using DeepSeek LLM ({})", cfg.model);
        let key = deepseek_key.or(openai_key);
        Some(Arc::new(OpenAiClient::new(Some(base), &cfg.model, key.as_deref())))
    } else if openai_key.is_some() {
        tracing::info!("Using OpenAI LLM ({})", cfg.model);
        Some(Arc::new(OpenAiClient::new(cfg.base_url.as_deref(), &cfg.model, openai_key.as_deref())))
    } else {
        tracing::warn!("No API key set, using Mock LLM");
        Some(Arc::new(MockLlmClient::new()))
    }
}
