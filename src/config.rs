//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEELINE__*` 覆盖（双下划线表示嵌套，如 `BEELINE__VALIDATION__STRICT=true`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::BackoffStrategy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub tools: ToolsConfig,
    pub recovery: RecoveryConfig,
    pub orchestrator: OrchestratorConfig,
    pub tracking: TrackingConfig,
    pub validation: ValidationConfig,
    pub llm: LlmConfig,
    pub rules: RulesConfig,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [tools] 段：单次调用超时、已知工具集合、恢复尝试次数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub tool_timeout_secs: u64,
    pub known_tools: Vec<String>,
    pub max_recovery_attempts: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            known_tools: default_known_tools(),
            max_recovery_attempts: 3,
        }
    }
}

pub fn default_known_tools() -> Vec<String> {
    ["file_manager", "terminal_executor", "web_search", "calculator", "human_input"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// [recovery] 段：退避参数以「时间单位」计，time_unit_ms 为一个单位的毫秒数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub time_unit_ms: u64,
    pub max_delay: f64,
    pub exponential_base: f64,
    pub jitter: bool,
    pub backoff: BackoffStrategy,
    /// 单次尝试超时（秒），与整链超时无关
    pub attempt_timeout_secs: Option<u64>,
    /// 工具 -> 备用工具
    pub fallbacks: HashMap<String, String>,
    /// 第几次 RETRY 失败后切换到备用工具
    pub retry_switch_attempt: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            time_unit_ms: 1000,
            max_delay: 60.0,
            exponential_base: 2.0,
            jitter: true,
            backoff: BackoffStrategy::Exponential,
            attempt_timeout_secs: None,
            fallbacks: crate::core::recovery::default_fallbacks(),
            retry_switch_attempt: 3,
        }
    }
}

/// [orchestrator] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// 新建工具链的整链超时（秒），0 表示不限
    pub chain_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { chain_timeout_secs: 600 }
    }
}

/// [tracking] 段：期望进度速率（百分比 / 分钟）与偏离阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub expected_rate_per_minute: f64,
    pub minor_ratio: f64,
    pub major_ratio: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            expected_rate_per_minute: 1.0,
            minor_ratio: 0.5,
            major_ratio: 0.2,
        }
    }
}

/// [validation] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// 严格模式：任一失败项阻断规划
    pub strict: bool,
    pub min_step_minutes: u32,
    pub max_step_minutes: u32,
    pub max_total_minutes: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            min_step_minutes: 5,
            max_step_minutes: 480,
            max_total_minutes: 2880,
        }
    }
}

/// [llm] 段：可选的叙述生成
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    /// deepseek / openai
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

/// [rules] 段：可选的关键词规则表文件（TOML，`[[rules]] keywords = [...] value = ...`）
///
/// 未设置的表使用内置规则。
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RulesConfig {
    /// 任务描述 -> 复杂度档位
    pub complexity: Option<PathBuf>,
    /// 任务描述 -> 任务类型
    pub task_type: Option<PathBuf>,
    /// 子任务描述 -> 所需能力
    pub capabilities: Option<PathBuf>,
    /// 错误文本 -> 失败类别
    pub failure_categories: Option<PathBuf>,
    /// 自由文本 -> 工具
    pub tool_routing: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 BEELINE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEELINE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEELINE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.tools.known_tools.len(), 5);
        assert_eq!(cfg.recovery.retry_switch_attempt, 3);
        assert_eq!(cfg.recovery.fallbacks.get("web_search").map(String::as_str), Some("file_manager"));
        assert_eq!(cfg.orchestrator.chain_timeout_secs, 600);
        assert_eq!(cfg.validation.max_total_minutes, 2880);
        assert!(!cfg.llm.enabled);
        assert!(cfg.rules.complexity.is_none());
        assert!(cfg.rules.failure_categories.is_none());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[tools]
tool_timeout_secs = 5

[recovery]
time_unit_ms = 1
backoff = "linear"
attempt_timeout_secs = 2

[recovery.fallbacks]
calculator = "terminal_executor"

[validation]
strict = true

[rules]
complexity = "rules/complexity.toml"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.tools.tool_timeout_secs, 5);
        assert_eq!(cfg.tools.max_recovery_attempts, 3);
        assert_eq!(cfg.recovery.time_unit_ms, 1);
        assert_eq!(cfg.recovery.backoff, BackoffStrategy::Linear);
        assert_eq!(cfg.recovery.attempt_timeout_secs, Some(2));
        assert_eq!(
            cfg.recovery.fallbacks.get("calculator").map(String::as_str),
            Some("terminal_executor")
        );
        assert!(cfg.validation.strict);
        assert_eq!(cfg.validation.min_step_minutes, 5);
        assert_eq!(cfg.tracking.minor_ratio, 0.5);
        assert_eq!(cfg.rules.complexity, Some(PathBuf::from("rules/complexity.toml")));
        assert!(cfg.rules.tool_routing.is_none());
    }
}
