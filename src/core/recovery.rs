//! 失败恢复系统
//!
//! 包裹每一次工具调用：按关键词规则把错误文本归类，先查工具专属覆盖表、再查类别默认表选择恢复动作，
//! 第 N 次（默认 3）RETRY 失败后若配置了备用工具则切换到 FALLBACK。每次尝试（成功或失败）都追加到
//! 失败日志，供失败模式分析与改进建议使用。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

use crate::config::RecoveryConfig;
use crate::core::{FailureCategory, RecoveryStrategy};
use crate::rules::KeywordTable;
use crate::tools::{OutcomeStatus, ToolInvoker, ToolOutcome};

/// 失败分析的默认时间窗口
pub const DEFAULT_ANALYTICS_WINDOW: Duration = Duration::from_secs(3600);

/// 退避曲线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Linear,
    Fixed,
}

/// 重试延迟计算参数；延迟以「时间单位」计，默认 1 单位 = 1 秒
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub backoff: BackoffStrategy,
    pub max_delay: f64,
    pub exponential_base: f64,
    pub jitter: bool,
    pub time_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: BackoffStrategy::Exponential,
            max_delay: 60.0,
            exponential_base: 2.0,
            jitter: true,
            time_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// 未加抖动的延迟（已按 max_delay 截断）
    pub fn raw_delay(&self, attempt: u32, base_delay: f64) -> f64 {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            BackoffStrategy::Exponential => base_delay * self.exponential_base.powi(attempt as i32 - 1),
            BackoffStrategy::Linear => base_delay * attempt as f64,
            BackoffStrategy::Fixed => base_delay,
        };
        delay.min(self.max_delay)
    }

    /// 最终延迟（时间单位）：截断、±10% 抖动、下限 0.1
    pub fn delay_units(&self, attempt: u32, base_delay: f64) -> f64 {
        let mut delay = self.raw_delay(attempt, base_delay);
        if self.jitter {
            let spread = (delay * 0.1).abs();
            delay += rand::thread_rng().gen_range(-spread..=spread);
        }
        delay.max(0.1)
    }

    pub fn delay(&self, attempt: u32, base_delay: f64) -> Duration {
        self.time_unit.mul_f64(self.delay_units(attempt, base_delay))
    }
}

/// 具体恢复动作（策略 + 参数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry { base_delay: f64 },
    /// tool 为空时查备用工具表
    Fallback { tool: Option<String> },
    Escalate {
        require_human: bool,
        suggestion: Option<String>,
    },
    Skip,
    Abort,
}

impl RecoveryAction {
    pub fn strategy(&self) -> RecoveryStrategy {
        match self {
            Self::Retry { .. } => RecoveryStrategy::Retry,
            Self::Fallback { .. } => RecoveryStrategy::Fallback,
            Self::Escalate { .. } => RecoveryStrategy::Escalate,
            Self::Skip => RecoveryStrategy::Skip,
            Self::Abort => RecoveryStrategy::Abort,
        }
    }

    fn escalate() -> Self {
        Self::Escalate {
            require_human: true,
            suggestion: None,
        }
    }
}

/// 工具专属覆盖：(工具, 类别) -> 动作，优先于类别默认
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOverride {
    pub tool: String,
    pub category: FailureCategory,
    pub action: RecoveryAction,
}

/// 声明式恢复规则
#[derive(Debug, Clone)]
pub struct RecoveryRules {
    pub categories: KeywordTable<FailureCategory>,
    pub defaults: HashMap<FailureCategory, RecoveryAction>,
    pub overrides: Vec<ToolOverride>,
    /// 工具 -> 备用工具
    pub fallbacks: HashMap<String, String>,
    /// 到达该尝试次数仍为 RETRY 时切换
    pub retry_switch_attempt: u32,
}

impl Default for RecoveryRules {
    fn default() -> Self {
        let categories = KeywordTable::default()
            .rule(
                &[
                    "timeout",
                    "connection",
                    "network",
                    "temporary",
                    "unavailable",
                    "busy",
                    "rate limit",
                    "throttle",
                ],
                FailureCategory::Transient,
            )
            .rule(
                &[
                    "config",
                    "parameter",
                    "argument",
                    "missing",
                    "invalid",
                    "not found",
                    "does not exist",
                ],
                FailureCategory::Configuration,
            )
            .rule(
                &[
                    "syntax",
                    "parse",
                    "format",
                    "invalid",
                    "unexpected",
                    "assertion",
                    "logic",
                    "algorithm",
                ],
                FailureCategory::Logic,
            )
            .rule(
                &[
                    "memory", "disk", "space", "limit", "quota", "resource", "capacity", "full",
                ],
                FailureCategory::Resource,
            )
            .rule(
                &[
                    "permission",
                    "access",
                    "denied",
                    "forbidden",
                    "unauthorized",
                    "authentication",
                    "credential",
                ],
                FailureCategory::Permission,
            )
            .rule(
                &["fatal", "critical", "system", "crash", "corruption", "unrecoverable"],
                FailureCategory::Fatal,
            );

        let defaults = HashMap::from([
            (FailureCategory::Transient, RecoveryAction::Retry { base_delay: 2.0 }),
            (FailureCategory::Configuration, RecoveryAction::escalate()),
            (FailureCategory::Logic, RecoveryAction::Fallback { tool: None }),
            (FailureCategory::Resource, RecoveryAction::Retry { base_delay: 5.0 }),
            (FailureCategory::Permission, RecoveryAction::escalate()),
            (FailureCategory::Fatal, RecoveryAction::Abort),
        ]);

        let overrides = vec![
            ToolOverride {
                tool: "web_search".into(),
                category: FailureCategory::Transient,
                action: RecoveryAction::Retry { base_delay: 5.0 },
            },
            ToolOverride {
                tool: "terminal_executor".into(),
                category: FailureCategory::Permission,
                action: RecoveryAction::Escalate {
                    require_human: true,
                    suggestion: Some("Retry the command with elevated privileges (sudo)".into()),
                },
            },
            ToolOverride {
                tool: "code_executor".into(),
                category: FailureCategory::Resource,
                action: RecoveryAction::Retry { base_delay: 1.0 },
            },
        ];

        Self {
            categories,
            defaults,
            overrides,
            fallbacks: default_fallbacks(),
            retry_switch_attempt: 3,
        }
    }
}

pub fn default_fallbacks() -> HashMap<String, String> {
    HashMap::from([
        ("web_search".to_string(), "file_manager".to_string()),
        ("terminal_executor".to_string(), "file_manager".to_string()),
        ("code_executor".to_string(), "terminal_executor".to_string()),
    ])
}

impl RecoveryRules {
    /// 按规则顺序子串匹配，首个命中的类别；无命中为 Logic
    pub fn categorize(&self, error: &str) -> FailureCategory {
        self.categories
            .first_match(error)
            .copied()
            .unwrap_or(FailureCategory::Logic)
    }

    /// 选择恢复动作：覆盖表 -> 类别默认 -> Escalate
    ///
    /// `attempt >= retry_switch_attempt` 时 RETRY 不再原样返回：该工具配置了备用工具则改为
    /// FALLBACK，否则改为 ESCALATE。两者都会结束对当前工具的重试，所以超过切换次数的尝试
    /// 不会发生；`retry_switch_attempt` 实际上是单个工具的重试上限。
    pub fn select_action(&self, tool: &str, category: FailureCategory, attempt: u32) -> RecoveryAction {
        let action = self
            .overrides
            .iter()
            .find(|o| o.tool == tool && o.category == category)
            .map(|o| o.action.clone())
            .or_else(|| self.defaults.get(&category).cloned())
            .unwrap_or_else(RecoveryAction::escalate);

        if attempt >= self.retry_switch_attempt && action.strategy() == RecoveryStrategy::Retry {
            return match self.fallbacks.get(tool) {
                Some(fallback) => RecoveryAction::Fallback {
                    tool: Some(fallback.clone()),
                },
                None => RecoveryAction::escalate(),
            };
        }
        action
    }

    /// 用 TOML 关键词表替换失败分类规则
    pub fn with_category_table(mut self, table: KeywordTable<FailureCategory>) -> Self {
        self.categories = table;
        self
    }
}

/// 一次尝试的日志记录（只追加）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub tool: String,
    pub success: bool,
    pub error: String,
    pub category: Option<FailureCategory>,
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
    pub strategy: Option<RecoveryStrategy>,
    pub context: Value,
}

/// 升级报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationReport {
    pub tool: String,
    pub error: String,
    pub category: FailureCategory,
    pub attempt: u32,
    pub require_human: bool,
    pub suggestion: String,
    pub timestamp: DateTime<Utc>,
}

/// 人工审批通道
#[async_trait]
pub trait EscalationHandler: Send + Sync {
    async fn escalate(&self, report: EscalationReport);
}

/// 默认：只写 error 日志
#[derive(Debug, Default)]
pub struct LogEscalation;

#[async_trait]
impl EscalationHandler for LogEscalation {
    async fn escalate(&self, report: EscalationReport) {
        tracing::error!(
            tool = %report.tool,
            category = %report.category,
            attempt = report.attempt,
            require_human = report.require_human,
            suggestion = %report.suggestion,
            "Tool failure escalated: {}",
            report.error
        );
    }
}

/// 通过 mpsc 通道把升级报告交给外部审批方
#[derive(Debug, Clone)]
pub struct ChannelEscalation {
    tx: mpsc::Sender<EscalationReport>,
}

impl ChannelEscalation {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<EscalationReport>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EscalationHandler for ChannelEscalation {
    async fn escalate(&self, report: EscalationReport) {
        let tool = report.tool.clone();
        if self.tx.send(report).await.is_err() {
            tracing::warn!(tool = %tool, "Escalation channel closed, report dropped");
        }
    }
}

/// 时间窗口内的失败模式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailurePatterns {
    pub total_attempts: usize,
    pub total_failures: usize,
    pub category_breakdown: BTreeMap<String, usize>,
    pub tool_breakdown: BTreeMap<String, usize>,
    /// 出现最多的错误词（长度 > 3），最多 5 个
    pub common_error_patterns: Vec<(String, usize)>,
    /// 每分钟失败数
    pub failure_rate: f64,
    /// 失败 / 尝试
    pub failure_ratio: f64,
    pub window_secs: u64,
}

/// 恢复系统：规则 + 退避 + 升级通道 + 进程级尝试日志
pub struct RecoverySystem {
    rules: RecoveryRules,
    policy: RetryPolicy,
    attempt_timeout: Option<Duration>,
    escalation: Arc<dyn EscalationHandler>,
    log: RwLock<Vec<FailureRecord>>,
}

impl Default for RecoverySystem {
    fn default() -> Self {
        Self::new(RecoveryRules::default(), RetryPolicy::default())
    }
}

impl std::fmt::Debug for RecoverySystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoverySystem")
            .field("policy", &self.policy)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl RecoverySystem {
    pub fn new(rules: RecoveryRules, policy: RetryPolicy) -> Self {
        Self {
            rules,
            policy,
            attempt_timeout: None,
            escalation: Arc::new(LogEscalation),
            log: RwLock::new(Vec::new()),
        }
    }

    pub fn from_config(cfg: &RecoveryConfig) -> Self {
        Self::from_config_with_rules(RecoveryRules::default(), cfg)
    }

    /// 以给定规则为底，备用工具与切换次数取自配置
    pub fn from_config_with_rules(rules: RecoveryRules, cfg: &RecoveryConfig) -> Self {
        let rules = RecoveryRules {
            fallbacks: cfg.fallbacks.clone(),
            retry_switch_attempt: cfg.retry_switch_attempt,
            ..rules
        };
        let policy = RetryPolicy {
            backoff: cfg.backoff,
            max_delay: cfg.max_delay,
            exponential_base: cfg.exponential_base,
            jitter: cfg.jitter,
            time_unit: Duration::from_millis(cfg.time_unit_ms),
        };
        let system = Self::new(rules, policy);
        match cfg.attempt_timeout_secs {
            Some(secs) => system.with_attempt_timeout(Duration::from_secs(secs)),
            None => system,
        }
    }

    pub fn with_escalation(mut self, handler: Arc<dyn EscalationHandler>) -> Self {
        self.escalation = handler;
        self
    }

    /// 单次尝试超时（与整链超时相互独立）
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn rules(&self) -> &RecoveryRules {
        &self.rules
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn categorize(&self, error: &str) -> FailureCategory {
        self.rules.categorize(error)
    }

    pub fn calculate_delay(&self, attempt: u32, base_delay: f64) -> Duration {
        self.policy.delay(attempt, base_delay)
    }

    async fn attempt(&self, invoker: &dyn ToolInvoker, tool: &str, params: Value) -> ToolOutcome {
        match self.attempt_timeout {
            None => invoker.invoke(tool, params).await,
            Some(limit) => match tokio::time::timeout(limit, invoker.invoke(tool, params)).await {
                Ok(outcome) => outcome,
                Err(_) => ToolOutcome::failed_with(
                    tool,
                    format!("Attempt timeout after {}ms", limit.as_millis()),
                    OutcomeStatus::Timeout,
                    limit.as_millis() as u64,
                ),
            },
        }
    }

    async fn record(&self, record: FailureRecord) {
        self.log.write().await.push(record);
    }

    /// 带恢复的执行：永不返回 Err，最终失败时 outcome.recovery 标明采用过的策略
    pub async fn execute_with_recovery(
        &self,
        invoker: &dyn ToolInvoker,
        tool: &str,
        max_attempts: u32,
        params: Value,
    ) -> ToolOutcome {
        let mut attempt = 1;
        let mut last: Option<ToolOutcome> = None;

        while attempt <= max_attempts {
            let outcome = self.attempt(invoker, tool, params.clone()).await;

            if outcome.success {
                self.record(FailureRecord {
                    tool: tool.to_string(),
                    success: true,
                    error: String::new(),
                    category: None,
                    timestamp: Utc::now(),
                    attempt,
                    strategy: None,
                    context: params.clone(),
                })
                .await;
                if attempt > 1 {
                    tracing::info!(tool, attempt, "Tool succeeded after recovery");
                }
                return outcome;
            }

            let category = self.rules.categorize(outcome.error_text());
            let action = self.rules.select_action(tool, category, attempt);
            let strategy = action.strategy();
            self.record(FailureRecord {
                tool: tool.to_string(),
                success: false,
                error: outcome.error_text().to_string(),
                category: Some(category),
                timestamp: Utc::now(),
                attempt,
                strategy: Some(strategy),
                context: params.clone(),
            })
            .await;
            tracing::warn!(
                tool,
                attempt,
                category = %category,
                strategy = %strategy,
                "Tool failure: {}",
                outcome.error_text()
            );

            let mut failed = outcome;
            failed.recovery = Some(strategy);

            match action {
                RecoveryAction::Abort => {
                    tracing::error!(tool, "Aborting execution");
                    last = Some(failed);
                    break;
                }
                RecoveryAction::Skip => {
                    tracing::info!(tool, "Skipping failed tool");
                    return ToolOutcome::skipped(tool, failed.error_text());
                }
                RecoveryAction::Escalate {
                    require_human,
                    suggestion,
                } => {
                    let report = EscalationReport {
                        tool: tool.to_string(),
                        error: failed.error_text().to_string(),
                        category,
                        attempt,
                        require_human,
                        suggestion: suggestion.unwrap_or_else(|| "Review and fix the issue".to_string()),
                        timestamp: Utc::now(),
                    };
                    self.escalation.escalate(report).await;
                    last = Some(failed);
                    break;
                }
                RecoveryAction::Fallback { tool: fallback } => {
                    let fallback = fallback.or_else(|| self.rules.fallbacks.get(tool).cloned());
                    match fallback {
                        Some(fallback) => {
                            let result = self.try_fallback(invoker, tool, &fallback, params.clone(), attempt).await;
                            if result.success {
                                return result;
                            }
                        }
                        None => tracing::warn!(tool, "No fallback tool available"),
                    }
                    last = Some(failed);
                }
                RecoveryAction::Retry { base_delay } => {
                    last = Some(failed);
                    if attempt < max_attempts {
                        let delay = self.policy.delay(attempt, base_delay);
                        tracing::info!(tool, next_attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Retrying");
                        tokio::time::sleep(delay).await;
                    }
                }
            }

            attempt += 1;
        }

        tracing::error!(tool, "All recovery attempts failed");
        last.unwrap_or_else(|| ToolOutcome::failure(tool, "All recovery attempts failed", 0))
    }

    async fn try_fallback(
        &self,
        invoker: &dyn ToolInvoker,
        original: &str,
        fallback: &str,
        params: Value,
        attempt: u32,
    ) -> ToolOutcome {
        tracing::info!(tool = original, fallback, "Trying fallback tool");
        let outcome = self.attempt(invoker, fallback, params.clone()).await;

        let context = serde_json::json!({ "fallback_for": original, "params": params });
        self.record(FailureRecord {
            tool: fallback.to_string(),
            success: outcome.success,
            error: outcome.error_text().to_string(),
            category: (!outcome.success).then(|| self.rules.categorize(outcome.error_text())),
            timestamp: Utc::now(),
            attempt,
            strategy: (!outcome.success).then_some(RecoveryStrategy::Fallback),
            context,
        })
        .await;

        if !outcome.success {
            tracing::warn!(tool = original, fallback, "Fallback tool also failed: {}", outcome.error_text());
            return outcome;
        }
        let mut outcome = outcome.with_metadata("fallback_for", original);
        outcome.status = OutcomeStatus::Fallback;
        outcome.recovery = Some(RecoveryStrategy::Fallback);
        outcome
    }

    /// 尝试日志快照
    pub async fn history(&self) -> Vec<FailureRecord> {
        self.log.read().await.clone()
    }

    pub async fn clear_history(&self) {
        self.log.write().await.clear();
    }

    /// 时间窗口内的失败模式；tool 为 Some 时只统计该工具
    pub async fn failure_patterns(&self, tool: Option<&str>, window: Duration) -> FailurePatterns {
        let cutoff = Utc::now() - chrono::Duration::milliseconds(window.as_millis() as i64);
        let log = self.log.read().await;
        let recent: Vec<&FailureRecord> = log
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .filter(|r| tool.map_or(true, |t| r.tool == t))
            .collect();

        let mut patterns = FailurePatterns {
            total_attempts: recent.len(),
            window_secs: window.as_secs(),
            ..FailurePatterns::default()
        };

        let mut words: HashMap<String, usize> = HashMap::new();
        for record in recent.iter().filter(|r| !r.success) {
            patterns.total_failures += 1;
            if let Some(category) = record.category {
                *patterns.category_breakdown.entry(category.to_string()).or_default() += 1;
            }
            *patterns.tool_breakdown.entry(record.tool.clone()).or_default() += 1;
            for word in record.error.to_lowercase().split_whitespace() {
                if word.chars().count() > 3 {
                    *words.entry(word.to_string()).or_default() += 1;
                }
            }
        }

        let mut common: Vec<(String, usize)> = words.into_iter().collect();
        common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        common.truncate(5);
        patterns.common_error_patterns = common;

        let minutes = (window.as_secs_f64() / 60.0).max(1.0);
        patterns.failure_rate = patterns.total_failures as f64 / minutes;
        if patterns.total_attempts > 0 {
            patterns.failure_ratio = patterns.total_failures as f64 / patterns.total_attempts as f64;
        }
        patterns
    }

    /// 基于最近一小时失败模式的改进建议
    pub async fn suggest_improvements(&self, tool: Option<&str>) -> Vec<String> {
        let patterns = self.failure_patterns(tool, DEFAULT_ANALYTICS_WINDOW).await;
        if patterns.total_failures == 0 {
            return vec!["No recent failures - system is performing well".to_string()];
        }

        let mut suggestions = Vec::new();
        if patterns.failure_rate > 1.0 {
            suggestions.push("High failure rate detected - consider system health check".to_string());
        }
        let count = |c: FailureCategory| patterns.category_breakdown.get(c.as_str()).copied().unwrap_or(0);
        if count(FailureCategory::Transient) > 5 {
            suggestions.push(
                "Many transient failures - check network connectivity and external services".to_string(),
            );
        }
        if count(FailureCategory::Configuration) > 2 {
            suggestions.push("Configuration errors detected - review tool parameters and settings".to_string());
        }
        if count(FailureCategory::Resource) > 2 {
            suggestions
                .push("Resource issues detected - monitor system resources and consider scaling".to_string());
        }
        let problematic: Vec<&str> = patterns
            .tool_breakdown
            .iter()
            .filter(|(_, n)| **n > 3)
            .map(|(t, _)| t.as_str())
            .collect();
        if !problematic.is_empty() {
            suggestions.push(format!(
                "Tools with high failure rates: {} - consider maintenance",
                problematic.join(", ")
            ));
        }

        if suggestions.is_empty() {
            suggestions.push("No specific improvement suggestions at this time".to_string());
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ScriptedTool, ToolExecutor, ToolRegistry};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            time_unit: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    fn system() -> RecoverySystem {
        RecoverySystem::new(RecoveryRules::default(), fast_policy())
    }

    fn executor(tools: Vec<ScriptedTool>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        ToolExecutor::new(registry, 5)
    }

    #[test]
    fn test_categorize() {
        let rules = RecoveryRules::default();
        assert_eq!(rules.categorize("Connection timeout"), FailureCategory::Transient);
        assert_eq!(rules.categorize("Invalid parameter 'x'"), FailureCategory::Configuration);
        assert_eq!(rules.categorize("syntax error near line 3"), FailureCategory::Logic);
        assert_eq!(rules.categorize("out of memory"), FailureCategory::Resource);
        assert_eq!(rules.categorize("Access denied"), FailureCategory::Permission);
        assert_eq!(rules.categorize("kernel crash"), FailureCategory::Fatal);
        assert_eq!(rules.categorize("something odd"), FailureCategory::Logic);
        assert_eq!(rules.categorize("Connection timeout"), rules.categorize("Connection timeout"));
    }

    #[test]
    fn test_select_action_overrides_and_switch() {
        let rules = RecoveryRules::default();
        assert_eq!(
            rules.select_action("calculator", FailureCategory::Transient, 1),
            RecoveryAction::Retry { base_delay: 2.0 }
        );
        assert_eq!(
            rules.select_action("web_search", FailureCategory::Transient, 2),
            RecoveryAction::Retry { base_delay: 5.0 }
        );
        assert_eq!(
            rules.select_action("web_search", FailureCategory::Transient, 3),
            RecoveryAction::Fallback {
                tool: Some("file_manager".into())
            }
        );
        assert_eq!(
            rules.select_action("calculator", FailureCategory::Transient, 3).strategy(),
            RecoveryStrategy::Escalate
        );
        for attempt in [4, 10] {
            assert_eq!(
                rules.select_action("calculator", FailureCategory::Transient, attempt).strategy(),
                RecoveryStrategy::Escalate
            );
        }
        match rules.select_action("terminal_executor", FailureCategory::Permission, 1) {
            RecoveryAction::Escalate { suggestion, .. } => assert!(suggestion.unwrap().contains("sudo")),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_switch_attempt_caps_retries() {
        let rules = RecoveryRules {
            retry_switch_attempt: 2,
            ..RecoveryRules::default()
        };
        assert_eq!(
            rules.select_action("calculator", FailureCategory::Resource, 1),
            RecoveryAction::Retry { base_delay: 5.0 }
        );
        assert_eq!(
            rules.select_action("calculator", FailureCategory::Resource, 2).strategy(),
            RecoveryStrategy::Escalate
        );
        assert_eq!(
            rules.select_action("terminal_executor", FailureCategory::Transient, 2),
            RecoveryAction::Fallback {
                tool: Some("file_manager".into())
            }
        );
        // 非 RETRY 动作不受切换次数影响
        assert_eq!(
            rules.select_action("calculator", FailureCategory::Fatal, 5),
            RecoveryAction::Abort
        );
    }

    #[test]
    fn test_delay_curves() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_units(1, 2.0), 2.0);
        assert_eq!(policy.delay_units(3, 2.0), 8.0);
        assert_eq!(policy.delay_units(10, 2.0), 60.0);

        let linear = RetryPolicy {
            backoff: BackoffStrategy::Linear,
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(linear.delay_units(3, 2.0), 6.0);

        let fixed = RetryPolicy {
            backoff: BackoffStrategy::Fixed,
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(fixed.delay_units(5, 0.01), 0.1);
    }

    #[test]
    fn test_jitter_within_ten_percent() {
        let policy = RetryPolicy::default();
        for attempt in 1..6 {
            let raw = policy.raw_delay(attempt, 2.0);
            let jittered = policy.delay_units(attempt, 2.0);
            assert!(jittered >= raw * 0.9 - 1e-9 && jittered <= raw * 1.1 + 1e-9);
        }
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let tool = ScriptedTool::fail_times("calculator", 1, "connection reset");
        let exec = executor(vec![tool.clone()]);
        let recovery = system();

        let outcome = recovery
            .execute_with_recovery(&exec, "calculator", 3, serde_json::json!({"expression": "2+2"}))
            .await;
        assert!(outcome.success);
        assert_eq!(tool.calls(), 2);

        let history = recovery.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].category, Some(FailureCategory::Transient));
        assert!(history[1].success);
    }

    #[tokio::test]
    async fn test_fallback_on_third_retry_attempt() {
        let search = ScriptedTool::failing("web_search", "network unavailable");
        let files = ScriptedTool::echo("file_manager");
        let exec = executor(vec![search.clone(), files.clone()]);
        let recovery = system();

        let outcome = recovery
            .execute_with_recovery(&exec, "web_search", 3, serde_json::json!({"query": "rust"}))
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.status, OutcomeStatus::Fallback);
        assert_eq!(outcome.metadata.get("fallback_for"), Some(&Value::from("web_search")));
        assert_eq!(search.calls(), 3);
        assert_eq!(files.calls(), 1);

        let strategies: Vec<Option<RecoveryStrategy>> =
            recovery.history().await.iter().map(|r| r.strategy).collect();
        assert_eq!(
            strategies,
            vec![
                Some(RecoveryStrategy::Retry),
                Some(RecoveryStrategy::Retry),
                Some(RecoveryStrategy::Fallback),
                None
            ]
        );
    }

    #[tokio::test]
    async fn test_escalation_goes_to_channel() {
        let (handler, mut rx) = ChannelEscalation::new(4);
        let recovery = system().with_escalation(Arc::new(handler));
        let tool = ScriptedTool::failing("terminal_executor", "permission denied");
        let exec = executor(vec![tool.clone()]);

        let outcome = recovery
            .execute_with_recovery(&exec, "terminal_executor", 3, serde_json::json!({"command": "ls"}))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.recovery, Some(RecoveryStrategy::Escalate));
        assert_eq!(tool.calls(), 1);

        let report = rx.recv().await.unwrap();
        assert_eq!(report.category, FailureCategory::Permission);
        assert!(report.suggestion.contains("sudo"));
    }

    #[tokio::test]
    async fn test_fatal_aborts() {
        let exec = executor(vec![ScriptedTool::failing("calculator", "fatal: unrecoverable state")]);
        let outcome = system().execute_with_recovery(&exec, "calculator", 3, Value::Null).await;
        assert!(!outcome.success);
        assert_eq!(outcome.recovery, Some(RecoveryStrategy::Abort));
        assert_eq!(outcome.describe_failure(), "fatal: unrecoverable state (recovery: abort)");
    }

    #[tokio::test]
    async fn test_skip_override() {
        let mut rules = RecoveryRules::default();
        rules.overrides.push(ToolOverride {
            tool: "human_input".into(),
            category: FailureCategory::Logic,
            action: RecoveryAction::Skip,
        });
        let recovery = RecoverySystem::new(rules, fast_policy());
        let exec = executor(vec![ScriptedTool::failing("human_input", "no answer")]);

        let outcome = recovery.execute_with_recovery(&exec, "human_input", 3, Value::Null).await;
        assert!(outcome.success);
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.metadata.get("original_error"), Some(&Value::from("no answer")));
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let slow = ScriptedTool::echo("calculator").with_delay(Duration::from_millis(300));
        let exec = executor(vec![slow]);
        let recovery = system().with_attempt_timeout(Duration::from_millis(20));

        let outcome = recovery.execute_with_recovery(&exec, "calculator", 1, Value::Null).await;
        assert_eq!(outcome.status, OutcomeStatus::Timeout);
        assert_eq!(recovery.categorize(outcome.error_text()), FailureCategory::Transient);
    }

    #[tokio::test]
    async fn test_failure_patterns_and_suggestions() {
        let recovery = system();
        assert_eq!(
            recovery.suggest_improvements(None).await,
            vec!["No recent failures - system is performing well"]
        );

        let exec = executor(vec![ScriptedTool::failing("calculator", "invalid config value")]);
        for _ in 0..3 {
            recovery.execute_with_recovery(&exec, "calculator", 1, Value::Null).await;
        }

        let patterns = recovery.failure_patterns(None, DEFAULT_ANALYTICS_WINDOW).await;
        assert_eq!(patterns.total_failures, 3);
        assert_eq!(patterns.category_breakdown.get("configuration"), Some(&3));
        assert_eq!(patterns.tool_breakdown.get("calculator"), Some(&3));
        assert!(patterns.common_error_patterns.iter().all(|(w, _)| w.len() > 3));

        let suggestions = recovery.suggest_improvements(Some("calculator")).await;
        assert!(suggestions.iter().any(|s| s.starts_with("Configuration errors detected")));
    }
}
