//! 工具链类型定义
//!
//! 与路线图无关的轻量步骤序列：步骤 ID、工具名、参数、依赖、可选条件；以及执行结果。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::ToolOutcome;

pub type ChainId = String;
pub type StepId = String;

/// 链执行策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStrategy {
    /// 顺序执行，首个失败即停止
    #[default]
    Sequential,
    /// 按依赖分层，同层并发，层间全屏障
    Parallel,
    /// 顺序执行，由条件决定每步是否运行
    Conditional,
}

/// 步骤条件（固定词表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCondition {
    /// 之前所有已执行步骤均成功
    AllPriorSucceeded,
    /// 之前任一已执行步骤失败
    AnyPriorFailed,
}

impl StepCondition {
    /// 从自由文本条件标签解析（含 "fail" 视为 AnyPriorFailed，含 "success"/"succeed" 视为 AllPriorSucceeded）
    pub fn parse(tag: &str) -> Option<Self> {
        let lower = tag.to_lowercase();
        if lower.contains("fail") {
            Some(Self::AnyPriorFailed)
        } else if lower.contains("succe") {
            Some(Self::AllPriorSucceeded)
        } else {
            None
        }
    }

    /// 基于已执行步骤的结果判断
    pub fn holds<'a, I>(&self, prior: I) -> bool
    where
        I: IntoIterator<Item = &'a ToolOutcome>,
    {
        let mut prior = prior.into_iter();
        match self {
            Self::AllPriorSucceeded => prior.all(|o| o.success),
            Self::AnyPriorFailed => prior.any(|o| !o.success),
        }
    }
}

/// 工具链中的一步
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChainStep {
    pub step_id: StepId,
    pub tool_name: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    #[serde(default)]
    pub condition: Option<StepCondition>,
}

impl ToolChainStep {
    pub fn new(step_id: impl Into<StepId>, tool_name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            step_id: step_id.into(),
            tool_name: tool_name.into(),
            parameters,
            depends_on: Vec::new(),
            condition: None,
        }
    }
}

/// 工具链
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChain {
    pub chain_id: ChainId,
    pub name: String,
    pub description: String,
    pub steps: Vec<ToolChainStep>,
    pub strategy: ChainStrategy,
    /// 整链超时（秒）
    pub timeout_secs: u64,
}

/// 链执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainExecutionResult {
    pub chain_id: ChainId,
    pub success: bool,
    pub step_results: BTreeMap<StepId, ToolOutcome>,
    pub elapsed_ms: u64,
    /// 成功完成的步骤（完成顺序）
    pub completed_steps: Vec<StepId>,
    /// 因条件不满足而跳过的步骤
    pub skipped_steps: Vec<StepId>,
    pub error_message: Option<String>,
}

impl ChainExecutionResult {
    pub fn new(chain_id: impl Into<ChainId>) -> Self {
        Self {
            chain_id: chain_id.into(),
            success: true,
            step_results: BTreeMap::new(),
            elapsed_ms: 0,
            completed_steps: Vec::new(),
            skipped_steps: Vec::new(),
            error_message: None,
        }
    }

    /// 失败的步骤 ID
    pub fn failed_steps(&self) -> Vec<&StepId> {
        self.step_results
            .iter()
            .filter(|(_, o)| !o.success)
            .map(|(id, _)| id)
            .collect()
    }

    pub(crate) fn record(&mut self, step_id: &str, outcome: ToolOutcome) {
        if outcome.success {
            self.completed_steps.push(step_id.to_string());
        }
        self.step_results.insert(step_id.to_string(), outcome);
    }

    /// 首次失败原因生效，后续不覆盖
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.success = false;
        if self.error_message.is_none() {
            self.error_message = Some(message.into());
        }
    }
}

/// 工具链构建 / 校验错误
#[derive(Error, Debug, PartialEq)]
pub enum ChainError {
    #[error("Duplicate step id: {0}")]
    DuplicateStep(StepId),
    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: StepId, dependency: StepId },
    #[error("Cyclic dependency detected: {0}")]
    CyclicDependency(String),
    #[error("Invalid chain configuration: {0}")]
    InvalidConfiguration(String),
}
