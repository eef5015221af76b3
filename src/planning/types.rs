//! 规划数据模型：子任务、分解结果、执行步骤与路线图

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Research,
    Development,
    Analysis,
    Creation,
    Communication,
    SystemOperation,
}

impl TaskType {
    /// 耗时估算的类型系数
    pub fn time_multiplier(&self) -> f64 {
        match self {
            Self::Research => 1.2,
            Self::Development => 1.5,
            Self::Analysis => 1.0,
            Self::Creation => 1.3,
            Self::Communication => 0.8,
            Self::SystemOperation => 0.7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Development => "development",
            Self::Analysis => "analysis",
            Self::Creation => "creation",
            Self::Communication => "communication",
            Self::SystemOperation => "system_operation",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 复杂度档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl Complexity {
    /// 基准分钟数
    pub fn base_minutes(&self) -> u32 {
        match self {
            Self::Simple => 15,
            Self::Moderate => 60,
            Self::Complex => 180,
            Self::VeryComplex => 480,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::VeryComplex => "very_complex",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 估算耗时（分钟）= 基准 × 类型系数，向下取整
pub fn estimate_minutes(complexity: Complexity, task_type: TaskType) -> u32 {
    (complexity.base_minutes() as f64 * task_type.time_multiplier()) as u32
}

/// 子任务，由分解器产出后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub name: String,
    pub description: String,
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub estimated_minutes: u32,
    pub dependencies: Vec<String>,
    pub required_capabilities: Vec<String>,
    pub success_criteria: String,
    pub confidence: f64,
}

/// 分解结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decomposition {
    pub original_task: String,
    pub subtasks: Vec<Subtask>,
    /// 稳定拓扑序
    pub execution_order: Vec<String>,
    pub total_estimated_minutes: u32,
    pub confidence: f64,
    pub rationale: String,
    /// 拓扑排序时因无就绪节点被强行放置的子任务
    #[serde(default)]
    pub forced_order: Vec<String>,
}

impl Decomposition {
    pub fn subtask(&self, id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    /// 依赖都存在，且执行顺序恰好覆盖全部子任务
    pub fn is_consistent(&self) -> bool {
        let ids: HashSet<&str> = self.subtasks.iter().map(|s| s.id.as_str()).collect();
        let deps_ok = self
            .subtasks
            .iter()
            .all(|s| s.dependencies.iter().all(|d| ids.contains(d.as_str())));
        let order: HashSet<&str> = self.execution_order.iter().map(String::as_str).collect();
        deps_ok && order == ids && self.execution_order.len() == ids.len()
    }
}

/// 执行步骤：与子任务一一对应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step_id: String,
    pub subtask_id: String,
    pub name: String,
    pub description: String,
    pub estimated_minutes: u32,
    pub required_capabilities: Vec<String>,
    /// 依赖的步骤 ID；无法解析的子任务 ID 原样保留，由校验层报告
    pub dependencies: Vec<String>,
    pub success_criteria: String,
    pub parallel_group: Option<String>,
}

/// 路线图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roadmap {
    pub id: String,
    pub source_task: String,
    pub steps: Vec<ExecutionStep>,
    /// 可并发执行的步骤组，按执行先后排列
    pub phases: Vec<Vec<String>>,
    pub critical_path: Vec<String>,
    pub total_estimated_minutes: u32,
    pub confidence: f64,
    /// 创建时间（毫秒时间戳）
    pub created_at: i64,
    /// 因依赖无法满足而被强行放入阶段的步骤
    #[serde(default)]
    pub forced_steps: Vec<String>,
}

impl Roadmap {
    pub fn step(&self, step_id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// 所在阶段下标
    pub fn phase_of(&self, step_id: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.iter().any(|s| s == step_id))
    }

    pub fn sum_of_step_minutes(&self) -> u32 {
        self.steps.iter().map(|s| s.estimated_minutes).sum()
    }
}
