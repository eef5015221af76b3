//! 协调器：分解 -> 校验 -> 路线图 -> 校验 -> 跟踪，以及带恢复的执行
//!
//! 每个 tracking id 对应一次推理结果；进度、对齐、回退与完成都以 tracking id 为键。
//! 内部错误在这里转换为对外契约的返回形状（bool / TrackStatus / 结果记录）并记录日志。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::core::recovery::RecoverySystem;
use crate::core::tracker::{TrackKeeper, TrackStatus, TrackingSummary};
use crate::core::EngineError;
use crate::llm::LlmClient;
use crate::planning::{Check, CheckSummary, Decomposition, Roadmap, RoadmapGenerator, TaskDecomposer, Validator};
use crate::tools::{ParameterMapper, ToolOutcome};
use crate::workflow::{ChainExecutionResult, ChainStrategy, StepSpec, ToolChain, ToolChainStep, ToolOrchestrator};

const NARRATOR_SYSTEM_PROMPT: &str =
    "You explain execution plans. Given a task and its subtasks, write a short rationale for the plan.";

/// 校验严格程度：Strict 下任一失败项阻断规划
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    #[default]
    Lenient,
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningResult {
    pub success: bool,
    pub decomposition: Option<Decomposition>,
    pub roadmap: Option<Roadmap>,
    pub checks: Vec<Check>,
    pub tracking_id: Option<String>,
    pub confidence: f64,
    pub reasoning_ms: u64,
    /// LLM 生成的计划说明
    pub narrative: Option<String>,
    /// LLM 错误原文
    pub narrative_error: Option<String>,
    pub error_message: Option<String>,
}

impl ReasoningResult {
    fn blocked(decomposition: Decomposition, roadmap: Option<Roadmap>, checks: Vec<Check>, started: Instant) -> Self {
        let failed = checks.iter().filter(|c| c.failed()).count();
        Self {
            success: false,
            decomposition: Some(decomposition),
            roadmap,
            checks,
            tracking_id: None,
            confidence: 0.0,
            reasoning_ms: started.elapsed().as_millis() as u64,
            narrative: None,
            narrative_error: None,
            error_message: Some(EngineError::ValidationBlocked(format!("{failed} critical issues")).to_string()),
        }
    }
}

/// 动作与计划的对齐结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub aligned: bool,
    pub confidence: f64,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// 执行目标
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTarget {
    Chain(ToolChain),
    Tool(String),
    /// 按任务描述自动路由
    #[default]
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub request_id: String,
    pub task_description: String,
    #[serde(default)]
    pub target: ExecutionTarget,
    #[serde(default)]
    pub parameters: Value,
}

impl ExecutionRequest {
    pub fn new(task_description: impl Into<String>, target: ExecutionTarget, parameters: Value) -> Self {
        Self {
            request_id: format!("exec_{}", uuid::Uuid::new_v4()),
            task_description: task_description.into(),
            target,
            parameters,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub request_id: String,
    pub success: bool,
    pub tool_results: BTreeMap<String, ToolOutcome>,
    pub chain_result: Option<ChainExecutionResult>,
    pub elapsed_ms: u64,
    pub error_message: Option<String>,
}

/// 按阶段执行路线图的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadmapRun {
    pub tracking_id: String,
    pub success: bool,
    pub phases: Vec<ChainExecutionResult>,
    pub completed_steps: Vec<String>,
    pub final_status: TrackStatus,
    pub error_message: Option<String>,
}

/// 推理 + 执行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub reasoning: ReasoningResult,
    pub execution: Option<RoadmapRun>,
}

impl TaskRun {
    pub fn success(&self) -> bool {
        self.reasoning.success && self.execution.as_ref().map(|e| e.success).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningSummary {
    pub task: Option<String>,
    pub success: bool,
    pub confidence: f64,
    pub reasoning_ms: u64,
    pub subtasks: usize,
    pub roadmap_steps: usize,
    /// 非通过项数
    pub validation_issues: usize,
    pub validation: CheckSummary,
    pub tracking: Option<TrackingSummary>,
}

pub struct Coordinator {
    pub(crate) decomposer: TaskDecomposer,
    pub(crate) roadmaps: RoadmapGenerator,
    pub(crate) validator: Validator,
    pub(crate) tracker: TrackKeeper,
    pub(crate) recovery: Arc<RecoverySystem>,
    pub(crate) orchestrator: ToolOrchestrator,
    pub(crate) mapper: ParameterMapper,
    pub(crate) narrator: Option<Arc<dyn LlmClient>>,
    pub(crate) max_attempts: u32,
    pub(crate) active: RwLock<HashMap<String, ReasoningResult>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("max_attempts", &self.max_attempts)
            .field("narrator", &self.narrator.as_ref().map(|n| n.model().to_string()))
            .finish()
    }
}

impl Coordinator {
    pub fn tracker(&self) -> &TrackKeeper {
        &self.tracker
    }

    pub fn recovery(&self) -> &Arc<RecoverySystem> {
        &self.recovery
    }

    pub fn orchestrator(&self) -> &ToolOrchestrator {
        &self.orchestrator
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub async fn reason_about_task(&self, task: &str, strictness: Strictness) -> ReasoningResult {
        let started = Instant::now();
        tracing::info!(task, ?strictness, "Starting reasoning about task");

        let decomposition = self.decomposer.decompose(task);
        let mut checks = self.validator.validate_decomposition(&decomposition);
        if strictness == Strictness::Strict && checks.iter().any(Check::failed) {
            tracing::warn!(task, "Decomposition blocked by validation");
            return ReasoningResult::blocked(decomposition, None, checks, started);
        }

        let roadmap = self.roadmaps.generate(&decomposition);
        let roadmap_checks = self.validator.validate_roadmap(&roadmap);
        let roadmap_failed = roadmap_checks.iter().any(Check::failed);
        checks.extend(roadmap_checks);
        if strictness == Strictness::Strict && roadmap_failed {
            tracing::warn!(task, roadmap_id = %roadmap.id, "Roadmap blocked by validation");
            return ReasoningResult::blocked(decomposition, Some(roadmap), checks, started);
        }

        let tracking_id = self.tracker.start_tracking(&roadmap).await;
        let check_confidence = checks.iter().map(|c| c.confidence).sum::<f64>() / checks.len().max(1) as f64;
        let confidence = (decomposition.confidence + roadmap.confidence + check_confidence) / 3.0;
        let (narrative, narrative_error) = self.narrate(&decomposition).await;

        let result = ReasoningResult {
            success: true,
            decomposition: Some(decomposition),
            roadmap: Some(roadmap),
            checks,
            tracking_id: Some(tracking_id.clone()),
            confidence,
            reasoning_ms: started.elapsed().as_millis() as u64,
            narrative,
            narrative_error,
            error_message: None,
        };
        self.active.write().await.insert(tracking_id.clone(), result.clone());
        tracing::info!(%tracking_id, confidence, elapsed_ms = result.reasoning_ms, "Reasoning completed");
        result
    }

    async fn narrate(&self, d: &Decomposition) -> (Option<String>, Option<String>) {
        let Some(narrator) = &self.narrator else {
            return (None, None);
        };
        let subtasks: Vec<String> = d.subtasks.iter().map(|s| format!("- {} ({}min)", s.name, s.estimated_minutes)).collect();
        let prompt = format!("Task: {}\nSubtasks:\n{}", d.original_task, subtasks.join("\n"));
        match narrator.generate(&prompt, Some(NARRATOR_SYSTEM_PROMPT)).await {
            Ok(resp) => {
                tracing::debug!(tokens = resp.token_usage.total, "Narrative generated");
                (Some(resp.content), None)
            }
            Err(e) => {
                tracing::warn!("Narrative generation failed: {}", e);
                (None, Some(e.message()))
            }
        }
    }

    async fn is_active(&self, tracking_id: &str) -> bool {
        self.active.read().await.contains_key(tracking_id)
    }

    pub async fn update_progress(&self, tracking_id: &str, step_id: &str, progress: f64, notes: &str) -> TrackStatus {
        if !self.is_active(tracking_id).await {
            tracing::error!(tracking_id, "Unknown tracking ID");
            return TrackStatus::Lost;
        }
        match self.tracker.update_progress(tracking_id, step_id, progress, notes).await {
            Ok(status) => {
                if status.is_off_track() {
                    let suggestions = self.tracker.recovery_suggestions(tracking_id).await;
                    tracing::info!(tracking_id, ?suggestions, "Recovery suggestions");
                }
                status
            }
            Err(e) => {
                tracing::error!(tracking_id, "Progress update failed: {}", e);
                TrackStatus::Lost
            }
        }
    }

    pub async fn check_alignment(&self, tracking_id: &str, observed_action: &str, expected_step: &str) -> AlignmentReport {
        let unknown = || AlignmentReport {
            aligned: false,
            confidence: 0.0,
            message: "Unknown tracking ID".to_string(),
            suggestions: vec!["Restart reasoning process".to_string()],
        };
        if !self.is_active(tracking_id).await {
            return unknown();
        }
        match self.tracker.detect_confusion(tracking_id, observed_action, expected_step).await {
            Ok(report) => AlignmentReport {
                aligned: !report.confused,
                confidence: if report.confused { 0.2 } else { 0.8 },
                message: report.message,
                suggestions: report.suggestions,
            },
            Err(e) => {
                tracing::error!(tracking_id, "Alignment check failed: {}", e);
                unknown()
            }
        }
    }

    pub async fn recover(&self, tracking_id: &str, checkpoint_id: &str) -> bool {
        if !self.is_active(tracking_id).await {
            tracing::error!(tracking_id, "Unknown tracking ID");
            return false;
        }
        match self.tracker.backtrack_to_checkpoint(tracking_id, checkpoint_id).await {
            Ok(()) => {
                tracing::info!(tracking_id, checkpoint_id, "Recovered reasoning");
                true
            }
            Err(e) => {
                tracing::error!(tracking_id, "Failed to recover reasoning: {}", e);
                false
            }
        }
    }

    /// 记录 100% 进度后清理跟踪状态
    pub async fn complete(&self, tracking_id: &str) -> bool {
        if self.active.write().await.remove(tracking_id).is_none() {
            return false;
        }
        if let Err(e) = self
            .tracker
            .update_progress(tracking_id, "completed", 100.0, "Reasoning completed")
            .await
        {
            tracing::warn!(tracking_id, "Final progress update failed: {}", e);
        }
        self.tracker.cleanup_tracking(tracking_id).await;
        tracing::info!(tracking_id, "Completed reasoning");
        true
    }

    pub async fn reasoning_summary(&self, tracking_id: &str) -> Option<ReasoningSummary> {
        let result = self.active.read().await.get(tracking_id).cloned()?;
        let validation = CheckSummary::of(&result.checks);
        Some(ReasoningSummary {
            task: result.decomposition.as_ref().map(|d| d.original_task.clone()),
            success: result.success,
            confidence: result.confidence,
            reasoning_ms: result.reasoning_ms,
            subtasks: result.decomposition.as_ref().map(|d| d.subtasks.len()).unwrap_or(0),
            roadmap_steps: result.roadmap.as_ref().map(|r| r.steps.len()).unwrap_or(0),
            validation_issues: validation.total - validation.passed,
            validation,
            tracking: self.tracker.tracking_summary(tracking_id).await,
        })
    }

    pub async fn list_active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 执行工具链 / 单个工具 / 自动路由；链的成功决定整体成功，否则要求所有工具成功
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionReport {
        let started = Instant::now();
        tracing::info!(request_id = %request.request_id, "Starting execution request");

        let mut report = ExecutionReport {
            request_id: request.request_id.clone(),
            success: false,
            tool_results: BTreeMap::new(),
            chain_result: None,
            elapsed_ms: 0,
            error_message: None,
        };

        match &request.target {
            ExecutionTarget::Chain(chain) => {
                let result = self.orchestrator.execute_tool_chain(chain).await;
                report.attach_chain(result);
            }
            ExecutionTarget::Tool(tool) => {
                let outcome = self.run_tool(tool, &request.parameters).await;
                report.tool_results.insert(tool.clone(), outcome);
            }
            ExecutionTarget::Auto => {
                let tools = self.orchestrator.route_task_to_tools(&request.task_description);
                tracing::info!(task = %request.task_description, ?tools, "Auto-routing task");
                if let [tool] = tools.as_slice() {
                    let outcome = self.run_tool(tool, &request.parameters).await;
                    report.tool_results.insert(tool.clone(), outcome);
                } else {
                    let specs = tools
                        .iter()
                        .enumerate()
                        .map(|(i, tool)| {
                            let params = self.mapper.map_parameters(tool, &request.parameters);
                            let deps = if i > 0 { vec![format!("step_{i:02}")] } else { Vec::new() };
                            StepSpec::new(tool.clone(), params).depends_on(deps)
                        })
                        .collect();
                    let chain = self.orchestrator.create_tool_chain(&request.task_description, specs);
                    let result = self.orchestrator.execute_tool_chain(&chain).await;
                    report.attach_chain(result);
                }
            }
        }

        if let Some(chain) = &report.chain_result {
            report.success = chain.success;
            report.error_message = chain.error_message.clone();
        } else {
            report.success = !report.tool_results.is_empty() && report.tool_results.values().all(|o| o.success);
            report.error_message = report
                .tool_results
                .values()
                .find(|o| !o.success)
                .map(ToolOutcome::describe_failure);
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(request_id = %report.request_id, success = report.success, "Execution completed");
        report
    }

    /// 参数映射后经恢复系统调用
    async fn run_tool(&self, tool: &str, params: &Value) -> ToolOutcome {
        let mapped = self.mapper.map_parameters(tool, params);
        let missing = self.mapper.validate_parameters(tool, &mapped);
        if !missing.is_empty() {
            tracing::warn!(tool, ?missing, "Missing required parameters");
        }
        self.recovery
            .execute_with_recovery(self.orchestrator.invoker().as_ref(), tool, self.max_attempts, mapped)
            .await
    }

    /// 按阶段执行已规划的路线图：每个阶段是一条并行链，阶段间顺序执行；
    /// 步骤的全部工具成功后按已完成比例更新进度，任一阶段失败即停止
    pub async fn execute_roadmap(&self, tracking_id: &str, params: &Value) -> Result<RoadmapRun, EngineError> {
        let roadmap = self
            .active
            .read()
            .await
            .get(tracking_id)
            .and_then(|r| r.roadmap.clone())
            .ok_or_else(|| EngineError::UnknownTracking(tracking_id.to_string()))?;

        let total = roadmap.steps.len().max(1) as f64;
        let mut run = RoadmapRun {
            tracking_id: tracking_id.to_string(),
            success: true,
            phases: Vec::new(),
            completed_steps: Vec::new(),
            final_status: TrackStatus::OnTrack,
            error_message: None,
        };

        for (index, phase) in roadmap.phases.iter().enumerate() {
            let chain = self.phase_chain(&roadmap, index, phase, params);
            tracing::info!(tracking_id, phase = index + 1, steps = phase.len(), "Executing roadmap phase");
            let result = self.orchestrator.execute_tool_chain(&chain).await;

            for step_id in phase {
                let prefix = format!("{step_id}:");
                let done = chain
                    .steps
                    .iter()
                    .filter(|s| s.step_id.starts_with(&prefix))
                    .all(|s| result.completed_steps.contains(&s.step_id));
                if done {
                    run.completed_steps.push(step_id.clone());
                    let progress = run.completed_steps.len() as f64 / total * 100.0;
                    let name = roadmap.step(step_id).map(|s| s.name.as_str()).unwrap_or(step_id);
                    run.final_status = self
                        .update_progress(tracking_id, step_id, progress, &format!("Completed {name}"))
                        .await;
                }
            }

            let failed = !result.success;
            if failed {
                let reason = result.error_message.clone().unwrap_or_else(|| "unknown error".to_string());
                run.success = false;
                run.error_message = Some(format!("Phase {} failed: {reason}", index + 1));
                tracing::warn!(tracking_id, phase = index + 1, "Roadmap phase failed");
            }
            run.phases.push(result);
            if failed {
                break;
            }
        }
        Ok(run)
    }

    /// 阶段内每个步骤展开为其所需工具的顺序子链（{step_id}:{tool}），不同步骤之间并行
    fn phase_chain(&self, roadmap: &Roadmap, index: usize, phase: &[String], params: &Value) -> ToolChain {
        let mut steps = Vec::new();
        for step in phase.iter().filter_map(|id| roadmap.step(id)) {
            let tools = if step.required_capabilities.is_empty() {
                self.orchestrator
                    .route_task_to_tools(&step.description)
                    .into_iter()
                    .take(1)
                    .collect()
            } else {
                step.required_capabilities.clone()
            };

            let mut base = match params {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            };
            base.entry("task").or_insert_with(|| Value::String(step.description.clone()));
            let base = Value::Object(base);

            let mut previous: Option<String> = None;
            for tool in tools {
                let chain_step_id = format!("{}:{tool}", step.step_id);
                let mut chain_step =
                    ToolChainStep::new(chain_step_id.clone(), tool.clone(), self.mapper.map_parameters(&tool, &base));
                chain_step.depends_on = previous.iter().cloned().collect();
                previous = Some(chain_step_id);
                steps.push(chain_step);
            }
        }

        ToolChain {
            chain_id: format!("{}_phase_{:02}", roadmap.id, index + 1),
            name: format!("Phase {} of {}", index + 1, roadmap.source_task),
            description: roadmap.source_task.clone(),
            steps,
            strategy: ChainStrategy::Parallel,
            timeout_secs: self.orchestrator.default_timeout_secs(),
        }
    }

    /// 推理后直接执行；全部成功时结束跟踪
    pub async fn run_task(&self, task: &str, strictness: Strictness, params: &Value) -> TaskRun {
        let reasoning = self.reason_about_task(task, strictness).await;
        let Some(tracking_id) = reasoning.tracking_id.clone() else {
            return TaskRun {
                reasoning,
                execution: None,
            };
        };

        let execution = match self.execute_roadmap(&tracking_id, params).await {
            Ok(run) => Some(run),
            Err(e) => {
                tracing::error!(%tracking_id, "Roadmap execution failed: {}", e);
                None
            }
        };
        if execution.as_ref().map(|r| r.success).unwrap_or(false) {
            self.complete(&tracking_id).await;
        }
        TaskRun { reasoning, execution }
    }
}

impl ExecutionReport {
    fn attach_chain(&mut self, result: ChainExecutionResult) {
        self.tool_results = result
            .step_results
            .iter()
            .map(|(id, outcome)| (id.clone(), outcome.clone()))
            .collect();
        self.chain_result = Some(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::core::{CoordinatorBuilder, RecoveryRules, RetryPolicy};
    use crate::llm::MockLlmClient;
    use crate::tools::{ScriptedTool, ToolRegistry};
    use crate::workflow::ToolChainBuilder;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in ["file_manager", "terminal_executor", "web_search", "calculator", "human_input"] {
            registry.register(ScriptedTool::echo(name));
        }
        registry
    }

    fn fast_recovery() -> RecoverySystem {
        RecoverySystem::new(
            RecoveryRules::default(),
            RetryPolicy {
                time_unit: std::time::Duration::from_millis(1),
                jitter: false,
                ..RetryPolicy::default()
            },
        )
    }

    fn coordinator(registry: ToolRegistry) -> Coordinator {
        CoordinatorBuilder::new().registry(registry).recovery(fast_recovery()).build()
    }

    #[tokio::test]
    async fn test_reason_simple_task() {
        let c = coordinator(registry());
        let r = c.reason_about_task("Calculate 2+2", Strictness::Strict).await;
        assert!(r.success, "{:?}", r.error_message);
        assert_eq!(r.decomposition.as_ref().unwrap().subtasks.len(), 1);
        assert_eq!(r.roadmap.as_ref().unwrap().phases.len(), 1);
        let id = r.tracking_id.clone().unwrap();
        assert_eq!(c.list_active().await, vec![id.clone()]);
        assert!(r.confidence > 0.0 && r.confidence <= 1.0);
        assert!(r.narrative.is_none());
    }

    #[tokio::test]
    async fn test_strict_mode_blocks_failed_validation() {
        let c = coordinator(registry());
        // 通用模板的子任务名称与任务词没有重合，一致性检查失败
        let r = c.reason_about_task("Implement a parser", Strictness::Strict).await;
        assert!(!r.success);
        assert!(r.tracking_id.is_none());
        assert!(r.roadmap.is_none());
        assert_eq!(r.confidence, 0.0);
        assert_eq!(
            r.error_message.as_deref(),
            Some("Validation blocked: 1 critical issues")
        );
        assert!(c.list_active().await.is_empty());

        let lenient = c.reason_about_task("Implement a parser", Strictness::Lenient).await;
        assert!(lenient.success);
        assert!(lenient.checks.iter().any(|ch| ch.failed()));
    }

    #[tokio::test]
    async fn test_progress_alignment_recover_complete() {
        let c = coordinator(registry());
        let r = c.reason_about_task("Build an application", Strictness::Lenient).await;
        let id = r.tracking_id.unwrap();

        assert_eq!(c.update_progress(&id, "step_01", 10.0, "started").await, TrackStatus::OnTrack);
        assert_eq!(c.update_progress("missing", "step_01", 10.0, "").await, TrackStatus::Lost);

        let aligned = c.check_alignment(&id, "analyze requirements document", "req_analysis").await;
        assert!(aligned.aligned);
        assert_eq!(aligned.confidence, 0.8);
        let unknown = c.check_alignment("missing", "x", "y").await;
        assert_eq!(unknown.message, "Unknown tracking ID");

        assert!(c.recover(&id, "cp_001").await);
        assert!(!c.recover(&id, "cp_404").await);

        let summary = c.reasoning_summary(&id).await.unwrap();
        assert_eq!(summary.subtasks, 6);
        assert_eq!(summary.roadmap_steps, 6);
        assert_eq!(summary.validation.total, 11);

        assert!(c.complete(&id).await);
        assert!(!c.complete(&id).await);
        assert!(c.list_active().await.is_empty());
        assert!(c.tracker().state(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_execute_single_tool_and_auto_routing() {
        let c = coordinator(registry());
        let report = c
            .execute(ExecutionRequest::new(
                "compute",
                ExecutionTarget::Tool("calculator".into()),
                json!({"expression": "2+2"}),
            ))
            .await;
        assert!(report.success);
        assert_eq!(report.tool_results["calculator"].payload["expression"], "2+2");

        let report = c
            .execute(ExecutionRequest::new(
                "search the web then calculate the total",
                ExecutionTarget::Auto,
                json!({"query": "prices"}),
            ))
            .await;
        let chain = report.chain_result.as_ref().unwrap();
        assert!(report.success, "{:?}", report.error_message);
        assert_eq!(chain.completed_steps, vec!["step_01", "step_02"]);
        assert_eq!(report.tool_results.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_chain_failure_carries_strategy() {
        let mut registry = registry();
        registry.register(ScriptedTool::failing("broken", "permission denied"));
        let c = coordinator(registry);
        let chain = ToolChainBuilder::new("broken chain")
            .step("a", "calculator", json!({}))
            .step("b", "broken", json!({}))
            .after("a", "b")
            .build()
            .unwrap();
        let report = c.execute(ExecutionRequest::new("x", ExecutionTarget::Chain(chain), json!({}))).await;
        assert!(!report.success);
        let msg = report.error_message.unwrap();
        assert!(msg.contains("permission denied"));
        assert!(msg.contains("recovery: escalate"));
    }

    #[tokio::test]
    async fn test_run_task_executes_all_phases() {
        let c = coordinator(registry());
        let run = c.run_task("Build an application", Strictness::Lenient, &json!({})).await;
        assert!(run.success(), "{:?}", run.execution.as_ref().and_then(|e| e.error_message.clone()));
        let execution = run.execution.unwrap();
        assert_eq!(execution.phases.len(), 6);
        assert_eq!(execution.completed_steps.len(), 6);
        assert_eq!(execution.final_status, TrackStatus::Completed);
        assert!(c.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_roadmap_stops_at_failed_phase() {
        let mut registry = registry();
        registry.register(ScriptedTool::failing("terminal_executor", "fatal crash in runner"));
        let c = CoordinatorBuilder::new()
            .registry(registry)
            .recovery(fast_recovery())
            .max_attempts(1)
            .build();
        let r = c.reason_about_task("Build an application", Strictness::Lenient).await;
        let id = r.tracking_id.unwrap();
        let run = c.execute_roadmap(&id, &json!({})).await.unwrap();
        assert!(!run.success);
        assert_eq!(run.phases.len(), 3);
        assert_eq!(run.completed_steps, vec!["step_01", "step_02"]);
        assert!(run.error_message.unwrap().starts_with("Phase 3 failed"));
        assert_eq!(c.list_active().await, vec![id]);

        let err = c.execute_roadmap("missing", &json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownTracking(_)));
    }

    #[tokio::test]
    async fn test_narrator_success_and_failure() {
        let c = CoordinatorBuilder::new()
            .registry(registry())
            .narrator(Arc::new(MockLlmClient::new()))
            .build();
        let r = c.reason_about_task("Calculate 2+2", Strictness::Lenient).await;
        assert_eq!(r.narrative.as_deref(), Some("Mock rationale: Task: Calculate 2+2"));

        let c = CoordinatorBuilder::new()
            .registry(registry())
            .narrator(Arc::new(MockLlmClient::failing("rate limited")))
            .build();
        let r = c.reason_about_task("Calculate 2+2", Strictness::Lenient).await;
        assert!(r.success);
        assert_eq!(r.narrative_error.as_deref(), Some("rate limited"));
    }
}
