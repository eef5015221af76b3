//! 工具编排器
//!
//! 按链策略执行工具链：Sequential（首个失败即停止）、Parallel（按依赖分层并发，层间全屏障）、
//! Conditional（顺序执行，由条件决定每步是否运行，失败不中断）。每次调用都经过恢复系统；
//! 整链超时与外部取消会放弃正在进行的调用。

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::RecoverySystem;
use crate::tools::{ToolInvoker, ToolOutcome, ToolRouter};
use crate::workflow::types::*;

/// create_tool_chain 的步骤描述
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepSpec {
    pub tool: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    /// 自由文本条件标签，按固定词表解析
    #[serde(default)]
    pub condition: Option<String>,
}

impl StepSpec {
    pub fn new(tool: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool: tool.into(),
            parameters,
            ..Self::default()
        }
    }

    pub fn depends_on(mut self, deps: Vec<StepId>) -> Self {
        self.depends_on = deps;
        self
    }
}

/// 工具编排器
pub struct ToolOrchestrator {
    invoker: Arc<dyn ToolInvoker>,
    recovery: Option<Arc<RecoverySystem>>,
    max_attempts: u32,
    router: ToolRouter,
    default_timeout_secs: u64,
    chain_counter: AtomicUsize,
}

impl ToolOrchestrator {
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            invoker,
            recovery: None,
            max_attempts: 3,
            router: ToolRouter::default(),
            default_timeout_secs: 600,
            chain_counter: AtomicUsize::new(0),
        }
    }

    /// 让链中每一步都经过恢复系统
    pub fn with_recovery(mut self, recovery: Arc<RecoverySystem>, max_attempts: u32) -> Self {
        self.recovery = Some(recovery);
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_router(mut self, router: ToolRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_default_timeout(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    pub fn invoker(&self) -> &Arc<dyn ToolInvoker> {
        &self.invoker
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    pub fn default_timeout_secs(&self) -> u64 {
        self.default_timeout_secs
    }

    /// 单次调用，直接委托给调用契约
    pub async fn execute_single_tool(&self, tool: &str, params: Value) -> ToolOutcome {
        tracing::info!(tool, "Executing tool");
        let outcome = self.invoker.invoke(tool, params).await;
        if outcome.success {
            tracing::info!(tool, duration_ms = outcome.duration_ms, "Tool executed successfully");
        } else {
            tracing::warn!(tool, "Tool failed: {}", outcome.error_text());
        }
        outcome
    }

    /// 链内一步：有恢复系统时走恢复流程
    async fn run_step(&self, step: &ToolChainStep) -> ToolOutcome {
        match &self.recovery {
            Some(recovery) => {
                recovery
                    .execute_with_recovery(
                        self.invoker.as_ref(),
                        &step.tool_name,
                        self.max_attempts,
                        step.parameters.clone(),
                    )
                    .await
            }
            None => self.execute_single_tool(&step.tool_name, step.parameters.clone()).await,
        }
    }

    pub async fn execute_tool_chain(&self, chain: &ToolChain) -> ChainExecutionResult {
        self.execute_tool_chain_with_cancel(chain, CancellationToken::new()).await
    }

    /// 执行工具链；超时或取消时丢弃进行中的调用，保留已完成步骤的结果
    pub async fn execute_tool_chain_with_cancel(
        &self,
        chain: &ToolChain,
        cancel: CancellationToken,
    ) -> ChainExecutionResult {
        let start = Instant::now();
        tracing::info!(
            chain_id = %chain.chain_id,
            strategy = ?chain.strategy,
            steps = chain.steps.len(),
            "Executing tool chain"
        );

        let mut result = ChainExecutionResult::new(chain.chain_id.clone());
        let timeout_secs = chain.timeout_secs;
        let deadline = async move {
            if timeout_secs == 0 {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep(Duration::from_secs(timeout_secs)).await
            }
        };

        let interrupted = tokio::select! {
            _ = self.run_strategy(chain, &mut result) => None,
            _ = deadline => Some(format!("Chain timeout after {timeout_secs}s")),
            _ = cancel.cancelled() => Some("Chain cancelled".to_string()),
        };

        if let Some(reason) = interrupted {
            tracing::warn!(chain_id = %chain.chain_id, "{reason}");
            result.fail(reason);
        }

        let failed: Vec<String> = result.failed_steps().into_iter().cloned().collect();
        if !failed.is_empty() {
            result.fail(format!("Failed steps: {}", failed.join(", ")));
        }

        result.elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            chain_id = %chain.chain_id,
            success = result.success,
            completed = result.completed_steps.len(),
            elapsed_ms = result.elapsed_ms,
            "Chain completed"
        );
        result
    }

    async fn run_strategy(&self, chain: &ToolChain, result: &mut ChainExecutionResult) {
        match chain.strategy {
            ChainStrategy::Sequential => self.execute_sequential(chain, result).await,
            ChainStrategy::Parallel => self.execute_parallel(chain, result).await,
            ChainStrategy::Conditional => self.execute_conditional(chain, result).await,
        }
    }

    fn dependencies_met(step: &ToolChainStep, result: &ChainExecutionResult) -> bool {
        step.depends_on.iter().all(|d| result.completed_steps.contains(d))
    }

    fn condition_holds(step: &ToolChainStep, result: &ChainExecutionResult) -> bool {
        step.condition
            .map_or(true, |c| c.holds(result.step_results.values()))
    }

    async fn execute_sequential(&self, chain: &ToolChain, result: &mut ChainExecutionResult) {
        for step in &chain.steps {
            if !Self::dependencies_met(step, result) {
                result.fail(format!("Dependencies not met for step {}", step.step_id));
                break;
            }
            if !Self::condition_holds(step, result) {
                tracing::info!(step = %step.step_id, condition = ?step.condition, "Skipping step due to condition");
                result.skipped_steps.push(step.step_id.clone());
                continue;
            }

            let outcome = self.run_step(step).await;
            let halted = !outcome.success;
            if halted {
                result.fail(format!("Step {} failed: {}", step.step_id, outcome.describe_failure()));
            }
            result.record(&step.step_id, outcome);
            if halted {
                break;
            }
        }
    }

    async fn execute_conditional(&self, chain: &ToolChain, result: &mut ChainExecutionResult) {
        for step in &chain.steps {
            if !Self::dependencies_met(step, result) || !Self::condition_holds(step, result) {
                tracing::info!(step = %step.step_id, "Step gated out");
                result.skipped_steps.push(step.step_id.clone());
                continue;
            }
            let outcome = self.run_step(step).await;
            if !outcome.success {
                tracing::warn!(step = %step.step_id, "Conditional step failed: {}", outcome.describe_failure());
            }
            result.record(&step.step_id, outcome);
        }
    }

    async fn execute_parallel(&self, chain: &ToolChain, result: &mut ChainExecutionResult) {
        let levels = chain.dependency_graph().ready_levels();

        for level in levels {
            if level.forced {
                tracing::warn!(steps = ?level.ids, "Unresolvable dependencies, running remaining steps together");
            }

            let mut runnable: Vec<&ToolChainStep> = Vec::new();
            for id in &level.ids {
                let Some(step) = chain.step(id) else { continue };
                if !Self::dependencies_met(step, result) {
                    result.record(
                        &step.step_id,
                        ToolOutcome::failure(
                            step.tool_name.clone(),
                            format!("Dependencies not met for step {}", step.step_id),
                            0,
                        ),
                    );
                } else if !Self::condition_holds(step, result) {
                    result.skipped_steps.push(step.step_id.clone());
                } else {
                    runnable.push(step);
                }
            }

            let futures = runnable.iter().map(|step| async move {
                let outcome = AssertUnwindSafe(self.run_step(step)).catch_unwind().await;
                let outcome = outcome.unwrap_or_else(|panic| {
                    ToolOutcome::failure(step.tool_name.clone(), panic_message(&panic), 0)
                });
                (step.step_id.clone(), outcome)
            });

            for (step_id, outcome) in join_all(futures).await {
                result.record(&step_id, outcome);
            }
        }
    }

    /// 自由文本 -> 工具列表（规则顺序）
    pub fn route_task_to_tools(&self, task: &str) -> Vec<String> {
        self.router.route(task)
    }

    /// 由步骤描述创建顺序工具链，步骤 ID 为 step_01, step_02, ...
    pub fn create_tool_chain(&self, description: &str, steps: Vec<StepSpec>) -> ToolChain {
        let n = self.chain_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let chain_id = format!("chain_{n:03}");
        let steps: Vec<ToolChainStep> = steps
            .into_iter()
            .enumerate()
            .map(|(i, spec)| ToolChainStep {
                step_id: format!("step_{:02}", i + 1),
                tool_name: spec.tool,
                parameters: spec.parameters,
                depends_on: spec.depends_on,
                condition: spec.condition.as_deref().and_then(StepCondition::parse),
            })
            .collect();

        tracing::info!(%chain_id, steps = steps.len(), "Created tool chain");
        ToolChain {
            chain_id,
            name: format!("Chain for: {description}"),
            description: description.to_string(),
            steps,
            strategy: ChainStrategy::Sequential,
            timeout_secs: self.default_timeout_secs,
        }
    }

    /// 把未注册工具替换为路由得到的第一个可用替代
    pub fn optimize_tool_chain(&self, chain: &ToolChain) -> ToolChain {
        let steps = chain
            .steps
            .iter()
            .map(|step| {
                if self.invoker.has_tool(&step.tool_name) {
                    return step.clone();
                }
                let alternatives = self.route_task_to_tools(&format!("Alternative for {}", step.tool_name));
                let replacement = alternatives
                    .iter()
                    .find(|t| self.invoker.has_tool(t))
                    .or_else(|| alternatives.first())
                    .cloned();
                match replacement {
                    Some(tool) => {
                        tracing::info!(step = %step.step_id, from = %step.tool_name, to = %tool, "Replaced unavailable tool");
                        ToolChainStep {
                            tool_name: tool,
                            ..step.clone()
                        }
                    }
                    None => step.clone(),
                }
            })
            .collect();

        ToolChain {
            chain_id: format!("{}_opt", chain.chain_id),
            name: format!("{} (Optimized)", chain.name),
            description: chain.description.clone(),
            steps,
            strategy: chain.strategy,
            timeout_secs: chain.timeout_secs,
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("Tool panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("Tool panicked: {s}")
    } else {
        "Tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RecoveryRules, RetryPolicy};
    use crate::tools::{ScriptedTool, ToolExecutor, ToolRegistry};
    use crate::workflow::ToolChainBuilder;
    use serde_json::json;

    fn orchestrator(tools: Vec<ScriptedTool>) -> ToolOrchestrator {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        ToolOrchestrator::new(Arc::new(ToolExecutor::new(registry, 5)))
    }

    #[tokio::test]
    async fn test_sequential_halts_on_first_failure() {
        let last = ScriptedTool::echo("file_manager");
        let orch = orchestrator(vec![
            ScriptedTool::echo("web_search"),
            ScriptedTool::failing("calculator", "division by zero"),
            last.clone(),
        ]);
        let chain = ToolChainBuilder::new("seq")
            .step("s1", "web_search", json!({"query": "x"}))
            .step("s2", "calculator", json!({"expression": "1/0"}))
            .step("s3", "file_manager", json!({"path": "out"}))
            .build()
            .unwrap();

        let result = orch.execute_tool_chain(&chain).await;
        assert!(!result.success);
        assert_eq!(result.completed_steps, vec!["s1"]);
        assert_eq!(result.error_message.as_deref(), Some("Step s2 failed: division by zero"));
        assert_eq!(last.calls(), 0);
    }

    #[tokio::test]
    async fn test_sequential_failure_message_names_recovery_strategy() {
        let rules = RecoveryRules::default();
        let policy = RetryPolicy {
            time_unit: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let orch = orchestrator(vec![ScriptedTool::failing("calculator", "access denied")])
            .with_recovery(Arc::new(RecoverySystem::new(rules, policy)), 3);
        let chain = ToolChainBuilder::new("seq")
            .step("s1", "calculator", json!({}))
            .build()
            .unwrap();

        let result = orch.execute_tool_chain(&chain).await;
        assert_eq!(
            result.error_message.as_deref(),
            Some("Step s1 failed: access denied (recovery: escalate)")
        );
    }

    #[tokio::test]
    async fn test_parallel_levels_with_barrier() {
        let orch = orchestrator(vec![
            ScriptedTool::echo("web_search").with_delay(Duration::from_millis(30)),
            ScriptedTool::echo("calculator"),
            ScriptedTool::echo("file_manager"),
        ]);
        let chain = ToolChainBuilder::new("par")
            .strategy(ChainStrategy::Parallel)
            .step("a", "web_search", json!({}))
            .step("b", "calculator", json!({}))
            .step("c", "file_manager", json!({}))
            .depends_on("c", vec!["a".into(), "b".into()])
            .build()
            .unwrap();

        let result = orch.execute_tool_chain(&chain).await;
        assert!(result.success);
        assert_eq!(result.completed_steps.len(), 3);
        assert_eq!(result.completed_steps.last().map(String::as_str), Some("c"));
    }

    #[tokio::test]
    async fn test_parallel_converts_panic_and_blocks_dependents() {
        let orch = orchestrator(vec![ScriptedTool::panicking("calculator"), ScriptedTool::echo("file_manager")]);
        let chain = ToolChainBuilder::new("par")
            .strategy(ChainStrategy::Parallel)
            .step("a", "calculator", json!({}))
            .step("b", "file_manager", json!({}))
            .step("c", "file_manager", json!({}))
            .after("a", "c")
            .build()
            .unwrap();

        let result = orch.execute_tool_chain(&chain).await;
        assert!(!result.success);
        assert!(result.step_results["a"].error_text().contains("panicked"));
        assert!(result.step_results["b"].success);
        assert_eq!(result.step_results["c"].error_text(), "Dependencies not met for step c");
        assert_eq!(result.error_message.as_deref(), Some("Failed steps: a, c"));
    }

    #[tokio::test]
    async fn test_conditional_runs_compensation_only_after_failure() {
        let notify = ScriptedTool::echo("human_input");
        let orch = orchestrator(vec![
            ScriptedTool::failing("terminal_executor", "exit code 2"),
            notify.clone(),
            ScriptedTool::echo("file_manager"),
        ]);
        let chain = ToolChainBuilder::new("cond")
            .strategy(ChainStrategy::Conditional)
            .step("build", "terminal_executor", json!({"command": "make"}))
            .step("publish", "file_manager", json!({}))
            .condition("publish", StepCondition::AllPriorSucceeded)
            .step("alert", "human_input", json!({"prompt": "build broke"}))
            .condition("alert", StepCondition::AnyPriorFailed)
            .build()
            .unwrap();

        let result = orch.execute_tool_chain(&chain).await;
        assert_eq!(result.skipped_steps, vec!["publish"]);
        assert_eq!(result.completed_steps, vec!["alert"]);
        assert_eq!(notify.calls(), 1);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_chain_timeout_keeps_completed_steps() {
        let orch = orchestrator(vec![
            ScriptedTool::echo("calculator"),
            ScriptedTool::echo("web_search").with_delay(Duration::from_secs(3)),
        ]);
        let chain = ToolChainBuilder::new("slow")
            .timeout_secs(1)
            .step("fast", "calculator", json!({}))
            .step("slow", "web_search", json!({}))
            .build()
            .unwrap();

        let result = orch.execute_tool_chain(&chain).await;
        assert!(!result.success);
        assert_eq!(result.completed_steps, vec!["fast"]);
        assert_eq!(result.error_message.as_deref(), Some("Chain timeout after 1s"));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let orch = orchestrator(vec![ScriptedTool::echo("web_search").with_delay(Duration::from_secs(5))]);
        let chain = ToolChainBuilder::new("cancel")
            .step("s1", "web_search", json!({}))
            .build()
            .unwrap();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = orch.execute_tool_chain_with_cancel(&chain, token).await;
        assert_eq!(result.error_message.as_deref(), Some("Chain cancelled"));
        assert!(result.step_results.is_empty());
    }

    #[test]
    fn test_create_and_optimize_chain() {
        let orch = orchestrator(vec![ScriptedTool::echo("file_manager")]);
        let chain = orch.create_tool_chain(
            "collect data",
            vec![
                StepSpec::new("database", json!({"table": "t"})),
                StepSpec::new("file_manager", json!({})).depends_on(vec!["step_01".into()]),
            ],
        );
        assert_eq!(chain.chain_id, "chain_001");
        assert_eq!(chain.name, "Chain for: collect data");
        assert_eq!(chain.steps[1].step_id, "step_02");
        assert_eq!(chain.timeout_secs, 600);

        let optimized = orch.optimize_tool_chain(&chain);
        assert_eq!(optimized.chain_id, "chain_001_opt");
        assert_eq!(optimized.steps[0].tool_name, "file_manager");
        assert_eq!(optimized.steps[0].parameters, json!({"table": "t"}));
    }
}
