//! 规划校验层
//!
//! 对分解结果与路线图做一组确定性检查，每项产出一条 [`Check`]（严重度 + 结论）。
//! 校验本身从不失败；是否因失败项而阻断由调用方（协调器的严格模式）决定。

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ValidationConfig;
use crate::planning::types::{Decomposition, Roadmap};
use crate::workflow::DependencyGraph;

/// 含糊的成功标准用词
const VAGUE_WORDS: &[&str] = &["good", "nice", "proper", "appropriate", "suitable"];

/// 检查严重度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// 检查结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Warning,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Warning => "warning",
            Self::Fail => "fail",
        })
    }
}

/// 一条校验记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub check_id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub verdict: Verdict,
    pub confidence: f64,
    pub details: String,
    pub suggestions: Vec<String>,
}

impl Check {
    fn new(check_id: &str, name: &str, description: &str, severity: Severity, confidence: f64) -> Self {
        Self {
            check_id: check_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            severity,
            verdict: Verdict::Pass,
            confidence,
            details: String::new(),
            suggestions: Vec::new(),
        }
    }

    fn verdict(mut self, verdict: Verdict, details: impl Into<String>, suggestions: &[&str]) -> Self {
        self.verdict = verdict;
        self.details = details.into();
        self.suggestions = suggestions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn failed(&self) -> bool {
        self.verdict == Verdict::Fail
    }
}

/// 校验结论计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub total: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
}

impl CheckSummary {
    pub fn of(checks: &[Check]) -> Self {
        let count = |v: Verdict| checks.iter().filter(|c| c.verdict == v).count();
        Self {
            total: checks.len(),
            passed: count(Verdict::Pass),
            warnings: count(Verdict::Warning),
            failed: count(Verdict::Fail),
        }
    }
}

/// 校验器：已知工具集合 + 耗时上下界
#[derive(Debug, Clone)]
pub struct Validator {
    known_tools: HashSet<String>,
    min_step_minutes: u32,
    max_step_minutes: u32,
    max_total_minutes: u32,
}

impl Default for Validator {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default(), crate::config::default_known_tools())
    }
}

impl Validator {
    pub fn new<I, S>(known_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_config(&ValidationConfig::default(), known_tools)
    }

    pub fn from_config<I, S>(cfg: &ValidationConfig, known_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_tools: known_tools.into_iter().map(Into::into).collect(),
            min_step_minutes: cfg.min_step_minutes,
            max_step_minutes: cfg.max_step_minutes,
            max_total_minutes: cfg.max_total_minutes,
        }
    }

    pub fn known_tools(&self) -> &HashSet<String> {
        &self.known_tools
    }

    pub fn validate_decomposition(&self, d: &Decomposition) -> Vec<Check> {
        let checks = vec![
            self.task_coherence(d),
            self.dependency_logic(d),
            self.execution_order(d),
            self.resource_availability(d),
            self.time_estimates(d),
            self.success_criteria(d),
            self.logical_sequence(d),
        ];
        log_checks("decomposition", &checks);
        checks
    }

    pub fn validate_roadmap(&self, r: &Roadmap) -> Vec<Check> {
        let checks = vec![
            self.roadmap_completeness(r),
            self.execution_phases(r),
            self.critical_path(r),
            self.parallel_execution(r),
        ];
        log_checks("roadmap", &checks);
        checks
    }

    /// 原任务词与子任务名称词的重合比例
    fn task_coherence(&self, d: &Decomposition) -> Check {
        let check = Check::new(
            "task_coherence",
            "Task Coherence",
            "Check if subtasks align with the original task",
            Severity::High,
            0.8,
        );
        let task_words = words(&d.original_task);
        let subtask_words: HashSet<String> = d.subtasks.iter().flat_map(|s| words(&s.name)).collect();

        let overlap = if task_words.is_empty() {
            0.5
        } else {
            task_words.intersection(&subtask_words).count() as f64 / task_words.len() as f64
        };

        if overlap > 0.3 {
            check.verdict(Verdict::Pass, format!("Good coherence: {overlap:.2} keyword overlap"), &[])
        } else if overlap > 0.1 {
            check.verdict(
                Verdict::Warning,
                format!("Moderate coherence: {overlap:.2} keyword overlap"),
                &["Review subtask relevance to original task"],
            )
        } else {
            check.verdict(
                Verdict::Fail,
                format!("Poor coherence: {overlap:.2} keyword overlap"),
                &[
                    "Subtasks may not address the original task",
                    "Consider re-decomposing the task",
                ],
            )
        }
    }

    fn dependency_logic(&self, d: &Decomposition) -> Check {
        let check = Check::new(
            "dependency_logic",
            "Dependency Logic",
            "Check for circular dependencies and invalid dependencies",
            Severity::Critical,
            0.9,
        );
        let graph = DependencyGraph::new(d.subtasks.iter().map(|s| (s.id.clone(), s.dependencies.clone())));

        let mut issues = Vec::new();
        if let Some(cycle) = graph.find_cycle() {
            if let Some(first) = cycle.first() {
                issues.push(format!("Circular dependency detected involving {first}"));
            }
        }
        for (node, dep) in graph.missing_dependencies() {
            issues.push(format!("Invalid dependency {dep} in {node}"));
        }

        if issues.is_empty() {
            check.verdict(Verdict::Pass, "Dependencies are valid", &[])
        } else {
            check.verdict(
                Verdict::Fail,
                format!("Dependency issues: {}", issues.join("; ")),
                &["Fix circular dependencies", "Ensure all dependencies exist"],
            )
        }
    }

    /// 执行顺序必须是合法拓扑序，且没有被强行放置的子任务
    fn execution_order(&self, d: &Decomposition) -> Check {
        let check = Check::new(
            "execution_order",
            "Execution Order",
            "Check that the execution order respects every dependency",
            Severity::Critical,
            0.9,
        );
        let position: HashMap<&str, usize> = d
            .execution_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut issues = Vec::new();
        for subtask in &d.subtasks {
            let Some(&at) = position.get(subtask.id.as_str()) else {
                issues.push(format!("{} missing from execution order", subtask.id));
                continue;
            };
            for dep in &subtask.dependencies {
                if let Some(&dep_at) = position.get(dep.as_str()) {
                    if dep_at > at {
                        issues.push(format!("{} placed before its dependency {dep}", subtask.id));
                    }
                }
            }
        }
        if position.len() != d.subtasks.len() || d.execution_order.len() != position.len() {
            issues.push("Execution order does not match the subtask set".to_string());
        }
        if !d.forced_order.is_empty() {
            issues.push(format!(
                "Subtasks placed without satisfied dependencies: {}",
                d.forced_order.join(", ")
            ));
        }

        if issues.is_empty() {
            check.verdict(Verdict::Pass, "Execution order is a valid topological order", &[])
        } else {
            check.verdict(
                Verdict::Fail,
                format!("Execution order issues: {}", issues.join("; ")),
                &["Recompute the execution order from valid dependencies"],
            )
        }
    }

    fn resource_availability(&self, d: &Decomposition) -> Check {
        let check = Check::new(
            "resource_availability",
            "Resource Availability",
            "Check if required tools are available",
            Severity::High,
            0.95,
        );
        let mut missing: Vec<&str> = Vec::new();
        for cap in d.subtasks.iter().flat_map(|s| s.required_capabilities.iter()) {
            if !self.known_tools.contains(cap) && !missing.contains(&cap.as_str()) {
                missing.push(cap);
            }
        }

        if missing.is_empty() {
            check.verdict(Verdict::Pass, "All required tools are available", &[])
        } else {
            let list = missing.join(", ");
            let mut check = check.verdict(Verdict::Warning, format!("Missing tools: {list}"), &[]);
            check.suggestions = vec![format!("Implement or acquire missing tools: {list}")];
            check
        }
    }

    fn time_estimates(&self, d: &Decomposition) -> Check {
        let check = Check::new(
            "time_estimates",
            "Time Estimates",
            "Check if time estimates are reasonable",
            Severity::Medium,
            0.7,
        );
        let mut issues = Vec::new();
        for s in &d.subtasks {
            if s.estimated_minutes < self.min_step_minutes {
                issues.push(format!("{}: too short ({}min)", s.name, s.estimated_minutes));
            } else if s.estimated_minutes > self.max_step_minutes {
                issues.push(format!("{}: too long ({}min)", s.name, s.estimated_minutes));
            }
        }
        let total: u32 = d.subtasks.iter().map(|s| s.estimated_minutes).sum();
        if total > self.max_total_minutes {
            issues.push(format!("Total time very long: {total}min"));
        }

        if issues.is_empty() {
            let avg = total as f64 / d.subtasks.len().max(1) as f64;
            check.verdict(
                Verdict::Pass,
                format!("Time estimates reasonable (total: {total}min, avg: {avg:.1}min)"),
                &[],
            )
        } else {
            check.verdict(
                Verdict::Warning,
                format!("Time estimate issues: {}", issues.join("; ")),
                &["Review time estimates", "Consider breaking down long tasks"],
            )
        }
    }

    fn success_criteria(&self, d: &Decomposition) -> Check {
        let check = Check::new(
            "success_criteria",
            "Success Criteria",
            "Check if success criteria are specific and measurable",
            Severity::Medium,
            0.7,
        );
        let vague: Vec<&str> = d
            .subtasks
            .iter()
            .filter(|s| {
                let lower = s.success_criteria.to_lowercase();
                s.success_criteria.len() < 10 || VAGUE_WORDS.iter().any(|w| lower.contains(w))
            })
            .map(|s| s.name.as_str())
            .collect();

        if vague.is_empty() {
            check.verdict(Verdict::Pass, "Success criteria are specific", &[])
        } else {
            check.verdict(
                Verdict::Warning,
                format!("Vague success criteria in: {}", vague.join(", ")),
                &["Make success criteria more specific and measurable"],
            )
        }
    }

    /// 准备类步骤不应排在执行类步骤之后
    fn logical_sequence(&self, d: &Decomposition) -> Check {
        let check = Check::new(
            "logical_sequence",
            "Logical Sequence",
            "Check if the task sequence makes logical sense",
            Severity::Medium,
            0.6,
        );
        let position: HashMap<&str, usize> = d
            .execution_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let named = |keys: &[&str]| -> Vec<(&str, usize)> {
            d.subtasks
                .iter()
                .filter(|s| {
                    let lower = s.name.to_lowercase();
                    keys.iter().any(|k| lower.contains(k))
                })
                .filter_map(|s| position.get(s.id.as_str()).map(|&at| (s.name.as_str(), at)))
                .collect()
        };
        let preparation = named(&["prepare", "setup"]);
        let execution = named(&["implement", "execute"]);

        let mut issues = Vec::new();
        for (prep, prep_at) in &preparation {
            for (exec, exec_at) in &execution {
                if prep_at > exec_at {
                    issues.push(format!("Preparation task {prep} comes after execution task {exec}"));
                }
            }
        }

        if issues.is_empty() {
            check.verdict(Verdict::Pass, "Task sequence is logical", &[])
        } else {
            check.verdict(
                Verdict::Warning,
                format!("Sequence issues: {}", issues.join("; ")),
                &["Reorder tasks so preparation comes first"],
            )
        }
    }

    fn roadmap_completeness(&self, r: &Roadmap) -> Check {
        let check = Check::new(
            "roadmap_completeness",
            "Roadmap Completeness",
            "Check if the roadmap has steps, phases and a critical path",
            Severity::Critical,
            0.9,
        );
        let mut issues = Vec::new();
        if r.steps.is_empty() {
            issues.push("No execution steps");
        }
        if r.phases.is_empty() {
            issues.push("No execution phases");
        }
        if r.critical_path.is_empty() {
            issues.push("No critical path");
        }

        if issues.is_empty() {
            check.verdict(Verdict::Pass, "Roadmap is complete", &[])
        } else {
            check.verdict(
                Verdict::Fail,
                format!("Incomplete roadmap: {}", issues.join(", ")),
                &["Regenerate the roadmap"],
            )
        }
    }

    /// 阶段恰好划分步骤集合，且每个步骤的依赖都在更早的阶段
    fn execution_phases(&self, r: &Roadmap) -> Check {
        let check = Check::new(
            "execution_phases",
            "Execution Phases",
            "Check that phases partition the steps and respect dependencies",
            Severity::High,
            0.9,
        );
        let mut issues = Vec::new();
        let mut phase_of: HashMap<&str, usize> = HashMap::new();
        for (i, phase) in r.phases.iter().enumerate() {
            for id in phase {
                if phase_of.insert(id.as_str(), i).is_some() {
                    issues.push(format!("Step {id} appears in multiple phases"));
                }
                if r.step(id).is_none() {
                    issues.push(format!("Phase references unknown step {id}"));
                }
            }
        }
        for step in &r.steps {
            let Some(&at) = phase_of.get(step.step_id.as_str()) else {
                issues.push(format!("Step {} is not in any phase", step.step_id));
                continue;
            };
            for dep in &step.dependencies {
                match phase_of.get(dep.as_str()) {
                    Some(&dep_at) if dep_at < at => {}
                    Some(_) => issues.push(format!("Step {} runs no later than its dependency {dep}", step.step_id)),
                    None => issues.push(format!("Step {} depends on unknown step {dep}", step.step_id)),
                }
            }
        }
        if !r.forced_steps.is_empty() {
            issues.push(format!("Steps forced into phases: {}", r.forced_steps.join(", ")));
        }

        if issues.is_empty() {
            check.verdict(
                Verdict::Pass,
                format!("{} phases cover all {} steps", r.phases.len(), r.steps.len()),
                &[],
            )
        } else {
            check.verdict(
                Verdict::Fail,
                format!("Phase issues: {}", issues.join("; ")),
                &["Fix step dependencies and regenerate phases"],
            )
        }
    }

    /// 关键路径：步骤存在，且相邻两步构成依赖链
    fn critical_path(&self, r: &Roadmap) -> Check {
        let check = Check::new(
            "critical_path",
            "Critical Path",
            "Check critical path validity",
            Severity::Medium,
            0.8,
        );
        if r.critical_path.is_empty() {
            return check.verdict(
                Verdict::Warning,
                "No critical path identified",
                &["Identify critical path for better planning"],
            );
        }

        let invalid: Vec<&str> = r
            .critical_path
            .iter()
            .filter(|id| r.step(id).is_none())
            .map(String::as_str)
            .collect();
        if !invalid.is_empty() {
            return check.verdict(
                Verdict::Fail,
                format!("Critical path contains invalid steps: {}", invalid.join(", ")),
                &["Fix critical path step references"],
            );
        }

        let broken = r.critical_path.windows(2).find(|pair| {
            r.step(&pair[1])
                .map(|next| !next.dependencies.contains(&pair[0]))
                .unwrap_or(true)
        });
        match broken {
            Some(pair) => check.verdict(
                Verdict::Fail,
                format!("Critical path is not a dependency chain: {} does not depend on {}", pair[1], pair[0]),
                &["Recompute the critical path"],
            ),
            None => check.verdict(
                Verdict::Pass,
                format!("Critical path valid with {} steps", r.critical_path.len()),
                &[],
            ),
        }
    }

    /// 同一阶段内的步骤不应争用同一能力
    fn parallel_execution(&self, r: &Roadmap) -> Check {
        let check = Check::new(
            "parallel_execution",
            "Parallel Execution",
            "Check parallel execution feasibility",
            Severity::Medium,
            0.7,
        );
        let mut issues = Vec::new();
        for phase in r.phases.iter().filter(|p| p.len() > 1) {
            let mut seen: HashSet<&str> = HashSet::new();
            for step in phase.iter().filter_map(|id| r.step(id)) {
                let conflicts: Vec<&str> = step
                    .required_capabilities
                    .iter()
                    .map(String::as_str)
                    .filter(|c| seen.contains(c))
                    .collect();
                if !conflicts.is_empty() {
                    issues.push(format!("Tool conflicts in parallel phase: {}", conflicts.join(", ")));
                }
                seen.extend(step.required_capabilities.iter().map(String::as_str));
            }
        }

        if issues.is_empty() {
            check.verdict(Verdict::Pass, "Parallel execution is feasible", &[])
        } else {
            check.verdict(
                Verdict::Warning,
                format!("Parallel execution issues: {}", issues.join("; ")),
                &["Resolve tool conflicts", "Consider sequential execution for conflicting steps"],
            )
        }
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn log_checks(target: &str, checks: &[Check]) {
    for c in checks.iter().filter(|c| !c.passed()) {
        tracing::warn!(target_kind = target, check = %c.check_id, verdict = %c.verdict, details = %c.details, "Validation issue");
    }
    let summary = CheckSummary::of(checks);
    tracing::info!(
        target_kind = target,
        passed = summary.passed,
        warnings = summary.warnings,
        failed = summary.failed,
        "Validation finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::types::{Complexity, ExecutionStep, Subtask, TaskType};
    use crate::planning::{RoadmapGenerator, TaskDecomposer};

    fn subtask(id: &str, name: &str, minutes: u32, deps: &[&str]) -> Subtask {
        Subtask {
            id: id.to_string(),
            name: name.to_string(),
            description: name.to_string(),
            task_type: TaskType::Analysis,
            complexity: Complexity::Moderate,
            estimated_minutes: minutes,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            required_capabilities: vec!["file_manager".to_string()],
            success_criteria: "Report written to disk".to_string(),
            confidence: 0.8,
        }
    }

    fn decomposition(task: &str, subtasks: Vec<Subtask>, order: &[&str]) -> Decomposition {
        Decomposition {
            original_task: task.to_string(),
            execution_order: order.iter().map(|s| s.to_string()).collect(),
            total_estimated_minutes: subtasks.iter().map(|s| s.estimated_minutes).sum(),
            confidence: 0.8,
            rationale: String::new(),
            forced_order: Vec::new(),
            subtasks,
        }
    }

    fn find<'a>(checks: &'a [Check], id: &str) -> &'a Check {
        checks.iter().find(|c| c.check_id == id).unwrap()
    }

    #[test]
    fn test_generated_plans_pass_cleanly() {
        let validator = Validator::default();
        for task in ["Calculate 2+2", "Build an application"] {
            let d = TaskDecomposer::new().decompose(task);
            let r = RoadmapGenerator::new().generate(&d);
            let checks = validator.validate_decomposition(&d);
            assert!(checks.iter().all(|c| !c.failed()), "{task}: {checks:?}");
            let checks = validator.validate_roadmap(&r);
            assert!(checks.iter().all(Check::passed), "{task}: {checks:?}");
        }
    }

    #[test]
    fn test_cycle_and_missing_dependency_fail() {
        let d = decomposition(
            "analyze data",
            vec![
                subtask("a", "analyze a", 30, &["b"]),
                subtask("b", "analyze b", 30, &["a"]),
                subtask("c", "analyze c", 30, &["ghost"]),
            ],
            &["a", "b", "c"],
        );
        let checks = Validator::default().validate_decomposition(&d);
        let deps = find(&checks, "dependency_logic");
        assert_eq!(deps.verdict, Verdict::Fail);
        assert_eq!(deps.severity, Severity::Critical);
        assert!(deps.details.contains("Circular dependency detected"));
        assert!(deps.details.contains("Invalid dependency ghost in c"));
    }

    #[test]
    fn test_forced_order_is_flagged() {
        let mut d = decomposition("analyze", vec![subtask("a", "analyze", 30, &[])], &["a"]);
        d.forced_order = vec!["a".to_string()];
        let checks = Validator::default().validate_decomposition(&d);
        assert_eq!(find(&checks, "execution_order").verdict, Verdict::Fail);
    }

    #[test]
    fn test_coherence_time_and_criteria() {
        let mut vague = subtask("a", "unrelated thing", 2, &[]);
        vague.success_criteria = "good".to_string();
        let d = decomposition(
            "compile the quarterly report",
            vec![vague, subtask("b", "other", 500, &["a"])],
            &["a", "b"],
        );
        let checks = Validator::default().validate_decomposition(&d);
        assert_eq!(find(&checks, "task_coherence").verdict, Verdict::Fail);
        let time = find(&checks, "time_estimates");
        assert_eq!(time.verdict, Verdict::Warning);
        assert!(time.details.contains("unrelated thing: too short (2min)"));
        assert!(time.details.contains("other: too long (500min)"));
        assert_eq!(find(&checks, "success_criteria").verdict, Verdict::Warning);
    }

    #[test]
    fn test_missing_tools_warn() {
        let mut s = subtask("a", "analyze", 30, &[]);
        s.required_capabilities = vec!["teleporter".to_string()];
        let d = decomposition("analyze", vec![s], &["a"]);
        let checks = Validator::new(["file_manager"]).validate_decomposition(&d);
        let res = find(&checks, "resource_availability");
        assert_eq!(res.verdict, Verdict::Warning);
        assert_eq!(res.details, "Missing tools: teleporter");
    }

    #[test]
    fn test_preparation_after_execution_warns() {
        let d = decomposition(
            "setup and implement",
            vec![
                subtask("impl", "Implement feature", 30, &[]),
                subtask("setup", "Setup tooling", 30, &["impl"]),
            ],
            &["impl", "setup"],
        );
        let checks = Validator::default().validate_decomposition(&d);
        let seq = find(&checks, "logical_sequence");
        assert_eq!(seq.verdict, Verdict::Warning);
        assert!(seq
            .details
            .contains("Preparation task Setup tooling comes after execution task Implement feature"));
    }

    #[test]
    fn test_broken_roadmap_invariants() {
        let d = TaskDecomposer::new().decompose("Build an application");
        let mut r = RoadmapGenerator::new().generate(&d);
        r.phases.swap(0, 1);
        r.critical_path = vec!["step_01".to_string(), "step_03".to_string()];
        let extra = ExecutionStep {
            step_id: "step_99".to_string(),
            ..r.steps[0].clone()
        };
        r.steps.push(extra);

        let checks = Validator::default().validate_roadmap(&r);
        let phases = find(&checks, "execution_phases");
        assert_eq!(phases.verdict, Verdict::Fail);
        assert!(phases.details.contains("Step step_99 is not in any phase"));
        assert!(phases.details.contains("runs no later than its dependency"));
        assert_eq!(find(&checks, "critical_path").verdict, Verdict::Fail);
    }

    #[test]
    fn test_empty_roadmap_incomplete() {
        let d = TaskDecomposer::new().decompose("Calculate 2+2");
        let mut r = RoadmapGenerator::new().generate(&d);
        r.critical_path.clear();
        let checks = Validator::default().validate_roadmap(&r);
        assert_eq!(find(&checks, "roadmap_completeness").verdict, Verdict::Fail);
        assert_eq!(find(&checks, "critical_path").verdict, Verdict::Warning);
        let summary = CheckSummary::of(&checks);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.warnings, 1);
    }

    #[test]
    fn test_parallel_conflict_warns() {
        let d = TaskDecomposer::new().decompose("Calculate 2+2");
        let mut r = RoadmapGenerator::new().generate(&d);
        let twin = ExecutionStep {
            step_id: "step_02".to_string(),
            ..r.steps[0].clone()
        };
        r.steps.push(twin);
        r.phases = vec![vec!["step_01".to_string(), "step_02".to_string()]];
        let checks = Validator::default().validate_roadmap(&r);
        let par = find(&checks, "parallel_execution");
        assert_eq!(par.verdict, Verdict::Warning);
        assert!(par.details.contains("calculator"));
    }
}
