//! 路线图生成器
//!
//! 子任务 1:1 映射为执行步骤；按就绪层划分阶段，每层内按能力冲突做首次适配分组；
//! 记忆化最长路径求关键路径；总耗时 = Σ 各阶段最长步骤。

use std::collections::{HashMap, HashSet};

use crate::planning::types::*;
use crate::workflow::DependencyGraph;

#[derive(Debug, Clone, Default)]
pub struct RoadmapGenerator;

/// 阶段划分结果
struct Phasing {
    phases: Vec<Vec<String>>,
    forced: Vec<String>,
}

impl RoadmapGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, decomposition: &Decomposition) -> Roadmap {
        tracing::info!(task = %decomposition.original_task, "Generating roadmap");

        let mut steps = Self::create_steps(&decomposition.subtasks);
        let phasing = Self::determine_phases(&steps);
        for (i, phase) in phasing.phases.iter().enumerate().filter(|(_, p)| p.len() > 1) {
            let tag = format!("phase_{:02}", i + 1);
            for step in steps.iter_mut().filter(|s| phase.contains(&s.step_id)) {
                step.parallel_group = Some(tag.clone());
            }
        }
        let critical_path = Self::critical_path(&steps);
        let total = Self::total_minutes(&steps, &phasing.phases);

        let roadmap = Roadmap {
            id: format!("roadmap_{}", uuid::Uuid::new_v4()),
            source_task: decomposition.original_task.clone(),
            steps,
            phases: phasing.phases,
            critical_path,
            total_estimated_minutes: total,
            confidence: decomposition.confidence,
            created_at: chrono::Utc::now().timestamp_millis(),
            forced_steps: phasing.forced,
        };

        tracing::info!(
            roadmap_id = %roadmap.id,
            steps = roadmap.steps.len(),
            phases = roadmap.phases.len(),
            total_minutes = roadmap.total_estimated_minutes,
            "Generated roadmap"
        );
        roadmap
    }

    /// step_NN 编号；依赖从子任务 ID 翻译为步骤 ID
    fn create_steps(subtasks: &[Subtask]) -> Vec<ExecutionStep> {
        let ids: HashMap<&str, String> = subtasks
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), format!("step_{:02}", i + 1)))
            .collect();

        subtasks
            .iter()
            .enumerate()
            .map(|(i, s)| ExecutionStep {
                step_id: format!("step_{:02}", i + 1),
                subtask_id: s.id.clone(),
                name: s.name.clone(),
                description: s.description.clone(),
                estimated_minutes: s.estimated_minutes,
                required_capabilities: s.required_capabilities.clone(),
                dependencies: s
                    .dependencies
                    .iter()
                    .map(|d| ids.get(d.as_str()).cloned().unwrap_or_else(|| d.clone()))
                    .collect(),
                success_criteria: s.success_criteria.clone(),
                parallel_group: None,
            })
            .collect()
    }

    fn graph(steps: &[ExecutionStep]) -> DependencyGraph {
        DependencyGraph::new(steps.iter().map(|s| (s.step_id.clone(), s.dependencies.clone())))
    }

    fn determine_phases(steps: &[ExecutionStep]) -> Phasing {
        let by_id: HashMap<&str, &ExecutionStep> = steps.iter().map(|s| (s.step_id.as_str(), s)).collect();
        let mut phasing = Phasing {
            phases: Vec::new(),
            forced: Vec::new(),
        };

        for level in Self::graph(steps).ready_levels() {
            if level.forced {
                tracing::warn!(steps = ?level.ids, "No ready steps found, adding remaining steps");
                phasing.forced.extend(level.ids.iter().cloned());
            }
            let ready: Vec<&ExecutionStep> = level.ids.iter().filter_map(|id| by_id.get(id.as_str()).copied()).collect();
            phasing.phases.extend(Self::group_parallel(&ready));
        }
        phasing
    }

    /// 首次适配：以第一个剩余步骤开新组，后续步骤与组内已累计能力不相交则并入
    fn group_parallel(ready: &[&ExecutionStep]) -> Vec<Vec<String>> {
        let mut groups = Vec::new();
        let mut remaining: Vec<&ExecutionStep> = ready.to_vec();

        while !remaining.is_empty() {
            let first = remaining.remove(0);
            let mut group = vec![first.step_id.clone()];
            let mut caps: HashSet<&str> = first.required_capabilities.iter().map(String::as_str).collect();

            remaining.retain(|step| {
                let conflict = step.required_capabilities.iter().any(|c| caps.contains(c.as_str()));
                if conflict {
                    return true;
                }
                caps.extend(step.required_capabilities.iter().map(String::as_str));
                group.push(step.step_id.clone());
                false
            });
            groups.push(group);
        }
        groups
    }

    fn critical_path(steps: &[ExecutionStep]) -> Vec<String> {
        let minutes: HashMap<&str, u64> = steps
            .iter()
            .map(|s| (s.step_id.as_str(), s.estimated_minutes as u64))
            .collect();
        let (path, _) = Self::graph(steps).critical_path(|id| minutes.get(id).copied().unwrap_or(0));
        path
    }

    fn total_minutes(steps: &[ExecutionStep], phases: &[Vec<String>]) -> u32 {
        let minutes: HashMap<&str, u32> = steps
            .iter()
            .map(|s| (s.step_id.as_str(), s.estimated_minutes))
            .collect();
        phases
            .iter()
            .map(|phase| {
                phase
                    .iter()
                    .filter_map(|id| minutes.get(id.as_str()).copied())
                    .max()
                    .unwrap_or(0)
            })
            .sum()
    }

    /// 关键路径步骤标记为 "critical"，重算阶段与总耗时；置信度 × 0.95
    pub fn optimize(&self, roadmap: &Roadmap) -> Roadmap {
        tracing::info!(roadmap_id = %roadmap.id, "Optimizing roadmap");
        let mut steps = roadmap.steps.clone();
        for step in steps.iter_mut() {
            if roadmap.critical_path.contains(&step.step_id) {
                step.parallel_group = Some("critical".to_string());
            }
        }
        let phasing = Self::determine_phases(&steps);
        let total = Self::total_minutes(&steps, &phasing.phases);

        Roadmap {
            id: format!("{}_optimized", roadmap.id),
            source_task: roadmap.source_task.clone(),
            steps,
            phases: phasing.phases,
            critical_path: roadmap.critical_path.clone(),
            total_estimated_minutes: total,
            confidence: roadmap.confidence * 0.95,
            created_at: chrono::Utc::now().timestamp_millis(),
            forced_steps: phasing.forced,
        }
    }
}
