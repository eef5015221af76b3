//! 规划与恢复的性质测试

use std::collections::{HashMap, HashSet};

use beeline::core::{BackoffStrategy, RecoveryRules, RetryPolicy};
use beeline::planning::{Complexity, Decomposition, RoadmapGenerator, Subtask, TaskType};
use beeline::workflow::DependencyGraph;
use proptest::prelude::*;

const TOOLS: [&str; 5] = ["file_manager", "terminal_executor", "web_search", "calculator", "human_input"];

/// 随机 DAG：第 i 个子任务只依赖编号更小的子任务，列出顺序随机打乱
fn arb_subtasks() -> impl Strategy<Value = Vec<Subtask>> {
    (1usize..10)
        .prop_flat_map(|n| {
            let nodes: Vec<_> = (0..n)
                .map(|i| {
                    (
                        proptest::collection::vec(any::<bool>(), i),
                        proptest::collection::vec(any::<bool>(), TOOLS.len()),
                        5u32..300,
                    )
                })
                .collect();
            nodes
        })
        .prop_map(|nodes| {
            nodes
                .into_iter()
                .enumerate()
                .map(|(i, (deps, caps, minutes))| Subtask {
                    id: format!("t{i}"),
                    name: format!("task {i}"),
                    description: format!("task {i}"),
                    task_type: TaskType::Analysis,
                    complexity: Complexity::Moderate,
                    estimated_minutes: minutes,
                    dependencies: deps
                        .iter()
                        .enumerate()
                        .filter(|(_, on)| **on)
                        .map(|(j, _)| format!("t{j}"))
                        .collect(),
                    required_capabilities: caps
                        .iter()
                        .zip(TOOLS)
                        .filter(|(on, _)| **on)
                        .map(|(_, t)| t.to_string())
                        .collect(),
                    success_criteria: format!("task {i} verified"),
                    confidence: 0.8,
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

fn graph(subtasks: &[Subtask]) -> DependencyGraph {
    DependencyGraph::new(subtasks.iter().map(|s| (s.id.clone(), s.dependencies.clone())))
}

fn decomposition(subtasks: Vec<Subtask>) -> Decomposition {
    let ordering = graph(&subtasks).stable_order();
    Decomposition {
        original_task: "generated".into(),
        total_estimated_minutes: subtasks.iter().map(|s| s.estimated_minutes).sum(),
        execution_order: ordering.order,
        forced_order: ordering.forced,
        confidence: 0.8,
        rationale: String::new(),
        subtasks,
    }
}

proptest! {
    #[test]
    fn execution_order_is_topological(subtasks in arb_subtasks()) {
        let d = decomposition(subtasks);
        prop_assert!(d.forced_order.is_empty());
        prop_assert!(d.is_consistent());
        let position: HashMap<&str, usize> =
            d.execution_order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for s in &d.subtasks {
            for dep in &s.dependencies {
                prop_assert!(position[dep.as_str()] < position[s.id.as_str()]);
            }
        }
    }

    #[test]
    fn roadmap_phases_partition_and_respect_dependencies(subtasks in arb_subtasks()) {
        let d = decomposition(subtasks);
        let r = RoadmapGenerator::new().generate(&d);

        let mut phase_of: HashMap<&str, usize> = HashMap::new();
        for (i, phase) in r.phases.iter().enumerate() {
            let mut caps: HashSet<&str> = HashSet::new();
            for id in phase {
                prop_assert!(phase_of.insert(id.as_str(), i).is_none());
                let step = r.step(id).unwrap();
                for cap in &step.required_capabilities {
                    prop_assert!(caps.insert(cap.as_str()), "capability shared within a phase");
                }
            }
        }
        prop_assert_eq!(phase_of.len(), r.steps.len());
        for step in &r.steps {
            for dep in &step.dependencies {
                prop_assert!(phase_of[dep.as_str()] < phase_of[step.step_id.as_str()]);
            }
        }

        let longest = r.steps.iter().map(|s| s.estimated_minutes).max().unwrap_or(0);
        prop_assert!(r.total_estimated_minutes >= longest);
        prop_assert!(r.total_estimated_minutes <= r.sum_of_step_minutes());
        if r.phases.iter().any(|p| p.len() > 1) {
            prop_assert!(r.total_estimated_minutes < r.sum_of_step_minutes());
        }
    }

    #[test]
    fn critical_path_is_longest_dependency_chain(subtasks in arb_subtasks()) {
        let d = decomposition(subtasks);
        let r = RoadmapGenerator::new().generate(&d);

        let minutes: HashMap<&str, u64> =
            r.steps.iter().map(|s| (s.step_id.as_str(), s.estimated_minutes as u64)).collect();
        let g = DependencyGraph::new(r.steps.iter().map(|s| (s.step_id.clone(), s.dependencies.clone())));
        let best = g.longest_paths(|id| minutes[id]).values().copied().max().unwrap_or(0);

        let path_len: u64 = r.critical_path.iter().map(|id| minutes[id.as_str()]).sum();
        prop_assert_eq!(path_len, best);
        for pair in r.critical_path.windows(2) {
            prop_assert!(r.step(&pair[1]).unwrap().dependencies.contains(&pair[0]));
        }
    }

    #[test]
    fn retry_delay_is_monotonic_and_bounded(
        base in 0.05f64..10.0,
        max_delay in 1.0f64..120.0,
        linear in any::<bool>(),
    ) {
        let policy = RetryPolicy {
            backoff: if linear { BackoffStrategy::Linear } else { BackoffStrategy::Exponential },
            max_delay,
            jitter: false,
            ..RetryPolicy::default()
        };
        let mut previous = 0.0;
        for attempt in 1..=8 {
            let raw = policy.raw_delay(attempt, base);
            prop_assert!(raw >= previous);
            prop_assert!(raw <= max_delay);
            previous = raw;

            let units = policy.delay_units(attempt, base);
            prop_assert!(units >= 0.1);
        }

        let jittered = RetryPolicy { jitter: true, ..policy };
        for attempt in 1..=8 {
            let raw = jittered.raw_delay(attempt, base);
            let units = jittered.delay_units(attempt, base);
            prop_assert!(units >= 0.1);
            prop_assert!(units <= (raw * 1.1).max(0.1) + 1e-9);
            prop_assert!(units >= raw * 0.9 - 1e-9);
        }
    }

    #[test]
    fn categorization_is_deterministic(error in "[a-z ]{0,40}") {
        let rules = RecoveryRules::default();
        prop_assert_eq!(rules.categorize(&error), rules.categorize(&error));
        let other = RecoveryRules::default();
        prop_assert_eq!(rules.categorize(&error), other.categorize(&error));
    }
}
