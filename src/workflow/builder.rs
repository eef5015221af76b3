//! 工具链构建器
//!
//! 提供流畅的API来构建工具链，build 时校验步骤 ID 唯一、依赖存在且无环

use std::collections::HashSet;

use crate::workflow::graph::DependencyGraph;
use crate::workflow::types::*;

/// 工具链构建器
pub struct ToolChainBuilder {
    id: ChainId,
    name: String,
    description: String,
    steps: Vec<ToolChainStep>,
    strategy: ChainStrategy,
    timeout_secs: u64,
}

impl ToolChainBuilder {
    /// 创建新的工具链构建器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: format!("chain_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            description: String::new(),
            steps: Vec::new(),
            strategy: ChainStrategy::Sequential,
            timeout_secs: 600,
        }
    }

    /// 指定链 ID
    pub fn id(mut self, id: impl Into<ChainId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn strategy(mut self, strategy: ChainStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// 整链超时；0 表示不限
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// 添加步骤
    pub fn step(mut self, id: impl Into<StepId>, tool: impl Into<String>, parameters: serde_json::Value) -> Self {
        self.steps.push(ToolChainStep::new(id, tool, parameters));
        self
    }

    /// 设置顺序依赖
    pub fn after(self, from: impl Into<StepId>, to: impl Into<StepId>) -> Self {
        let from = from.into();
        self.depends_on(to, vec![from])
    }

    /// 追加依赖
    pub fn depends_on(mut self, step_id: impl Into<StepId>, deps: Vec<StepId>) -> Self {
        let id = step_id.into();
        if let Some(step) = self.steps.iter_mut().find(|s| s.step_id == id) {
            for dep in deps {
                if !step.depends_on.contains(&dep) {
                    step.depends_on.push(dep);
                }
            }
        }
        self
    }

    /// 设置执行条件
    pub fn condition(mut self, step_id: impl Into<StepId>, condition: StepCondition) -> Self {
        let id = step_id.into();
        if let Some(step) = self.steps.iter_mut().find(|s| s.step_id == id) {
            step.condition = Some(condition);
        }
        self
    }

    /// 构建工具链
    pub fn build(self) -> Result<ToolChain, ChainError> {
        let chain = ToolChain {
            chain_id: self.id,
            name: self.name,
            description: self.description,
            steps: self.steps,
            strategy: self.strategy,
            timeout_secs: self.timeout_secs,
        };
        chain.validate()?;
        Ok(chain)
    }
}

impl ToolChain {
    /// 结构校验：非空、步骤 ID 唯一、依赖存在、无环
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.steps.is_empty() {
            return Err(ChainError::InvalidConfiguration("chain has no steps".to_string()));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.step_id.as_str()) {
                return Err(ChainError::DuplicateStep(step.step_id.clone()));
            }
        }

        let graph = self.dependency_graph();
        if let Some((step, dependency)) = graph.missing_dependencies().into_iter().next() {
            return Err(ChainError::UnknownDependency { step, dependency });
        }
        if let Some(cycle) = graph.find_cycle() {
            return Err(ChainError::CyclicDependency(cycle.join(" -> ")));
        }
        Ok(())
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::new(
            self.steps
                .iter()
                .map(|s| (s.step_id.clone(), s.depends_on.clone())),
        )
    }

    pub fn step(&self, step_id: &str) -> Option<&ToolChainStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_simple_chain() {
        let chain = ToolChainBuilder::new("Report")
            .description("search then save")
            .strategy(ChainStrategy::Sequential)
            .step("search", "web_search", json!({"query": "rust"}))
            .step("save", "file_manager", json!({"path": "out.md"}))
            .after("search", "save")
            .build()
            .expect("Failed to build chain");

        assert!(chain.chain_id.starts_with("chain_"));
        assert_eq!(chain.steps.len(), 2);
        assert_eq!(chain.step("save").unwrap().depends_on, vec!["search"]);
        assert_eq!(chain.timeout_secs, 600);
    }

    #[test]
    fn test_build_empty_chain_fails() {
        let result = ToolChainBuilder::new("Empty").build();
        assert!(matches!(result, Err(ChainError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_build_rejects_duplicates_unknown_deps_and_cycles() {
        let dup = ToolChainBuilder::new("dup")
            .step("a", "calculator", json!({}))
            .step("a", "calculator", json!({}))
            .build();
        assert_eq!(dup.unwrap_err(), ChainError::DuplicateStep("a".into()));

        let unknown = ToolChainBuilder::new("unknown")
            .step("a", "calculator", json!({}))
            .depends_on("a", vec!["ghost".into()])
            .build();
        assert_eq!(
            unknown.unwrap_err(),
            ChainError::UnknownDependency {
                step: "a".into(),
                dependency: "ghost".into()
            }
        );

        let cyclic = ToolChainBuilder::new("cycle")
            .step("a", "calculator", json!({}))
            .step("b", "calculator", json!({}))
            .after("a", "b")
            .after("b", "a")
            .build();
        assert!(matches!(cyclic, Err(ChainError::CyclicDependency(_))));
    }

    #[test]
    fn test_condition_is_attached() {
        let chain = ToolChainBuilder::new("cond")
            .strategy(ChainStrategy::Conditional)
            .step("main", "terminal_executor", json!({"command": "make"}))
            .step("notify", "human_input", json!({"prompt": "build failed"}))
            .condition("notify", StepCondition::AnyPriorFailed)
            .build()
            .unwrap();
        assert_eq!(chain.step("notify").unwrap().condition, Some(StepCondition::AnyPriorFailed));
    }
}
