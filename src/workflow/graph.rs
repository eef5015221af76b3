//! 依赖图
//!
//! 使用邻接表和入度表描述 DAG，供任务分解（稳定拓扑序）、路线图（就绪层 + 关键路径）、
//! 工具链并行执行（依赖层级）与校验层（环检测）共用。节点保留声明顺序，所有平局都按声明顺序决出。

use std::collections::{HashMap, HashSet};

/// 稳定拓扑序结果；forced 为因无就绪节点而被强行放置的节点（环或缺失依赖），需由校验层标记
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StableOrder {
    pub order: Vec<String>,
    pub forced: Vec<String>,
}

/// 一个就绪层：该层所有节点的依赖都已在之前的层中放置
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyLevel {
    pub ids: Vec<String>,
    /// 没有任何节点就绪时，剩余节点整体被视为就绪，以保证终止
    pub forced: bool,
}

/// 依赖图
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 节点（声明顺序）
    pub nodes: Vec<String>,
    /// 节点 -> 声明的依赖（可能包含不存在的节点）
    pub dependencies: HashMap<String, Vec<String>>,
    /// 邻接表：节点 -> 依赖它的节点
    pub adjacency: HashMap<String, Vec<String>>,
    /// 入度表：节点 -> 已知依赖数
    pub in_degree: HashMap<String, usize>,
}

impl DependencyGraph {
    /// 由 (节点, 依赖列表) 构建；重复节点只保留第一次出现
    pub fn new<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut graph = Self::default();
        for (id, deps) in nodes {
            if graph.dependencies.contains_key(&id) {
                continue;
            }
            graph.nodes.push(id.clone());
            graph.adjacency.entry(id.clone()).or_default();
            graph.dependencies.insert(id, deps);
        }

        for id in &graph.nodes {
            let mut degree = 0;
            for dep in &graph.dependencies[id] {
                if graph.dependencies.contains_key(dep) {
                    graph.adjacency.entry(dep.clone()).or_default().push(id.clone());
                    degree += 1;
                }
            }
            graph.in_degree.insert(id.clone(), degree);
        }

        graph
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.dependencies.contains_key(id)
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 指向不存在节点的依赖：(节点, 缺失依赖)
    pub fn missing_dependencies(&self) -> Vec<(String, String)> {
        self.nodes
            .iter()
            .flat_map(|id| {
                self.dependencies_of(id)
                    .iter()
                    .filter(|dep| !self.contains(dep))
                    .map(move |dep| (id.clone(), dep.clone()))
            })
            .collect()
    }

    fn deps_placed(&self, id: &str, placed: &HashSet<String>) -> bool {
        self.dependencies_of(id).iter().all(|d| placed.contains(d))
    }

    /// 稳定拓扑排序：每次取声明顺序中第一个依赖已全部放置的节点；
    /// 若没有就绪节点，则放置剩余的第一个并记为 forced
    pub fn stable_order(&self) -> StableOrder {
        let mut placed: HashSet<String> = HashSet::new();
        let mut remaining: Vec<String> = self.nodes.clone();
        let mut result = StableOrder::default();

        while !remaining.is_empty() {
            let idx = match remaining.iter().position(|id| self.deps_placed(id, &placed)) {
                Some(idx) => idx,
                None => {
                    result.forced.push(remaining[0].clone());
                    0
                }
            };
            let id = remaining.remove(idx);
            placed.insert(id.clone());
            result.order.push(id);
        }

        result
    }

    /// 按依赖分层：每层为「依赖都已在更早层放置」的全部剩余节点
    pub fn ready_levels(&self) -> Vec<ReadyLevel> {
        let mut placed: HashSet<String> = HashSet::new();
        let mut remaining: Vec<String> = self.nodes.clone();
        let mut levels = Vec::new();

        while !remaining.is_empty() {
            let mut ready: Vec<String> = remaining
                .iter()
                .filter(|id| self.deps_placed(id, &placed))
                .cloned()
                .collect();
            let forced = ready.is_empty();
            if forced {
                ready = remaining.clone();
            }

            remaining.retain(|id| !ready.contains(id));
            placed.extend(ready.iter().cloned());
            levels.push(ReadyLevel { ids: ready, forced });
        }

        levels
    }

    /// DFS 环检测（递归路径集合）；返回环上节点（从重复进入的节点开始）
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        for id in &self.nodes {
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: HashSet<&str> = HashSet::new();
            if let Some(cycle) = self.dfs_cycle(id, &mut visited, &mut path, &mut on_path) {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        id: &'a str,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
        on_path: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        if on_path.contains(id) {
            let start = path.iter().position(|p| *p == id).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        if !visited.insert(id) {
            return None;
        }

        path.push(id);
        on_path.insert(id);
        for dep in self.dependencies_of(id) {
            if let Some((key, _)) = self.dependencies.get_key_value(dep.as_str()) {
                if let Some(cycle) = self.dfs_cycle(key.as_str(), visited, path, on_path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        on_path.remove(id);
        None
    }

    /// 记忆化递归：以每个节点结尾的最长累计权重（叶子 = 自身权重；否则自身 + 依赖最大值）
    pub fn longest_paths<F>(&self, weight: F) -> HashMap<String, u64>
    where
        F: Fn(&str) -> u64,
    {
        let mut memo: HashMap<String, u64> = HashMap::new();
        let mut visiting: HashSet<String> = HashSet::new();
        for id in &self.nodes {
            self.longest_to(id, &weight, &mut memo, &mut visiting);
        }
        memo
    }

    fn longest_to<F>(
        &self,
        id: &str,
        weight: &F,
        memo: &mut HashMap<String, u64>,
        visiting: &mut HashSet<String>,
    ) -> u64
    where
        F: Fn(&str) -> u64,
    {
        if let Some(v) = memo.get(id) {
            return *v;
        }
        // 环上的回边不计入
        if !visiting.insert(id.to_string()) {
            return 0;
        }

        let mut best_dep = 0;
        for dep in self.dependencies_of(id) {
            if self.contains(dep) {
                best_dep = best_dep.max(self.longest_to(dep, weight, memo, visiting));
            }
        }
        visiting.remove(id);

        let value = best_dep + weight(id);
        memo.insert(id.to_string(), value);
        value
    }

    /// 关键路径：从全局最大值节点出发，每一跳沿最长路径值最大的依赖回溯；返回 (路径, 长度)
    pub fn critical_path<F>(&self, weight: F) -> (Vec<String>, u64)
    where
        F: Fn(&str) -> u64,
    {
        let memo = self.longest_paths(weight);

        let mut end: Option<(&String, u64)> = None;
        for id in &self.nodes {
            let value = memo.get(id).copied().unwrap_or(0);
            if end.map_or(true, |(_, best)| value > best) {
                end = Some((id, value));
            }
        }
        let Some((end_id, length)) = end else {
            return (Vec::new(), 0);
        };

        let mut path = vec![end_id.clone()];
        let mut current = end_id.clone();
        loop {
            let mut next: Option<(&String, u64)> = None;
            for dep in self.dependencies_of(&current) {
                if path.contains(dep) {
                    continue;
                }
                if let Some(value) = memo.get(dep) {
                    if next.map_or(true, |(_, best)| *value > best) {
                        next = Some((dep, *value));
                    }
                }
            }
            match next {
                Some((dep, _)) => {
                    path.push(dep.clone());
                    current = dep.clone();
                }
                None => break,
            }
        }

        path.reverse();
        (path, length)
    }
}
