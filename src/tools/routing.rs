//! 自由文本 -> 工具路由
//!
//! 关键词规则表按顺序匹配，命中的工具按规则顺序去重返回；全部未命中时回落到默认工具。

use crate::rules::KeywordTable;

#[derive(Debug, Clone)]
pub struct ToolRouter {
    table: KeywordTable<String>,
    default_tool: String,
}

impl Default for ToolRouter {
    fn default() -> Self {
        let table = KeywordTable::default()
            .rule(
                &["file", "read", "write", "create", "save", "document", "text"],
                "file_manager".to_string(),
            )
            .rule(
                &["command", "execute", "run", "install", "system", "shell"],
                "terminal_executor".to_string(),
            )
            .rule(
                &["search", "research", "find", "lookup", "web", "internet"],
                "web_search".to_string(),
            )
            .rule(
                &["calculate", "compute", "math", "number", "sum", "count"],
                "calculator".to_string(),
            )
            .rule(
                &["ask", "confirm", "input", "user", "approval", "question"],
                "human_input".to_string(),
            );
        Self::new(table, "file_manager")
    }
}

impl ToolRouter {
    pub fn new(table: KeywordTable<String>, default_tool: &str) -> Self {
        Self {
            table,
            default_tool: default_tool.to_string(),
        }
    }

    /// 替换规则表，保留默认工具
    pub fn with_table(mut self, table: KeywordTable<String>) -> Self {
        self.table = table;
        self
    }

    pub fn table(&self) -> &KeywordTable<String> {
        &self.table
    }

    /// 命中的工具（规则顺序、去重）；无命中返回 [default_tool]
    pub fn route(&self, task: &str) -> Vec<String> {
        let mut tools: Vec<String> = Vec::new();
        for tool in self.table.all_matches(task) {
            if !tools.contains(tool) {
                tools.push(tool.clone());
            }
        }
        if tools.is_empty() {
            tools.push(self.default_tool.clone());
        }
        tracing::info!(task, ?tools, "Routed task to tools");
        tools
    }
}
