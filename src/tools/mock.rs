//! 脚本化工具（测试与 dry-run 用）
//!
//! 按预设脚本依次返回结果，脚本耗尽后回到默认行为（回显参数或固定失败），并记录调用次数。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

#[derive(Debug, Clone)]
enum Fallthrough {
    Echo,
    Fail(String),
    Panic,
}

/// 脚本化工具
#[derive(Debug, Clone)]
pub struct ScriptedTool {
    name: String,
    description: String,
    script: Arc<Mutex<VecDeque<Result<Value, String>>>>,
    fallthrough: Fallthrough,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedTool {
    fn with_fallthrough(name: &str, fallthrough: Fallthrough) -> Self {
        Self {
            name: name.to_string(),
            description: format!("Scripted stand-in for {name}"),
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallthrough,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 回显参数：{"tool": name, ...args}
    pub fn echo(name: &str) -> Self {
        Self::with_fallthrough(name, Fallthrough::Echo)
    }

    /// 每次调用都以固定错误文本失败
    pub fn failing(name: &str, error: &str) -> Self {
        Self::with_fallthrough(name, Fallthrough::Fail(error.to_string()))
    }

    /// 前 times 次以 error 失败，之后回显
    pub fn fail_times(name: &str, times: usize, error: &str) -> Self {
        let tool = Self::echo(name);
        for _ in 0..times {
            tool.push(Err(error.to_string()));
        }
        tool
    }

    /// 执行时 panic（验证并行执行把异常转为失败结果）
    pub fn panicking(name: &str) -> Self {
        Self::with_fallthrough(name, Fallthrough::Panic)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// 追加一条脚本结果
    pub fn push(&self, result: Result<Value, String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
    }

    /// 已发生的调用次数（clone 之间共享）
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_scripted(&self) -> Option<Result<Value, String>> {
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(result) = self.next_scripted() {
            return result;
        }
        match &self.fallthrough {
            Fallthrough::Echo => {
                let mut payload = serde_json::Map::new();
                payload.insert("tool".into(), Value::String(self.name.clone()));
                if let Value::Object(map) = args {
                    payload.extend(map);
                } else if !args.is_null() {
                    payload.insert("args".into(), args);
                }
                Ok(Value::Object(payload))
            }
            Fallthrough::Fail(error) => Err(error.clone()),
            Fallthrough::Panic => panic!("scripted tool {} panicked", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_times_then_echo() {
        let tool = ScriptedTool::fail_times("web_search", 2, "connection reset");
        assert_eq!(tool.execute(Value::Null).await, Err("connection reset".into()));
        assert_eq!(tool.execute(Value::Null).await, Err("connection reset".into()));
        let ok = tool.execute(serde_json::json!({"query": "rust"})).await.unwrap();
        assert_eq!(ok["query"], "rust");
        assert_eq!(tool.calls(), 3);
    }

    #[tokio::test]
    async fn test_calls_shared_between_clones() {
        let tool = ScriptedTool::echo("calculator");
        let clone = tool.clone();
        clone.execute(Value::Null).await.unwrap();
        assert_eq!(tool.calls(), 1);
    }
}
