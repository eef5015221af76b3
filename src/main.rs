//! Beeline 命令行入口
//!
//! 用法：`beeline [--strict] [--plan-only] <任务描述>`
//! 注册一组回显工具后对任务做推理（并在非 --plan-only 时执行路线图），结果以 JSON 打印到 stdout。

use anyhow::Context;
use beeline::core::{create_coordinator_builder, Strictness};
use beeline::tools::{ScriptedTool, ToolRegistry};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    beeline::observability::init();

    let mut strict = false;
    let mut plan_only = false;
    let mut words = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--strict" => strict = true,
            "--plan-only" => plan_only = true,
            _ => words.push(arg),
        }
    }
    let task = words.join(" ");
    if task.trim().is_empty() {
        anyhow::bail!("usage: beeline [--strict] [--plan-only] <task description>");
    }

    let builder = create_coordinator_builder(None).context("Failed to load config")?;
    let config = builder.config();
    let strictness = if strict || config.validation.strict {
        Strictness::Strict
    } else {
        Strictness::Lenient
    };

    let mut registry = ToolRegistry::new();
    for name in &config.tools.known_tools {
        registry.register(ScriptedTool::echo(name));
    }
    let coordinator = builder.registry(registry).build();

    let output = if plan_only {
        let reasoning = coordinator.reason_about_task(&task, strictness).await;
        serde_json::to_value(&reasoning)?
    } else {
        let run = coordinator.run_task(&task, strictness, &json!({})).await;
        json!({ "success": run.success(), "run": run })
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
