//! Beeline - 任务规划与工具编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复系统、进度跟踪、协调器
//! - **llm**: 可选的计划叙述（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: tracing 初始化
//! - **planning**: 任务分解、路线图生成、规划校验
//! - **rules**: 有序关键词规则表
//! - **tools**: 工具调用契约、注册表、执行器、参数映射、路由
//! - **workflow**: 依赖图、工具链模型与编排器

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod planning;
pub mod rules;
pub mod tools;
pub mod workflow;

pub use crate::core::{Coordinator, CoordinatorBuilder, Strictness};
