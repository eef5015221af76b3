//! 工作流层：依赖图、工具链模型、链构建器与工具编排器

pub mod builder;
pub mod engine;
pub mod graph;
pub mod types;

pub use builder::ToolChainBuilder;
pub use engine::{StepSpec, ToolOrchestrator};
pub use graph::{DependencyGraph, ReadyLevel, StableOrder};
pub use types::*;
