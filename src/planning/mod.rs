//! 规划层：任务分解、路线图生成与校验

pub mod decomposer;
pub mod roadmap;
pub mod types;
pub mod validation;

pub use decomposer::TaskDecomposer;
pub use roadmap::RoadmapGenerator;
pub use types::*;
pub use validation::{Check, CheckSummary, Severity, Validator, Verdict};
