//! 工具层：统一调用契约、名称注册表、超时执行器、参数映射与关键词路由

pub mod executor;
pub mod mock;
pub mod outcome;
pub mod params;
pub mod registry;
pub mod routing;

pub use executor::{ToolError, ToolExecutor, ToolInvoker};
pub use mock::ScriptedTool;
pub use outcome::{OutcomeStatus, ToolOutcome};
pub use params::{Inference, ParameterMapper, ToolParamSpec};
pub use registry::{Tool, ToolRegistry};
pub use routing::ToolRouter;
