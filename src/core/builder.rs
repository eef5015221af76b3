//! 协调器构建器：统一的初始化逻辑
//!
//! 所有入口（CLI、测试、嵌入方）共享同一套组件装配：执行器 -> 恢复系统 -> 编排器 -> 规划与跟踪。
//! [rules] 段指定的关键词规则表在 from_config 时读入，读取或解析失败直接返回错误。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::core::coordinator::Coordinator;
use crate::core::error::{EngineError, FailureCategory};
use crate::core::recovery::{RecoveryRules, RecoverySystem};
use crate::core::tracker::TrackKeeper;
use crate::llm::LlmClient;
use crate::planning::{RoadmapGenerator, TaskDecomposer, Validator};
use crate::rules::KeywordTable;
use crate::tools::{ParameterMapper, ToolExecutor, ToolInvoker, ToolRegistry, ToolRouter};
use crate::workflow::ToolOrchestrator;

/// 协调器构建器
pub struct CoordinatorBuilder {
    config: AppConfig,
    registry: ToolRegistry,
    recovery: Option<RecoverySystem>,
    /// [rules].failure_categories；未显式设置 recovery 时生效
    category_table: Option<KeywordTable<FailureCategory>>,
    validator: Option<Validator>,
    decomposer: Option<TaskDecomposer>,
    router: Option<ToolRouter>,
    mapper: Option<ParameterMapper>,
    max_attempts: Option<u32>,
    narrator: Option<Arc<dyn LlmClient>>,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self::with_defaults(AppConfig::default())
    }

    /// 以配置为底；narrator 按 [llm] 段创建（未启用为 None），[rules] 段的规则表在此读入
    pub fn from_config(config: AppConfig) -> Result<Self, EngineError> {
        let rules = config.rules.clone();
        let mut builder = Self::with_defaults(config);

        if rules.complexity.is_some() || rules.task_type.is_some() || rules.capabilities.is_some() {
            let mut decomposer = TaskDecomposer::new();
            if let Some(path) = &rules.complexity {
                decomposer = decomposer.with_complexity_rules(KeywordTable::from_file(path)?);
            }
            if let Some(path) = &rules.task_type {
                decomposer = decomposer.with_type_rules(KeywordTable::from_file(path)?);
            }
            if let Some(path) = &rules.capabilities {
                decomposer = decomposer.with_capability_rules(KeywordTable::from_file(path)?);
            }
            builder.decomposer = Some(decomposer);
        }
        if let Some(path) = &rules.failure_categories {
            builder.category_table = Some(KeywordTable::from_file(path)?);
        }
        if let Some(path) = &rules.tool_routing {
            builder.router = Some(ToolRouter::default().with_table(KeywordTable::from_file(path)?));
        }
        Ok(builder)
    }

    fn with_defaults(config: AppConfig) -> Self {
        let narrator = crate::llm::create_narrator(&config.llm);
        Self {
            config,
            registry: ToolRegistry::new(),
            recovery: None,
            category_table: None,
            validator: None,
            decomposer: None,
            router: None,
            mapper: None,
            max_attempts: None,
            narrator,
        }
    }

    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn recovery(mut self, recovery: RecoverySystem) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn decomposer(mut self, decomposer: TaskDecomposer) -> Self {
        self.decomposer = Some(decomposer);
        self
    }

    pub fn router(mut self, router: ToolRouter) -> Self {
        self.router = Some(router);
        self
    }

    pub fn mapper(mut self, mapper: ParameterMapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// 每次工具调用的最大尝试次数（默认取 tools.max_recovery_attempts）
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn narrator(mut self, narrator: Arc<dyn LlmClient>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build(self) -> Coordinator {
        let cfg = self.config;
        let max_attempts = self.max_attempts.unwrap_or(cfg.tools.max_recovery_attempts.max(1));

        let invoker: Arc<dyn ToolInvoker> = Arc::new(ToolExecutor::new(self.registry, cfg.tools.tool_timeout_secs));
        let category_table = self.category_table;
        let recovery = Arc::new(self.recovery.unwrap_or_else(|| match category_table {
            Some(table) => {
                RecoverySystem::from_config_with_rules(RecoveryRules::default().with_category_table(table), &cfg.recovery)
            }
            None => RecoverySystem::from_config(&cfg.recovery),
        }));
        let mut orchestrator = ToolOrchestrator::new(invoker)
            .with_recovery(recovery.clone(), max_attempts)
            .with_default_timeout(cfg.orchestrator.chain_timeout_secs);
        if let Some(router) = self.router {
            orchestrator = orchestrator.with_router(router);
        }

        let validator = self
            .validator
            .unwrap_or_else(|| Validator::from_config(&cfg.validation, cfg.tools.known_tools.iter().cloned()));

        tracing::info!(
            tools = ?orchestrator.invoker().tool_names(),
            max_attempts,
            chain_timeout_secs = cfg.orchestrator.chain_timeout_secs,
            narrator = self.narrator.is_some(),
            "Coordinator initialized"
        );

        Coordinator {
            decomposer: self.decomposer.unwrap_or_default(),
            roadmaps: RoadmapGenerator::new(),
            validator,
            tracker: TrackKeeper::from_config(&cfg.tracking),
            recovery,
            orchestrator,
            mapper: self.mapper.unwrap_or_default(),
            narrator: self.narrator,
            max_attempts,
            active: RwLock::new(HashMap::new()),
        }
    }
}

/// 便捷函数：从默认路径加载配置并创建构建器
pub fn create_coordinator_builder(config_path: Option<PathBuf>) -> Result<CoordinatorBuilder, EngineError> {
    let config = crate::config::load_config(config_path).map_err(|e| EngineError::Config(e.to_string()))?;
    CoordinatorBuilder::from_config(config)
}
