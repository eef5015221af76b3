//! 任务分解器
//!
//! 自由文本 -> 复杂度 / 类型（关键词规则表）-> 领域模板（开发 / 研究 / 创作 / 通用）-> 子任务 DAG。
//! 简单任务只产出一个包裹整句请求的子任务。分解永不失败。

use crate::planning::types::*;
use crate::rules::KeywordTable;
use crate::workflow::DependencyGraph;

/// 子任务默认置信度
const SUBTASK_CONFIDENCE: f64 = 0.8;

/// 模板中的一条子任务
struct Template {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    task_type: TaskType,
    complexity: Complexity,
    minutes: u32,
    dependencies: &'static [&'static str],
    capabilities: &'static [&'static str],
    success_criteria: &'static str,
}

impl Template {
    fn build(&self) -> Subtask {
        Subtask {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            task_type: self.task_type,
            complexity: self.complexity,
            estimated_minutes: self.minutes,
            dependencies: self.dependencies.iter().map(|s| s.to_string()).collect(),
            required_capabilities: self.capabilities.iter().map(|s| s.to_string()).collect(),
            success_criteria: self.success_criteria.to_string(),
            confidence: SUBTASK_CONFIDENCE,
        }
    }
}

const DEVELOPMENT: &[Template] = &[
    Template {
        id: "req_analysis",
        name: "Analyze Requirements",
        description: "Understand what needs to be built",
        task_type: TaskType::Analysis,
        complexity: Complexity::Moderate,
        minutes: 60,
        dependencies: &[],
        capabilities: &["file_manager"],
        success_criteria: "Requirements clearly documented",
    },
    Template {
        id: "arch_design",
        name: "Design Architecture",
        description: "Plan the system architecture",
        task_type: TaskType::Creation,
        complexity: Complexity::Complex,
        minutes: 120,
        dependencies: &["req_analysis"],
        capabilities: &["file_manager"],
        success_criteria: "Architecture diagram and plan created",
    },
    Template {
        id: "setup_env",
        name: "Setup Environment",
        description: "Prepare development environment",
        task_type: TaskType::SystemOperation,
        complexity: Complexity::Moderate,
        minutes: 45,
        dependencies: &["arch_design"],
        capabilities: &["terminal_executor"],
        success_criteria: "Development environment ready",
    },
    Template {
        id: "core_impl",
        name: "Implement Core Features",
        description: "Build main functionality",
        task_type: TaskType::Development,
        complexity: Complexity::VeryComplex,
        minutes: 300,
        dependencies: &["setup_env"],
        capabilities: &["file_manager", "terminal_executor"],
        success_criteria: "Core features working",
    },
    Template {
        id: "testing",
        name: "Add Testing",
        description: "Create and run tests",
        task_type: TaskType::Development,
        complexity: Complexity::Complex,
        minutes: 120,
        dependencies: &["core_impl"],
        capabilities: &["file_manager", "terminal_executor"],
        success_criteria: "Tests passing",
    },
    Template {
        id: "deployment",
        name: "Deploy Application",
        description: "Deploy to production",
        task_type: TaskType::SystemOperation,
        complexity: Complexity::Complex,
        minutes: 90,
        dependencies: &["testing"],
        capabilities: &["terminal_executor"],
        success_criteria: "Application deployed and accessible",
    },
];

const RESEARCH: &[Template] = &[
    Template {
        id: "define_scope",
        name: "Define Research Scope",
        description: "Clarify what to research",
        task_type: TaskType::Analysis,
        complexity: Complexity::Simple,
        minutes: 30,
        dependencies: &[],
        capabilities: &["file_manager"],
        success_criteria: "Research scope defined",
    },
    Template {
        id: "gather_info",
        name: "Gather Information",
        description: "Search for relevant information",
        task_type: TaskType::Research,
        complexity: Complexity::Moderate,
        minutes: 90,
        dependencies: &["define_scope"],
        capabilities: &["web_search", "file_manager"],
        success_criteria: "Relevant information collected",
    },
    Template {
        id: "analyze_findings",
        name: "Analyze Findings",
        description: "Process and analyze collected data",
        task_type: TaskType::Analysis,
        complexity: Complexity::Moderate,
        minutes: 75,
        dependencies: &["gather_info"],
        capabilities: &["file_manager"],
        success_criteria: "Analysis completed",
    },
    Template {
        id: "create_summary",
        name: "Create Summary",
        description: "Synthesize findings into summary",
        task_type: TaskType::Creation,
        complexity: Complexity::Moderate,
        minutes: 60,
        dependencies: &["analyze_findings"],
        capabilities: &["file_manager"],
        success_criteria: "Summary document created",
    },
];

const CREATION: &[Template] = &[
    Template {
        id: "plan_structure",
        name: "Plan Structure",
        description: "Outline the structure",
        task_type: TaskType::Analysis,
        complexity: Complexity::Simple,
        minutes: 30,
        dependencies: &[],
        capabilities: &["file_manager"],
        success_criteria: "Structure planned",
    },
    Template {
        id: "create_content",
        name: "Create Content",
        description: "Generate the main content",
        task_type: TaskType::Creation,
        complexity: Complexity::Complex,
        minutes: 150,
        dependencies: &["plan_structure"],
        capabilities: &["file_manager", "web_search"],
        success_criteria: "Content created",
    },
    Template {
        id: "review_refine",
        name: "Review and Refine",
        description: "Review and improve the content",
        task_type: TaskType::Analysis,
        complexity: Complexity::Moderate,
        minutes: 60,
        dependencies: &["create_content"],
        capabilities: &["file_manager"],
        success_criteria: "Content reviewed and refined",
    },
];

/// 任务分解器：三张关键词规则表 + 固定模板目录
#[derive(Debug, Clone)]
pub struct TaskDecomposer {
    complexity_rules: KeywordTable<Complexity>,
    type_rules: KeywordTable<TaskType>,
    capability_rules: KeywordTable<String>,
}

impl Default for TaskDecomposer {
    fn default() -> Self {
        let complexity_rules = KeywordTable::default()
            .rule(
                &[
                    "build",
                    "create application",
                    "full stack",
                    "system",
                    "architecture",
                    "production",
                    "deploy",
                    "integrate multiple",
                    "end-to-end",
                ],
                Complexity::VeryComplex,
            )
            .rule(
                &[
                    "develop",
                    "implement",
                    "design",
                    "analyze complex",
                    "research comprehensive",
                    "multiple components",
                    "workflow",
                    "automation",
                ],
                Complexity::Complex,
            )
            .rule(
                &[
                    "write", "document", "research", "analyze", "plan", "organize", "review", "compare",
                    "evaluate",
                ],
                Complexity::Moderate,
            );

        let type_rules = KeywordTable::default()
            .rule(&["research", "investigate", "study", "explore"], TaskType::Research)
            .rule(&["build", "develop", "code", "implement", "program"], TaskType::Development)
            .rule(&["analyze", "evaluate", "assess", "review"], TaskType::Analysis)
            .rule(&["create", "write", "design", "make"], TaskType::Creation)
            .rule(&["email", "message", "communicate", "notify"], TaskType::Communication);

        let capability_rules = KeywordTable::default()
            .rule(&["file", "read", "write", "create", "save"], "file_manager".to_string())
            .rule(&["command", "execute", "run", "install"], "terminal_executor".to_string())
            .rule(&["search", "research", "find information"], "web_search".to_string())
            .rule(&["calculate", "compute", "math"], "calculator".to_string())
            .rule(&["ask", "confirm", "approval", "input"], "human_input".to_string());

        Self {
            complexity_rules,
            type_rules,
            capability_rules,
        }
    }
}

impl TaskDecomposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_complexity_rules(mut self, rules: KeywordTable<Complexity>) -> Self {
        self.complexity_rules = rules;
        self
    }

    pub fn with_type_rules(mut self, rules: KeywordTable<TaskType>) -> Self {
        self.type_rules = rules;
        self
    }

    pub fn with_capability_rules(mut self, rules: KeywordTable<String>) -> Self {
        self.capability_rules = rules;
        self
    }

    /// 复杂度：首个命中档位，默认 Simple
    pub fn analyze_complexity(&self, task: &str) -> Complexity {
        self.complexity_rules
            .first_match(task)
            .copied()
            .unwrap_or(Complexity::Simple)
    }

    /// 类型：首个命中类型，默认 SystemOperation
    pub fn identify_type(&self, task: &str) -> TaskType {
        self.type_rules
            .first_match(task)
            .copied()
            .unwrap_or(TaskType::SystemOperation)
    }

    /// 所需能力（规则顺序、去重）
    pub fn required_capabilities(&self, text: &str) -> Vec<String> {
        let mut caps: Vec<String> = Vec::new();
        for cap in self.capability_rules.all_matches(text) {
            if !caps.contains(cap) {
                caps.push(cap.clone());
            }
        }
        caps
    }

    pub fn decompose(&self, task: &str) -> Decomposition {
        tracing::info!(task, "Decomposing task");
        let complexity = self.analyze_complexity(task);
        let task_type = self.identify_type(task);

        let subtasks = if complexity == Complexity::Simple {
            vec![Subtask {
                id: "main_task".to_string(),
                name: task.to_string(),
                description: task.to_string(),
                task_type,
                complexity,
                estimated_minutes: estimate_minutes(complexity, task_type),
                dependencies: Vec::new(),
                required_capabilities: self.required_capabilities(task),
                success_criteria: format!("Successfully completed: {task}"),
                confidence: SUBTASK_CONFIDENCE,
            }]
        } else {
            self.expand(task, complexity, task_type)
        };

        let ordering = DependencyGraph::new(subtasks.iter().map(|s| (s.id.clone(), s.dependencies.clone())))
            .stable_order();
        if !ordering.forced.is_empty() {
            tracing::warn!(forced = ?ordering.forced, "Subtasks placed without satisfied dependencies");
        }

        let total: u32 = subtasks.iter().map(|s| s.estimated_minutes).sum();
        let confidence = subtasks.iter().map(|s| s.confidence).sum::<f64>() / subtasks.len().max(1) as f64;
        let rationale = format!(
            "Decomposed {complexity} {task_type} task into {} subtasks",
            subtasks.len()
        );

        tracing::info!(subtasks = subtasks.len(), total_minutes = total, "Task decomposed");
        Decomposition {
            original_task: task.to_string(),
            subtasks,
            execution_order: ordering.order,
            total_estimated_minutes: total,
            confidence,
            rationale,
            forced_order: ordering.forced,
        }
    }

    /// 按类型选择模板；开发类只有提到 application / app 时才用开发模板，否则走通用模板
    fn expand(&self, task: &str, complexity: Complexity, task_type: TaskType) -> Vec<Subtask> {
        let lower = task.to_lowercase();
        let catalog = match task_type {
            TaskType::Development if lower.contains("application") || lower.contains("app") => Some(DEVELOPMENT),
            TaskType::Research => Some(RESEARCH),
            TaskType::Creation => Some(CREATION),
            _ => None,
        };
        match catalog {
            Some(templates) => templates.iter().map(Template::build).collect(),
            None => self.generic(task, complexity, task_type),
        }
    }

    fn generic(&self, task: &str, complexity: Complexity, task_type: TaskType) -> Vec<Subtask> {
        let prepare = Template {
            id: "prepare",
            name: "Prepare",
            description: "Prepare for the task",
            task_type: TaskType::SystemOperation,
            complexity: Complexity::Simple,
            minutes: 15,
            dependencies: &[],
            capabilities: &["file_manager"],
            success_criteria: "Preparation complete",
        };
        let verify = Template {
            id: "verify",
            name: "Verify Results",
            description: "Verify task completion",
            task_type: TaskType::Analysis,
            complexity: Complexity::Simple,
            minutes: 15,
            dependencies: &["execute"],
            capabilities: &["file_manager"],
            success_criteria: "Results verified",
        };
        let execute = Subtask {
            id: "execute".to_string(),
            name: "Execute Main Task".to_string(),
            description: format!("Execute: {task}"),
            task_type,
            complexity,
            estimated_minutes: estimate_minutes(complexity, task_type),
            dependencies: vec!["prepare".to_string()],
            required_capabilities: self.required_capabilities(task),
            success_criteria: format!("Task completed: {task}"),
            confidence: SUBTASK_CONFIDENCE,
        };
        vec![prepare.build(), execute, verify.build()]
    }
}
