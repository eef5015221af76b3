//! 核心层：错误与恢复、进度跟踪、协调器及其构建器

pub mod builder;
pub mod coordinator;
pub mod error;
pub mod recovery;
pub mod tracker;

pub use builder::{create_coordinator_builder, CoordinatorBuilder};
pub use coordinator::{
    AlignmentReport, Coordinator, ExecutionReport, ExecutionRequest, ExecutionTarget, ReasoningResult,
    ReasoningSummary, RoadmapRun, Strictness, TaskRun,
};
pub use error::{EngineError, FailureCategory, RecoveryStrategy};
pub use recovery::{
    default_fallbacks, BackoffStrategy, ChannelEscalation, EscalationHandler, EscalationReport, FailurePatterns,
    FailureRecord, LogEscalation, RecoveryAction, RecoveryRules, RecoverySystem, RetryPolicy, ToolOverride,
    DEFAULT_ANALYTICS_WINDOW,
};
pub use tracker::{Checkpoint, ConfusionReport, TrackKeeper, TrackStatus, TrackingState, TrackingSummary};
