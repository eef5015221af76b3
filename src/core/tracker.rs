//! 进度跟踪（Track Keeper）
//!
//! 每次执行一个 TrackingState：进度更新时按「进度增量 / 距上个检查点的分钟数」对比期望速率判定偏离；
//! 观察到的动作与期望步骤关键词做 Jaccard 重合度判断是否迷失；可回退到任一检查点。
//!
//! 同一 tracking id 假定同时只有一个写入方。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::TrackingConfig;
use crate::core::error::EngineError;
use crate::planning::Roadmap;

/// 开始跟踪时写入的检查点步骤名
pub const TRACKING_START: &str = "tracking_start";

/// 模板步骤的固定关键词
const STEP_KEYWORDS: &[(&str, &[&str])] = &[
    ("req_analysis", &["analyze", "requirements", "understand", "document"]),
    ("arch_design", &["design", "architecture", "plan", "structure"]),
    ("setup_env", &["setup", "environment", "install", "configure"]),
    ("core_impl", &["implement", "code", "build", "develop"]),
    ("testing", &["test", "verify", "validate", "check"]),
    ("deployment", &["deploy", "release", "production", "launch"]),
];

/// 跟踪状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    OnTrack,
    MinorDeviation,
    MajorDeviation,
    Lost,
    Completed,
}

impl TrackStatus {
    pub fn is_off_track(&self) -> bool {
        matches!(self, Self::MajorDeviation | Self::Lost)
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OnTrack => "on_track",
            Self::MinorDeviation => "minor_deviation",
            Self::MajorDeviation => "major_deviation",
            Self::Lost => "lost",
            Self::Completed => "completed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// cp_001、cp_002 …
    pub checkpoint_id: String,
    pub step_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: TrackStatus,
    pub progress: f64,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingState {
    pub roadmap_id: String,
    pub current_step: Option<String>,
    pub current_phase: usize,
    pub completed_steps: Vec<String>,
    pub checkpoints: Vec<Checkpoint>,
    pub overall_progress: f64,
    pub status: TrackStatus,
    pub last_update: DateTime<Utc>,
}

impl TrackingState {
    fn push_checkpoint(&mut self, step_id: &str, status: TrackStatus, progress: f64, notes: &str, now: DateTime<Utc>) {
        let checkpoint = Checkpoint {
            checkpoint_id: format!("cp_{:03}", self.checkpoints.len() + 1),
            step_id: step_id.to_string(),
            timestamp: now,
            status,
            progress,
            notes: notes.to_string(),
        };
        self.checkpoints.push(checkpoint);
        self.last_update = now;
    }
}

/// 动作对齐检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionReport {
    pub confused: bool,
    /// Jaccard 重合度
    pub alignment: f64,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// 跟踪摘要（最近三个检查点）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSummary {
    pub tracking_id: String,
    pub roadmap_id: String,
    pub current_step: Option<String>,
    pub progress: f64,
    pub status: TrackStatus,
    pub completed_steps: usize,
    pub total_checkpoints: usize,
    pub last_update: DateTime<Utc>,
    pub recent_checkpoints: Vec<Checkpoint>,
}

struct Tracked {
    state: TrackingState,
    phases: Vec<Vec<String>>,
    /// 步骤 ID / 子任务 ID -> 期望关键词
    keywords: HashMap<String, Vec<String>>,
}

pub struct TrackKeeper {
    tracked: RwLock<HashMap<String, Tracked>>,
    expected_rate_per_minute: f64,
    minor_ratio: f64,
    major_ratio: f64,
    seq: AtomicU64,
}

impl Default for TrackKeeper {
    fn default() -> Self {
        Self::from_config(&TrackingConfig::default())
    }
}

impl fmt::Debug for TrackKeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackKeeper")
            .field("expected_rate_per_minute", &self.expected_rate_per_minute)
            .field("minor_ratio", &self.minor_ratio)
            .field("major_ratio", &self.major_ratio)
            .finish()
    }
}

impl TrackKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &TrackingConfig) -> Self {
        Self {
            tracked: RwLock::new(HashMap::new()),
            expected_rate_per_minute: cfg.expected_rate_per_minute,
            minor_ratio: cfg.minor_ratio,
            major_ratio: cfg.major_ratio,
            seq: AtomicU64::new(0),
        }
    }

    pub async fn start_tracking(&self, roadmap: &Roadmap) -> String {
        self.start_tracking_at(roadmap, Utc::now()).await
    }

    pub async fn start_tracking_at(&self, roadmap: &Roadmap, now: DateTime<Utc>) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let tracking_id = format!("track_{}_{}_{seq}", roadmap.id, now.format("%Y%m%d_%H%M%S"));

        let mut state = TrackingState {
            roadmap_id: roadmap.id.clone(),
            current_step: None,
            current_phase: 0,
            completed_steps: Vec::new(),
            checkpoints: Vec::new(),
            overall_progress: 0.0,
            status: TrackStatus::OnTrack,
            last_update: now,
        };
        state.push_checkpoint(TRACKING_START, TrackStatus::OnTrack, 0.0, "Started tracking roadmap execution", now);

        let tracked = Tracked {
            state,
            phases: roadmap.phases.clone(),
            keywords: step_keywords(roadmap),
        };
        self.tracked.write().await.insert(tracking_id.clone(), tracked);
        tracing::info!(roadmap_id = %roadmap.id, tracking_id = %tracking_id, "Started tracking");
        tracking_id
    }

    pub async fn create_checkpoint(
        &self,
        tracking_id: &str,
        step_id: &str,
        status: TrackStatus,
        progress: f64,
        notes: &str,
    ) -> Result<String, EngineError> {
        let mut guard = self.tracked.write().await;
        let tracked = guard
            .get_mut(tracking_id)
            .ok_or_else(|| EngineError::UnknownTracking(tracking_id.to_string()))?;
        tracked.state.push_checkpoint(step_id, status, progress, notes, Utc::now());
        let id = tracked
            .state
            .checkpoints
            .last()
            .map(|c| c.checkpoint_id.clone())
            .unwrap_or_default();
        tracing::debug!(tracking_id, checkpoint = %id, "Created checkpoint");
        Ok(id)
    }

    pub async fn update_progress(
        &self,
        tracking_id: &str,
        step_id: &str,
        progress: f64,
        notes: &str,
    ) -> Result<TrackStatus, EngineError> {
        self.update_progress_at(tracking_id, step_id, progress, notes, Utc::now()).await
    }

    /// 切换到新步骤时，上一步骤记为完成；随后判定状态并追加检查点
    pub async fn update_progress_at(
        &self,
        tracking_id: &str,
        step_id: &str,
        progress: f64,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<TrackStatus, EngineError> {
        let mut guard = self.tracked.write().await;
        let tracked = guard
            .get_mut(tracking_id)
            .ok_or_else(|| EngineError::UnknownTracking(tracking_id.to_string()))?;
        let state = &mut tracked.state;

        if state.current_step.as_deref() != Some(step_id) {
            if let Some(previous) = state.current_step.take() {
                if !state.completed_steps.contains(&previous) {
                    state.completed_steps.push(previous);
                }
            }
            state.current_step = Some(step_id.to_string());
            if let Some(phase) = tracked.phases.iter().position(|p| p.iter().any(|s| s == step_id)) {
                state.current_phase = phase;
            }
        }

        let status = self.assess(state, progress, now);
        state.overall_progress = progress;
        state.status = status;
        state.push_checkpoint(step_id, status, progress, notes, now);

        if status.is_off_track() {
            tracing::warn!(tracking_id, step_id, %status, progress, "Execution is off track");
        } else {
            tracing::debug!(tracking_id, step_id, %status, progress, "Progress updated");
        }
        Ok(status)
    }

    /// 完成优先；之后比较与上一个（非起始）检查点之间的进度增量与期望增量
    fn assess(&self, state: &TrackingState, progress: f64, now: DateTime<Utc>) -> TrackStatus {
        if progress >= 100.0 {
            return TrackStatus::Completed;
        }
        if state.checkpoints.len() > 1 {
            if let Some(last) = state.checkpoints.last() {
                let delta = progress - last.progress;
                let minutes = (now - last.timestamp).num_milliseconds() as f64 / 60_000.0;
                let expected = self.expected_rate_per_minute * minutes;
                if delta < expected * self.major_ratio {
                    return TrackStatus::MajorDeviation;
                }
                if delta < expected * self.minor_ratio {
                    return TrackStatus::MinorDeviation;
                }
            }
        }
        if progress > 0.0 {
            TrackStatus::OnTrack
        } else {
            TrackStatus::MinorDeviation
        }
    }

    /// 重合度 > 0.7 对齐；0.3 ~ 0.7 轻微偏离（不阻断）；< 0.3 判定为迷失
    ///
    /// 只产出报告，不改动跟踪状态；状态仍由 update_progress 的进度评估决定。
    pub async fn detect_confusion(
        &self,
        tracking_id: &str,
        observed: &str,
        expected_step: &str,
    ) -> Result<ConfusionReport, EngineError> {
        let guard = self.tracked.read().await;
        let tracked = guard
            .get(tracking_id)
            .ok_or_else(|| EngineError::UnknownTracking(tracking_id.to_string()))?;

        let expected = tracked
            .keywords
            .get(expected_step)
            .cloned()
            .unwrap_or_else(|| fixed_keywords(expected_step));
        let alignment = alignment(observed, &expected);

        let report = if alignment > 0.7 {
            ConfusionReport {
                confused: false,
                alignment,
                message: "Action aligns with expected step".to_string(),
                suggestions: Vec::new(),
            }
        } else if alignment > 0.3 {
            ConfusionReport {
                confused: false,
                alignment,
                message: "Minor misalignment detected".to_string(),
                suggestions: vec![
                    "Review current step requirements".to_string(),
                    "Ensure action matches step objectives".to_string(),
                ],
            }
        } else {
            tracing::warn!(tracking_id, expected_step, alignment, "Major confusion detected");
            ConfusionReport {
                confused: true,
                alignment,
                message: "Major confusion detected - action doesn't match expected step".to_string(),
                suggestions: vec![
                    "Stop current action".to_string(),
                    "Review roadmap and current position".to_string(),
                    "Restart from last checkpoint if needed".to_string(),
                ],
            }
        };
        Ok(report)
    }

    pub async fn recovery_suggestions(&self, tracking_id: &str) -> Vec<String> {
        let guard = self.tracked.read().await;
        let Some(tracked) = guard.get(tracking_id) else {
            return vec!["Restart tracking system".to_string()];
        };
        let suggestions: &[&str] = match tracked.state.status {
            TrackStatus::Lost => &[
                "Review original roadmap and objectives",
                "Identify last successful checkpoint",
                "Restart from last known good state",
                "Break down current confusion into smaller steps",
            ],
            TrackStatus::MajorDeviation => &[
                "Pause current activity",
                "Review current step requirements",
                "Identify what caused the deviation",
                "Adjust approach to align with roadmap",
            ],
            TrackStatus::MinorDeviation => &[
                "Review current step objectives",
                "Make minor adjustments to stay on track",
                "Continue with increased awareness",
            ],
            TrackStatus::OnTrack | TrackStatus::Completed => &[],
        };
        suggestions.iter().map(|s| s.to_string()).collect()
    }

    /// 截断到目标检查点，恢复其记录的步骤 / 进度 / 状态，再追加一个回退检查点
    pub async fn backtrack_to_checkpoint(&self, tracking_id: &str, checkpoint_id: &str) -> Result<(), EngineError> {
        let mut guard = self.tracked.write().await;
        let tracked = guard
            .get_mut(tracking_id)
            .ok_or_else(|| EngineError::UnknownTracking(tracking_id.to_string()))?;
        let state = &mut tracked.state;

        let index = state
            .checkpoints
            .iter()
            .position(|c| c.checkpoint_id == checkpoint_id)
            .ok_or_else(|| EngineError::CheckpointNotFound {
                tracking_id: tracking_id.to_string(),
                checkpoint_id: checkpoint_id.to_string(),
            })?;
        state.checkpoints.truncate(index + 1);
        let target = state.checkpoints[index].clone();

        state.current_step = (target.step_id != TRACKING_START).then(|| target.step_id.clone());
        state.overall_progress = target.progress;
        state.status = target.status;
        state.completed_steps = completed_before(&state.checkpoints);
        if let Some(phase) = tracked
            .phases
            .iter()
            .position(|p| p.iter().any(|s| s == &target.step_id))
        {
            state.current_phase = phase;
        }

        let notes = format!("Backtracked to checkpoint {checkpoint_id}");
        state.push_checkpoint(&target.step_id, target.status, target.progress, &notes, Utc::now());
        tracing::info!(tracking_id, checkpoint_id, "Backtracked to checkpoint");
        Ok(())
    }

    pub async fn state(&self, tracking_id: &str) -> Option<TrackingState> {
        self.tracked.read().await.get(tracking_id).map(|t| t.state.clone())
    }

    pub async fn tracking_summary(&self, tracking_id: &str) -> Option<TrackingSummary> {
        let guard = self.tracked.read().await;
        let state = &guard.get(tracking_id)?.state;
        let skip = state.checkpoints.len().saturating_sub(3);
        Some(TrackingSummary {
            tracking_id: tracking_id.to_string(),
            roadmap_id: state.roadmap_id.clone(),
            current_step: state.current_step.clone(),
            progress: state.overall_progress,
            status: state.status,
            completed_steps: state.completed_steps.len(),
            total_checkpoints: state.checkpoints.len(),
            last_update: state.last_update,
            recent_checkpoints: state.checkpoints[skip..].to_vec(),
        })
    }

    pub async fn cleanup_tracking(&self, tracking_id: &str) -> bool {
        let removed = self.tracked.write().await.remove(tracking_id).is_some();
        if removed {
            tracing::info!(tracking_id, "Cleaned up tracking");
        }
        removed
    }

    pub async fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tracked.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn fixed_keywords(step: &str) -> Vec<String> {
    STEP_KEYWORDS
        .iter()
        .find(|(id, _)| *id == step)
        .map(|(_, words)| words.iter().map(|w| w.to_string()).collect())
        .unwrap_or_default()
}

/// 模板步骤用固定关键词，其余步骤取名称中的词；步骤 ID 与子任务 ID 都可查
fn step_keywords(roadmap: &Roadmap) -> HashMap<String, Vec<String>> {
    let mut map = HashMap::new();
    for step in &roadmap.steps {
        let mut words = fixed_keywords(&step.subtask_id);
        if words.is_empty() {
            words = step
                .name
                .split_whitespace()
                .map(str::to_lowercase)
                .filter(|w| w.len() > 2)
                .collect();
        }
        map.insert(step.step_id.clone(), words.clone());
        map.insert(step.subtask_id.clone(), words);
    }
    map
}

/// Jaccard 重合度；期望关键词为空时取中性值 0.5
fn alignment(observed: &str, expected: &[String]) -> f64 {
    if expected.is_empty() {
        return 0.5;
    }
    let observed: HashSet<String> = observed.split_whitespace().map(str::to_lowercase).collect();
    let expected: HashSet<String> = expected.iter().cloned().collect();
    let union = observed.union(&expected).count();
    if union == 0 {
        return 0.5;
    }
    observed.intersection(&expected).count() as f64 / union as f64
}

/// 按检查点重放：某步骤之后出现了不同步骤，即视为已完成
fn completed_before(checkpoints: &[Checkpoint]) -> Vec<String> {
    let mut completed: Vec<String> = Vec::new();
    let mut current: Option<&str> = None;
    for cp in checkpoints.iter().filter(|c| c.step_id != TRACKING_START) {
        if current != Some(cp.step_id.as_str()) {
            if let Some(prev) = current {
                if !completed.iter().any(|c| c == prev) {
                    completed.push(prev.to_string());
                }
            }
            current = Some(cp.step_id.as_str());
        }
    }
    completed
}
