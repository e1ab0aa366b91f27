use serde::{Deserialize, Serialize};

/// Work item category as reported by the work-graph tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    Epic,
    Feature,
    Bug,
    #[default]
    Task,
    Chore,
}

/// Optional per-item graph metrics from the work-graph scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreBreakdown {
    #[serde(default)]
    pub pagerank: f64,
    #[serde(default)]
    pub blocker_ratio: f64,
    #[serde(default)]
    pub time_to_impact: f64,
}

/// A prioritized recommendation from the external work-graph tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    /// 0 (critical) through 4 (backlog).
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default, rename = "type")]
    pub kind: WorkKind,
    /// "open", "blocked", "in_progress", ...
    #[serde(default)]
    pub status: String,
    /// Base triage score in [0, 1].
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub breakdown: Option<ScoreBreakdown>,
    /// Ids of items this one unblocks when completed.
    #[serde(default)]
    pub unblocks: Vec<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

fn default_priority() -> u8 {
    2
}

impl WorkItem {
    /// Blocked items are never selected by the scorer.
    pub fn is_blocked(&self) -> bool {
        self.status == "blocked"
    }
}

/// Top-level triage payload from the work-graph tool.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriageResponse {
    #[serde(default)]
    pub recommendations: Vec<WorkItem>,
}
