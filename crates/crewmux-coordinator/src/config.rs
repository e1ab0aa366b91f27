//! Coordinator and pipeline configuration.

use std::time::Duration;

use crewmux_core::redact::RedactionMode;
use crewmux_core::score::Strategy;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// tmux session the coordinator manages.
    pub session: String,
    /// Project key handed to the work-graph tool (usually the repo path).
    pub project_key: String,
    pub tick_interval: Duration,
    pub auto_assign: bool,
    /// Lines captured per pane for state detection.
    pub capture_lines: u32,
    pub strategy: Strategy,
    pub redaction_mode: RedactionMode,
    /// When set, approval-required commands do not block assignment.
    pub pre_approved: bool,
    /// Sender name used on assignment mail.
    pub agent_name: String,
}

impl CoordinatorConfig {
    pub fn new(session: impl Into<String>, project_key: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            project_key: project_key.into(),
            tick_interval: Duration::from_secs(1),
            auto_assign: false,
            capture_lines: 10,
            strategy: Strategy::Balanced,
            redaction_mode: RedactionMode::Warn,
            pre_approved: false,
            agent_name: "crewmux-coordinator".into(),
        }
    }

    #[must_use]
    pub fn with_auto_assign(mut self, on: bool) -> Self {
        self.auto_assign = on;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_redaction_mode(mut self, mode: RedactionMode) -> Self {
        self.redaction_mode = mode;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pause after injecting a prompt, before the first idle poll, so the
    /// agent's thinking indicator has time to appear. Empirical; tune per
    /// deployment.
    pub debounce: Duration,
    pub poll_interval: Duration,
    pub stage_timeout: Duration,
    /// Lines captured for the before/after snapshots.
    pub capture_lines: u32,
    /// Lines captured for each idle poll.
    pub detect_lines: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
            stage_timeout: Duration::from_secs(30 * 60),
            capture_lines: 2000,
            detect_lines: 10,
        }
    }
}
