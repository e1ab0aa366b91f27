//! Coordinator error kinds. Each surfaces a stable identifier (for CLI and
//! event payloads) alongside the wrapped cause.

use std::time::Duration;

use crewmux_core::driver::DriverError;
use crewmux_core::types::AgentKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("pane not found: {0}")]
    PaneNotFound(String),

    /// The bound pane disappeared mid-operation.
    #[error("pane lost: {0}")]
    PaneLost(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    /// Work-graph or mail service unreachable. Recoverable: the next tick
    /// retries.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Credentials rejected. Fatal to that subsystem; the coordinator
    /// continues with reduced functionality.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Reservation or name conflict; caller retries with disambiguation.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("blocked by policy: {0}")]
    PolicyBlock(String),

    #[error("approval required by policy: {0}")]
    PolicyApprovalRequired(String),

    /// A transported payload failed schema checks; dropped with a logged
    /// reason.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("no agent found for type {kind:?} (model {model:?})")]
    NoAgent {
        kind: AgentKind,
        model: Option<String>,
    },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoordinatorError {
    /// Stable machine-readable identifier, used in JSON output and event
    /// detail maps.
    pub fn kind_id(&self) -> &'static str {
        match self {
            Self::PaneNotFound(_) => "pane-not-found",
            Self::PaneLost(_) => "pane-lost",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::UpstreamUnavailable(_) => "upstream-unavailable",
            Self::Unauthorized(_) => "unauthorized",
            Self::Conflict(_) => "conflict",
            Self::PolicyBlock(_) => "policy-block",
            Self::PolicyApprovalRequired(_) => "policy-approval-required",
            Self::MalformedInput(_) => "malformed-input",
            Self::NoAgent { .. } => "no-agent",
            Self::Driver(DriverError::PaneNotFound(_)) => "pane-not-found",
            Self::Driver(_) => "driver",
            Self::Io(_) => "io",
            Self::Json(_) => "malformed-input",
        }
    }
}

/// A pipeline failure: which stage broke and why. Stage indexes are
/// zero-based.
#[derive(Debug, Error)]
#[error("stage {stage} failed: {source}")]
pub struct PipelineError {
    pub stage: usize,
    #[source]
    pub source: CoordinatorError,
}
