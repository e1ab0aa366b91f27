use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::PersonaProfile;

/// Agent family bound to a pane. Derived once when the pane is discovered
/// and immutable for the pane's lifetime; a pane id reappearing with a
/// different kind is treated as a new pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Claude,
    Codex,
    Gemini,
    User,
    Unknown,
}

impl AgentKind {
    /// Parse a kind from a short code or full name ("cc", "claude", ...).
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "claude" | "cc" | "claude-code" => Self::Claude,
            "codex" | "cod" | "openai" => Self::Codex,
            "gemini" | "gmi" | "google" => Self::Gemini,
            "user" | "shell" => Self::User,
            _ => Self::Unknown,
        }
    }

    /// Short code used in pane titles and CLI output.
    pub fn short(&self) -> &'static str {
        match self {
            Self::Claude => "cc",
            Self::Codex => "cod",
            Self::Gemini => "gmi",
            Self::User => "user",
            Self::Unknown => "unknown",
        }
    }

    /// True for the three AI agent families (excludes user shells).
    pub fn is_agent(&self) -> bool {
        matches!(self, Self::Claude | Self::Codex | Self::Gemini)
    }
}

/// Inferred run-state of the process in a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Working,
    AwaitingInput,
    Error,
    Unknown,
}

impl AgentState {
    /// Idle and AwaitingInput panes both accept new work. AwaitingInput is
    /// still reported distinctly on the event bus.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Self::Idle | Self::AwaitingInput)
    }

    /// snake_case name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::AwaitingInput => "awaiting_input",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// A detected state plus the instant it was first observed. `since` is
/// carried forward while the state does not change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateReading {
    pub state: AgentState,
    pub since: DateTime<Utc>,
}

/// Point-in-time view of an agent, as consumed by the assignment scorer.
/// The registry clones these out under its lock; the scorer never sees
/// live records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub pane_id: String,
    pub kind: AgentKind,
    #[serde(default)]
    pub variant: Option<String>,
    /// Context window usage as a percentage, 0-100.
    #[serde(default)]
    pub context_usage: f64,
    #[serde(default)]
    pub reservations: Vec<String>,
    #[serde(default)]
    pub profile: Option<PersonaProfile>,
    #[serde(default)]
    pub mail_name: Option<String>,
}

impl AgentSnapshot {
    pub fn new(pane_id: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            pane_id: pane_id.into(),
            kind,
            variant: None,
            context_usage: 0.0,
            reservations: Vec::new(),
            profile: None,
            mail_name: None,
        }
    }
}
