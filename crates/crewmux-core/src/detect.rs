//! Heuristic agent-state detection over captured pane scrollback.
//!
//! The detector is a pure function from the pane tail plus the agent kind
//! to one of {idle, working, awaiting_input, error, unknown}. Rules are
//! evaluated top-down, first match wins. [`StateTracker`] layers the
//! per-pane `since` timestamp on top.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::types::{AgentKind, AgentState, StateReading};

/// Compiled rule tables for one agent kind.
struct KindRules {
    /// Anchored idle-prompt patterns, matched against the last non-blank line.
    prompts: Vec<Regex>,
}

/// State detector with per-kind prompt tables. Build once and reuse; the
/// regexes are compiled in the constructor.
pub struct StateDetector {
    shell: KindRules,
    claude: KindRules,
    codex: KindRules,
    gemini: KindRules,
    waiting_phrases: Vec<&'static str>,
    error_banners: Vec<Regex>,
    /// Rejects prompt-suffix matches that are really currency, percent, or
    /// comparison tails ("cost is 5 $", "progress 42%", "if x > 3").
    numeric_context: Regex,
}

// Known "waiting for input" banners. Matched case-insensitively anywhere in
// the tail; subsumed into idle for assignment but reported distinctly.
const WAITING_PHRASES: &[&str] = &[
    "what would you like",
    "how can i help",
    "ready for",
    "waiting for",
];

// Provider error banners are noisy and vendor-specific; keep the table
// data-driven so new providers only add rows.
const ERROR_BANNERS: &[&str] = &[
    r"(?i)rate[ -]?limit(ed)?",
    r"(?i)quota (exceeded|exhausted)",
    r"(?i)unauthorized",
    r"(?i)invalid api key",
    r"(?i)overloaded_error",
    r"\b(401|429)\b.*(error|status)",
];

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static detector pattern"))
        .collect()
}

impl Default for StateDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl StateDetector {
    pub fn new() -> Self {
        // Every prompt pattern is anchored at end-of-line so inline text
        // ("cost is $5 for this") can never satisfy it.
        let shared = &[r"\$\s*$", r"%\s*$", r">\s*$", r">>>\s*$"];
        Self {
            shell: KindRules {
                prompts: compile_all(shared),
            },
            claude: KindRules {
                prompts: compile_all(&[r"claude>\s*$", r"\$\s*$", r"%\s*$", r">\s*$", r">>>\s*$"]),
            },
            codex: KindRules {
                prompts: compile_all(&[r"codex>\s*$", r"\$\s*$", r"%\s*$", r">\s*$", r">>>\s*$"]),
            },
            gemini: KindRules {
                prompts: compile_all(&[r"gemini>\s*$", r"\$\s*$", r"%\s*$", r">\s*$", r">>>\s*$"]),
            },
            waiting_phrases: WAITING_PHRASES.to_vec(),
            error_banners: compile_all(ERROR_BANNERS),
            numeric_context: Regex::new(r"\d\s*[%$>]\s*$").expect("static detector pattern"),
        }
    }

    fn rules_for(&self, kind: AgentKind) -> &KindRules {
        match kind {
            AgentKind::Claude => &self.claude,
            AgentKind::Codex => &self.codex,
            AgentKind::Gemini => &self.gemini,
            AgentKind::User | AgentKind::Unknown => &self.shell,
        }
    }

    /// Classify a pane tail. `tail` is the last ~10 lines of scrollback;
    /// mixed line endings and trailing whitespace are tolerated.
    pub fn detect(&self, tail: &str, kind: AgentKind) -> AgentState {
        if tail.trim().is_empty() {
            return AgentState::Unknown;
        }

        let last_line = tail
            .lines()
            .map(|l| l.trim_end_matches('\r').trim_end())
            .filter(|l| !l.is_empty())
            .next_back()
            .unwrap_or("");

        let rules = self.rules_for(kind);
        if rules.prompts.iter().any(|re| re.is_match(last_line))
            && !self.numeric_context.is_match(last_line)
        {
            return AgentState::Idle;
        }

        let lowered = tail.to_lowercase();
        if self.waiting_phrases.iter().any(|p| lowered.contains(p)) {
            return AgentState::AwaitingInput;
        }

        if self.error_banners.iter().any(|re| re.is_match(tail)) {
            return AgentState::Error;
        }

        AgentState::Working
    }
}

#[derive(Clone, Copy)]
struct Entry {
    reading: StateReading,
    /// Set right after prompt delivery: the pane is held at working even
    /// if the detector still reads the pre-delivery idle prompt, until the
    /// agent is actually seen doing something.
    delivery_hold: bool,
}

/// Tracks per-pane state transitions: the same state keeps its original
/// `since` timestamp, a change resets it.
#[derive(Default)]
pub struct StateTracker {
    entries: HashMap<String, Entry>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation. Returns the current reading plus whether this
    /// observation changed the state.
    pub fn observe(
        &mut self,
        pane_id: &str,
        state: AgentState,
        now: DateTime<Utc>,
    ) -> (StateReading, bool) {
        if let Some(entry) = self.entries.get_mut(pane_id) {
            if entry.delivery_hold {
                if state.is_assignable() {
                    // Stale idle prompt from before the delivery.
                    return (entry.reading, false);
                }
                entry.delivery_hold = false;
            }
            if entry.reading.state == state {
                return (entry.reading, false);
            }
            entry.reading = StateReading { state, since: now };
            (entry.reading, true)
        } else {
            let reading = StateReading { state, since: now };
            self.entries.insert(
                pane_id.to_string(),
                Entry {
                    reading,
                    delivery_hold: false,
                },
            );
            (reading, true)
        }
    }

    /// Pin a pane at working after a prompt was delivered to it, so the
    /// agent is not re-selected before the detector catches up. The hold
    /// clears once the detector sees any non-assignable state.
    pub fn hold_working(&mut self, pane_id: &str, now: DateTime<Utc>) {
        self.entries.insert(
            pane_id.to_string(),
            Entry {
                reading: StateReading {
                    state: AgentState::Working,
                    since: now,
                },
                delivery_hold: true,
            },
        );
    }

    pub fn reading(&self, pane_id: &str) -> Option<StateReading> {
        self.entries.get(pane_id).map(|e| e.reading)
    }

    pub fn forget(&mut self, pane_id: &str) {
        self.entries.remove(pane_id);
    }
}
