//! Multi-factor agent/work matching.
//!
//! Every (idle agent, open work item) pair gets a decomposable score; a
//! greedy pass over the sorted candidates then yields a maximal
//! non-conflicting matching (at most one item per agent, one agent per
//! item). Selection is deterministic for a stable input order.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgentKind, AgentSnapshot, PersonaProfile, ScoreBreakdown, WorkItem, WorkKind};

/// Knobs for assignment scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreConfig {
    pub prefer_critical_path: bool,
    pub penalize_file_overlap: bool,
    pub use_agent_profiles: bool,
    pub budget_aware: bool,
    /// Context usage percentage (0-100) above which the penalty kicks in.
    pub context_threshold: f64,
    pub profile_tag_weight: f64,
    pub focus_pattern_weight: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            prefer_critical_path: true,
            penalize_file_overlap: true,
            use_agent_profiles: true,
            budget_aware: true,
            context_threshold: 80.0,
            profile_tag_weight: 0.15,
            focus_pattern_weight: 0.10,
        }
    }
}

/// Assignment strategy selected on the CLI. Each variant is a preset over
/// [`ScoreConfig`]; `Balanced` is the plain default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Balanced,
    Speed,
    Quality,
    Dependency,
}

impl Strategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "balanced" => Some(Self::Balanced),
            "speed" => Some(Self::Speed),
            "quality" => Some(Self::Quality),
            "dependency" => Some(Self::Dependency),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Speed => "speed",
            Self::Quality => "quality",
            Self::Dependency => "dependency",
        }
    }

    /// Tuned scoring config for this strategy.
    pub fn score_config(&self) -> ScoreConfig {
        let mut cfg = ScoreConfig::default();
        match self {
            Self::Balanced => {}
            Self::Speed => {
                // Fast turnaround: ignore graph centrality, spread work thin.
                cfg.prefer_critical_path = false;
                cfg.context_threshold = 70.0;
            }
            Self::Quality => {
                cfg.profile_tag_weight = 0.25;
                cfg.focus_pattern_weight = 0.20;
            }
            Self::Dependency => {
                cfg.prefer_critical_path = true;
                cfg.profile_tag_weight = 0.10;
            }
        }
        cfg
    }
}

/// How a candidate's total was computed. All bonus terms add, penalties
/// subtract.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AssignmentBreakdown {
    pub base: f64,
    pub agent_type_bonus: f64,
    pub critical_path_bonus: f64,
    pub profile_tag_bonus: f64,
    pub focus_pattern_bonus: f64,
    pub file_overlap_penalty: f64,
    pub context_penalty: f64,
}

impl AssignmentBreakdown {
    pub fn total(&self) -> f64 {
        self.base + self.agent_type_bonus + self.critical_path_bonus + self.profile_tag_bonus
            + self.focus_pattern_bonus
            - self.file_overlap_penalty
            - self.context_penalty
    }
}

/// A work item bound to an agent. Pending until the prompt is delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub work_id: String,
    pub work_title: String,
    pub pane_id: String,
    pub agent_kind: AgentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_name: Option<String>,
    pub priority: u8,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_to_reserve: Vec<String>,
    pub assigned_at: DateTime<Utc>,
}

/// A scored (agent, work) candidate produced by [`score_and_select`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAssignment {
    pub assignment: Assignment,
    pub work: WorkItem,
    pub total: f64,
    pub breakdown: AssignmentBreakdown,
}

/// Score all (agent, item) pairs and pick a non-conflicting subset.
///
/// Blocked items are skipped, candidates with non-positive totals are
/// discarded, and the greedy selection over the descending-sorted list is
/// deterministic given a stable input order.
pub fn score_and_select(
    idle_agents: &[AgentSnapshot],
    items: &[WorkItem],
    config: &ScoreConfig,
    existing_reservations: &HashMap<String, Vec<String>>,
    now: DateTime<Utc>,
) -> Vec<ScoredAssignment> {
    if idle_agents.is_empty() || items.is_empty() {
        return Vec::new();
    }

    let mut candidates: Vec<ScoredAssignment> = Vec::new();
    for agent in idle_agents {
        for item in items {
            if item.is_blocked() {
                continue;
            }
            let scored = score_pair(agent, item, config, existing_reservations, now);
            if scored.total > 0.0 {
                candidates.push(scored);
            }
        }
    }

    // Stable descending sort keeps iteration order as the tie-breaker.
    candidates.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected = Vec::new();
    let mut taken_agents: HashSet<String> = HashSet::new();
    let mut taken_items: HashSet<String> = HashSet::new();
    for cand in candidates {
        if taken_agents.contains(&cand.assignment.pane_id) || taken_items.contains(&cand.work.id) {
            continue;
        }
        taken_agents.insert(cand.assignment.pane_id.clone());
        taken_items.insert(cand.work.id.clone());
        selected.push(cand);
    }
    selected
}

fn score_pair(
    agent: &AgentSnapshot,
    item: &WorkItem,
    config: &ScoreConfig,
    existing_reservations: &HashMap<String, Vec<String>>,
    now: DateTime<Utc>,
) -> ScoredAssignment {
    let mut breakdown = AssignmentBreakdown {
        base: item.score,
        ..Default::default()
    };

    if config.use_agent_profiles {
        breakdown.agent_type_bonus = agent_type_bonus(agent.kind, item);

        if let Some(profile) = &agent.profile {
            let task_tags = extract_task_tags(&item.title);
            breakdown.profile_tag_bonus =
                profile_tag_bonus(profile, &task_tags, config.profile_tag_weight);

            let mentioned = extract_mentioned_files(&item.title);
            breakdown.focus_pattern_bonus =
                focus_pattern_bonus(profile, &mentioned, config.focus_pattern_weight);
        }
    }

    if config.prefer_critical_path {
        if let Some(bd) = &item.breakdown {
            breakdown.critical_path_bonus = critical_path_bonus(bd);
        }
    }

    if config.penalize_file_overlap {
        breakdown.file_overlap_penalty = file_overlap_penalty(agent, existing_reservations);
    }

    if config.budget_aware {
        breakdown.context_penalty = context_penalty(agent.context_usage, config.context_threshold);
    }

    let total = breakdown.total();
    ScoredAssignment {
        assignment: Assignment {
            work_id: item.id.clone(),
            work_title: item.title.clone(),
            pane_id: agent.pane_id.clone(),
            agent_kind: agent.kind,
            mail_name: agent.mail_name.clone(),
            priority: item.priority,
            score: total,
            files_to_reserve: Vec::new(),
            assigned_at: now,
        },
        work: item.clone(),
        total,
        breakdown,
    }
}

/// Per-(kind, complexity) affinity. Claude-family agents shine on complex
/// multi-step work, codex-family on quick focused fixes, gemini-family on
/// the middle of the range.
fn agent_type_bonus(kind: AgentKind, item: &WorkItem) -> f64 {
    let complexity = estimate_complexity(item);
    match kind {
        AgentKind::Claude => {
            if complexity >= 0.7 {
                0.15
            } else if complexity <= 0.3 {
                -0.05
            } else {
                0.0
            }
        }
        AgentKind::Codex => {
            if complexity <= 0.3 {
                0.15
            } else if complexity >= 0.7 {
                -0.10
            } else {
                0.0
            }
        }
        AgentKind::Gemini => {
            if (0.4..=0.6).contains(&complexity) {
                0.05
            } else {
                0.0
            }
        }
        AgentKind::User | AgentKind::Unknown => 0.0,
    }
}

/// Estimate task complexity in [0, 1] from kind, priority, and fan-out.
pub fn estimate_complexity(item: &WorkItem) -> f64 {
    let mut complexity: f64 = 0.5;

    complexity += match item.kind {
        WorkKind::Epic => 0.3,
        WorkKind::Feature => 0.2,
        WorkKind::Bug => 0.0,
        WorkKind::Task => -0.1,
        WorkKind::Chore => -0.2,
    };

    // Urgent items tend to be quick fixes; backlog items tend to sprawl.
    if item.priority == 0 {
        complexity -= 0.1;
    } else if item.priority >= 3 {
        complexity += 0.1;
    }

    if item.unblocks.len() >= 5 {
        complexity += 0.15;
    } else if item.unblocks.len() >= 3 {
        complexity += 0.1;
    }

    complexity.clamp(0.0, 1.0)
}

fn critical_path_bonus(bd: &ScoreBreakdown) -> f64 {
    let mut bonus = 0.0;
    if bd.pagerank > 0.05 {
        bonus += bd.pagerank * 2.0;
    }
    if bd.blocker_ratio > 0.05 {
        bonus += bd.blocker_ratio * 1.5;
    }
    if bd.time_to_impact > 0.04 {
        bonus += 0.05;
    }
    bonus
}

/// Penalty tiers by how many reservations the agent already holds; spreads
/// work across agents. The explicit map takes precedence over the agent's
/// own reservation set.
fn file_overlap_penalty(
    agent: &AgentSnapshot,
    reservations: &HashMap<String, Vec<String>>,
) -> f64 {
    let count = reservations
        .get(&agent.pane_id)
        .filter(|r| !r.is_empty())
        .map(|r| r.len())
        .unwrap_or(agent.reservations.len());
    match count {
        0 => 0.0,
        1..=2 => 0.05,
        3..=5 => 0.10,
        _ => 0.20,
    }
}

/// Linear penalty above the context-usage threshold. Both arguments are in
/// percentage scale (0-100); 10 points over → 0.05, 20 over → 0.10.
pub fn context_penalty(context_usage: f64, threshold: f64) -> f64 {
    if context_usage <= threshold {
        return 0.0;
    }
    (context_usage - threshold) / 100.0 * 0.5
}

// Keyword → capability tag, applied to lowercased work titles.
const TASK_TAG_KEYWORDS: &[(&str, &str)] = &[
    ("test", "testing"),
    ("e2e", "testing"),
    ("coverage", "testing"),
    ("qa", "testing"),
    ("refactor", "architecture"),
    ("restructure", "architecture"),
    ("redesign", "architecture"),
    ("architecture", "architecture"),
    ("design", "architecture"),
    ("doc", "documentation"),
    ("readme", "documentation"),
    ("comment", "documentation"),
    ("implement", "implementation"),
    ("add", "implementation"),
    ("create", "implementation"),
    ("build", "implementation"),
    ("feature", "implementation"),
    ("review", "review"),
    ("audit", "review"),
    ("inspect", "review"),
    ("fix", "bugs"),
    ("bug", "bugs"),
    ("patch", "bugs"),
    ("error", "bugs"),
    ("crash", "bugs"),
];

/// Extract capability tags implied by a work title.
pub fn extract_task_tags(title: &str) -> Vec<String> {
    let text = title.to_lowercase();
    let mut tags: Vec<String> = Vec::new();
    for (keyword, tag) in TASK_TAG_KEYWORDS {
        if text.contains(keyword) && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

const FILE_EXTENSIONS: &[&str] = &[
    ".go", ".ts", ".js", ".py", ".rs", ".md", ".yaml", ".yml", ".json", ".toml",
];

/// Extract file-like tokens from a work title.
pub fn extract_mentioned_files(title: &str) -> Vec<String> {
    title
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| ",.;:()[]{}\"'`".contains(c)))
        .filter(|w| looks_like_path(w))
        .map(str::to_string)
        .collect()
}

fn looks_like_path(s: &str) -> bool {
    if s.len() < 3 {
        return false;
    }
    if s.contains('/') || s.contains('\\') {
        return true;
    }
    if FILE_EXTENSIONS.iter().any(|ext| s.ends_with(ext)) {
        return true;
    }
    if s.contains('*') {
        return true;
    }
    // Hidden files and dot-directories.
    s.starts_with('.') && s.len() > 1
}

fn profile_tag_bonus(profile: &PersonaProfile, task_tags: &[String], weight: f64) -> f64 {
    if profile.tags.is_empty() || task_tags.is_empty() {
        return 0.0;
    }
    let profile_tags: HashSet<String> = profile.tags.iter().map(|t| t.to_lowercase()).collect();
    let matches = task_tags
        .iter()
        .filter(|t| profile_tags.contains(&t.to_lowercase()))
        .count();
    if matches == 0 {
        return 0.0;
    }
    matches as f64 / profile.tags.len() as f64 * weight
}

fn focus_pattern_bonus(profile: &PersonaProfile, mentioned: &[String], weight: f64) -> f64 {
    if profile.focus_patterns.is_empty() || mentioned.is_empty() {
        return 0.0;
    }
    let matches = mentioned
        .iter()
        .filter(|file| {
            profile
                .focus_patterns
                .iter()
                .any(|pattern| match_focus_pattern(pattern, file))
        })
        .count();
    if matches == 0 {
        return 0.0;
    }
    matches as f64 / mentioned.len() as f64 * weight
}

/// Glob-style focus pattern match. `**` spans any path depth; otherwise a
/// simple single-segment glob is used.
pub fn match_focus_pattern(pattern: &str, file: &str) -> bool {
    if pattern.contains("**") {
        let parts: Vec<&str> = pattern.splitn(2, "**").collect();
        if parts.len() == 2 {
            let prefix = parts[0];
            let suffix = parts[1].trim_start_matches('/');
            if !prefix.is_empty() && !file.starts_with(prefix) {
                return false;
            }
            if !suffix.is_empty() {
                let suffix = suffix.trim_start_matches('*');
                return file.ends_with(suffix);
            }
            return true;
        }
    }
    glob_match(pattern, file)
}

/// Minimal glob matcher: `*` matches any run of characters, `?` exactly
/// one. No character classes, no path-separator awareness.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    // Iterative backtracking over the last-seen star.
    let (mut pi, mut ti) = (0usize, 0usize);
    let (mut star, mut star_ti) = (None::<usize>, 0usize);
    while ti < t.len() {
        if pi < p.len() && (p[pi] == t[ti] || p[pi] == '?') {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
