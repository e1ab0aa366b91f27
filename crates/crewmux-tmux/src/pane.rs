//! TmuxPane, list-panes format string, parser, and agent-kind derivation.

use crewmux_core::types::AgentKind;
use serde::{Deserialize, Serialize};

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;

/// Tab-delimited format string for `tmux list-panes -s -F`.
pub const LIST_PANES_FORMAT: &str =
    "#{pane_id}\t#{session_name}\t#{window_id}\t#{pane_index}\t#{pane_title}\t#{pane_current_command}";

/// Metadata for one tmux pane, with the agent kind and model variant
/// derived from the pane title at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxPane {
    pub pane_id: String,
    pub session_name: String,
    pub window_id: String,
    pub index: u32,
    pub title: String,
    pub current_cmd: String,
    pub kind: AgentKind,
    pub variant: Option<String>,
}

/// Execute `tmux list-panes -s -t <session>` and parse the output.
pub fn list_panes(
    runner: &impl TmuxCommandRunner,
    session: &str,
) -> Result<Vec<TmuxPane>, TmuxError> {
    let output = runner.run(&["list-panes", "-s", "-t", session, "-F", LIST_PANES_FORMAT])?;
    parse_list_panes_output(&output)
}

/// Parse the raw output of `tmux list-panes -F <FORMAT>`.
pub fn parse_list_panes_output(output: &str) -> Result<Vec<TmuxPane>, TmuxError> {
    let mut panes = Vec::new();
    for (idx, line) in output.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        panes.push(parse_line(trimmed, idx + 1)?);
    }
    Ok(panes)
}

fn parse_line(line: &str, line_num: usize) -> Result<TmuxPane, TmuxError> {
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < 6 {
        return Err(TmuxError::ParseError {
            line_num,
            detail: format!("expected 6 tab-separated fields, got {}", parts.len()),
        });
    }

    let title = parts[4].to_string();
    let current_cmd = parts[5].to_string();
    let kind = derive_kind(&title, &current_cmd);
    let variant = derive_variant(&title);

    Ok(TmuxPane {
        pane_id: parts[0].to_string(),
        session_name: parts[1].to_string(),
        window_id: parts[2].to_string(),
        index: parts[3].trim().parse().unwrap_or(0),
        title,
        current_cmd,
        kind,
        variant,
    })
}

/// Derive the agent kind from the pane title, falling back to the running
/// command. Titles use spawn-time tags ("__cc", "__cod", ...) or plain
/// agent names; the kind never changes for a live pane.
pub fn derive_kind(title: &str, current_cmd: &str) -> AgentKind {
    let t = title.to_lowercase();
    if t.contains("__cc") || t.contains("claude") {
        return AgentKind::Claude;
    }
    if t.contains("__cod") || t.contains("codex") {
        return AgentKind::Codex;
    }
    if t.contains("__gmi") || t.contains("gemini") {
        return AgentKind::Gemini;
    }
    if t.contains("__user") {
        return AgentKind::User;
    }

    let cmd = current_cmd.to_lowercase();
    if cmd.contains("claude") {
        return AgentKind::Claude;
    }
    if cmd.contains("codex") {
        return AgentKind::Codex;
    }
    if cmd.contains("gemini") {
        return AgentKind::Gemini;
    }
    if matches!(cmd.as_str(), "bash" | "zsh" | "fish" | "sh" | "-zsh" | "-bash") {
        return AgentKind::User;
    }
    AgentKind::Unknown
}

const KNOWN_VARIANTS: &[&str] = &["opus", "sonnet", "haiku", "o3", "o4-mini", "flash", "pro"];

/// Extract the model hint from the pane title, if any.
pub fn derive_variant(title: &str) -> Option<String> {
    let t = title.to_lowercase();
    KNOWN_VARIANTS
        .iter()
        .find(|v| t.contains(*v))
        .map(|v| v.to_string())
}
