//! Regex policy over shell command strings.
//!
//! Three ordered rule lists with fixed precedence: allow beats block beats
//! approval. The coordinator runs every generated command through
//! [`Policy::check`] before an assignment is delivered.

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Block,
    Approval,
}

/// One compiled rule. Patterns are anchored at the start of the (trimmed)
/// command string.
#[derive(Debug)]
pub struct PolicyRule {
    pub action: PolicyAction,
    pub pattern: Regex,
    pub reason: &'static str,
}

fn rule(action: PolicyAction, pattern: &str, reason: &'static str) -> PolicyRule {
    PolicyRule {
        action,
        pattern: Regex::new(pattern).expect("static policy pattern"),
        reason,
    }
}

/// Precedence-ordered command policy.
pub struct Policy {
    allow: Vec<PolicyRule>,
    block: Vec<PolicyRule>,
    approval: Vec<PolicyRule>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            allow: vec![
                rule(
                    PolicyAction::Allow,
                    r"^git\s+push\s+(\S+\s+)*--force-with-lease\b",
                    "force-with-lease is the safe force push",
                ),
                rule(
                    PolicyAction::Allow,
                    r"^git\s+reset\s+--soft\b",
                    "soft reset keeps the working tree",
                ),
                rule(
                    PolicyAction::Allow,
                    r"^git\s+reset\s+(--mixed\s+)?(HEAD|\S*~\d*)\s*$",
                    "mixed reset keeps the working tree",
                ),
            ],
            block: vec![
                rule(
                    PolicyAction::Block,
                    r"^git\s+reset\s+--hard\b",
                    "hard reset discards work",
                ),
                rule(
                    PolicyAction::Block,
                    r"^git\s+clean\s+-[a-zA-Z]*f",
                    "git clean -f deletes untracked files",
                ),
                rule(
                    PolicyAction::Block,
                    r"^git\s+push\s+(\S+\s+)*(--force|-f)(\s|$)",
                    "force push rewrites remote history",
                ),
                rule(
                    PolicyAction::Block,
                    r"^rm\s+-[a-zA-Z]*[rR][a-zA-Z]*\s+(/|~)\s*$",
                    "recursive delete of root or home",
                ),
                rule(
                    PolicyAction::Block,
                    r"^git\s+branch\s+-D\b",
                    "force branch delete loses commits",
                ),
                rule(
                    PolicyAction::Block,
                    r"^git\s+stash\s+(drop|clear)\b",
                    "dropped stashes are unrecoverable",
                ),
            ],
            approval: vec![
                rule(
                    PolicyAction::Approval,
                    r"^git\s+rebase\s+-i\b",
                    "interactive rebase rewrites history",
                ),
                rule(
                    PolicyAction::Approval,
                    r"^git\s+commit\s+--amend\b",
                    "amend rewrites the last commit",
                ),
                rule(
                    PolicyAction::Approval,
                    r"^rm\s+-[a-zA-Z]*([rR][a-zA-Z]*f|f[a-zA-Z]*[rR])",
                    "recursive forced delete",
                ),
            ],
        }
    }
}

impl Policy {
    /// Policy from explicit rule lists. Precedence between the lists is
    /// fixed regardless of construction order.
    pub fn new(allow: Vec<PolicyRule>, block: Vec<PolicyRule>, approval: Vec<PolicyRule>) -> Self {
        Self {
            allow,
            block,
            approval,
        }
    }

    /// Build one rule; panics on an invalid pattern, so only use with
    /// vetted pattern literals.
    pub fn rule(action: PolicyAction, pattern: &str, reason: &'static str) -> PolicyRule {
        rule(action, pattern, reason)
    }

    /// Match a command against the policy. Allow > block > approval; the
    /// first matching rule within the winning list is returned. `None`
    /// means the command is unconstrained.
    pub fn check(&self, command: &str) -> Option<&PolicyRule> {
        let cmd = command.trim();
        for list in [&self.allow, &self.block, &self.approval] {
            if let Some(r) = list.iter().find(|r| r.pattern.is_match(cmd)) {
                return Some(r);
            }
        }
        None
    }

    pub fn is_blocked(&self, command: &str) -> bool {
        matches!(
            self.check(command),
            Some(PolicyRule {
                action: PolicyAction::Block,
                ..
            })
        )
    }

    pub fn needs_approval(&self, command: &str) -> bool {
        matches!(
            self.check(command),
            Some(PolicyRule {
                action: PolicyAction::Approval,
                ..
            })
        )
    }

    /// (allow, block, approval) rule counts.
    pub fn stats(&self) -> (usize, usize, usize) {
        (self.allow.len(), self.block.len(), self.approval.len())
    }
}
