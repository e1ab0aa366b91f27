//! Inter-agent mail interface and the assignment message format.
//!
//! The mail service is optional: without one, assignments are still
//! injected into panes, just not announced. Agent registration retries
//! once on a name conflict with a time-derived numeric suffix.

use chrono::{DateTime, Utc};
use crewmux_core::score::ScoredAssignment;

use crate::error::CoordinatorError;

#[derive(Debug, Clone)]
pub struct SendMessageOptions {
    pub project_key: String,
    pub sender: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body_md: String,
    pub importance: String,
    pub ack_required: bool,
}

#[derive(Debug, Clone)]
pub struct RegisterAgentOptions {
    pub project_key: String,
    pub program: String,
    pub model: String,
    pub name: String,
    pub task_description: String,
}

pub trait MailService: Send + Sync {
    /// Send a message; returns the message id.
    fn send_message(&self, opts: &SendMessageOptions) -> Result<String, CoordinatorError>;

    /// Register an agent name; `Conflict` on collision.
    fn register_agent(&self, opts: &RegisterAgentOptions) -> Result<String, CoordinatorError>;
}

/// Register, retrying once with a 4-digit suffix derived from the clock
/// when the name is taken.
pub fn register_with_disambiguation(
    mail: &dyn MailService,
    opts: &RegisterAgentOptions,
    now: DateTime<Utc>,
) -> Result<String, CoordinatorError> {
    match mail.register_agent(opts) {
        Ok(name) => Ok(name),
        Err(CoordinatorError::Conflict(_)) => {
            let mut retry = opts.clone();
            retry.name = format!("{}_{:04}", opts.name, now.timestamp() % 10000);
            mail.register_agent(&retry)
        }
        Err(e) => Err(e),
    }
}

/// Cap on how many unblocked ids the impact section lists.
const MAX_UNBLOCK_LINES: usize = 20;

/// Markdown body announcing a work assignment to an agent.
pub fn format_assignment_message(scored: &ScoredAssignment) -> String {
    let assignment = &scored.assignment;
    let work = &scored.work;

    let mut body = String::new();
    body.push_str("# Work Assignment\n\n");
    body.push_str(&format!("**Bead:** {}\n", assignment.work_id));
    body.push_str(&format!("**Title:** {}\n", assignment.work_title));
    body.push_str(&format!("**Priority:** P{}\n", assignment.priority));
    body.push_str(&format!("**Score:** {:.2}\n\n", assignment.score));

    if !work.reasons.is_empty() {
        body.push_str("## Why This Task\n\n");
        for reason in &work.reasons {
            body.push_str(&format!("- {reason}\n"));
        }
        body.push('\n');
    }

    if !work.unblocks.is_empty() {
        body.push_str("## Impact\n\n");
        body.push_str(&format!(
            "Completing this will unblock {} other tasks:\n",
            work.unblocks.len()
        ));
        for id in work.unblocks.iter().take(MAX_UNBLOCK_LINES) {
            body.push_str(&format!("- {id}\n"));
        }
        if work.unblocks.len() > MAX_UNBLOCK_LINES {
            body.push_str("- ...\n");
        }
        body.push('\n');
    }

    body.push_str("## Instructions\n\n");
    body.push_str(&format!("1. Review the bead with `bead show {}`\n", assignment.work_id));
    body.push_str(&format!(
        "2. Claim the work with `bead update {} --status in_progress`\n",
        assignment.work_id
    ));
    body.push_str("3. Reserve any files you'll modify\n");
    body.push_str("4. Implement and test\n");
    body.push_str(&format!("5. Close with `bead close {}`\n\n", assignment.work_id));
    body.push_str("Please acknowledge this message when you begin work.\n");

    body
}

/// Command strings an assignment asks the agent to run; every one is
/// checked against the policy guard before delivery.
pub fn assignment_commands(work_id: &str) -> Vec<String> {
    vec![
        format!("bead show {work_id}"),
        format!("bead update {work_id} --status in_progress"),
        format!("bead close {work_id}"),
    ]
}
