//! `crewmux status` — one-shot state view of every agent pane.

use std::sync::Arc;

use crewmux_coordinator::CoordinatorError;
use crewmux_core::detect::StateDetector;
use crewmux_core::driver::PaneDriver;
use crewmux_tmux::{TmuxCommandRunner, TmuxDriver};
use serde::Serialize;

use crate::cli::{resolve_session, StatusOpts};

#[derive(Serialize)]
struct PaneStatus {
    pane_id: String,
    index: u32,
    agent_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variant: Option<String>,
    state: &'static str,
    title: String,
}

pub async fn cmd_status(
    runner: Arc<dyn TmuxCommandRunner>,
    opts: StatusOpts,
) -> Result<(), CoordinatorError> {
    let session = resolve_session(opts.session.as_deref()).ok_or_else(|| {
        CoordinatorError::MalformedInput("no session given and CREWMUX_SESSION unset".into())
    })?;

    let driver = TmuxDriver::new(runner);
    let detector = StateDetector::new();

    let panes = driver.list(&session)?;
    let mut statuses = Vec::with_capacity(panes.len());
    for pane in &panes {
        let state = if pane.kind.is_agent() {
            let tail = driver.capture(&pane.id, 10).unwrap_or_default();
            detector.detect(&tail, pane.kind)
        } else {
            crewmux_core::types::AgentState::Unknown
        };
        statuses.push(PaneStatus {
            pane_id: pane.id.clone(),
            index: pane.index,
            agent_type: pane.kind.short(),
            variant: pane.variant.clone(),
            state: state.as_str(),
            title: pane.title.clone(),
        });
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        println!("{session}: {} panes", statuses.len());
        for s in &statuses {
            let variant = s.variant.as_deref().unwrap_or("-");
            println!(
                "  {:>4} {:<8} {:<10} {:<14} {}",
                s.index, s.agent_type, variant, s.state, s.title
            );
        }
    }
    Ok(())
}
