//! `crewmux assign` — recommend (or execute) task-to-agent assignments.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use crewmux_coordinator::coordinator::assignment_prompt;
use crewmux_coordinator::mail::assignment_commands;
use crewmux_coordinator::workgraph::{WorkGraph, WorkGraphCli};
use crewmux_coordinator::CoordinatorError;
use crewmux_core::detect::StateDetector;
use crewmux_core::driver::PaneDriver;
use crewmux_core::policy::{Policy, PolicyAction};
use crewmux_core::score::{score_and_select, ScoredAssignment, Strategy};
use crewmux_core::types::{AgentSnapshot, TriageResponse};
use crewmux_tmux::{TmuxCommandRunner, TmuxDriver};
use serde::Serialize;

use crate::cli::{resolve_session, AssignOpts};

#[derive(Serialize)]
struct AssignSummary {
    total_agents: usize,
    idle_agents: usize,
    working_agents: usize,
    ready_beads: usize,
    recommendations: usize,
}

#[derive(Serialize)]
struct AssignOutput {
    session: String,
    strategy: String,
    summary: AssignSummary,
    recommendations: Vec<ScoredAssignment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

pub async fn cmd_assign(
    runner: Arc<dyn TmuxCommandRunner>,
    opts: AssignOpts,
) -> Result<(), CoordinatorError> {
    let session = resolve_session(opts.session.as_deref()).ok_or_else(|| {
        CoordinatorError::MalformedInput("no session given and CREWMUX_SESSION unset".into())
    })?;
    let strategy = Strategy::parse(&opts.strategy).ok_or_else(|| {
        CoordinatorError::MalformedInput(format!("unknown strategy: {}", opts.strategy))
    })?;
    let project = opts.project.clone().unwrap_or_else(|| {
        std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| ".".into())
    });

    let driver = TmuxDriver::new(runner);
    let detector = StateDetector::new();

    // One consistent pass over the session's panes.
    let panes = driver.list(&session)?;
    let mut total_agents = 0usize;
    let mut idle: Vec<AgentSnapshot> = Vec::new();
    for pane in &panes {
        if !pane.kind.is_agent() {
            continue;
        }
        total_agents += 1;
        let tail = driver.capture(&pane.id, 10).unwrap_or_default();
        let state = detector.detect(&tail, pane.kind);
        if state.is_assignable() {
            let mut snapshot = AgentSnapshot::new(&pane.id, pane.kind);
            snapshot.variant = pane.variant.clone();
            idle.push(snapshot);
        }
    }

    let workgraph = WorkGraphCli::new(&opts.graph_bin);
    let mut triage = workgraph.triage(&project)?;
    filter_beads(&mut triage, opts.beads.as_deref());

    let ready = triage
        .recommendations
        .iter()
        .filter(|r| !r.is_blocked())
        .count();

    let selected = score_and_select(
        &idle,
        &triage.recommendations,
        &strategy.score_config(),
        &HashMap::new(),
        Utc::now(),
    );

    let mut warnings = Vec::new();
    if ready > idle.len() && !idle.is_empty() {
        warnings.push(format!(
            "{} beads won't be assigned - not enough idle agents",
            ready - idle.len()
        ));
    }

    let output = AssignOutput {
        session: session.clone(),
        strategy: strategy.as_str().to_string(),
        summary: AssignSummary {
            total_agents,
            idle_agents: idle.len(),
            working_agents: total_agents - idle.len(),
            ready_beads: ready,
            recommendations: selected.len(),
        },
        recommendations: selected,
        warnings,
    };

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_assign_output(&output);
    }

    if opts.auto && !output.recommendations.is_empty() {
        execute_assignments(&driver, &output.recommendations)?;
    }

    Ok(())
}

/// Keep only the requested bead ids, when `--beads` was given.
fn filter_beads(triage: &mut TriageResponse, beads: Option<&str>) {
    let Some(beads) = beads else { return };
    let wanted: Vec<&str> = beads.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if wanted.is_empty() {
        return;
    }
    triage
        .recommendations
        .retain(|r| wanted.contains(&r.id.as_str()));
}

fn print_assign_output(output: &AssignOutput) {
    println!("Task assignment recommendations for {}", output.session);
    println!("Strategy: {}", output.strategy);
    println!(
        "Agents: {} total, {} idle, {} working",
        output.summary.total_agents, output.summary.idle_agents, output.summary.working_agents
    );
    println!("Beads: {} ready", output.summary.ready_beads);
    println!();

    if output.recommendations.is_empty() {
        println!("No assignments to recommend.");
    } else {
        for rec in &output.recommendations {
            let a = &rec.assignment;
            println!(
                "  [{} {}] -> {} [P{}] (score {:.2})",
                a.agent_kind.short(),
                a.pane_id,
                a.work_id,
                a.priority,
                rec.total
            );
            println!("     {}", a.work_title);
        }
    }

    for warning in &output.warnings {
        println!("warning: {warning}");
    }
}

fn execute_assignments(
    driver: &TmuxDriver,
    recommendations: &[ScoredAssignment],
) -> Result<(), CoordinatorError> {
    let policy = Policy::default();
    println!();
    println!("Executing assignments...");
    for rec in recommendations {
        let assignment = &rec.assignment;
        let blocked = assignment_commands(&assignment.work_id)
            .iter()
            .any(|cmd| matches!(policy.check(cmd).map(|r| r.action), Some(PolicyAction::Block)));
        if blocked {
            println!("  skipped {}: blocked by policy", assignment.work_id);
            continue;
        }
        let prompt = assignment_prompt(assignment);
        match driver.send(&assignment.pane_id, &prompt, true) {
            Ok(()) => println!(
                "  assigned {} to pane {} ({})",
                assignment.work_id,
                assignment.pane_id,
                assignment.agent_kind.short()
            ),
            Err(e) => println!("  failed to assign to pane {}: {e}", assignment.pane_id),
        }
    }
    Ok(())
}
