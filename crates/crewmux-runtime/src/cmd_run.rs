//! `crewmux run` — execute a prompt pipeline across agents.

use std::sync::Arc;
use std::time::Duration;

use crewmux_coordinator::{CoordinatorError, Pipeline, PipelineConfig, PipelineRunner, Stage};
use crewmux_core::types::AgentKind;
use crewmux_tmux::{TmuxCommandRunner, TmuxDriver};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{resolve_session, RunOpts};

pub async fn cmd_run(
    runner: Arc<dyn TmuxCommandRunner>,
    opts: RunOpts,
) -> Result<(), CoordinatorError> {
    let session = resolve_session(opts.session.as_deref()).ok_or_else(|| {
        CoordinatorError::MalformedInput("no session given and CREWMUX_SESSION unset".into())
    })?;

    let stages = opts
        .stages
        .iter()
        .map(|raw| parse_stage(raw))
        .collect::<Result<Vec<Stage>, CoordinatorError>>()?;

    let pipeline = Pipeline {
        session,
        stages,
    };

    let config = PipelineConfig {
        stage_timeout: Duration::from_secs(opts.timeout_mins * 60),
        ..PipelineConfig::default()
    };
    let runner = PipelineRunner::new(Arc::new(TmuxDriver::new(runner)), config);

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling pipeline");
            cancel_on_signal.cancel();
        }
    });

    let outputs = runner.run(&pipeline, &cancel).await.map_err(|e| {
        eprintln!("pipeline failed at stage {}", e.stage + 1);
        e.source
    })?;

    if opts.all_outputs {
        for (i, output) in outputs.iter().enumerate() {
            println!("--- stage {} ---", i + 1);
            println!("{}", output.trim_end());
        }
    } else if let Some(last) = outputs.last() {
        println!("{}", last.trim_end());
    }
    Ok(())
}

/// Parse "<agent>:<prompt>" or "<agent>/<model>:<prompt>".
fn parse_stage(raw: &str) -> Result<Stage, CoordinatorError> {
    let (head, prompt) = raw.split_once(':').ok_or_else(|| {
        CoordinatorError::MalformedInput(format!("stage {raw:?}: expected <agent>:<prompt>"))
    })?;
    if prompt.trim().is_empty() {
        return Err(CoordinatorError::MalformedInput(format!(
            "stage {raw:?}: empty prompt"
        )));
    }

    let (kind_str, model) = match head.split_once('/') {
        Some((kind, model)) => (kind, Some(model.to_string())),
        None => (head, None),
    };
    let kind = AgentKind::parse(kind_str);
    if !kind.is_agent() {
        return Err(CoordinatorError::MalformedInput(format!(
            "stage {raw:?}: unknown agent type {kind_str:?}"
        )));
    }

    let mut stage = Stage::new(kind, prompt.trim());
    if let Some(model) = model {
        stage = stage.with_model(model);
    }
    Ok(stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_stage() {
        let stage = parse_stage("claude:summarize the design").expect("should parse");
        assert_eq!(stage.agent, AgentKind::Claude);
        assert_eq!(stage.prompt, "summarize the design");
        assert!(stage.model.is_none());
    }

    #[test]
    fn parse_stage_with_model() {
        let stage = parse_stage("claude/opus:deep analysis").expect("should parse");
        assert_eq!(stage.agent, AgentKind::Claude);
        assert_eq!(stage.model.as_deref(), Some("opus"));
    }

    #[test]
    fn parse_stage_short_codes() {
        assert_eq!(parse_stage("cod:x").expect("parse").agent, AgentKind::Codex);
        assert_eq!(parse_stage("gmi:x").expect("parse").agent, AgentKind::Gemini);
    }

    #[test]
    fn parse_stage_rejects_bad_input() {
        assert!(parse_stage("no separator").is_err());
        assert!(parse_stage("claude:   ").is_err());
        assert!(parse_stage("vim:do something").is_err());
    }

    #[test]
    fn prompt_may_contain_colons() {
        let stage = parse_stage("codex:fix the bug: tests fail at 3:00").expect("should parse");
        assert_eq!(stage.prompt, "fix the bug: tests fail at 3:00");
    }
}
