//! `crewmux daemon` — run the coordinator loop in the foreground,
//! printing lifecycle events as they happen.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crewmux_coordinator::session;
use crewmux_coordinator::workgraph::WorkGraphCli;
use crewmux_coordinator::{CoordinatorConfig, CoordinatorError, SessionCoordinator};
use crewmux_core::score::Strategy;
use crewmux_tmux::{TmuxCommandRunner, TmuxDriver};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{resolve_session, DaemonOpts};

pub async fn cmd_daemon(
    runner: Arc<dyn TmuxCommandRunner>,
    opts: DaemonOpts,
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

    let mut config = CoordinatorConfig::new(&session, &project)
        .with_auto_assign(opts.auto_assign)
        .with_strategy(strategy);
    config.tick_interval = Duration::from_millis(opts.tick_interval_ms);

    // Reuse the session's persisted identity so a restarted daemon keeps
    // the same coordinator name. No mail service is wired here, so the
    // registration stays local.
    match session::register_session_agent(None, &session, &project, Utc::now()) {
        Ok(identity) => config.agent_name = identity.agent_name,
        Err(e) => warn!(error = %e, "session identity not persisted"),
    }

    let driver = Arc::new(TmuxDriver::new(runner));
    let coordinator = SessionCoordinator::new(config, driver)
        .with_workgraph(Arc::new(WorkGraphCli::new(&opts.graph_bin)));

    let mut events = coordinator.events().subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode event"),
            }
        }
    });

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping coordinator");
            cancel_on_signal.cancel();
        }
    });

    info!(session = %session, auto_assign = opts.auto_assign, "daemon running");
    coordinator.run(cancel).await;
    printer.abort();

    if let Err(e) = session::update_session_activity(&session, Utc::now()) {
        warn!(error = %e, "failed to record session activity");
    }
    Ok(())
}
