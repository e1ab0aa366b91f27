//! crewmux: single binary exposing assignment, status, pipeline, and
//! coordinator-daemon commands over a tmux session of AI coding agents.

use std::sync::Arc;

use clap::Parser;
use crewmux_coordinator::CoordinatorError;
use crewmux_tmux::{TmuxCommandRunner, TmuxExecutor};

mod cli;
mod cmd_assign;
mod cmd_daemon;
mod cmd_run;
mod cmd_status;

fn build_runner(socket: Option<&str>) -> Arc<dyn TmuxCommandRunner> {
    let mut executor = TmuxExecutor::default();
    if let Some(path) = socket {
        executor = executor.with_socket_path(path);
    } else if let Ok(path) = std::env::var("CREWMUX_TMUX_SOCKET") {
        executor = executor.with_socket_path(path);
    }
    Arc::new(executor)
}

fn init_tracing() {
    let filter = std::env::var("CREWMUX_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();
    let runner = build_runner(args.tmux_socket.as_deref());

    let result: Result<(), CoordinatorError> = match args.command {
        cli::Command::Assign(opts) => cmd_assign::cmd_assign(runner, opts).await,
        cli::Command::Status(opts) => cmd_status::cmd_status(runner, opts).await,
        cli::Command::Run(opts) => {
            init_tracing();
            cmd_run::cmd_run(runner, opts).await
        }
        cli::Command::Daemon(opts) => {
            init_tracing();
            cmd_daemon::cmd_daemon(runner, opts).await
        }
    };

    if let Err(e) = result {
        eprintln!("error[{}]: {e}", e.kind_id());
        std::process::exit(1);
    }
}
